//! Session token storage with sliding expiry.
//!
//! Sessions are opaque UUID tokens bound to a JSON payload and an absolute
//! expiry. Rows live in a [`SessionStore`] (SQLite by default); the
//! [`SessionManager`] applies validity checks, renewal, and bulk reaping.

pub mod error;
pub mod manager;
pub mod payload;
pub mod policy;
pub mod reaper;
pub mod record;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;

pub use {
    error::{Result, SessionError},
    manager::SessionManager,
    reaper::{DEFAULT_REAP_INTERVAL, reap_once, spawn_reaper},
    record::SessionRecord,
    store::SessionStore,
    store_memory::MemorySessionStore,
    store_sqlite::SqliteSessionStore,
};
