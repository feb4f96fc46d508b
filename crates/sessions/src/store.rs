//! Storage abstraction for session rows.

use async_trait::async_trait;

use crate::record::SessionRecord;

/// Durable collection of session rows keyed by token.
///
/// Backends generate tokens, own row timestamps, and never interpret the
/// payload. Expiry policy lives in the manager.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new row under a freshly generated unique token.
    /// Returns `None` if the backend reports that no row was created.
    async fn insert(
        &self,
        payload: Option<String>,
        expires_at: i64,
    ) -> anyhow::Result<Option<SessionRecord>>;

    /// Point lookup. Absence is not an error.
    async fn find_by_token(&self, token: &str) -> anyhow::Result<Option<SessionRecord>>;

    /// Write back payload and expiry of an existing row, refreshing `updated_at`.
    /// Returns `false` if the row no longer exists.
    async fn save(&self, record: &SessionRecord) -> anyhow::Result<bool>;

    /// Idempotent delete. Returns whether a row was removed.
    async fn delete_by_token(&self, token: &str) -> anyhow::Result<bool>;

    /// Delete every row with `expires_at < now` in one operation.
    async fn delete_expired(&self, now: i64) -> anyhow::Result<u64>;

    /// Number of stored rows, expired ones included.
    async fn count(&self) -> anyhow::Result<u64>;
}

pub(crate) fn new_token() -> String {
    uuid::Uuid::new_v4().to_string()
}
