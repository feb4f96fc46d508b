//! Configuration for stint: schema types, file discovery, and `${VAR}` substitution.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{
        clear_config_dir, config_dir, discover_and_load, find_config_file, load_config,
        set_config_dir,
    },
    schema::{ReaperConfig, SessionsConfig, StintConfig},
};
