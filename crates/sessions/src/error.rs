//! Session error types

use thiserror::Error;

/// Errors returned by [`SessionManager`](crate::SessionManager) operations.
///
/// Messages never include the token.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,

    #[error("session expired")]
    Expired,

    #[error("session store did not create a row")]
    CreationFailed,

    #[error("stored payload does not decode into the requested type: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("session storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

impl SessionError {
    /// `NotFound` and `Expired` are expected in normal flow (stale client tokens).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotFound | Self::Expired)
    }
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
