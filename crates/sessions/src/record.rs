use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::policy;

/// A persisted session row.
///
/// Values are immutable in flight: the manager fetches a record, derives an
/// updated copy with [`with_payload`](Self::with_payload) or
/// [`renewed`](Self::renewed), and writes that copy back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub token: String,
    /// Serialized JSON, or `None` when the session carries no data.
    pub payload: Option<String>,
    /// Absolute expiry, epoch milliseconds.
    pub expires_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SessionRecord {
    /// Whether the session is still valid at `now`.
    pub fn is_valid_at(&self, now: i64) -> bool {
        policy::is_valid(self.expires_at, now)
    }

    /// Copy with the payload replaced.
    pub fn with_payload(self, payload: Option<String>) -> Self {
        Self { payload, ..self }
    }

    /// Copy with the renewal step applied. Unchanged when no renewal is due.
    pub fn renewed(self, now: i64, renew_step: i64) -> Self {
        match policy::renewed_expiry(self.expires_at, now, renew_step) {
            Some(expires_at) => Self { expires_at, ..self },
            None => self,
        }
    }
}

pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Short token prefix for log lines; full tokens are bearer secrets.
pub(crate) fn token_prefix(token: &str) -> &str {
    token.get(..8).unwrap_or(token)
}
