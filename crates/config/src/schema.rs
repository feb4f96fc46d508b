/// Config schema types (sessions, reaper).
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default session lifetime: 24 hours.
pub const DEFAULT_EXPIRE_TIME_MS: u64 = 24 * 60 * 60 * 1000;
/// Default renewal step: 1 hour.
pub const DEFAULT_RENEW_TIMESTAMP_MS: u64 = 60 * 60 * 1000;
/// Default reaper cadence: 5 minutes.
pub const DEFAULT_REAP_INTERVAL_SECS: u64 = 300;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StintConfig {
    pub sessions: SessionsConfig,
    pub reaper: ReaperConfig,
}

/// Session lifetime policy and storage location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Milliseconds added to the creation time to compute a new session's expiry.
    #[serde(alias = "expireTime")]
    pub expire_time: u64,

    /// Milliseconds a renewal pushes the expiry past "now".
    #[serde(alias = "renewTimestamp")]
    pub renew_timestamp: u64,

    /// Path to the SQLite database file.
    #[serde(alias = "storagePath")]
    pub storage_path: PathBuf,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            expire_time: DEFAULT_EXPIRE_TIME_MS,
            renew_timestamp: DEFAULT_RENEW_TIMESTAMP_MS,
            storage_path: PathBuf::from("./sessions.db"),
        }
    }
}

impl SessionsConfig {
    /// Check that durations fit a signed millisecond timestamp and a storage path is set.
    pub fn validate(&self) -> anyhow::Result<()> {
        if i64::try_from(self.expire_time).is_err() {
            anyhow::bail!("sessions.expire_time is out of range: {}", self.expire_time);
        }
        if i64::try_from(self.renew_timestamp).is_err() {
            anyhow::bail!(
                "sessions.renew_timestamp is out of range: {}",
                self.renew_timestamp
            );
        }
        if self.storage_path.as_os_str().is_empty() {
            anyhow::bail!("sessions.storage_path must not be empty");
        }
        Ok(())
    }

    /// Session lifetime in milliseconds, clamped to `i64::MAX`.
    pub fn expire_time_ms(&self) -> i64 {
        i64::try_from(self.expire_time).unwrap_or(i64::MAX)
    }

    /// Renewal step in milliseconds, clamped to `i64::MAX`.
    pub fn renew_timestamp_ms(&self) -> i64 {
        i64::try_from(self.renew_timestamp).unwrap_or(i64::MAX)
    }
}

/// Periodic removal of expired sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    /// Sweep expired sessions before each session command.
    pub enabled: bool,

    /// Seconds between reaper passes.
    pub interval_secs: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: DEFAULT_REAP_INTERVAL_SECS,
        }
    }
}
