//! Background removal of expired sessions.

use std::{sync::Arc, time::Duration};

use {
    tokio::{task::JoinHandle, time::interval},
    tracing::{debug, info, warn},
};

use crate::manager::SessionManager;

pub const DEFAULT_REAP_INTERVAL: Duration =
    Duration::from_secs(stint_config::schema::DEFAULT_REAP_INTERVAL_SECS);

const MIN_REAP_INTERVAL: Duration = Duration::from_millis(1);

/// Run one reaper pass, logging the outcome. Returns the number of rows removed.
pub async fn reap_once(manager: &SessionManager) -> Option<u64> {
    match manager.remove_expired_sessions().await {
        Ok(0) => {
            debug!("session reap: no expired sessions");
            Some(0)
        },
        Ok(count) => {
            info!(reaped = count, "session reap completed");
            Some(count)
        },
        Err(e) => {
            warn!(error = %e, "session reap failed");
            None
        },
    }
}

/// Spawn a task that reaps expired sessions every `every`.
///
/// The first pass runs one full interval after spawning. Failures are logged
/// and the loop keeps going; abort the returned handle to stop it. A zero
/// interval is raised to one millisecond.
pub fn spawn_reaper(manager: Arc<SessionManager>, every: Duration) -> JoinHandle<()> {
    let every = every.max(MIN_REAP_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = interval(every);

        // Skip the immediate first tick.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            reap_once(&manager).await;

            if let Ok(count) = manager.count_sessions().await {
                debug!(stored_sessions = count, "session store status");
            }
        }
    })
}
