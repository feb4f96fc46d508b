//! Expiry and renewal rules.
//!
//! Pure functions of `(now, expires_at, step)`; all values are epoch
//! milliseconds or millisecond durations.

/// A session is valid while its expiry lies strictly in the future.
/// Expiring exactly at `now` counts as expired.
pub fn is_valid(expires_at: i64, now: i64) -> bool {
    expires_at.saturating_sub(now) > 0
}

/// Rows matched by bulk reaping: expiry strictly before `now`.
pub fn is_reapable(expires_at: i64, now: i64) -> bool {
    expires_at < now
}

/// Initial expiry for a session created at `now`.
pub fn initial_expiry(now: i64, expire_time: i64) -> i64 {
    now.saturating_add(expire_time)
}

/// Renewal is due when one step from `now` would land past the current expiry.
///
/// A session that already outlives a full step is left alone, so renewal never
/// shortens a session and repeated renewals inside one step cost no write.
/// Sessions past expiry are always due.
pub fn renewal_due(expires_at: i64, now: i64, renew_step: i64) -> bool {
    now.saturating_add(renew_step) > expires_at
}

/// The expiry after a renewal request, or `None` when no renewal is due.
pub fn renewed_expiry(expires_at: i64, now: i64, renew_step: i64) -> Option<i64> {
    renewal_due(expires_at, now, renew_step).then(|| now.saturating_add(renew_step))
}
