//! Rate-limit and backoff policy — pure functions over
//! [`RateLimitInfo`] and HTTP status shapes. The `reqwest`-specific header
//! parsing that produces a `RateLimitInfo` lives in `triage-github`; this
//! module only ever sees the already-parsed value so `triage-core` stays
//! free of an HTTP dependency.

use std::time::Duration;

use triage_protocol::RateLimitInfo;

/// Below this many remaining calls, the poller should pause before its next
/// request even though the current one succeeded.
const LOW_WATERMARK: i64 = 100;

/// `true` once `remaining` drops under [`LOW_WATERMARK`]. Unknown remaining
/// (no header present) is treated as "don't throttle" — the poller has no
/// evidence it's close to the limit.
pub fn should_throttle(info: &RateLimitInfo) -> bool {
    matches!(info.remaining, Some(remaining) if remaining < LOW_WATERMARK)
}

/// How long to sleep before the next request, given `now`. Zero if
/// `reset_at` is unknown or already in the past.
pub fn wait_duration(info: &RateLimitInfo, now_epoch_secs: i64) -> Duration {
    match info.reset_at {
        Some(reset_at) if reset_at > now_epoch_secs => {
            Duration::from_secs((reset_at - now_epoch_secs) as u64)
        }
        _ => Duration::ZERO,
    }
}

/// `true` for `304 Not Modified` (poller should treat as "no change",
/// not an error).
pub fn is_not_modified(status: u16) -> bool {
    status == 304
}

/// `true` for any `5xx` — the retry helper's backoff applies, distinct from
/// the scheduled rate-limit wait.
pub fn is_server_error(status: u16) -> bool {
    (500..600).contains(&status)
}

/// `true` for `403` (often a rate-limit in disguise on code-hosting APIs)
/// or `429`.
pub fn is_rate_limit_error(status: u16) -> bool {
    status == 403 || status == 429
}

/// `backoff(attempt) = min(2^attempt seconds, 60s)`. Distinct from
/// [`crate::retry::backoff`]: no jitter, a 60s cap rather than 10s — this is
/// the plain exponential curve the poller applies to its own 5xx retries,
/// separate from C2's jittered helper used elsewhere. `attempt` floors at 0.
pub fn backoff(attempt: u32) -> Duration {
    let secs = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_secs(secs.min(60))
}

/// `handle_rate_limit_error`: only meaningful for a 403/429
/// response. Prefers `reset - now` when positive, otherwise `retry_after`
/// (the `Retry-After` header, seconds), otherwise a flat 60s. Returns
/// `None` for a non-rate-limit status — the caller should treat that as a
/// plain error instead of a scheduled wait.
pub fn handle_rate_limit_error(
    status: u16,
    info: &RateLimitInfo,
    retry_after_secs: Option<u64>,
    now_epoch_secs: i64,
) -> Option<Duration> {
    if !is_rate_limit_error(status) {
        return None;
    }
    let scheduled = wait_duration(info, now_epoch_secs);
    if !scheduled.is_zero() {
        return Some(scheduled);
    }
    if let Some(secs) = retry_after_secs {
        return Some(Duration::from_secs(secs));
    }
    Some(Duration::from_secs(60))
}
