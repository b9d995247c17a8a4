//! Bounded-attempt retry with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::error::Error;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const BASE: Duration = Duration::from_secs(1);
const CAP: Duration = Duration::from_secs(10);

/// `base * 2^attempt`, capped at `CAP`, plus additive jitter uniform in
/// `[0, 0.25 * delay]`. `attempt` is zero-indexed.
pub fn backoff(attempt: u32) -> Duration {
    let doubled = BASE.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    let delay = doubled.min(CAP);
    let jitter_max = delay.mul_f64(0.25);
    let jitter = if jitter_max.is_zero() {
        Duration::ZERO
    } else {
        let millis = rand::thread_rng().gen_range(0..=jitter_max.as_millis().max(1) as u64);
        Duration::from_millis(millis)
    };
    delay + jitter
}

/// Run `f` up to `max_attempts` times (non-positive treated as the default
/// of 3). Sleeps `backoff(attempt)` between failures, honoring
/// cancellation both before the call and during the sleep.
pub async fn run<T, F, Fut>(
    cancel: &CancellationToken,
    max_attempts: i64,
    mut f: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let max_attempts = if max_attempts > 0 {
        max_attempts as u32
    } else {
        DEFAULT_MAX_ATTEMPTS
    };

    let mut last_err = Error::Fatal("retry called with zero attempts".to_owned());
    for attempt in 0..max_attempts {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => last_err = err,
        }

        let is_last = attempt + 1 == max_attempts;
        if !is_last {
            tokio::select! {
                _ = tokio::time::sleep(backoff(attempt)) => {}
                _ = cancel.cancelled() => return Err(Error::Cancelled),
            }
        }
    }
    Err(last_err)
}
