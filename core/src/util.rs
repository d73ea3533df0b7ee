use std::time::Duration;

use rand::Rng;

/// Default exponential back-off schedule: 200ms -> 400ms -> 800ms -> 1600ms,
/// jittered by +/-20% so concurrent retries (e.g. every agent's attempt
/// snapshot failing at once) don't all wake up on the same tick.
///
/// Used by Attempt Storage for `StorageError` retries (spec §4.5 "Failure
/// semantics") and by the Orchestrator for backend transport retries.
pub fn backoff(attempt: u32) -> Duration {
    let base_delay_ms = 200u64 * (1u64 << attempt.saturating_sub(1).min(10));
    let jitter = rand::rng().random_range(0.8..1.2);
    let delay_ms = (base_delay_ms as f64 * jitter) as u64;
    Duration::from_millis(delay_ms)
}
