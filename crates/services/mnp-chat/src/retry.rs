use backon::ExponentialBuilder;
use std::time::Duration;

/// Upper bound for a single reconnect delay.
pub const DEFAULT_MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Creates the default exponential backoff builder for REST requests
///
/// Configured with:
/// - Initial interval: 250ms
/// - Max interval: 2s
/// - Max times: 2
/// - Factor: 2.0
/// - Jitter enabled
#[must_use]
pub fn default_backoff_builder() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(250))
        .with_max_delay(Duration::from_secs(2))
        .with_max_times(2)
        .with_factor(2.0)
        .with_jitter()
}

/// Determines if an HTTP status code should trigger a retry
///
/// Retries on: 408, 409, 429, and 5xx
#[must_use]
pub const fn is_retryable_status(code: u16) -> bool {
    matches!(code, 408 | 409 | 429 | 500..=599)
}

/// Delay before reconnect attempt `attempt` (1-based).
///
/// `min(base * 2^(attempt-1), cap)`. No jitter: the schedule is part of the
/// connection contract and callers surface it to users.
#[must_use]
pub fn reconnect_delay(base: Duration, attempt: u32, cap: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.checked_mul(1u32 << exponent)
        .map_or(cap, |delay| delay.min(cap))
}
