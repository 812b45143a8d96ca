use crate::domain::config::ReconnectPolicy;
use std::time::Duration;

/// Delay before reconnect attempt `attempt` (1-based).
///
/// `initial_delay_ms * 2^(attempt - 1)`, capped at `max_delay_ms`.
pub fn retry_delay(attempt: u32, policy: &ReconnectPolicy) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let shift = attempt.saturating_sub(1).min(30);
    let delay = policy
        .initial_delay_ms
        .saturating_mul(1u64 << shift)
        .min(policy.max_delay_ms);

    Duration::from_millis(delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(initial: u64, max: u64) -> ReconnectPolicy {
        ReconnectPolicy {
            enabled: true,
            max_attempts: 10,
            initial_delay_ms: initial,
            max_delay_ms: max,
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = policy(100, 10_000);
        assert_eq!(retry_delay(1, &policy), Duration::from_millis(100));
        assert_eq!(retry_delay(2, &policy), Duration::from_millis(200));
        assert_eq!(retry_delay(3, &policy), Duration::from_millis(400));
        assert_eq!(retry_delay(7, &policy), Duration::from_millis(6400));
    }

    #[test]
    fn test_backoff_saturates_at_max() {
        let policy = policy(100, 10_000);
        assert_eq!(retry_delay(8, &policy), Duration::from_millis(10_000));
        assert_eq!(retry_delay(100, &policy), Duration::from_millis(10_000));
        assert_eq!(retry_delay(u32::MAX, &policy), Duration::from_millis(10_000));
    }

    #[test]
    fn test_attempt_zero_has_no_delay() {
        assert_eq!(retry_delay(0, &policy(100, 1000)), Duration::ZERO);
    }
}
