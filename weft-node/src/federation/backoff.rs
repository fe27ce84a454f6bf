// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use rand::Rng;

// Layer 3: Internal module imports
// (none)

/// Default base delay between redial attempts.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Default cap on the redial delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Exponential reconnect pacing with full jitter.
///
/// Each failed attempt doubles the ceiling (`base * 2^attempt`, capped),
/// and the actual delay is drawn uniformly from `0..=ceiling`. Full jitter
/// keeps a relay that drops many spokes at once from being redialed by all
/// of them in lockstep.
///
/// # Example
/// ```rust
/// use std::time::Duration;
/// use weft_node::federation::ReconnectBackoff;
///
/// let mut backoff = ReconnectBackoff::default();
/// let first = backoff.next_delay();
/// assert!(first <= Duration::from_millis(500));
///
/// backoff.reset(); // successful connect starts the schedule over
/// assert_eq!(backoff.attempt(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    base_delay: Duration,
    max_delay: Duration,
    attempt: u32,
}

impl ReconnectBackoff {
    /// Create a backoff schedule.
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            attempt: 0,
        }
    }

    /// Delay to sleep before the next attempt, advancing the schedule.
    pub fn next_delay(&mut self) -> Duration {
        // Cap the exponent to keep the shift well-defined.
        let exponent = self.attempt.min(16);
        self.attempt = self.attempt.saturating_add(1);

        let ceiling_ms = self
            .base_delay
            .as_millis()
            .saturating_mul(1u128 << exponent)
            .min(self.max_delay.as_millis()) as u64;
        let jittered = rand::thread_rng().gen_range(0..=ceiling_ms);
        Duration::from_millis(jittered)
    }

    /// Failed attempts since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Restart the schedule after a successful connect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_within_growing_ceiling() {
        let mut backoff = ReconnectBackoff::new(Duration::from_millis(100), Duration::from_secs(5));

        for attempt in 0..10 {
            let ceiling =
                Duration::from_millis((100u64 << attempt.min(16)).min(5_000));
            let delay = backoff.next_delay();
            assert!(delay <= ceiling, "attempt {attempt}: {delay:?} > {ceiling:?}");
        }
    }

    #[test]
    fn test_ceiling_caps_at_max() {
        let mut backoff = ReconnectBackoff::new(Duration::from_millis(500), Duration::from_secs(2));
        for _ in 0..20 {
            assert!(backoff.next_delay() <= Duration::from_secs(2));
        }
    }

    #[test]
    fn test_reset() {
        let mut backoff = ReconnectBackoff::default();
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.attempt(), 2);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
    }

    #[test]
    fn test_many_attempts_do_not_overflow() {
        let mut backoff = ReconnectBackoff::default();
        for _ in 0..100 {
            let _ = backoff.next_delay();
        }
        assert!(backoff.next_delay() <= DEFAULT_MAX_DELAY);
    }
}
