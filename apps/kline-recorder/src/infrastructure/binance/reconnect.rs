//! Reconnection Backoff
//!
//! [`BackoffPolicy`] implementations for the feed connection: exponential
//! backoff with jitter for production and a fixed delay for the legacy
//! behaviour and tests. Policies are stateless; the connection owns the
//! attempt counter and resets it after every successful connect.

use std::time::Duration;

use rand::Rng;

use crate::application::ports::BackoffPolicy;

/// Exponential backoff with symmetric jitter.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay, before jitter.
    pub max_delay: Duration,
    /// Growth factor per attempt (2.0 doubles the delay).
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl ExponentialBackoff {
    /// Create a policy with custom values.
    #[must_use]
    pub const fn new(
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        jitter_factor: f64,
    ) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            jitter_factor,
        }
    }

    /// Build from the reconnect section of the recorder configuration.
    #[must_use]
    pub const fn from_settings(settings: &crate::ReconnectSettings) -> Self {
        Self {
            initial_delay: settings.delay_initial,
            max_delay: settings.delay_max,
            multiplier: settings.delay_multiplier,
            jitter_factor: settings.jitter_factor,
        }
    }

    /// Delay for `attempt` before jitter, capped at `max_delay`.
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let max_millis = self.max_delay.as_millis();
        #[allow(clippy::cast_precision_loss)]
        let initial = self.initial_delay.as_millis() as f64;
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = (initial * self.multiplier.powi(exponent)).round();

        let millis = if scaled.is_finite() && scaled > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                (scaled as u128).min(max_millis)
            }
        } else if scaled.is_infinite() && scaled > 0.0 {
            max_millis
        } else {
            0
        };
        Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.jitter_factor <= 0.0 || duration.is_zero() {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.jitter_factor;
        let jitter: f64 = rand::rng().random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        self.apply_jitter(self.base_delay(attempt))
    }
}

/// Constant delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay(pub Duration);

impl FixedDelay {
    /// Five-second retry, matching the dashboard backend this replaces.
    pub const LEGACY: Self = Self(Duration::from_secs(5));

    /// Retry immediately.
    pub const IMMEDIATE: Self = Self(Duration::ZERO);
}

impl BackoffPolicy for FixedDelay {
    fn delay(&self, _attempt: u32) -> Duration {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn no_jitter(initial_ms: u64, max_ms: u64, multiplier: f64) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(initial_ms),
            Duration::from_millis(max_ms),
            multiplier,
            0.0,
        )
    }

    #[test]
    fn default_values() {
        let policy = ExponentialBackoff::default();
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(60));
        assert!((policy.multiplier - 2.0).abs() < f64::EPSILON);
        assert!((policy.jitter_factor - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn exponential_growth() {
        let policy = no_jitter(100, 10_000, 2.0);
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
        assert_eq!(policy.delay(3), Duration::from_millis(800));
    }

    #[test]
    fn capped_at_max_delay() {
        let policy = no_jitter(1_000, 2_000, 4.0);
        assert_eq!(policy.delay(1), Duration::from_millis(2_000));
        assert_eq!(policy.delay(2), Duration::from_millis(2_000));
    }

    #[test]
    fn huge_attempt_does_not_overflow() {
        let policy = no_jitter(1_000, 60_000, 2.0);
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn jitter_bounds() {
        let policy = ExponentialBackoff::new(
            Duration::from_millis(1_000),
            Duration::from_secs(10),
            2.0,
            0.1,
        );
        for _ in 0..100 {
            let millis = policy.delay(0).as_millis();
            assert!(millis >= 900, "delay {millis}ms is below minimum 900ms");
            assert!(millis <= 1100, "delay {millis}ms is above maximum 1100ms");
        }
    }

    #[test]
    fn fixed_delay_ignores_attempt() {
        assert_eq!(FixedDelay::LEGACY.delay(0), Duration::from_secs(5));
        assert_eq!(FixedDelay::LEGACY.delay(42), Duration::from_secs(5));
        assert_eq!(FixedDelay::IMMEDIATE.delay(7), Duration::ZERO);
    }

    proptest! {
        #[test]
        fn base_delay_is_monotonic_and_bounded(attempt in 0u32..64, multiplier in 1.0f64..4.0) {
            let policy = no_jitter(250, 60_000, multiplier);
            let current = policy.base_delay(attempt);
            let next = policy.base_delay(attempt + 1);
            prop_assert!(current <= next);
            prop_assert!(next <= Duration::from_secs(60));
        }
    }
}
