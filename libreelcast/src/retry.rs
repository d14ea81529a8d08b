//! Retry classification and backoff policy
//!
//! The policy is a pure function of the failure class, the attempt index and
//! a caller-supplied jitter sample, so schedules can be tested without
//! sleeping or seeding a random generator.

use std::time::Duration;

/// How a platform failure should be treated by the retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Network hiccup or server-side 5xx; retry with backoff
    Transient,
    /// Throttled; wait the advertised duration when the platform gave one
    RateLimited(Option<Duration>),
    /// Credential no longer valid; refresh before trying again
    AuthExpired,
    /// Retrying will not help
    Permanent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total publish attempts allowed, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the backoff delay added at most as jitter
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Decide what to do after attempt `attempt_index` (zero based) failed
    ///
    /// `jitter_sample` is expected in `[0, 1)`; values outside are clamped.
    pub fn decide(
        &self,
        classification: Classification,
        attempt_index: u32,
        jitter_sample: f64,
    ) -> RetryDecision {
        if attempt_index.saturating_add(1) >= self.max_attempts {
            return RetryDecision::GiveUp;
        }

        match classification {
            Classification::AuthExpired | Classification::Permanent => RetryDecision::GiveUp,
            Classification::RateLimited(Some(wait)) => RetryDecision::RetryAfter(wait),
            Classification::RateLimited(None) | Classification::Transient => {
                RetryDecision::RetryAfter(self.backoff(attempt_index, jitter_sample))
            }
        }
    }

    /// Exponential delay for an attempt index, jitter included, capped at `max_delay`
    pub fn backoff(&self, attempt_index: u32, jitter_sample: f64) -> Duration {
        let max = self.max_delay.as_secs_f64();
        let exponent = attempt_index.min(1023) as i32;
        let base = (self.base_delay.as_secs_f64() * 2f64.powi(exponent)).min(max);

        let sample = if jitter_sample.is_finite() {
            jitter_sample.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let jitter = self.jitter.max(0.0) * sample * base;

        Duration::from_secs_f64((base + jitter).min(max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_transient_schedule_without_jitter() {
        let policy = policy(10);
        let delays: Vec<Duration> = (0..7)
            .map(|i| match policy.decide(Classification::Transient, i, 0.0) {
                RetryDecision::RetryAfter(d) => d,
                RetryDecision::GiveUp => panic!("gave up at attempt {}", i),
            })
            .collect();

        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(16),
                Duration::from_secs(30),
                Duration::from_secs(30),
            ]
        );
    }

    #[test]
    fn test_transient_delays_non_decreasing_and_capped() {
        let policy = policy(64);
        for sample in [0.0, 0.3, 0.99] {
            let mut previous = Duration::ZERO;
            for attempt in 0..63 {
                let delay = policy.backoff(attempt, sample);
                assert!(delay >= previous, "attempt {} sample {}", attempt, sample);
                assert!(delay <= policy.max_delay);
                previous = delay;
            }
        }
    }

    #[test]
    fn test_jitter_adds_fraction_of_delay() {
        let policy = policy(5);
        assert_eq!(policy.backoff(2, 0.5), Duration::from_secs_f64(4.5));
        // never beyond the cap
        assert_eq!(policy.backoff(5, 0.99), Duration::from_secs(30));
    }

    #[test]
    fn test_rate_limited_uses_advertised_wait() {
        let policy = policy(10);
        let wait = Duration::from_secs(30);
        for attempt in [0, 3, 8] {
            assert_eq!(
                policy.decide(Classification::RateLimited(Some(wait)), attempt, 0.7),
                RetryDecision::RetryAfter(wait)
            );
        }
    }

    #[test]
    fn test_rate_limited_without_hint_backs_off() {
        let policy = policy(10);
        assert_eq!(
            policy.decide(Classification::RateLimited(None), 1, 0.0),
            RetryDecision::RetryAfter(Duration::from_secs(2))
        );
    }

    #[test]
    fn test_auth_and_permanent_give_up() {
        let policy = policy(10);
        assert_eq!(
            policy.decide(Classification::AuthExpired, 0, 0.0),
            RetryDecision::GiveUp
        );
        assert_eq!(
            policy.decide(Classification::Permanent, 0, 0.0),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn test_attempt_ceiling() {
        let policy = policy(3);
        assert!(matches!(
            policy.decide(Classification::Transient, 1, 0.0),
            RetryDecision::RetryAfter(_)
        ));
        assert_eq!(
            policy.decide(Classification::Transient, 2, 0.0),
            RetryDecision::GiveUp
        );
        assert_eq!(
            policy.decide(
                Classification::RateLimited(Some(Duration::from_secs(1))),
                2,
                0.0
            ),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn test_single_attempt_never_retries() {
        assert_eq!(
            policy(1).decide(Classification::Transient, 0, 0.0),
            RetryDecision::GiveUp
        );
    }
}
