//! Reconnect backoff
//!
//! Delays grow as `base * 2^(attempt-1)` up to `max`, with optional upward
//! jitter of at most a quarter of the nominal delay. Within one outage the
//! sequence of delays never decreases; a successful session resets it.

use crate::config::BackoffSection;
use std::time::Duration;
use uuid::Uuid;

/// Largest jitter as a fraction (1/N) of the nominal delay
const JITTER_DIVISOR: u64 = 4;

/// Reconnection delay configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub max_ms: u64,
    pub jitter: bool,
}

impl BackoffPolicy {
    pub fn new(base_ms: u64, max_ms: u64, jitter: bool) -> Self {
        Self {
            base_ms,
            max_ms: max_ms.max(base_ms),
            jitter,
        }
    }

    /// Nominal delay for the given 1-based attempt (pure function)
    pub fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        self.base_ms.saturating_mul(factor).min(self.max_ms)
    }

    /// Add jitter drawn from `sample`, never exceeding `max_ms` (pure function)
    pub fn apply_jitter(&self, nominal_ms: u64, sample: u64) -> u64 {
        if !self.jitter {
            return nominal_ms;
        }
        let span = nominal_ms / JITTER_DIVISOR;
        let extra = if span == 0 { 0 } else { sample % (span + 1) };
        nominal_ms.saturating_add(extra).min(self.max_ms)
    }
}

impl From<&BackoffSection> for BackoffPolicy {
    fn from(section: &BackoffSection) -> Self {
        Self::new(section.base_ms, section.max_ms, section.jitter)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from(&BackoffSection::default())
    }
}

/// Backoff state for one run of consecutive failures
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
    last_ms: u64,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            last_ms: 0,
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Waits scheduled since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Schedule the next wait; returns its 1-based number and duration
    pub fn next_delay(&mut self) -> (u32, Duration) {
        self.next_delay_with_sample(random_sample())
    }

    fn next_delay_with_sample(&mut self, sample: u64) -> (u32, Duration) {
        self.attempt = self.attempt.saturating_add(1);
        let nominal = self.policy.calculate_backoff_delay(self.attempt);
        let jittered = self.policy.apply_jitter(nominal, sample);
        // Jitter must not let a later wait undercut an earlier one
        self.last_ms = jittered.max(self.last_ms);
        (self.attempt, Duration::from_millis(self.last_ms))
    }

    /// Forget the failure run after a successful session
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.last_ms = 0;
    }
}

/// Each half of a v4 UUID carries fixed version or variant bits; XOR of the
/// halves leaves all 64 bits random.
fn random_sample() -> u64 {
    let (high, low) = Uuid::new_v4().as_u64_pair();
    high ^ low
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_nominal_delays_double_until_capped() {
        let policy = BackoffPolicy::new(1000, 30_000, false);
        let delays: Vec<u64> = (1..=7).map(|a| policy.calculate_backoff_delay(a)).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16_000, 30_000, 30_000]);
        assert_eq!(policy.calculate_backoff_delay(200), 30_000);
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = BackoffPolicy::new(1000, 30_000, true);
        assert_eq!(policy.apply_jitter(4000, 0), 4000);
        assert_eq!(policy.apply_jitter(4000, 1000), 5000);
        assert_eq!(policy.apply_jitter(4000, 1001), 4000);
        assert_eq!(policy.apply_jitter(30_000, 7000), 30_000);

        let no_jitter = BackoffPolicy::new(1000, 30_000, false);
        assert_eq!(no_jitter.apply_jitter(4000, 999), 4000);
    }

    #[test]
    fn test_backoff_sequence_and_reset() {
        let mut backoff = Backoff::new(BackoffPolicy::new(100, 1000, false));

        assert_eq!(backoff.next_delay(), (1, Duration::from_millis(100)));
        assert_eq!(backoff.next_delay(), (2, Duration::from_millis(200)));
        assert_eq!(backoff.next_delay(), (3, Duration::from_millis(400)));
        assert_eq!(backoff.attempt(), 3);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), (1, Duration::from_millis(100)));
    }

    #[test]
    fn test_large_jitter_does_not_let_next_delay_shrink() {
        let mut backoff = Backoff::new(BackoffPolicy::new(1000, 1200, true));
        // First wait: 1000 + 250 jitter, capped at 1200
        let (_, first) = backoff.next_delay_with_sample(250);
        // Second wait: nominal 1200 (capped), no jitter
        let (_, second) = backoff.next_delay_with_sample(0);
        assert_eq!(first, Duration::from_millis(1200));
        assert_eq!(second, Duration::from_millis(1200));
    }

    #[test]
    fn test_random_sample_has_no_fixed_bits() {
        let samples: Vec<u64> = (0..64).map(|_| random_sample()).collect();
        // Variant bits sit at the top of the low half, version bits at 12..16 of the high half
        let top_bits: HashSet<u64> = samples.iter().map(|s| s >> 62).collect();
        let version_bits: HashSet<u64> = samples.iter().map(|s| (s >> 12) & 0xF).collect();
        assert!(top_bits.len() > 1, "top bits fixed: {top_bits:?}");
        assert!(version_bits.len() > 1, "bits 12..16 fixed: {version_bits:?}");
    }

    #[test]
    fn test_policy_from_config_section() {
        let policy = BackoffPolicy::from(&BackoffSection::default());
        assert_eq!(policy.base_ms, 1000);
        assert_eq!(policy.max_ms, 30_000);
        assert!(policy.jitter);
    }

    proptest! {
        #[test]
        fn prop_delays_are_monotonic_and_capped(
            base in 1u64..5_000,
            extra in 0u64..60_000,
            samples in proptest::collection::vec(any::<u64>(), 1..40),
        ) {
            let max = base + extra;
            let mut backoff = Backoff::new(BackoffPolicy::new(base, max, true));
            let mut previous = Duration::ZERO;

            for sample in samples {
                let (_, delay) = backoff.next_delay_with_sample(sample);
                prop_assert!(delay >= previous);
                prop_assert!(delay <= Duration::from_millis(max));
                prop_assert!(delay >= Duration::from_millis(base));
                previous = delay;
            }
        }
    }
}
