//! Composite system health score
//!
//! Health starts at 100 and loses up to `flagged_weight` points as the flagged
//! rate approaches `flagged_rate_ceiling`, and up to `latency_weight` points as
//! average latency approaches `latency_ceiling_ms`. The score never increases
//! when either input increases, and it is a pure function of its inputs.

use serde::{Deserialize, Serialize};

/// Upper bound of the health score
pub const MAX_HEALTH: f64 = 100.0;

/// Weighting policy for the health score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthPolicy {
    /// Points lost at or above the flagged-rate ceiling
    pub flagged_weight: f64,
    /// Flagged rate at which the flagged penalty saturates
    pub flagged_rate_ceiling: f64,
    /// Points lost at or above the latency ceiling
    pub latency_weight: f64,
    /// Average latency (ms) at which the latency penalty saturates
    pub latency_ceiling_ms: f64,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            flagged_weight: 70.0,
            flagged_rate_ceiling: 0.5,
            latency_weight: 30.0,
            latency_ceiling_ms: 2000.0,
        }
    }
}

impl HealthPolicy {
    /// Compute health in [0, 100]
    ///
    /// NaN and negative inputs count as "no signal" and cost nothing.
    pub fn score(&self, flagged_rate: f64, average_latency_ms: f64) -> f64 {
        let flagged_penalty =
            non_negative(self.flagged_weight) * saturation(flagged_rate, self.flagged_rate_ceiling);
        let latency_penalty = non_negative(self.latency_weight)
            * saturation(average_latency_ms, self.latency_ceiling_ms);

        (MAX_HEALTH - flagged_penalty - latency_penalty).clamp(0.0, MAX_HEALTH)
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_nan() || value <= 0.0 {
        0.0
    } else {
        value
    }
}

/// Fraction of `ceiling` reached by `value`, in [0, 1]
fn saturation(value: f64, ceiling: f64) -> f64 {
    let value = non_negative(value);
    if value == 0.0 {
        return 0.0;
    }
    let ceiling = non_negative(ceiling);
    if ceiling == 0.0 {
        return 1.0;
    }
    // inf / inf is NaN, and f64::min yields the non-NaN operand
    (value / ceiling).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_no_signal_is_fully_healthy() {
        assert_eq!(HealthPolicy::default().score(0.0, 0.0), 100.0);
    }

    #[test]
    fn test_saturated_inputs_floor_at_zero() {
        let policy = HealthPolicy::default();
        assert_eq!(policy.score(1.0, 10_000.0), 0.0);
        assert_eq!(policy.score(1.0, f64::INFINITY), 0.0);
    }

    #[test]
    fn test_partial_penalties() {
        let policy = HealthPolicy::default();
        // 0.25 / 0.5 of 70 points, 1000 / 2000 of 30 points
        assert!((policy.score(0.25, 1000.0) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_nan_and_negative_inputs_cost_nothing() {
        let policy = HealthPolicy::default();
        assert_eq!(policy.score(f64::NAN, -5.0), 100.0);
    }

    #[test]
    fn test_zero_ceiling_saturates_on_any_signal() {
        let policy = HealthPolicy {
            latency_ceiling_ms: 0.0,
            ..Default::default()
        };
        assert_eq!(policy.score(0.0, 0.0), 100.0);
        assert_eq!(policy.score(0.0, 1.0), 70.0);
    }

    proptest! {
        #[test]
        fn health_in_range(rate in -1.0f64..2.0, latency in -100.0f64..1e6) {
            let score = HealthPolicy::default().score(rate, latency);
            prop_assert!((0.0..=100.0).contains(&score));
        }

        #[test]
        fn health_monotonic_in_flagged_rate(
            a in 0.0f64..1.0,
            b in 0.0f64..1.0,
            latency in 0.0f64..5000.0,
        ) {
            let policy = HealthPolicy::default();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(policy.score(hi, latency) <= policy.score(lo, latency));
        }

        #[test]
        fn health_monotonic_in_latency(
            a in 0.0f64..10_000.0,
            b in 0.0f64..10_000.0,
            rate in 0.0f64..1.0,
        ) {
            let policy = HealthPolicy::default();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(policy.score(rate, hi) <= policy.score(rate, lo));
        }

        #[test]
        fn health_is_stable(rate in 0.0f64..1.0, latency in 0.0f64..5000.0) {
            let policy = HealthPolicy::default();
            prop_assert_eq!(policy.score(rate, latency), policy.score(rate, latency));
        }
    }
}
