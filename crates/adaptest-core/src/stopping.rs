//! When a session ends, and why.

use serde::{Deserialize, Serialize};

use crate::estimator::AbilityEstimate;
use crate::model::StopReason;
use crate::scale::pass_cut_theta;

/// Length bounds that govern stopping for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoppingPolicy {
    /// Stop after exactly `target` items.
    Fixed { target: usize },
    /// Stop between `min` and `max` items once the pass/fail call is clear.
    Adaptive { min: usize, max: usize },
}

impl StoppingPolicy {
    /// Reported target length.
    pub fn target(&self) -> usize {
        match *self {
            StoppingPolicy::Fixed { target } => target,
            StoppingPolicy::Adaptive { max, .. } => max,
        }
    }
}

/// Decide whether to stop after `administered` responses.
///
/// Time expiry wins over every other rule. A bank-exhausted stop is not
/// decided here; the session raises it when selection comes back empty.
pub fn evaluate(
    policy: StoppingPolicy,
    administered: usize,
    estimate: &AbilityEstimate,
    time_expired: bool,
) -> Option<StopReason> {
    if time_expired {
        return Some(StopReason::TimeExpired);
    }
    match policy {
        StoppingPolicy::Fixed { target } => {
            (administered >= target).then_some(StopReason::FixedLengthReached)
        }
        StoppingPolicy::Adaptive { min, max } => {
            if administered >= max {
                return Some(StopReason::MaxReached);
            }
            if administered < min {
                return None;
            }
            let cut = pass_cut_theta();
            let (low, high) = estimate.confidence_interval();
            if low > cut {
                Some(StopReason::ClearPass)
            } else if high < cut {
                Some(StopReason::ClearFail)
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn est(theta: f64, se: f64) -> AbilityEstimate {
        AbilityEstimate {
            theta,
            se,
            total_information: 1.0 / (se * se),
        }
    }

    const ADAPTIVE: StoppingPolicy = StoppingPolicy::Adaptive { min: 100, max: 150 };

    #[test]
    fn fixed_stops_at_target() {
        let policy = StoppingPolicy::Fixed { target: 10 };
        assert_eq!(evaluate(policy, 9, &est(0.0, 1.0), false), None);
        assert_eq!(
            evaluate(policy, 10, &est(0.0, 1.0), false),
            Some(StopReason::FixedLengthReached)
        );
    }

    #[test]
    fn never_before_minimum() {
        let confident = est(2.5, 0.05);
        for n in 0..100 {
            assert_eq!(evaluate(ADAPTIVE, n, &confident, false), None);
        }
        assert_eq!(
            evaluate(ADAPTIVE, 100, &confident, false),
            Some(StopReason::ClearPass)
        );
    }

    #[test]
    fn always_at_maximum() {
        assert_eq!(
            evaluate(ADAPTIVE, 150, &est(1.0, 0.2), false),
            Some(StopReason::MaxReached)
        );
    }

    #[test]
    fn interval_must_clear_cut() {
        // 1.4 - 1.96 * 0.2 = 1.008 > 1.0
        assert_eq!(
            evaluate(ADAPTIVE, 120, &est(1.4, 0.2), false),
            Some(StopReason::ClearPass)
        );
        assert_eq!(evaluate(ADAPTIVE, 120, &est(1.3, 0.2), false), None);
        assert_eq!(
            evaluate(ADAPTIVE, 120, &est(0.5, 0.2), false),
            Some(StopReason::ClearFail)
        );
    }

    #[test]
    fn time_expiry_overrides() {
        assert_eq!(
            evaluate(ADAPTIVE, 3, &est(0.0, 1.0), true),
            Some(StopReason::TimeExpired)
        );
        assert_eq!(
            evaluate(StoppingPolicy::Fixed { target: 5 }, 5, &est(0.0, 1.0), true),
            Some(StopReason::TimeExpired)
        );
    }

    #[test]
    fn reported_target() {
        assert_eq!(ADAPTIVE.target(), 150);
        assert_eq!(StoppingPolicy::Fixed { target: 40 }.target(), 40);
    }
}
