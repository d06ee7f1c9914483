//! Running ability estimate and its damped gradient update.
//!
//! Each scored response moves θ along the 3PL score-function gradient with a
//! step that shrinks as scored evidence accumulates. The standard error is
//! then recomputed from the information of every scored item evaluated at
//! the new θ.

use serde::{Deserialize, Serialize};

use crate::irt::{information, probability, PROBABILITY_FLOOR};
use crate::model::{Item, THETA_MAX, THETA_MIN};

/// Information assumed before any scored response (se ≈ 1.51).
pub const PRIOR_INFORMATION: f64 = 0.44;
/// Step size for the first scored response.
pub const BASE_STEP: f64 = 0.48;
/// Number of scored items after which the step has halved.
pub const STEP_HALVING_ITEMS: f64 = 28.0;
/// Floor on total information when converting to a standard error.
pub const INFORMATION_FLOOR: f64 = 1e-6;

/// z-value for a two-sided 95% interval.
pub const Z_95: f64 = 1.96;

/// Current ability estimate with its precision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AbilityEstimate {
    pub theta: f64,
    pub se: f64,
    pub total_information: f64,
}

impl AbilityEstimate {
    /// Estimate before any response, seeded at `theta`.
    pub fn prior(theta: f64) -> Self {
        Self {
            theta: theta.clamp(THETA_MIN, THETA_MAX),
            se: se_from_information(PRIOR_INFORMATION),
            total_information: PRIOR_INFORMATION,
        }
    }

    /// 95% confidence interval on the ability scale.
    pub fn confidence_interval(&self) -> (f64, f64) {
        let half = Z_95 * self.se;
        (self.theta - half, self.theta + half)
    }
}

/// Standard error implied by a total information value.
pub fn se_from_information(total_information: f64) -> f64 {
    1.0 / total_information.max(INFORMATION_FLOOR).sqrt()
}

/// Step size after `scored_so_far` scored responses.
pub fn step_size(scored_so_far: usize) -> f64 {
    BASE_STEP / (1.0 + scored_so_far as f64 / STEP_HALVING_ITEMS)
}

/// Observed score in [0, 1] for a response.
///
/// Dichotomous items score 1 or 0. Graded items use
/// `partial_score / max_score` when a partial score is supplied.
pub fn observed_score(item: &Item, correct: bool, partial_score: Option<f64>) -> f64 {
    match partial_score {
        Some(partial) if item.is_graded() => (partial / item.max_score as f64).clamp(0.0, 1.0),
        _ => {
            if correct {
                1.0
            } else {
                0.0
            }
        }
    }
}

/// Score-function gradient of the log-likelihood with respect to θ.
///
/// `a (y − P)(P − c) / (P (1 − c))`, which is `a (y − P)` when `c = 0`.
pub fn gradient(theta: f64, item: &Item, observed: f64) -> f64 {
    let a = item.discrimination;
    let c = item.guessing_param();
    let p = probability(theta, item);
    a * (observed - p) * (p - c) / (p.max(PROBABILITY_FLOOR) * (1.0 - c))
}

/// Apply one scored response.
///
/// `previously_scored` lists the items already scored in this session, in
/// any order, excluding `item`.
pub fn update(
    prev: AbilityEstimate,
    item: &Item,
    observed: f64,
    previously_scored: &[&Item],
) -> AbilityEstimate {
    let step = step_size(previously_scored.len());
    let theta = (prev.theta + step * gradient(prev.theta, item, observed)).clamp(THETA_MIN, THETA_MAX);

    let total_information = previously_scored
        .iter()
        .map(|scored| information(theta, scored))
        .sum::<f64>()
        + information(theta, item);

    tracing::debug!(
        item = %item.id,
        observed,
        theta_prev = prev.theta,
        theta,
        total_information,
        "ability updated"
    );

    AbilityEstimate {
        theta,
        se: se_from_information(total_information),
        total_information,
    }
}
