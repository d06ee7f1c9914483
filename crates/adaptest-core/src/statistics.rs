//! Pass probability and per-domain aggregates.
//!
//! The normal CDF uses the Abramowitz & Stegun 7.1.26 approximation of erf,
//! accurate to about 1.5e-7.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::api::ResponseRecord;
use crate::scale::pass_cut_theta;

/// Smallest standard error used when converting to a pass probability.
pub const MIN_PASS_SE: f64 = 0.05;

/// Approximate error function.
pub fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t * (-x * x).exp());
    sign * y
}

/// Standard normal cumulative distribution function.
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Probability, as a percentage, that true ability lies above the pass cut.
pub fn pass_probability(theta: f64, se: f64) -> f64 {
    let z = (pass_cut_theta() - theta) / se.max(MIN_PASS_SE);
    ((1.0 - normal_cdf(z)) * 100.0).clamp(0.0, 100.0)
}

/// Response counts for one domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainStats {
    pub administered: usize,
    pub scored: usize,
    pub correct: usize,
}

/// Aggregate response records by domain.
pub fn summarize_domains(records: &[ResponseRecord]) -> BTreeMap<String, DomainStats> {
    let mut map: BTreeMap<String, DomainStats> = BTreeMap::new();
    for r in records {
        let entry = map.entry(r.domain.clone()).or_default();
        entry.administered += 1;
        if r.scored {
            entry.scored += 1;
        }
        if r.correct {
            entry.correct += 1;
        }
    }
    map
}
