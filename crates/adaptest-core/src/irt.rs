//! Three-parameter logistic response model.
//!
//! Pure functions over an item's `(a, b, c)` parameters. Non-multiple-choice
//! items carry `c = 0`, which reduces both formulas to the two-parameter form.

use crate::model::Item;

/// Floor on `P` in the information denominator.
pub const PROBABILITY_FLOOR: f64 = 1e-9;

/// Numerically stable logistic function.
pub fn logistic(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// `P(correct | θ)` for raw parameters.
pub fn probability_3pl(theta: f64, a: f64, b: f64, c: f64) -> f64 {
    c + (1.0 - c) * logistic(a * (theta - b))
}

/// Fisher information for raw parameters.
///
/// `a² (P − c)² (1 − P) / ((1 − c)² max(P, ε))`
pub fn information_3pl(theta: f64, a: f64, b: f64, c: f64) -> f64 {
    let p = probability_3pl(theta, a, b, c);
    (a * a * (p - c).powi(2) * (1.0 - p)) / ((1.0 - c).powi(2) * p.max(PROBABILITY_FLOOR))
}

/// Probability of a correct response to `item` at ability `theta`.
pub fn probability(theta: f64, item: &Item) -> f64 {
    probability_3pl(
        theta,
        item.discrimination,
        item.difficulty,
        item.guessing_param(),
    )
}

/// Information `item` contributes at ability `theta`.
pub fn information(theta: f64, item: &Item) -> f64 {
    information_3pl(
        theta,
        item.discrimination,
        item.difficulty,
        item.guessing_param(),
    )
}
