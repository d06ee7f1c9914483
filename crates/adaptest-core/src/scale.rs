//! Linear transform between ability and the reported score scale.

use crate::model::{THETA_MAX, THETA_MIN};

/// Lowest reportable scaled score.
pub const SCALED_MIN: f64 = 100.0;
/// Highest reportable scaled score.
pub const SCALED_MAX: f64 = 1000.0;
/// Scaled score required to pass.
pub const PASS_CUT_SCALED: f64 = 700.0;

const SPAN: f64 = SCALED_MAX - SCALED_MIN;
const THETA_SPAN: f64 = THETA_MAX - THETA_MIN;

/// Map ability onto the reporting scale, clamped to [100, 1000].
pub fn theta_to_scaled(theta: f64) -> f64 {
    (SCALED_MIN + ((theta - THETA_MIN) / THETA_SPAN) * SPAN).clamp(SCALED_MIN, SCALED_MAX)
}

/// Inverse of [`theta_to_scaled`] before clamping.
pub fn scaled_to_theta(scaled: f64) -> f64 {
    ((scaled - SCALED_MIN) / SPAN) * THETA_SPAN + THETA_MIN
}

/// Ability equivalent of the passing cut (θ = 1.0).
pub fn pass_cut_theta() -> f64 {
    scaled_to_theta(PASS_CUT_SCALED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midpoint_maps_to_550() {
        assert!((theta_to_scaled(0.0) - 550.0).abs() < 1e-12);
    }

    #[test]
    fn pass_cut_is_theta_one() {
        assert!((pass_cut_theta() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn inverse_round_trips_inside_range() {
        let mut s = SCALED_MIN;
        while s <= SCALED_MAX {
            let back = theta_to_scaled(scaled_to_theta(s));
            assert!((back - s).abs() < 1e-9, "{s} -> {back}");
            s += 12.5;
        }
    }

    #[test]
    fn clamps_outside_ability_range() {
        assert_eq!(theta_to_scaled(-4.0), SCALED_MIN);
        assert_eq!(theta_to_scaled(9.0), SCALED_MAX);
        assert!(theta_to_scaled(0.5) < theta_to_scaled(0.6));
    }
}
