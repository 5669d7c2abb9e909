//! Thin wrappers over `statrs` distributions.

use statrs::distribution::{ContinuousCDF, FisherSnedecor};
use statrs::function::erf::{erf_inv, erfc};

/// Standard normal CDF Φ(x).
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

/// Two-sided critical value `z` such that P(|Z| ≤ z) = `confidence`.
///
/// `confidence = 0.95` gives 1.959964.
pub fn z_for_confidence(confidence: f64) -> f64 {
    let tail = (1.0 - confidence) / 2.0;
    std::f64::consts::SQRT_2 * erf_inv(1.0 - 2.0 * tail)
}

/// Upper-tail probability P(F > f) for an F(d1, d2) distribution.
///
/// Returns `NaN` for invalid degrees of freedom or a non-finite statistic.
pub fn f_survival(f: f64, d1: f64, d2: f64) -> f64 {
    if !f.is_finite() || d1 <= 0.0 || d2 <= 0.0 {
        return f64::NAN;
    }
    if f <= 0.0 {
        return 1.0;
    }
    match FisherSnedecor::new(d1, d2) {
        Ok(dist) => (1.0 - dist.cdf(f)).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn z_for_95_percent() {
        assert!((z_for_confidence(0.95) - 1.959_964).abs() < 1e-5);
        assert!((z_for_confidence(0.90) - 1.644_854).abs() < 1e-5);
    }

    #[test]
    fn normal_cdf_symmetry() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-12);
        assert!((normal_cdf(1.5) + normal_cdf(-1.5) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn f_survival_reference_values() {
        // F(1, 10) critical value at 5% is 4.9646
        assert!((f_survival(4.9646, 1.0, 10.0) - 0.05).abs() < 1e-3);
        // F(5, 100) critical value at 1% is 3.2059
        assert!((f_survival(3.2059, 5.0, 100.0) - 0.01).abs() < 1e-3);
        assert_eq!(f_survival(0.0, 2.0, 20.0), 1.0);
        assert!(f_survival(f64::NAN, 2.0, 20.0).is_nan());
    }
}
