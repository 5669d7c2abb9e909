//! Parameter transforms and lag-polynomial helpers.
//!
//! The optimiser works on unconstrained reals. Each block of `k` AR (or MA)
//! parameters is mapped through `tanh` to partial autocorrelations in
//! `(-1, 1)`, then through the Durbin–Levinson recursion to polynomial
//! coefficients. Any such image is a stationary AR polynomial, so the search
//! never leaves the stationary and invertible region.

/// Largest magnitude allowed for a partial autocorrelation.
const PACF_BOUND: f64 = 0.9999;

/// Map unconstrained values to the coefficients `φ` of a stationary
/// `1 − φ₁B − … − φₖBᵏ`.
pub fn constrain_stationary(unconstrained: &[f64]) -> Vec<f64> {
    let pacf: Vec<f64> = unconstrained
        .iter()
        .map(|u| u.tanh().clamp(-PACF_BOUND, PACF_BOUND))
        .collect();
    pacf_to_coefficients(&pacf)
}

/// Inverse of [`constrain_stationary`] for starting values.
pub fn unconstrain_pacf(pacf: &[f64]) -> Vec<f64> {
    pacf.iter()
        .map(|r| r.clamp(-PACF_BOUND, PACF_BOUND).atanh())
        .collect()
}

/// Durbin–Levinson: partial autocorrelations → AR coefficients.
pub fn pacf_to_coefficients(pacf: &[f64]) -> Vec<f64> {
    let mut phi: Vec<f64> = Vec::with_capacity(pacf.len());
    for (k, &r) in pacf.iter().enumerate() {
        let prev = phi.clone();
        for j in 0..k {
            phi[j] = prev[j] - r * prev[k - 1 - j];
        }
        phi.push(r);
    }
    phi
}

/// Sample partial autocorrelations at lags `1..=max_lag` (Yule–Walker via
/// Durbin–Levinson). Used for starting values.
pub fn sample_pacf(values: &[f64], max_lag: usize) -> Vec<f64> {
    let n = values.len();
    if max_lag == 0 || n < 2 {
        return vec![0.0; max_lag];
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let acov: Vec<f64> = (0..=max_lag)
        .map(|k| {
            (k..n)
                .map(|i| (values[i] - mean) * (values[i - k] - mean))
                .sum::<f64>()
                / n as f64
        })
        .collect();
    if acov[0] <= 0.0 {
        return vec![0.0; max_lag];
    }

    let mut pacf = Vec::with_capacity(max_lag);
    let mut phi: Vec<f64> = Vec::new();
    let mut v = acov[0];
    for k in 1..=max_lag {
        if k >= n || v <= 0.0 {
            pacf.push(0.0);
            continue;
        }
        let num = acov[k] - (0..phi.len()).map(|j| phi[j] * acov[k - 1 - j]).sum::<f64>();
        let r = (num / v).clamp(-PACF_BOUND, PACF_BOUND);
        let prev = phi.clone();
        for j in 0..prev.len() {
            phi[j] = prev[j] - r * prev[prev.len() - 1 - j];
        }
        phi.push(r);
        v *= 1.0 - r * r;
        pacf.push(r);
    }
    pacf
}

/// Product of two lag polynomials given as coefficient vectors
/// (`c[0] + c[1]B + …`).
pub fn poly_mul(a: &[f64], b: &[f64]) -> Vec<f64> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

/// AR coefficients of `φ(B)(1 − B)ᵈ`, returned as `a` in `1 − Σ aᵢBⁱ`.
pub fn integrated_ar(phi: &[f64], d: usize) -> Vec<f64> {
    let mut poly: Vec<f64> = std::iter::once(1.0).chain(phi.iter().map(|c| -c)).collect();
    for _ in 0..d {
        poly = poly_mul(&poly, &[1.0, -1.0]);
    }
    poly.iter().skip(1).map(|c| -c).collect()
}

/// MA(∞) weights `ψ₀ … ψ_{n-1}` of `(1 − Σ aᵢBⁱ)⁻¹(1 + Σ θⱼBʲ)`.
pub fn psi_weights(ar: &[f64], ma: &[f64], n: usize) -> Vec<f64> {
    let mut psi = Vec::with_capacity(n);
    for j in 0..n {
        if j == 0 {
            psi.push(1.0);
            continue;
        }
        let mut v = ma.get(j - 1).copied().unwrap_or(0.0);
        for (i, a) in ar.iter().enumerate().take(j) {
            v += a * psi[j - 1 - i];
        }
        psi.push(v);
    }
    psi
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use nalgebra::Normed;

    /// Modulus of the smallest root of `1 − Σ φᵢzⁱ`, estimated from the
    /// companion matrix. Values above 1 mean stationary.
    fn min_root_modulus(phi: &[f64]) -> f64 {
        let k = phi.len();
        if k == 0 {
            return f64::INFINITY;
        }
        let companion = nalgebra::DMatrix::from_fn(k, k, |r, c| {
            if r == 0 {
                phi[c]
            } else if r == c + 1 {
                1.0
            } else {
                0.0
            }
        });
        let max_eig = companion
            .complex_eigenvalues()
            .iter()
            .map(|z| z.norm())
            .fold(0.0, f64::max);
        if max_eig == 0.0 {
            f64::INFINITY
        } else {
            1.0 / max_eig
        }
    }

    #[test]
    fn durbin_levinson_ar2() {
        // pacf (0.5, 0.2): φ₂ = 0.2, φ₁ = 0.5 − 0.2·0.5 = 0.4
        let phi = pacf_to_coefficients(&[0.5, 0.2]);
        assert!((phi[0] - 0.4).abs() < 1e-12);
        assert!((phi[1] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn integrated_ar_of_random_walk() {
        assert_eq!(integrated_ar(&[], 1), vec![1.0]);
        // (1 − 0.5B)(1 − B) = 1 − 1.5B + 0.5B²
        let a = integrated_ar(&[0.5], 1);
        assert!((a[0] - 1.5).abs() < 1e-12 && (a[1] + 0.5).abs() < 1e-12);
        // (1 − B)² = 1 − 2B + B²
        assert_eq!(integrated_ar(&[], 2), vec![2.0, -1.0]);
    }

    #[test]
    fn psi_weights_of_random_walk_are_one() {
        let psi = psi_weights(&[1.0], &[], 5);
        assert_eq!(psi, vec![1.0; 5]);
        let ar1 = psi_weights(&[0.5], &[], 4);
        assert_eq!(ar1, vec![1.0, 0.5, 0.25, 0.125]);
        let ma1 = psi_weights(&[], &[0.3], 3);
        assert_eq!(ma1, vec![1.0, 0.3, 0.0]);
    }

    #[test]
    fn sample_pacf_of_ar1() {
        use rand::{rngs::StdRng, SeedableRng};
        use rand_distr::{Distribution, StandardNormal};
        let mut rng = StdRng::seed_from_u64(5);
        let mut x = vec![0.0f64; 4000];
        for t in 1..x.len() {
            let e: f64 = StandardNormal.sample(&mut rng);
            x[t] = 0.6 * x[t - 1] + e;
        }
        let pacf = sample_pacf(&x, 3);
        assert!((pacf[0] - 0.6).abs() < 0.05);
        assert!(pacf[1].abs() < 0.06 && pacf[2].abs() < 0.06);
    }

    proptest! {
        #[test]
        fn constrained_polynomials_are_stationary(u in proptest::collection::vec(-4.0f64..4.0, 1..6)) {
            let phi = constrain_stationary(&u);
            prop_assert!(min_root_modulus(&phi) > 1.0 - 1e-9);
        }

        #[test]
        fn pacf_transform_round_trips(r in proptest::collection::vec(-0.95f64..0.95, 0..5)) {
            let u = unconstrain_pacf(&r);
            let back: Vec<f64> = u.iter().map(|x| x.tanh()).collect();
            for (a, b) in back.iter().zip(&r) {
                prop_assert!((a - b).abs() < 1e-12);
            }
        }
    }
}
