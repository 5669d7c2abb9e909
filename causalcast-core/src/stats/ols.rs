//! Ordinary least squares on `nalgebra` matrices.
//!
//! The cross-product `XᵀX` is checked for numerical rank before it is
//! inverted: the smallest eigenvalue relative to the largest must exceed
//! [`RCOND_MIN`]. Exactly collinear regressors (for example two identical
//! return series) fail here instead of producing huge, meaningless
//! coefficients.

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use thiserror::Error;

/// Smallest admissible reciprocal condition number of a cross-product matrix.
pub const RCOND_MIN: f64 = 1e-12;

/// Linear-algebra failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LinalgError {
    #[error("matrix is singular or not positive definite: {reason}")]
    Singular { reason: String },

    #[error("dimension mismatch: {0}")]
    Dimension(String),

    #[error("not enough observations: need more than {needed}, have {have}")]
    TooFewObservations { needed: usize, have: usize },
}

/// Result of an OLS regression `y = Xβ + u`.
#[derive(Debug, Clone)]
pub struct OlsFit {
    pub coefficients: DVector<f64>,
    pub residuals: DVector<f64>,
    /// Sum of squared residuals.
    pub ssr: f64,
    pub nobs: usize,
    /// `(XᵀX)⁻¹`, kept for standard errors.
    pub xtx_inv: DMatrix<f64>,
}

impl OlsFit {
    /// Residual degrees of freedom `n − k`.
    pub fn df_resid(&self) -> usize {
        self.nobs - self.coefficients.len()
    }

    /// Unbiased residual variance `SSR / (n − k)`.
    pub fn sigma2(&self) -> f64 {
        self.ssr / self.df_resid() as f64
    }

    /// Standard error of coefficient `i`.
    pub fn std_error(&self, i: usize) -> f64 {
        (self.sigma2() * self.xtx_inv[(i, i)]).sqrt()
    }

    /// t statistic of coefficient `i` against zero.
    pub fn t_stat(&self, i: usize) -> f64 {
        self.coefficients[i] / self.std_error(i)
    }

    /// Gaussian AIC up to an additive constant: `n ln(SSR/n) + 2k`.
    pub fn aic(&self) -> f64 {
        let n = self.nobs as f64;
        n * (self.ssr / n).ln() + 2.0 * self.coefficients.len() as f64
    }
}

/// Fit `y` on the columns of `x` by least squares.
pub fn ols(x: &DMatrix<f64>, y: &DVector<f64>) -> Result<OlsFit, LinalgError> {
    let (n, k) = x.shape();
    if y.len() != n {
        return Err(LinalgError::Dimension(format!(
            "design has {n} rows, response has {}",
            y.len()
        )));
    }
    if n <= k {
        return Err(LinalgError::TooFewObservations { needed: k, have: n });
    }

    let xt = x.transpose();
    let xtx = &xt * x;
    let xtx_inv = symmetric_inverse(&xtx)?;
    let coefficients = &xtx_inv * (&xt * y);
    let residuals = y - x * &coefficients;
    let ssr = residuals.dot(&residuals);

    Ok(OlsFit {
        coefficients,
        residuals,
        ssr,
        nobs: n,
        xtx_inv,
    })
}

/// Inverse of a symmetric positive-definite matrix with a rank check.
pub fn symmetric_inverse(m: &DMatrix<f64>) -> Result<DMatrix<f64>, LinalgError> {
    check_conditioning(m)?;
    let chol = m.clone().cholesky().ok_or_else(|| LinalgError::Singular {
        reason: "Cholesky factorisation failed".into(),
    })?;
    Ok(chol.inverse())
}

/// `ln det` of a symmetric positive-definite matrix via Cholesky.
pub fn log_det_spd(m: &DMatrix<f64>) -> Result<f64, LinalgError> {
    check_conditioning(m)?;
    let chol = m.clone().cholesky().ok_or_else(|| LinalgError::Singular {
        reason: "Cholesky factorisation failed".into(),
    })?;
    let l = chol.l();
    Ok(2.0 * (0..l.nrows()).map(|i| l[(i, i)].ln()).sum::<f64>())
}

fn check_conditioning(m: &DMatrix<f64>) -> Result<(), LinalgError> {
    if !m.is_square() {
        return Err(LinalgError::Dimension(format!(
            "expected square matrix, got {}x{}",
            m.nrows(),
            m.ncols()
        )));
    }
    if m.iter().any(|v| !v.is_finite()) {
        return Err(LinalgError::Singular {
            reason: "matrix has non-finite entries".into(),
        });
    }
    let eig = SymmetricEigen::new(m.clone());
    let max = eig.eigenvalues.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min = eig.eigenvalues.iter().cloned().fold(f64::INFINITY, f64::min);
    if max <= 0.0 || min / max < RCOND_MIN {
        return Err(LinalgError::Singular {
            reason: format!("eigenvalue ratio {:.3e} below {RCOND_MIN:e}", min / max),
        });
    }
    Ok(())
}
