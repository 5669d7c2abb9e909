//! Vector autoregression on the multivariate log-return system.
//!
//! Lifecycle, enforced by types:
//!
//! ```text
//! VarForecaster ──select_lag──▶ LagSelectedVar ──fit──▶ FittedVar ──forecast──▶ VarForecast
//! ```
//!
//! Return forecasts are integrated back to log-prices by cumulative sum from
//! the last observed log-price. Their uncertainty is the covariance of the
//! cumulative forecast error, `Σ_{n<h} Ψ_n Σ_u Ψ_nᵀ` with `Ψ_n = Σ_{j≤n} Φ_j`
//! the cumulative MA matrices, so cross-step correlation is accounted for.

mod model;

pub use model::{FittedVar, LagSelectedVar, VarForecast, VarForecaster, VarSummary};

/// Lag search bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarConfig {
    pub max_lags: usize,
}

impl Default for VarConfig {
    fn default() -> Self {
        Self { max_lags: 15 }
    }
}
