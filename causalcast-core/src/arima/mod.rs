//! Univariate ARIMA forecasting on log-prices.
//!
//! Lifecycle, enforced by types:
//!
//! ```text
//! ArimaForecaster ──select_order──▶ SelectedArima ──fit──▶ FittedArima ──forecast──▶ Forecast
//! ```
//!
//! - Order selection picks `d` by repeated ADF tests, then searches `(p, q)`
//!   by AIC in parallel.
//! - Fitting maximises the conditional Gaussian likelihood (conditional sum
//!   of squares) with Nelder–Mead over stationarity- and
//!   invertibility-preserving parameters.
//! - Forecast intervals come from the ψ-weights of the integrated model and
//!   are symmetric in log space, so asymmetric in price space.

mod model;
pub mod params;

pub use model::{ArimaForecaster, ArimaSummary, CandidateScore, FittedArima, SelectedArima};

use serde::{Deserialize, Serialize};

use crate::stats::NelderMeadOptions;

/// Model order `(p, d, q)` and whether a constant is estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
    /// Mean of the `d`-times differenced series (a drift when `d = 1`).
    pub constant: bool,
}

impl ArimaOrder {
    /// Order with the default constant rule: estimated when `d ≤ 1`.
    pub fn new(p: usize, d: usize, q: usize) -> Self {
        Self {
            p,
            d,
            q,
            constant: d <= 1,
        }
    }

    /// Number of mean-equation parameters (excluding the innovation variance).
    pub fn n_params(&self) -> usize {
        self.p + self.q + usize::from(self.constant)
    }

    /// Progressively simpler orders: drop MA terms one at a time, then AR
    /// terms, ending at `(0, d, 0)`. Excludes `self`.
    pub fn fallbacks(&self) -> Vec<ArimaOrder> {
        let mut out = Vec::with_capacity(self.p + self.q);
        let mut current = *self;
        while current.q > 0 {
            current.q -= 1;
            out.push(current);
        }
        while current.p > 0 {
            current.p -= 1;
            out.push(current);
        }
        out
    }
}

impl std::fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ARIMA({},{},{})", self.p, self.d, self.q)?;
        if self.constant {
            f.write_str("+c")?;
        }
        Ok(())
    }
}

/// Search bounds and optimiser settings.
#[derive(Debug, Clone, Copy)]
pub struct ArimaConfig {
    pub max_p: usize,
    pub max_d: usize,
    pub max_q: usize,
    /// Significance level of the ADF tests that choose `d`.
    pub alpha: f64,
    pub optimizer: NelderMeadOptions,
}

impl Default for ArimaConfig {
    fn default() -> Self {
        Self {
            max_p: 5,
            max_d: 2,
            max_q: 5,
            alpha: 0.05,
            optimizer: NelderMeadOptions {
                max_iter: 5000,
                f_tol: 1e-10,
                x_tol: 1e-6,
                initial_step: 0.1,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_only_up_to_first_difference() {
        assert!(ArimaOrder::new(1, 0, 1).constant);
        assert!(ArimaOrder::new(1, 1, 1).constant);
        assert!(!ArimaOrder::new(1, 2, 1).constant);
        assert_eq!(ArimaOrder::new(2, 1, 1).n_params(), 4);
    }

    #[test]
    fn fallbacks_drop_ma_then_ar() {
        let chain: Vec<String> = ArimaOrder::new(2, 1, 2)
            .fallbacks()
            .iter()
            .map(|o| o.to_string())
            .collect();
        assert_eq!(
            chain,
            vec![
                "ARIMA(2,1,1)+c",
                "ARIMA(2,1,0)+c",
                "ARIMA(1,1,0)+c",
                "ARIMA(0,1,0)+c"
            ]
        );
        assert!(ArimaOrder::new(0, 1, 0).fallbacks().is_empty());
    }
}
