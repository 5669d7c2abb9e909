use chrono::NaiveDate;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::VarConfig;
use crate::error::AnalysisError;
use crate::forecast::{integrate_returns, Forecast, ForecastHeader, ModelKind};
use crate::preprocess::StationarityReport;
use crate::series::{PriceTable, ReturnSeries};
use crate::stats::{log_det_spd, symmetric_inverse, LinalgError};

/// Unfit VAR over aligned, stationary return series.
#[derive(Debug, Clone)]
pub struct VarForecaster {
    assets: Vec<String>,
    /// `T × k` returns, one column per asset.
    data: DMatrix<f64>,
    last_log_prices: Vec<f64>,
    last_prices: Vec<f64>,
    origin: NaiveDate,
    config: VarConfig,
}

/// VAR with a chosen lag order.
#[derive(Debug, Clone)]
pub struct LagSelectedVar {
    base: VarForecaster,
    lag: usize,
    aic_by_lag: Vec<(usize, f64)>,
}

/// Estimated VAR(p).
#[derive(Debug, Clone)]
pub struct FittedVar {
    assets: Vec<String>,
    lag: usize,
    intercept: DVector<f64>,
    /// `A_1 … A_p`, each `k × k`; row = equation, column = regressor asset.
    coefs: Vec<DMatrix<f64>>,
    /// Residual covariance with degrees-of-freedom correction.
    sigma_u: DMatrix<f64>,
    nobs: usize,
    /// Last `p` observations, oldest first.
    history: Vec<DVector<f64>>,
    last_log_prices: Vec<f64>,
    last_prices: Vec<f64>,
    origin: NaiveDate,
}

/// Estimated parameters of a fitted VAR(p). Matrices are stored row by row:
/// row = equation, column = regressor asset, both in `assets` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarSummary {
    pub assets: Vec<String>,
    pub lag: usize,
    pub nobs: usize,
    pub intercept: Vec<f64>,
    /// `A_1 … A_p`.
    pub coefficients: Vec<Vec<Vec<f64>>>,
    pub sigma_u: Vec<Vec<f64>>,
}

fn matrix_rows(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    m.row_iter().map(|r| r.iter().copied().collect()).collect()
}

/// Forecasts for every asset of a fitted VAR.
#[derive(Debug, Clone)]
pub struct VarForecast {
    pub lag: usize,
    pub forecasts: Vec<Forecast>,
    /// Point return forecasts per asset, steps `1..=h`.
    pub return_paths: Vec<Vec<f64>>,
}

impl VarForecast {
    pub fn get(&self, asset: &str) -> Option<&Forecast> {
        self.forecasts.iter().find(|f| f.asset == asset)
    }

    pub fn return_path(&self, asset: &str) -> Option<&[f64]> {
        let idx = self.forecasts.iter().position(|f| f.asset == asset)?;
        self.return_paths.get(idx).map(Vec::as_slice)
    }
}

impl VarForecaster {
    /// Stack `returns` into a system.
    ///
    /// Every series must be stationary per `stationarity` and aligned on the
    /// same dates; `prices` supplies the last observed level of each asset.
    pub fn new(
        returns: &[ReturnSeries],
        prices: &PriceTable,
        stationarity: &StationarityReport,
        config: VarConfig,
    ) -> Result<Self, AnalysisError> {
        if returns.len() < 2 {
            return Err(AnalysisError::validation(
                "var",
                format!("need at least 2 series, have {}", returns.len()),
            ));
        }
        let first = &returns[0];
        for series in returns {
            match stationarity.returns_for(series.asset()) {
                Some(r) if r.stationary => {}
                Some(r) => {
                    return Err(AnalysisError::validation(
                        "var",
                        format!("'{}' is not stationary (ADF p = {:.4})", series.asset(), r.p_value),
                    ))
                }
                None => {
                    return Err(AnalysisError::validation(
                        "var",
                        format!("'{}' has no stationarity result", series.asset()),
                    ))
                }
            }
            if series.dates() != first.dates() {
                return Err(AnalysisError::validation(
                    "var",
                    format!("'{}' is not aligned with '{}'", series.asset(), first.asset()),
                ));
            }
        }

        let origin = prices
            .last_date()
            .ok_or_else(|| AnalysisError::validation("var", "empty price table"))?;
        let mut last_prices = Vec::with_capacity(returns.len());
        for series in returns {
            let last = prices
                .column(series.asset())
                .and_then(|c| c.last().copied())
                .ok_or_else(|| {
                    AnalysisError::validation(
                        "var",
                        format!("no prices for '{}'", series.asset()),
                    )
                })?;
            last_prices.push(last);
        }

        let t = first.len();
        let k = returns.len();
        let data = DMatrix::from_fn(t, k, |r, c| returns[c].values()[r]);

        Ok(Self {
            assets: returns.iter().map(|s| s.asset().to_string()).collect(),
            data,
            last_log_prices: last_prices.iter().map(|p| p.ln()).collect(),
            last_prices,
            origin,
            config,
        })
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    /// Largest lag that leaves more rows than regressors per equation.
    fn feasible_max_lag(&self) -> usize {
        let (t, k) = self.data.shape();
        let mut p = self.config.max_lags;
        while p > 0 && t.saturating_sub(p) <= 1 + p * k + k {
            p -= 1;
        }
        p
    }

    /// Choose the lag in `1..=max_lags` minimising
    /// `ln det Σ̂ + 2(pk² + k)/T` on a common sample.
    pub fn select_lag(self) -> Result<LagSelectedVar, AnalysisError> {
        let max_lag = self.feasible_max_lag();
        if max_lag == 0 {
            return Err(AnalysisError::validation(
                "var_lag_selection",
                format!("{} observations are too few for any lag", self.data.nrows()),
            ));
        }
        let k = self.data.ncols();

        let mut aic_by_lag = Vec::with_capacity(max_lag);
        let mut first_error: Option<(usize, LinalgError)> = None;
        for p in 1..=max_lag {
            let score = ols_system(&self.data, p, max_lag).and_then(|fit| {
                let t_eff = fit.residuals.nrows() as f64;
                let sigma_mle = fit.residuals.transpose() * &fit.residuals / t_eff;
                let ln_det = log_det_spd(&sigma_mle)?;
                Ok(ln_det + 2.0 * (p * k * k + k) as f64 / t_eff)
            });
            match score {
                Ok(aic) => {
                    debug!(lag = p, aic, "VAR lag candidate");
                    aic_by_lag.push((p, aic));
                }
                Err(e) => {
                    debug!(lag = p, error = %e, "VAR lag candidate failed");
                    first_error.get_or_insert((p, e));
                }
            }
        }

        let Some(&(lag, aic)) = aic_by_lag
            .iter()
            .min_by(|a, b| a.1.total_cmp(&b.1))
        else {
            let (p, source) = first_error.unwrap_or((
                1,
                LinalgError::Singular {
                    reason: "no lag could be evaluated".into(),
                },
            ));
            return Err(AnalysisError::SingularMatrix {
                stage: "var_lag_selection",
                params: format!("lags={p}, assets={}", self.assets.join(",")),
                source,
            });
        };
        info!(lag, aic, max_lag, "selected VAR lag order");

        Ok(LagSelectedVar {
            base: self,
            lag,
            aic_by_lag,
        })
    }

    /// Skip selection and use lag `p`.
    pub fn with_lag(self, p: usize) -> Result<LagSelectedVar, AnalysisError> {
        let (t, k) = self.data.shape();
        if p == 0 || t.saturating_sub(p) <= 1 + p * k + k {
            return Err(AnalysisError::validation(
                "var",
                format!("lag {p} does not fit {t} observations of {k} series"),
            ));
        }
        Ok(LagSelectedVar {
            base: self,
            lag: p,
            aic_by_lag: Vec::new(),
        })
    }
}

impl LagSelectedVar {
    pub fn lag(&self) -> usize {
        self.lag
    }

    /// `(lag, AIC)` for every lag that could be evaluated.
    pub fn aic_by_lag(&self) -> &[(usize, f64)] {
        &self.aic_by_lag
    }

    /// Equation-by-equation OLS with an intercept.
    pub fn fit(&self) -> Result<FittedVar, AnalysisError> {
        let base = &self.base;
        let p = self.lag;
        let (t, k) = base.data.shape();
        let singular = |source: LinalgError| AnalysisError::SingularMatrix {
            stage: "var_fit",
            params: format!("lags={p}, assets={}", base.assets.join(",")),
            source,
        };

        let fit = ols_system(&base.data, p, p).map_err(singular)?;
        let nobs = fit.residuals.nrows();
        let n_regressors = 1 + p * k;
        let df = nobs - n_regressors;
        let sigma_u = fit.residuals.transpose() * &fit.residuals / df as f64;
        // Residual covariance must be positive definite for intervals
        log_det_spd(&sigma_u).map_err(singular)?;

        let intercept = fit.coefficients.row(0).transpose();
        let coefs = (0..p)
            .map(|i| {
                DMatrix::from_fn(k, k, |eq, reg| fit.coefficients[(1 + i * k + reg, eq)])
            })
            .collect();
        let history = (t - p..t).map(|r| base.data.row(r).transpose()).collect();

        info!(lag = p, nobs, "fitted VAR");
        Ok(FittedVar {
            assets: base.assets.clone(),
            lag: p,
            intercept,
            coefs,
            sigma_u,
            nobs,
            history,
            last_log_prices: base.last_log_prices.clone(),
            last_prices: base.last_prices.clone(),
            origin: base.origin,
        })
    }
}

impl FittedVar {
    pub fn lag(&self) -> usize {
        self.lag
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn intercept(&self) -> &DVector<f64> {
        &self.intercept
    }

    /// Coefficient matrix `A_i` for lag `i` (1-based).
    pub fn coefficient(&self, i: usize) -> Option<&DMatrix<f64>> {
        i.checked_sub(1).and_then(|j| self.coefs.get(j))
    }

    pub fn sigma_u(&self) -> &DMatrix<f64> {
        &self.sigma_u
    }

    pub fn nobs(&self) -> usize {
        self.nobs
    }

    pub fn summary(&self) -> VarSummary {
        VarSummary {
            assets: self.assets.clone(),
            lag: self.lag,
            nobs: self.nobs,
            intercept: self.intercept.iter().copied().collect(),
            coefficients: self.coefs.iter().map(matrix_rows).collect(),
            sigma_u: matrix_rows(&self.sigma_u),
        }
    }

    /// Point return forecasts for steps `1..=horizon`, one vector per step.
    pub fn forecast_returns(&self, horizon: usize) -> Vec<DVector<f64>> {
        let mut window: Vec<DVector<f64>> = self.history.clone();
        let mut out = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            let mut next = self.intercept.clone();
            for (i, a) in self.coefs.iter().enumerate() {
                next += a * &window[window.len() - 1 - i];
            }
            window.push(next.clone());
            out.push(next);
        }
        out
    }

    /// MA matrices `Φ_0 = I, Φ_i = Σ_{j=1..min(i,p)} Φ_{i-j} A_j`.
    pub fn ma_matrices(&self, n: usize) -> Vec<DMatrix<f64>> {
        let k = self.assets.len();
        let mut phi: Vec<DMatrix<f64>> = Vec::with_capacity(n);
        for i in 0..n {
            if i == 0 {
                phi.push(DMatrix::identity(k, k));
                continue;
            }
            let mut m = DMatrix::zeros(k, k);
            for (j, a) in self.coefs.iter().enumerate().take(i) {
                m += &phi[i - 1 - j] * a;
            }
            phi.push(m);
        }
        phi
    }

    /// Covariance of the cumulative `h`-step forecast error for
    /// `h = 1..=horizon`: `Σ_{n<h} Ψ_n Σ_u Ψ_nᵀ`, `Ψ_n = Σ_{j≤n} Φ_j`.
    pub fn cumulative_covariances(&self, horizon: usize) -> Vec<DMatrix<f64>> {
        let k = self.assets.len();
        let mut psi = DMatrix::zeros(k, k);
        let mut acc = DMatrix::zeros(k, k);
        let mut out = Vec::with_capacity(horizon);
        for phi in self.ma_matrices(horizon) {
            psi += phi;
            acc += &psi * &self.sigma_u * psi.transpose();
            out.push(acc.clone());
        }
        out
    }

    /// Price forecasts for every asset.
    pub fn forecast(&self, horizon: usize, confidence: f64) -> Result<VarForecast, AnalysisError> {
        if horizon == 0 {
            return Err(AnalysisError::validation("var_forecast", "horizon must be at least 1"));
        }
        let returns = self.forecast_returns(horizon);
        let covs = self.cumulative_covariances(horizon);

        let mut forecasts = Vec::with_capacity(self.assets.len());
        let mut return_paths = Vec::with_capacity(self.assets.len());
        for (idx, asset) in self.assets.iter().enumerate() {
            let path: Vec<f64> = returns.iter().map(|r| r[idx]).collect();
            let log_means = integrate_returns(self.last_log_prices[idx], &path);
            let log_ses: Vec<f64> = covs.iter().map(|c| c[(idx, idx)].max(0.0).sqrt()).collect();
            let forecast = Forecast::from_log_space(
                ForecastHeader {
                    model: ModelKind::Var,
                    asset: asset.clone(),
                    spec: format!("VAR({})", self.lag),
                    origin: self.origin,
                    last_price: self.last_prices[idx],
                    confidence,
                },
                &log_means,
                &log_ses,
            )?;
            forecasts.push(forecast);
            return_paths.push(path);
        }

        Ok(VarForecast {
            lag: self.lag,
            forecasts,
            return_paths,
        })
    }
}

struct SystemFit {
    /// `(1 + pk) × k`; column = equation.
    coefficients: DMatrix<f64>,
    residuals: DMatrix<f64>,
}

/// Multivariate OLS of `y_t` on `[1, y_{t-1}, …, y_{t-p}]` over rows
/// `skip..T` (`skip ≥ p`).
fn ols_system(data: &DMatrix<f64>, p: usize, skip: usize) -> Result<SystemFit, LinalgError> {
    let (t, k) = data.shape();
    let skip = skip.max(p);
    let rows = t.saturating_sub(skip);
    let cols = 1 + p * k;
    if rows <= cols {
        return Err(LinalgError::TooFewObservations {
            needed: cols,
            have: rows,
        });
    }
    let x = DMatrix::from_fn(rows, cols, |r, c| {
        if c == 0 {
            1.0
        } else {
            let lag = (c - 1) / k + 1;
            let asset = (c - 1) % k;
            data[(r + skip - lag, asset)]
        }
    });
    let y = data.rows(skip, rows).into_owned();
    let xt = x.transpose();
    let xtx_inv = symmetric_inverse(&(&xt * &x))?;
    let coefficients = xtx_inv * (xt * &y);
    let residuals = y - &x * &coefficients;
    Ok(SystemFit {
        coefficients,
        residuals,
    })
}
