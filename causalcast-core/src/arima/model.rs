use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::params::{constrain_stationary, integrated_ar, psi_weights, sample_pacf, unconstrain_pacf};
use super::{ArimaConfig, ArimaOrder};
use crate::error::AnalysisError;
use crate::forecast::{Forecast, ForecastHeader, ModelKind};
use crate::preprocess::adf_test;
use crate::series::PriceSeries;
use crate::stats::{difference, mean, nelder_mead, std_dev, NelderMeadOptions};

const AIC_TIE: f64 = 1e-9;

/// Unfit ARIMA model over one asset's log-prices.
#[derive(Debug, Clone)]
pub struct ArimaForecaster {
    asset: String,
    log_prices: Vec<f64>,
    origin: NaiveDate,
    last_price: f64,
    config: ArimaConfig,
}

/// AIC (or failure) of one grid candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub order: ArimaOrder,
    pub aic: Option<f64>,
    pub failure: Option<String>,
}

/// An ARIMA model whose order is fixed but whose parameters are not yet
/// estimated.
#[derive(Debug, Clone)]
pub struct SelectedArima {
    base: ArimaForecaster,
    order: ArimaOrder,
    candidates: Vec<CandidateScore>,
}

/// Estimated parameters of a fitted ARIMA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArimaSummary {
    pub order: ArimaOrder,
    /// φ₁ … φ_p.
    pub ar: Vec<f64>,
    /// θ₁ … θ_q.
    pub ma: Vec<f64>,
    /// Mean of the differenced series; `None` when no constant is estimated.
    pub constant: Option<f64>,
    pub sigma2: f64,
    pub loglik: f64,
    pub aic: f64,
    pub nobs: usize,
    pub iterations: usize,
}

/// Estimated ARIMA model, ready to forecast.
#[derive(Debug, Clone)]
pub struct FittedArima {
    asset: String,
    order: ArimaOrder,
    ar: Vec<f64>,
    ma: Vec<f64>,
    mean: f64,
    sigma2: f64,
    loglik: f64,
    aic: f64,
    nobs: usize,
    iterations: usize,
    /// The `d`-times differenced log-price series.
    w: Vec<f64>,
    /// One-step residuals aligned with `w`; zero before the conditioning start.
    residuals: Vec<f64>,
    /// Last value of the log-price differenced `k` times, for `k in 0..d`.
    tails: Vec<f64>,
    origin: NaiveDate,
    last_price: f64,
}

impl ArimaForecaster {
    pub fn new(series: &PriceSeries, config: ArimaConfig) -> Result<Self, AnalysisError> {
        let Some((origin, last_price)) = series.last() else {
            return Err(AnalysisError::data_quality(series.asset(), None, "empty price series"));
        };
        if let Some(i) = series.prices().iter().position(|p| !p.is_finite() || *p <= 0.0) {
            return Err(AnalysisError::data_quality(
                series.asset(),
                Some(series.dates()[i]),
                format!("invalid price {}", series.prices()[i]),
            ));
        }
        Ok(Self {
            asset: series.asset().to_string(),
            log_prices: series.log_prices(),
            origin,
            last_price,
            config,
        })
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    /// Smallest `d ≤ max_d` whose differenced log-price passes the ADF test.
    pub fn select_d(&self) -> Result<usize, AnalysisError> {
        for d in 0..=self.config.max_d {
            let series = difference(&self.log_prices, d);
            let label = format!("{} Δ^{d}", self.asset);
            let result = adf_test(&series, &label, self.config.alpha)?;
            debug!(asset = %self.asset, d, p_value = result.p_value, "differencing order test");
            if result.stationary {
                return Ok(d);
            }
        }
        warn!(
            asset = %self.asset,
            max_d = self.config.max_d,
            "no differencing order passed the ADF test; using max_d"
        );
        Ok(self.config.max_d)
    }

    /// Choose `d`, then `(p, q)` by minimum AIC over the configured grid.
    pub fn select_order(self) -> Result<SelectedArima, AnalysisError> {
        let d = self.select_d()?;
        let w = difference(&self.log_prices, d);
        let start = self.config.max_p;

        let grid: Vec<ArimaOrder> = (0..=self.config.max_p)
            .flat_map(|p| (0..=self.config.max_q).map(move |q| ArimaOrder::new(p, d, q)))
            .collect();

        let candidates: Vec<CandidateScore> = grid
            .par_iter()
            .map(|&order| {
                match fit_css(&w, order, start, self.config.optimizer, &self.asset) {
                    Ok(fit) => {
                        let aic = fit.aic(order);
                        debug!(asset = %self.asset, %order, aic, "candidate fitted");
                        CandidateScore {
                            order,
                            aic: Some(aic),
                            failure: None,
                        }
                    }
                    Err(e) => {
                        debug!(asset = %self.asset, %order, error = %e, "candidate skipped");
                        CandidateScore {
                            order,
                            aic: None,
                            failure: Some(e.to_string()),
                        }
                    }
                }
            })
            .collect();

        let mut best: Option<(ArimaOrder, f64)> = None;
        for c in &candidates {
            let Some(aic) = c.aic else { continue };
            best = match best {
                None => Some((c.order, aic)),
                Some((b, b_aic)) => {
                    let tie = (aic - b_aic).abs() < AIC_TIE;
                    if (!tie && aic < b_aic) || (tie && c.order.p + c.order.q < b.p + b.q) {
                        Some((c.order, aic))
                    } else {
                        Some((b, b_aic))
                    }
                }
            };
        }

        let Some((order, aic)) = best else {
            return Err(AnalysisError::Convergence {
                model: "ARIMA",
                asset: self.asset.clone(),
                order: format!("grid p≤{}, d={d}, q≤{}", self.config.max_p, self.config.max_q),
                reason: "no candidate order converged".into(),
            });
        };
        info!(asset = %self.asset, %order, aic, "selected ARIMA order");

        Ok(SelectedArima {
            base: self,
            order,
            candidates,
        })
    }

    /// Skip selection and use `order` directly.
    pub fn with_order(self, order: ArimaOrder) -> Result<SelectedArima, AnalysisError> {
        if self.log_prices.len() <= order.d + order.p + 1 {
            return Err(AnalysisError::validation(
                "arima",
                format!("order {order} does not fit {} observations", self.log_prices.len()),
            ));
        }
        Ok(SelectedArima {
            base: self,
            order,
            candidates: Vec::new(),
        })
    }
}

impl SelectedArima {
    pub fn order(&self) -> ArimaOrder {
        self.order
    }

    pub fn asset(&self) -> &str {
        &self.base.asset
    }

    /// Every grid candidate with its AIC or failure reason; empty when the
    /// order was given explicitly.
    pub fn candidates(&self) -> &[CandidateScore] {
        &self.candidates
    }

    /// Same data, different order (used to retry with simpler models).
    pub fn with_order(&self, order: ArimaOrder) -> SelectedArima {
        SelectedArima {
            base: self.base.clone(),
            order,
            candidates: self.candidates.clone(),
        }
    }

    /// Estimate the parameters by conditional maximum likelihood.
    pub fn fit(&self) -> Result<FittedArima, AnalysisError> {
        let order = self.order;
        let base = &self.base;
        let w = difference(&base.log_prices, order.d);
        let fit = fit_css(&w, order, order.p, base.config.optimizer, &base.asset)?;
        let tails = (0..order.d)
            .map(|k| {
                difference(&base.log_prices, k)
                    .last()
                    .copied()
                    .unwrap_or(f64::NAN)
            })
            .collect();
        let aic = fit.aic(order);
        let loglik = fit.loglik();
        debug!(asset = %base.asset, %order, aic, iterations = fit.iterations, "fitted ARIMA");

        Ok(FittedArima {
            asset: base.asset.clone(),
            order,
            sigma2: fit.sse / fit.nobs as f64,
            ar: fit.ar,
            ma: fit.ma,
            mean: fit.mean,
            loglik,
            aic,
            nobs: fit.nobs,
            iterations: fit.iterations,
            w,
            residuals: fit.residuals,
            tails,
            origin: base.origin,
            last_price: base.last_price,
        })
    }
}

impl FittedArima {
    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn order(&self) -> ArimaOrder {
        self.order
    }

    pub fn ar(&self) -> &[f64] {
        &self.ar
    }

    pub fn ma(&self) -> &[f64] {
        &self.ma
    }

    /// Mean of the differenced series (0 when no constant is estimated).
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Innovation variance (maximum-likelihood estimate).
    pub fn sigma2(&self) -> f64 {
        self.sigma2
    }

    pub fn loglik(&self) -> f64 {
        self.loglik
    }

    pub fn aic(&self) -> f64 {
        self.aic
    }

    pub fn nobs(&self) -> usize {
        self.nobs
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn summary(&self) -> ArimaSummary {
        ArimaSummary {
            order: self.order,
            ar: self.ar.clone(),
            ma: self.ma.clone(),
            constant: self.order.constant.then_some(self.mean),
            sigma2: self.sigma2,
            loglik: self.loglik,
            aic: self.aic,
            nobs: self.nobs,
            iterations: self.iterations,
        }
    }

    /// Point forecasts of the log-price for steps `1..=horizon`.
    pub fn forecast_log_path(&self, horizon: usize) -> Vec<f64> {
        let m = self.w.len();
        let mut w_ext = self.w.clone();
        let mut e_ext = self.residuals.clone();
        for _ in 0..horizon {
            let t = w_ext.len();
            let mut v = self.mean;
            for (i, phi) in self.ar.iter().enumerate() {
                if let Some(x) = t.checked_sub(i + 1).map(|k| w_ext[k]) {
                    v += phi * (x - self.mean);
                }
            }
            for (j, theta) in self.ma.iter().enumerate() {
                if let Some(e) = t.checked_sub(j + 1).map(|k| e_ext[k]) {
                    v += theta * e;
                }
            }
            w_ext.push(v);
            e_ext.push(0.0);
        }

        // Undo each difference, innermost first
        let mut path: Vec<f64> = w_ext[m..].to_vec();
        for tail in self.tails.iter().rev() {
            let mut level = *tail;
            for x in path.iter_mut() {
                level += *x;
                *x = level;
            }
        }
        path
    }

    /// Standard errors of the log-price forecast for steps `1..=horizon`:
    /// `σ √(Σ_{j<h} ψ_j²)` with ψ from `φ(B)(1 − B)ᵈ` and `θ(B)`.
    pub fn forecast_log_se(&self, horizon: usize) -> Vec<f64> {
        let psi = psi_weights(&integrated_ar(&self.ar, self.order.d), &self.ma, horizon);
        psi.iter()
            .scan(0.0, |acc, p| {
                *acc += p * p;
                Some((self.sigma2 * *acc).sqrt())
            })
            .collect()
    }

    /// Price forecast with `confidence` intervals.
    pub fn forecast(&self, horizon: usize, confidence: f64) -> Result<Forecast, AnalysisError> {
        if horizon == 0 {
            return Err(AnalysisError::validation("arima_forecast", "horizon must be at least 1"));
        }
        let means = self.forecast_log_path(horizon);
        let ses = self.forecast_log_se(horizon);
        Forecast::from_log_space(
            ForecastHeader {
                model: ModelKind::Arima,
                asset: self.asset.clone(),
                spec: self.order.to_string(),
                origin: self.origin,
                last_price: self.last_price,
                confidence,
            },
            &means,
            &ses,
        )
    }
}

// ── Conditional sum of squares ──────────────────────────────────────

struct CssFit {
    ar: Vec<f64>,
    ma: Vec<f64>,
    mean: f64,
    sse: f64,
    nobs: usize,
    residuals: Vec<f64>,
    iterations: usize,
}

impl CssFit {
    fn loglik(&self) -> f64 {
        let n = self.nobs as f64;
        -0.5 * n * ((2.0 * std::f64::consts::PI).ln() + (self.sse / n).ln() + 1.0)
    }

    fn aic(&self, order: ArimaOrder) -> f64 {
        -2.0 * self.loglik() + 2.0 * (order.n_params() + 1) as f64
    }
}

/// Objective over unconstrained parameters `[ar.., ma.., mean]`.
struct Css<'a> {
    w: &'a [f64],
    start: usize,
    order: ArimaOrder,
    center: f64,
    scale: f64,
}

impl Css<'_> {
    fn unpack(&self, x: &[f64]) -> (Vec<f64>, Vec<f64>, f64) {
        let (p, q) = (self.order.p, self.order.q);
        let ar = constrain_stationary(&x[..p]);
        // Invertible θ(B) = 1 + Σθⱼ Bʲ from a stationary 1 − Σcⱼ Bʲ
        let ma = constrain_stationary(&x[p..p + q])
            .into_iter()
            .map(|c| -c)
            .collect();
        let mean = if self.order.constant {
            self.center + self.scale * x[p + q]
        } else {
            0.0
        };
        (ar, ma, mean)
    }

    fn residuals(&self, ar: &[f64], ma: &[f64], mean: f64) -> (Vec<f64>, f64) {
        let w = self.w;
        let mut e = vec![0.0; w.len()];
        let mut sse = 0.0;
        for t in self.start..w.len() {
            let mut v = w[t] - mean;
            for (i, phi) in ar.iter().enumerate() {
                v -= phi * (w[t - 1 - i] - mean);
            }
            for (j, theta) in ma.iter().enumerate() {
                if t > j {
                    v -= theta * e[t - 1 - j];
                }
            }
            e[t] = v;
            sse += v * v;
        }
        (e, sse)
    }

    fn nobs(&self) -> usize {
        self.w.len() - self.start
    }

    /// Concentrated negative log-likelihood per observation, up to a constant.
    fn objective(&self, x: &[f64]) -> f64 {
        let (ar, ma, mean) = self.unpack(x);
        let (_, sse) = self.residuals(&ar, &ma, mean);
        0.5 * (sse / self.nobs() as f64).ln()
    }
}

fn fit_css(
    w: &[f64],
    order: ArimaOrder,
    start: usize,
    opts: NelderMeadOptions,
    asset: &str,
) -> Result<CssFit, AnalysisError> {
    let convergence = |reason: String| AnalysisError::Convergence {
        model: "ARIMA",
        asset: asset.to_string(),
        order: order.to_string(),
        reason,
    };

    let start = start.max(order.p);
    let k = order.n_params();
    if w.len() <= start + k + 1 {
        return Err(AnalysisError::validation(
            "arima_fit",
            format!(
                "{} observations after differencing are too few for {order}",
                w.len()
            ),
        ));
    }

    let sd = std_dev(w);
    let css = Css {
        w,
        start,
        order,
        center: mean(w),
        scale: if sd.is_finite() && sd > 0.0 { sd } else { 1.0 },
    };

    let mut x0 = unconstrain_pacf(&sample_pacf(w, order.p));
    x0.extend(std::iter::repeat(0.0).take(order.q));
    if order.constant {
        x0.push(0.0);
    }

    let result = nelder_mead(|x| css.objective(x), &x0, opts);
    if !result.f.is_finite() {
        return Err(convergence("non-finite likelihood".into()));
    }
    if !result.converged {
        return Err(convergence(format!(
            "Nelder–Mead stopped after {} iterations",
            result.iterations
        )));
    }

    let (ar, ma, mean) = css.unpack(&result.x);
    let (residuals, sse) = css.residuals(&ar, &ma, mean);
    if !(sse.is_finite() && sse > 0.0) {
        return Err(convergence(format!("degenerate residual sum of squares {sse}")));
    }

    Ok(CssFit {
        ar,
        ma,
        mean,
        sse,
        nobs: css.nobs(),
        residuals,
        iterations: result.iterations,
    })
}
