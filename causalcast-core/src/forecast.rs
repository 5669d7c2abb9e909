//! Forecast values shared by the ARIMA and VAR models.
//!
//! Both models forecast in log-price space with a Gaussian standard error per
//! step. Price-space values are `exp` of the log-space point and bounds, so
//! the price interval is asymmetric around the point.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    #[serde(rename = "ARIMA")]
    Arima,
    #[serde(rename = "VAR")]
    Var,
}

impl ModelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Arima => "ARIMA",
            Self::Var => "VAR",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One forecast step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    /// 1-based horizon step.
    pub step: usize,
    pub date: NaiveDate,
    pub point: f64,
    pub lower: f64,
    pub upper: f64,
    pub log_point: f64,
    /// Standard error of the log-price forecast.
    pub log_se: f64,
}

impl ForecastPoint {
    /// Width of the interval in log space.
    pub fn log_width(&self) -> f64 {
        self.upper.ln() - self.lower.ln()
    }
}

/// A price forecast for one asset from one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub model: ModelKind,
    pub asset: String,
    /// Human-readable model specification, e.g. `ARIMA(1,1,0)+c` or `VAR(3)`.
    pub spec: String,
    /// Last observed date; step `h` is dated `origin + h` calendar days.
    pub origin: NaiveDate,
    pub last_price: f64,
    pub confidence: f64,
    pub points: Vec<ForecastPoint>,
}

/// Flat row of `forecast_summary.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSummaryRow {
    pub model: String,
    pub asset: String,
    pub horizon_step: usize,
    pub date: NaiveDate,
    pub point_estimate: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

/// Context shared by every step of a forecast.
#[derive(Debug, Clone)]
pub struct ForecastHeader {
    pub model: ModelKind,
    pub asset: String,
    pub spec: String,
    pub origin: NaiveDate,
    pub last_price: f64,
    pub confidence: f64,
}

impl Forecast {
    /// Build a price forecast from log-space means and standard errors.
    ///
    /// Bounds are `exp(mean ± z·se)` with `z` the two-sided normal quantile for
    /// `header.confidence`. Fails with `Validation` if any value is non-finite
    /// or the standard errors decrease.
    pub fn from_log_space(
        header: ForecastHeader,
        log_means: &[f64],
        log_ses: &[f64],
    ) -> Result<Self, AnalysisError> {
        if log_means.len() != log_ses.len() || log_means.is_empty() {
            return Err(AnalysisError::validation(
                "forecast",
                format!(
                    "{} means and {} standard errors",
                    log_means.len(),
                    log_ses.len()
                ),
            ));
        }
        if !(header.confidence > 0.0 && header.confidence < 1.0) {
            return Err(AnalysisError::validation(
                "forecast",
                format!("confidence {} outside (0, 1)", header.confidence),
            ));
        }
        let z = crate::stats::z_for_confidence(header.confidence);
        let dates = forecast_dates(header.origin, log_means.len());

        let mut points = Vec::with_capacity(log_means.len());
        let mut prev_se = 0.0;
        for (i, ((&m, &se), date)) in log_means.iter().zip(log_ses).zip(dates).enumerate() {
            if !m.is_finite() || !se.is_finite() || se < 0.0 {
                return Err(AnalysisError::validation(
                    "forecast",
                    format!("{} step {}: mean {m}, se {se}", header.asset, i + 1),
                ));
            }
            if se < prev_se {
                return Err(AnalysisError::validation(
                    "forecast",
                    format!(
                        "{} step {}: standard error fell from {prev_se} to {se}",
                        header.asset,
                        i + 1
                    ),
                ));
            }
            prev_se = se;
            points.push(ForecastPoint {
                step: i + 1,
                date,
                point: m.exp(),
                lower: (m - z * se).exp(),
                upper: (m + z * se).exp(),
                log_point: m,
                log_se: se,
            });
        }

        Ok(Self {
            model: header.model,
            asset: header.asset,
            spec: header.spec,
            origin: header.origin,
            last_price: header.last_price,
            confidence: header.confidence,
            points,
        })
    }

    pub fn horizon(&self) -> usize {
        self.points.len()
    }

    pub fn final_point(&self) -> Option<&ForecastPoint> {
        self.points.last()
    }

    pub fn summary_rows(&self) -> Vec<ForecastSummaryRow> {
        self.points
            .iter()
            .map(|p| ForecastSummaryRow {
                model: self.model.as_str().to_string(),
                asset: self.asset.clone(),
                horizon_step: p.step,
                date: p.date,
                point_estimate: p.point,
                lower_bound: p.lower,
                upper_bound: p.upper,
            })
            .collect()
    }
}

/// `origin + 1 .. origin + horizon` calendar days.
pub fn forecast_dates(origin: NaiveDate, horizon: usize) -> Vec<NaiveDate> {
    (1..=horizon as i64).map(|h| origin + Duration::days(h)).collect()
}

/// Cumulative log-price path from the last observed log-price and a return
/// path: `last + Σ_{j≤h} r[j]`.
pub fn integrate_returns(last_log_price: f64, returns: &[f64]) -> Vec<f64> {
    returns
        .iter()
        .scan(last_log_price, |level, r| {
            *level += r;
            Some(*level)
        })
        .collect()
}

/// Inverse of [`integrate_returns`].
pub fn difference_log_prices(last_log_price: f64, log_prices: &[f64]) -> Vec<f64> {
    std::iter::once(last_log_price)
        .chain(log_prices.iter().copied())
        .collect::<Vec<_>>()
        .windows(2)
        .map(|w| w[1] - w[0])
        .collect()
}
