//! Augmented Dickey–Fuller unit-root test (constant, no trend).
//!
//! Test regression for lag `k`:
//!
//! ```text
//! Δy[t] = α + γ·y[t-1] + Σ_{i=1..k} β_i·Δy[t-i] + ε[t]
//! ```
//!
//! The statistic is the t-ratio of γ. The lag is chosen by AIC over
//! `0..=maxlag`, every candidate fitted on the same rows (the first `maxlag`
//! differences dropped), and the winning lag is then refitted on every row it
//! can use. p-values follow MacKinnon (1994), critical values MacKinnon (2010).

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::stats::{normal_cdf, ols, LinalgError, OlsFit};

/// Fewest observations accepted by [`adf_test`].
pub const ADF_MIN_OBS: usize = 12;

// MacKinnon (1994), one variable, constant only.
const TAU_MAX: f64 = 2.74;
const TAU_MIN: f64 = -18.83;
const TAU_STAR: f64 = -1.61;
const TAU_SMALL_P: [f64; 3] = [2.1659, 1.4412, 0.038269];
const TAU_LARGE_P: [f64; 4] = [1.7339, 0.93202, -0.12745, -0.010368];

// MacKinnon (2010) response surfaces, `c0 + c1/T + c2/T² + c3/T³`.
const CRIT_1: [f64; 4] = [-3.43035, -6.5393, -16.786, -79.433];
const CRIT_5: [f64; 4] = [-2.86154, -2.8903, -4.234, -40.040];
const CRIT_10: [f64; 4] = [-2.56677, -1.5384, -2.809, 0.0];

/// Critical values of the ADF statistic at the usual levels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriticalValues {
    pub one_pct: f64,
    pub five_pct: f64,
    pub ten_pct: f64,
}

/// Outcome of one ADF test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationarityResult {
    pub label: String,
    pub statistic: f64,
    pub p_value: f64,
    pub used_lag: usize,
    pub nobs: usize,
    pub critical_values: CriticalValues,
    pub alpha: f64,
    /// `p_value < alpha`: the unit-root null is rejected.
    pub stationary: bool,
}

/// Default upper bound on the augmentation lag for `n` observations:
/// `ceil(12·(n/100)^¼)`, capped so the regression keeps enough rows.
pub fn adf_max_lag(n: usize) -> usize {
    let rule = (12.0 * (n as f64 / 100.0).powf(0.25)).ceil() as usize;
    rule.min((n / 2).saturating_sub(2))
}

/// ADF test on `values` with AIC lag selection.
pub fn adf_test(
    values: &[f64],
    label: &str,
    alpha: f64,
) -> Result<StationarityResult, AnalysisError> {
    let n = values.len();
    if n < ADF_MIN_OBS {
        return Err(AnalysisError::validation(
            "adf",
            format!("'{label}' has {n} observations, need at least {ADF_MIN_OBS}"),
        ));
    }
    if let Some(i) = values.iter().position(|v| !v.is_finite()) {
        return Err(AnalysisError::data_quality(
            label,
            None,
            format!("non-finite value at position {i}"),
        ));
    }

    let diffs: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    let maxlag = adf_max_lag(n);
    let singular = |lag: usize, source: LinalgError| AnalysisError::SingularMatrix {
        stage: "adf",
        params: format!("series={label}, lag={lag}"),
        source,
    };

    let mut best: Option<(usize, f64)> = None;
    for lag in 0..=maxlag {
        let fit = match adf_regression(values, &diffs, lag, maxlag) {
            Ok(fit) => fit,
            // Extra lags can only make the design worse; a singular lag-0
            // regression means the series itself is degenerate.
            Err(e) if lag == 0 => return Err(singular(lag, e)),
            Err(_) => continue,
        };
        let aic = fit.aic();
        if best.map_or(true, |(_, b)| aic < b) {
            best = Some((lag, aic));
        }
    }
    let used_lag = best.map(|(lag, _)| lag).unwrap_or(0);

    let fit = adf_regression(values, &diffs, used_lag, used_lag).map_err(|e| singular(used_lag, e))?;
    let statistic = fit.t_stat(1);
    if !statistic.is_finite() {
        return Err(singular(
            used_lag,
            LinalgError::Singular {
                reason: "zero residual variance".into(),
            },
        ));
    }
    let p_value = mackinnon_p(statistic);
    let nobs = fit.nobs;

    Ok(StationarityResult {
        label: label.to_string(),
        statistic,
        p_value,
        used_lag,
        nobs,
        critical_values: critical_values(nobs),
        alpha,
        stationary: p_value < alpha,
    })
}

/// OLS of Δy on `[1, y[t-1], Δy[t-1..t-lag]]`, skipping the first `skip`
/// differences so several lags can share one sample.
fn adf_regression(
    levels: &[f64],
    diffs: &[f64],
    lag: usize,
    skip: usize,
) -> Result<OlsFit, LinalgError> {
    let rows = diffs.len().saturating_sub(skip);
    let cols = 2 + lag;
    if rows <= cols {
        return Err(LinalgError::TooFewObservations {
            needed: cols,
            have: rows,
        });
    }
    let x = DMatrix::from_fn(rows, cols, |r, c| {
        let i = r + skip;
        match c {
            0 => 1.0,
            1 => levels[i],
            j => diffs[i - (j - 1)],
        }
    });
    let y = DVector::from_fn(rows, |r, _| diffs[r + skip]);
    ols(&x, &y)
}

/// MacKinnon (1994) approximate p-value for the constant-only ADF statistic.
pub fn mackinnon_p(statistic: f64) -> f64 {
    if statistic > TAU_MAX {
        return 1.0;
    }
    if statistic < TAU_MIN {
        return 0.0;
    }
    let coefs: &[f64] = if statistic <= TAU_STAR {
        &TAU_SMALL_P
    } else {
        &TAU_LARGE_P
    };
    let poly = coefs
        .iter()
        .rev()
        .fold(0.0, |acc, c| acc * statistic + c);
    normal_cdf(poly)
}

/// MacKinnon (2010) finite-sample critical values for `nobs` observations.
pub fn critical_values(nobs: usize) -> CriticalValues {
    let t = nobs as f64;
    let surface = |c: [f64; 4]| c[0] + c[1] / t + c[2] / (t * t) + c[3] / (t * t * t);
    CriticalValues {
        one_pct: surface(CRIT_1),
        five_pct: surface(CRIT_5),
        ten_pct: surface(CRIT_10),
    }
}
