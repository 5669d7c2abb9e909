//! Pairwise Granger causality on stationary return series.
//!
//! For each lag `ℓ` the effect is regressed on a constant and `ℓ` of its own
//! lags (restricted), then additionally on `ℓ` lags of the cause
//! (unrestricted), both over rows `ℓ..n`. The SSR-based F statistic
//!
//! ```text
//! F = ((SSR_r − SSR_u) / ℓ) / (SSR_u / (n − ℓ − 2ℓ − 1))
//! ```
//!
//! is compared with F(ℓ, n − ℓ − 2ℓ − 1). A pair is summarised by its
//! smallest p-value over `1..=max_lag`.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::AnalysisError;
use crate::preprocess::StationarityReport;
use crate::series::ReturnSeries;
use crate::stats::{f_survival, ols, LinalgError};

/// F test at one lag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrangerLagResult {
    pub lag: usize,
    pub f_stat: f64,
    pub p_value: f64,
    pub df_num: usize,
    pub df_den: usize,
}

/// F tests at every lag for one (cause, effect) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrangerTest {
    pub lags: Vec<GrangerLagResult>,
}

impl GrangerTest {
    /// The lag with the smallest p-value.
    pub fn best(&self) -> Option<&GrangerLagResult> {
        self.lags
            .iter()
            .min_by(|a, b| a.p_value.total_cmp(&b.p_value))
    }

    pub fn min_p_value(&self) -> Option<f64> {
        self.best().map(|b| b.p_value)
    }
}

/// Test whether `cause` Granger-causes `effect` at lags `1..=max_lag`.
///
/// Both slices must be the same length and aligned in time.
pub fn granger_test(
    cause: &[f64],
    effect: &[f64],
    max_lag: usize,
) -> Result<GrangerTest, LinalgError> {
    let n = effect.len();
    if cause.len() != n {
        return Err(LinalgError::Dimension(format!(
            "cause has {} observations, effect has {n}",
            cause.len()
        )));
    }
    if max_lag == 0 {
        return Err(LinalgError::Dimension("max_lag must be at least 1".into()));
    }

    let mut lags = Vec::with_capacity(max_lag);
    for lag in 1..=max_lag {
        let rows = n.saturating_sub(lag);
        let df_den = rows.saturating_sub(2 * lag + 1);
        if df_den == 0 {
            return Err(LinalgError::TooFewObservations {
                needed: 3 * lag + 1,
                have: n,
            });
        }

        let y = DVector::from_fn(rows, |r, _| effect[r + lag]);
        let restricted = DMatrix::from_fn(rows, 1 + lag, |r, c| match c {
            0 => 1.0,
            j => effect[r + lag - j],
        });
        let unrestricted = DMatrix::from_fn(rows, 1 + 2 * lag, |r, c| match c {
            0 => 1.0,
            j if j <= lag => effect[r + lag - j],
            j => cause[r + lag - (j - lag)],
        });

        let ssr_r = ols(&restricted, &y)?.ssr;
        let ssr_u = ols(&unrestricted, &y)?.ssr;
        if ssr_u <= 0.0 || !ssr_u.is_finite() {
            return Err(LinalgError::Singular {
                reason: format!("unrestricted model fits exactly at lag {lag}"),
            });
        }

        let f_stat = ((ssr_r - ssr_u) / lag as f64) / (ssr_u / df_den as f64);
        let p_value = f_survival(f_stat, lag as f64, df_den as f64);
        lags.push(GrangerLagResult {
            lag,
            f_stat,
            p_value,
            df_num: lag,
            df_den,
        });
    }

    Ok(GrangerTest { lags })
}

/// Outcome for one ordered pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PairOutcome {
    Tested {
        min_p_value: f64,
        lag: usize,
        f_stat: f64,
    },
    /// The regression was numerically degenerate (for example, two identical
    /// series).
    Untestable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalityEntry {
    pub cause: String,
    pub effect: String,
    pub outcome: PairOutcome,
}

/// Row of the tidy Granger summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrangerSummaryRow {
    pub cause: String,
    pub effect: String,
    pub min_p_value: Option<f64>,
    pub best_lag: Option<usize>,
    pub significant: bool,
}

/// Directed Granger results for every ordered pair of distinct assets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalityMatrix {
    pub assets: Vec<String>,
    pub max_lag: usize,
    pub alpha: f64,
    pub entries: Vec<CausalityEntry>,
}

impl CausalityMatrix {
    pub fn entry(&self, cause: &str, effect: &str) -> Option<&CausalityEntry> {
        self.entries
            .iter()
            .find(|e| e.cause == cause && e.effect == effect)
    }

    /// Minimum p-value for `cause → effect`; `None` on the diagonal, for
    /// unknown assets, or for untestable pairs.
    pub fn p_value(&self, cause: &str, effect: &str) -> Option<f64> {
        match &self.entry(cause, effect)?.outcome {
            PairOutcome::Tested { min_p_value, .. } => Some(*min_p_value),
            PairOutcome::Untestable { .. } => None,
        }
    }

    pub fn is_significant(&self, cause: &str, effect: &str) -> bool {
        self.p_value(cause, effect).is_some_and(|p| p < self.alpha)
    }

    pub fn untestable(&self) -> impl Iterator<Item = &CausalityEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, PairOutcome::Untestable { .. }))
    }

    /// Every pair, significant first, then by ascending p-value; untestable
    /// pairs last.
    pub fn summary(&self) -> Vec<GrangerSummaryRow> {
        let mut rows: Vec<GrangerSummaryRow> = self
            .entries
            .iter()
            .map(|e| {
                let (min_p_value, best_lag) = match &e.outcome {
                    PairOutcome::Tested {
                        min_p_value, lag, ..
                    } => (Some(*min_p_value), Some(*lag)),
                    PairOutcome::Untestable { .. } => (None, None),
                };
                GrangerSummaryRow {
                    cause: e.cause.clone(),
                    effect: e.effect.clone(),
                    min_p_value,
                    best_lag,
                    significant: min_p_value.is_some_and(|p| p < self.alpha),
                }
            })
            .collect();
        rows.sort_by(|a, b| {
            b.significant.cmp(&a.significant).then_with(|| {
                let pa = a.min_p_value.unwrap_or(f64::INFINITY);
                let pb = b.min_p_value.unwrap_or(f64::INFINITY);
                pa.total_cmp(&pb)
            })
        });
        rows
    }
}

/// Granger tests for every ordered pair of distinct return series.
///
/// Every series must have passed the stationarity test in `stationarity`;
/// otherwise the whole stage fails with `Validation`.
pub fn granger_matrix(
    returns: &[ReturnSeries],
    stationarity: &StationarityReport,
    max_lag: usize,
    alpha: f64,
) -> Result<CausalityMatrix, AnalysisError> {
    if returns.len() < 2 {
        return Err(AnalysisError::validation(
            "causality",
            format!("need at least 2 series, have {}", returns.len()),
        ));
    }
    if max_lag == 0 {
        return Err(AnalysisError::validation("causality", "max_lag must be at least 1"));
    }
    for series in returns {
        match stationarity.returns_for(series.asset()) {
            Some(r) if r.stationary => {}
            Some(r) => {
                return Err(AnalysisError::validation(
                    "causality",
                    format!(
                        "'{}' is not stationary (ADF p = {:.4})",
                        series.asset(),
                        r.p_value
                    ),
                ))
            }
            None => {
                return Err(AnalysisError::validation(
                    "causality",
                    format!("'{}' has no stationarity result", series.asset()),
                ))
            }
        }
    }
    let first = &returns[0];
    if let Some(s) = returns.iter().find(|s| s.dates() != first.dates()) {
        return Err(AnalysisError::validation(
            "causality",
            format!("'{}' is not aligned with '{}'", s.asset(), first.asset()),
        ));
    }
    let n = first.len();
    if n <= 4 * max_lag + 1 {
        return Err(AnalysisError::validation(
            "causality",
            format!("{n} observations are too few for max_lag {max_lag}"),
        ));
    }

    let pairs: Vec<(usize, usize)> = (0..returns.len())
        .flat_map(|c| (0..returns.len()).filter(move |&e| e != c).map(move |e| (c, e)))
        .collect();

    let entries: Vec<CausalityEntry> = pairs
        .par_iter()
        .map(|&(c, e)| {
            let cause = &returns[c];
            let effect = &returns[e];
            let outcome = match granger_test(cause.values(), effect.values(), max_lag) {
                Ok(test) => match test.best() {
                    Some(best) if best.p_value.is_finite() => PairOutcome::Tested {
                        min_p_value: best.p_value,
                        lag: best.lag,
                        f_stat: best.f_stat,
                    },
                    _ => PairOutcome::Untestable {
                        reason: "no finite p-value".into(),
                    },
                },
                Err(err) => PairOutcome::Untestable {
                    reason: err.to_string(),
                },
            };
            match &outcome {
                PairOutcome::Tested { min_p_value, lag, .. } => {
                    debug!(cause = cause.asset(), effect = effect.asset(), min_p_value, lag, "granger pair");
                }
                PairOutcome::Untestable { reason } => {
                    warn!(cause = cause.asset(), effect = effect.asset(), %reason, "granger pair untestable");
                }
            }
            CausalityEntry {
                cause: cause.asset().to_string(),
                effect: effect.asset().to_string(),
                outcome,
            }
        })
        .collect();

    let matrix = CausalityMatrix {
        assets: returns.iter().map(|s| s.asset().to_string()).collect(),
        max_lag,
        alpha,
        entries,
    };
    info!(
        pairs = matrix.entries.len(),
        significant = matrix.summary().iter().filter(|r| r.significant).count(),
        untestable = matrix.untestable().count(),
        "granger causality complete"
    );
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    /// `a[t] = 0.5·b[t-1] + noise`, `b` white noise.
    fn driven_pair(seed: u64, n: usize) -> (Vec<f64>, Vec<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, 1.0).unwrap();
        let b: Vec<f64> = (0..n).map(|_| noise.sample(&mut rng)).collect();
        let mut a = vec![0.0; n];
        for t in 1..n {
            a[t] = 0.5 * b[t - 1] + noise.sample(&mut rng);
        }
        (a, b)
    }

    #[test]
    fn detects_lagged_driver() {
        let (a, b) = driven_pair(42, 500);
        let test = granger_test(&b, &a, 5).unwrap();
        assert_eq!(test.lags.len(), 5);
        assert!(test.min_p_value().unwrap() < 1e-6);
        assert_eq!(test.lags[0].df_den, 500 - 1 - 3);
    }

    #[test]
    fn identical_series_are_singular() {
        let (a, _) = driven_pair(1, 200);
        assert!(matches!(
            granger_test(&a, &a, 2),
            Err(LinalgError::Singular { .. })
        ));
    }

    #[test]
    fn too_short_for_lag() {
        assert!(matches!(
            granger_test(&[1.0, 2.0, 3.0, 4.0], &[4.0, 3.0, 1.0, 2.0], 2),
            Err(LinalgError::TooFewObservations { .. })
        ));
    }

    #[test]
    fn summary_orders_significant_first() {
        let m = CausalityMatrix {
            assets: vec!["A".into(), "B".into(), "C".into()],
            max_lag: 1,
            alpha: 0.05,
            entries: vec![
                CausalityEntry {
                    cause: "A".into(),
                    effect: "B".into(),
                    outcome: PairOutcome::Tested { min_p_value: 0.5, lag: 1, f_stat: 0.4 },
                },
                CausalityEntry {
                    cause: "B".into(),
                    effect: "A".into(),
                    outcome: PairOutcome::Tested { min_p_value: 0.01, lag: 1, f_stat: 7.0 },
                },
                CausalityEntry {
                    cause: "C".into(),
                    effect: "A".into(),
                    outcome: PairOutcome::Untestable { reason: "singular".into() },
                },
                CausalityEntry {
                    cause: "A".into(),
                    effect: "C".into(),
                    outcome: PairOutcome::Tested { min_p_value: 0.2, lag: 1, f_stat: 1.5 },
                },
            ],
        };
        let rows = m.summary();
        assert_eq!((rows[0].cause.as_str(), rows[0].significant), ("B", true));
        assert_eq!(rows[1].min_p_value, Some(0.2));
        assert_eq!(rows[3].min_p_value, None);
        assert!(m.is_significant("B", "A"));
        assert!(!m.is_significant("A", "B"));
        assert_eq!(m.p_value("C", "A"), None);
        assert_eq!(m.untestable().count(), 1);
    }
}
