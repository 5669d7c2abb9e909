//! Integration-order checks across the whole price table.
//!
//! Every asset is expected to be I(1): a non-stationary log-price level and a
//! stationary log-return series. Deviations are reported as warnings rather
//! than errors because the downstream stages enforce their own preconditions.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::adf::{adf_test, StationarityResult};
use crate::error::AnalysisError;
use crate::series::{PriceTable, ReturnSeries};

/// ADF results for every level and return series.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StationarityReport {
    /// One result per asset, on the log-price level.
    pub levels: Vec<StationarityResult>,
    /// One result per asset, on the log-return series.
    pub returns: Vec<StationarityResult>,
    pub warnings: Vec<String>,
}

impl StationarityReport {
    /// Return-series result for `asset`, if tested.
    pub fn returns_for(&self, asset: &str) -> Option<&StationarityResult> {
        self.returns.iter().find(|r| r.label == asset)
    }

    /// Labels of return series that failed the stationarity test.
    pub fn non_stationary_returns(&self) -> Vec<&str> {
        self.returns
            .iter()
            .filter(|r| !r.stationary)
            .map(|r| r.label.as_str())
            .collect()
    }
}

/// Run ADF on every log-price level and every return series.
pub fn assess_integration(
    prices: &PriceTable,
    returns: &[ReturnSeries],
    alpha: f64,
) -> Result<StationarityReport, AnalysisError> {
    let mut report = StationarityReport::default();

    for series in prices.all_series() {
        let result = adf_test(&series.log_prices(), series.asset(), alpha)?;
        if result.stationary {
            let msg = format!(
                "{} log-price level looks stationary (ADF p = {:.4}); differencing may be unnecessary",
                result.label, result.p_value
            );
            warn!("{msg}");
            report.warnings.push(msg);
        }
        report.levels.push(result);
    }

    for series in returns {
        let result = adf_test(series.values(), series.asset(), alpha)?;
        if !result.stationary {
            let msg = format!(
                "{} log-returns are not stationary (ADF p = {:.4})",
                result.label, result.p_value
            );
            warn!("{msg}");
            report.warnings.push(msg);
        }
        report.returns.push(result);
    }

    info!(
        levels = report.levels.len(),
        returns = report.returns.len(),
        warnings = report.warnings.len(),
        "stationarity assessment complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::gbm_path;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn random_walk_prices_are_i1() {
        let mut rng = StdRng::seed_from_u64(11);
        let n = 600;
        let start = chrono::NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let table = PriceTable::new(
            start.iter_days().take(n).collect(),
            vec!["A".into()],
            vec![gbm_path(&mut rng, 100.0, 0.0, 0.02, n)],
        )
        .unwrap();
        let returns = table.log_returns().unwrap();
        let report = assess_integration(&table, &returns, 0.05).unwrap();
        assert_eq!(report.levels.len(), 1);
        assert!(report.returns_for("A").unwrap().stationary);
        assert!(report.non_stationary_returns().is_empty());
    }
}
