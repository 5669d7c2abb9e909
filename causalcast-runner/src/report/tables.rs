//! CSV exports.
//!
//! Each function renders a complete CSV document in memory; writing it to
//! disk is left to the artifact layer.

use anyhow::{Context, Result};

use causalcast_core::causality::{CausalityMatrix, PairOutcome};
use causalcast_core::forecast::ForecastSummaryRow;
use causalcast_core::preprocess::{StationarityReport, StationarityResult};

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}

/// Columns: model, asset, horizon_step, date, point_estimate, lower_bound,
/// upper_bound
pub fn forecast_summary_csv(rows: &[ForecastSummaryRow]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "model",
        "asset",
        "horizon_step",
        "date",
        "point_estimate",
        "lower_bound",
        "upper_bound",
    ])?;
    for r in rows {
        wtr.write_record([
            &r.model,
            &r.asset,
            &r.horizon_step.to_string(),
            &r.date.to_string(),
            &format!("{:.6}", r.point_estimate),
            &format!("{:.6}", r.lower_bound),
            &format!("{:.6}", r.upper_bound),
        ])?;
    }
    finish(wtr)
}

/// Columns: cause, effect, min_p_value, best_lag, f_stat, significant,
/// status, reason. Sorted significant first, then by p-value.
pub fn granger_summary_csv(matrix: &CausalityMatrix) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "cause",
        "effect",
        "min_p_value",
        "best_lag",
        "f_stat",
        "significant",
        "status",
        "reason",
    ])?;
    for row in matrix.summary() {
        let (f_stat, status, reason) = match matrix.entry(&row.cause, &row.effect).map(|e| &e.outcome) {
            Some(PairOutcome::Tested { f_stat, .. }) => (format!("{f_stat:.6}"), "tested", String::new()),
            Some(PairOutcome::Untestable { reason }) => (String::new(), "untestable", reason.clone()),
            None => (String::new(), "missing", String::new()),
        };
        wtr.write_record([
            row.cause.as_str(),
            row.effect.as_str(),
            &row.min_p_value.map(|p| format!("{p:.6e}")).unwrap_or_default(),
            &row.best_lag.map(|l| l.to_string()).unwrap_or_default(),
            &f_stat,
            if row.significant { "true" } else { "false" },
            status,
            &reason,
        ])?;
    }
    finish(wtr)
}

fn stationarity_record(kind: &str, r: &StationarityResult) -> [String; 11] {
    [
        kind.to_string(),
        r.label.clone(),
        format!("{:.6}", r.statistic),
        format!("{:.6e}", r.p_value),
        r.used_lag.to_string(),
        r.nobs.to_string(),
        format!("{:.4}", r.critical_values.one_pct),
        format!("{:.4}", r.critical_values.five_pct),
        format!("{:.4}", r.critical_values.ten_pct),
        r.alpha.to_string(),
        r.stationary.to_string(),
    ]
}

/// One row per tested series: log-price levels first, then returns.
pub fn stationarity_csv(report: &StationarityReport) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "series_kind",
        "label",
        "adf_statistic",
        "p_value",
        "used_lag",
        "nobs",
        "crit_1pct",
        "crit_5pct",
        "crit_10pct",
        "alpha",
        "stationary",
    ])?;
    let levels = report.levels.iter().map(|r| ("log_price", r));
    let returns = report.returns.iter().map(|r| ("log_return", r));
    for (kind, r) in levels.chain(returns) {
        wtr.write_record(stationarity_record(kind, r))?;
    }
    finish(wtr)
}
