//! Markdown run report (`report.md`).

use chrono::{DateTime, Utc};

use causalcast_core::arima::ArimaSummary;
use causalcast_core::causality::PairOutcome;
use causalcast_core::data::DataSource;
use causalcast_core::forecast::Forecast;
use causalcast_core::preprocess::StationarityResult;
use causalcast_core::var::VarSummary;

use super::{ArtifactRecord, ArtifactStatus};
use crate::pipeline::{AnalysisResults, RunStatus, StageStatus};

fn stationarity_row(kind: &str, r: &StationarityResult) -> String {
    format!(
        "| {} | {} | {:.3} | {:.4} | {} | {} | {} |\n",
        r.label,
        kind,
        r.statistic,
        r.p_value,
        r.used_lag,
        r.nobs,
        if r.stationary { "yes" } else { "no" }
    )
}

fn final_step_row(f: &Forecast) -> String {
    let Some(last) = f.final_point() else {
        return String::new();
    };
    format!(
        "| {} | {} | {} | {} | {:.4} | {:.4} | {:.4} | {:.4} | {:+.2}% |\n",
        f.model,
        f.asset,
        f.spec,
        last.date,
        f.last_price,
        last.point,
        last.lower,
        last.upper,
        (last.point / f.last_price - 1.0) * 100.0
    )
}

/// Parameter table in the usual `const`, `ar.L1`, `ma.L1`, `sigma2` naming.
fn arima_parameters(s: &ArimaSummary) -> String {
    let mut md = String::from("| Parameter | Estimate |\n| --- | ---: |\n");
    if let Some(c) = s.constant {
        md.push_str(&format!("| const | {c:.6} |\n"));
    }
    for (i, phi) in s.ar.iter().enumerate() {
        md.push_str(&format!("| ar.L{} | {phi:.6} |\n", i + 1));
    }
    for (i, theta) in s.ma.iter().enumerate() {
        md.push_str(&format!("| ma.L{} | {theta:.6} |\n", i + 1));
    }
    md.push_str(&format!("| sigma2 | {:.6e} |\n\n", s.sigma2));
    md.push_str(&format!(
        "Log-likelihood {:.3}, AIC {:.3}, {} observations, {} optimizer iterations.\n\n",
        s.loglik, s.aic, s.nobs, s.iterations
    ));
    md
}

/// One table per matrix: rows are equations, columns regressors.
fn var_matrix(title: &str, assets: &[String], rows: &[Vec<f64>]) -> String {
    let mut md = format!("{title}\n\n| | {} |\n|---", assets.join(" | "));
    md.push_str(&"| ---: ".repeat(assets.len()));
    md.push_str("|\n");
    for (asset, row) in assets.iter().zip(rows) {
        let cells: Vec<String> = row.iter().map(|v| format!("{v:.4e}")).collect();
        md.push_str(&format!("| {asset} | {} |\n", cells.join(" | ")));
    }
    md.push('\n');
    md
}

fn var_parameters(s: &VarSummary) -> String {
    let mut md = String::new();
    md.push_str("| Equation | Intercept |\n| --- | ---: |\n");
    for (asset, c) in s.assets.iter().zip(&s.intercept) {
        md.push_str(&format!("| {asset} | {c:.4e} |\n"));
    }
    md.push('\n');
    for (i, a) in s.coefficients.iter().enumerate() {
        md.push_str(&var_matrix(&format!("A_{} (lag {})", i + 1, i + 1), &s.assets, a));
    }
    md.push_str(&var_matrix("Residual covariance Σ_u", &s.assets, &s.sigma_u));
    md.push_str(&format!("{} observations.\n\n", s.nobs));
    md
}

/// Render the report. `artifacts` lists whatever was written before the
/// report itself; written charts are embedded.
pub fn generate_report(
    results: &AnalysisResults,
    status: RunStatus,
    artifacts: &[ArtifactRecord],
    generated_at: DateTime<Utc>,
) -> String {
    let mut md = String::with_capacity(4096);
    let config = &results.config;
    let acq = &results.acquisition;

    md.push_str("# Causality and Forecast Report\n\n");

    md.push_str("## Run\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Run ID | `{}` |\n", results.run_id));
    md.push_str(&format!("| Generated | {} |\n", generated_at.format("%Y-%m-%d %H:%M:%S UTC")));
    md.push_str(&format!("| Status | {status:?} |\n"));
    md.push_str(&format!(
        "| Requested Period | {} to {} |\n",
        config.data.start, config.data.end
    ));
    if let (Some(first), Some(last)) = (acq.table.dates().first(), acq.table.last_date()) {
        md.push_str(&format!(
            "| Aligned Data | {first} to {last} ({} rows, {}) |\n",
            acq.table.len(),
            config.data.alignment.as_str()
        ));
    }
    md.push_str(&format!("| Assets | {} |\n", acq.table.assets().join(", ")));
    md.push_str(&format!(
        "| Source | {:?}{} |\n",
        acq.source,
        if acq.from_cache { " (cached)" } else { "" }
    ));
    md.push_str(&format!("| Dataset Hash | {} |\n", acq.dataset_hash));
    if acq.source == DataSource::Synthetic {
        md.push_str("| Data | **SYNTHETIC** |\n");
    }
    md.push('\n');

    // Stationarity
    let st = &results.stationarity;
    md.push_str("## Stationarity (ADF)\n\n");
    md.push_str(&format!("Significance level: {}\n\n", config.stationarity.alpha));
    md.push_str("| Series | Kind | ADF | p-value | Lag | Obs | Stationary |\n");
    md.push_str("| --- | --- | ---: | ---: | ---: | ---: | --- |\n");
    for r in &st.levels {
        md.push_str(&stationarity_row("log-price", r));
    }
    for r in &st.returns {
        md.push_str(&stationarity_row("log-return", r));
    }
    md.push('\n');
    for w in &st.warnings {
        md.push_str(&format!("- {w}\n"));
    }
    if !st.warnings.is_empty() {
        md.push('\n');
    }

    // Causality
    md.push_str("## Granger Causality\n\n");
    match &results.causality {
        Ok(matrix) => {
            md.push_str(&format!(
                "Lags 1..{}, significance level {}. Pairs are listed cause → effect.\n\n",
                matrix.max_lag, matrix.alpha
            ));
            md.push_str("| Cause | Effect | Min p-value | Best Lag | Significant |\n");
            md.push_str("| --- | --- | ---: | ---: | --- |\n");
            for row in matrix.summary() {
                md.push_str(&format!(
                    "| {} | {} | {} | {} | {} |\n",
                    row.cause,
                    row.effect,
                    row.min_p_value.map(|p| format!("{p:.4}")).unwrap_or_else(|| "n/a".into()),
                    row.best_lag.map(|l| l.to_string()).unwrap_or_else(|| "n/a".into()),
                    if row.significant { "**yes**" } else { "no" }
                ));
            }
            md.push('\n');
            for e in matrix.untestable() {
                if let PairOutcome::Untestable { reason } = &e.outcome {
                    md.push_str(&format!("- {} → {} untestable: {reason}\n", e.cause, e.effect));
                }
            }
        }
        Err(e) => md.push_str(&format!("Causality analysis failed ({}): {e}\n", e.kind())),
    }
    md.push('\n');

    // Models
    md.push_str("## Models\n\n");
    for run in &results.arima {
        md.push_str(&format!("### ARIMA: {}\n\n", run.asset));
        match (&run.result, run.fitted_order) {
            (Ok(f), Some(order)) => {
                md.push_str(&format!("Model {}", f.spec));
                if run.selected_order != Some(order) {
                    if let Some(sel) = run.selected_order {
                        md.push_str(&format!(" (selected {sel} failed to fit, fell back)"));
                    }
                }
                md.push_str(".\n\n");
            }
            (Err(e), _) => md.push_str(&format!("Failed ({}): {e}\n\n", e.kind())),
            (Ok(f), None) => md.push_str(&format!("Model {}.\n\n", f.spec)),
        }
        if let (Ok(_), Some(summary)) = (&run.result, &run.fitted) {
            md.push_str(&arima_parameters(summary));
        }
    }
    md.push_str("### VAR\n\n");
    match &results.var.result {
        Ok(v) => {
            md.push_str(&format!(
                "Lag {} selected by AIC over {} candidate lags.\n\n",
                v.lag,
                results.var.aic_by_lag.len()
            ));
            if let Some(summary) = &results.var.fitted {
                md.push_str(&var_parameters(summary));
            }
        }
        Err(e) => md.push_str(&format!("Failed ({}): {e}\n\n", e.kind())),
    }

    // Forecasts
    let forecasts: Vec<&Forecast> = results
        .arima_forecasts()
        .chain(results.var_forecast().into_iter().flat_map(|v| v.forecasts.iter()))
        .collect();
    md.push_str(&format!(
        "## Forecasts ({}-day horizon, {:.0}% intervals)\n\n",
        config.forecast.horizon,
        config.forecast.confidence * 100.0
    ));
    if forecasts.is_empty() {
        md.push_str("No forecasts were produced.\n\n");
    } else {
        md.push_str("| Model | Asset | Spec | Date | Last Price | Forecast | Lower | Upper | Change |\n");
        md.push_str("| --- | --- | --- | --- | ---: | ---: | ---: | ---: | ---: |\n");
        for f in &forecasts {
            md.push_str(&final_step_row(f));
        }
        md.push_str("\nFull paths are in `forecast_summary.csv`.\n\n");
    }

    // Stages and failures
    md.push_str("## Stages\n\n");
    md.push_str("| Stage | Outcome | Duration (ms) |\n");
    md.push_str("| --- | --- | ---: |\n");
    for s in &results.stages {
        let outcome = match &s.status {
            StageStatus::Succeeded => "succeeded".to_string(),
            StageStatus::Partial { detail } => format!("partial: {detail}"),
            StageStatus::Failed { kind, .. } => format!("failed ({kind})"),
        };
        md.push_str(&format!("| {} | {} | {} |\n", s.stage.as_str(), outcome, s.duration_ms));
    }
    md.push('\n');

    let failures = results.failures();
    let artifact_failures: Vec<&ArtifactRecord> = artifacts
        .iter()
        .filter(|a| matches!(a.status, ArtifactStatus::Failed { .. }))
        .collect();
    if !failures.is_empty() || !artifact_failures.is_empty() {
        md.push_str("## Failures\n\n");
        for f in &failures {
            let asset = f.asset.as_deref().map(|a| format!(" [{a}]")).unwrap_or_default();
            md.push_str(&format!("- {}{asset}: {}: {}\n", f.stage.as_str(), f.kind, f.message));
        }
        for a in artifact_failures {
            if let ArtifactStatus::Failed { error } = &a.status {
                md.push_str(&format!("- artifact {}: {error}\n", a.name));
            }
        }
        md.push('\n');
    }

    // Charts
    let charts: Vec<&str> = artifacts
        .iter()
        .filter(|a| a.name.ends_with(".svg") && a.status == ArtifactStatus::Written)
        .map(|a| a.name.as_str())
        .collect();
    if !charts.is_empty() {
        md.push_str("## Charts\n\n");
        for name in charts {
            md.push_str(&format!("![{name}]({name})\n\n"));
        }
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use causalcast_core::arima::ArimaOrder;

    #[test]
    fn arima_table_names_every_estimate() {
        let s = ArimaSummary {
            order: ArimaOrder::new(2, 1, 1),
            ar: vec![0.5, -0.25],
            ma: vec![0.125],
            constant: Some(0.0004),
            sigma2: 1.5e-4,
            loglik: 1234.5,
            aic: -2459.0,
            nobs: 998,
            iterations: 310,
        };
        let md = arima_parameters(&s);
        assert!(md.contains("| const | 0.000400 |"));
        assert!(md.contains("| ar.L1 | 0.500000 |"));
        assert!(md.contains("| ar.L2 | -0.250000 |"));
        assert!(md.contains("| ma.L1 | 0.125000 |"));
        assert!(md.contains("| sigma2 | 1.500000e-4 |"));
        assert!(md.contains("Log-likelihood 1234.500, AIC -2459.000, 998 observations"));

        let md = arima_parameters(&ArimaSummary {
            constant: None,
            ..s
        });
        assert!(!md.contains("const"));
    }

    #[test]
    fn var_tables_follow_asset_order() {
        let s = VarSummary {
            assets: vec!["Gold".into(), "Euro".into()],
            lag: 1,
            nobs: 500,
            intercept: vec![1e-4, -2e-4],
            coefficients: vec![vec![vec![0.5, 0.1], vec![0.0, 0.3]]],
            sigma_u: vec![vec![1e-4, 2e-5], vec![2e-5, 4e-5]],
        };
        let md = var_parameters(&s);
        assert!(md.contains("| Euro | -2.0000e-4 |"));
        assert!(md.contains("A_1 (lag 1)\n\n| | Gold | Euro |\n|---| ---: | ---: |\n"));
        assert!(md.contains("| Gold | 5.0000e-1 | 1.0000e-1 |"));
        assert!(md.contains("Residual covariance"));
        assert!(md.contains("| Euro | 2.0000e-5 | 4.0000e-5 |"));
        assert!(md.contains("500 observations."));
    }
}
