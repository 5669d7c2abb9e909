//! Report artifacts: charts, CSV tables, Markdown report and run manifest.
//!
//! Every artifact is written independently. A failure is logged, recorded
//! in the manifest and reported, but never stops the remaining artifacts.
//! The manifest is written last so it can list every other outcome.

pub mod charts;
pub mod manifest;
pub mod markdown;
pub mod tables;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::AnalysisConfig;
use crate::pipeline::{AnalysisResults, PipelineError, RunStatus};
use charts::{ForecastLayer, ForecastPanel};

pub use manifest::{load_manifest, RunManifest, MANIFEST_SCHEMA_VERSION};
pub use markdown::generate_report;
pub use tables::{forecast_summary_csv, granger_summary_csv, stationarity_csv};

pub const NORMALIZED_PRICES_SVG: &str = "01_normalized_prices.svg";
pub const CORRELATION_HEATMAP_SVG: &str = "02_correlation_heatmap.svg";
pub const GRANGER_HEATMAP_SVG: &str = "03_granger_heatmap.svg";
pub const ARIMA_FORECAST_SVG: &str = "04_arima_forecast.svg";
pub const VAR_FORECAST_SVG: &str = "05_var_forecast.svg";
pub const COMBINED_FORECAST_SVG: &str = "06_combined_forecast.svg";
pub const RETURN_DISTRIBUTION_SVG: &str = "07_return_distribution.svg";
pub const FORECAST_SUMMARY_CSV: &str = "forecast_summary.csv";
pub const GRANGER_SUMMARY_CSV: &str = "granger_summary.csv";
pub const STATIONARITY_CSV: &str = "stationarity.csv";
pub const REPORT_MD: &str = "report.md";
pub const MANIFEST_JSON: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ArtifactStatus {
    Written,
    /// Nothing to render, e.g. the model behind the chart failed.
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub name: String,
    #[serde(flatten)]
    pub status: ArtifactStatus,
}

/// Outcome of writing every artifact of a run.
#[derive(Debug, Clone)]
pub struct ArtifactReport {
    pub dir: PathBuf,
    pub records: Vec<ArtifactRecord>,
    /// Overall status, including artifact failures.
    pub status: RunStatus,
}

impl ArtifactReport {
    pub fn get(&self, name: &str) -> Option<&ArtifactStatus> {
        self.records.iter().find(|r| r.name == name).map(|r| &r.status)
    }

    pub fn failed(&self) -> impl Iterator<Item = &ArtifactRecord> {
        self.records
            .iter()
            .filter(|r| matches!(r.status, ArtifactStatus::Failed { .. }))
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

struct ArtifactWriter<'a> {
    dir: &'a Path,
    records: Vec<ArtifactRecord>,
}

impl<'a> ArtifactWriter<'a> {
    fn attempt(&mut self, name: &str, write: impl FnOnce(&Path) -> Result<()>) {
        let path = self.dir.join(name);
        let status = match write(&path) {
            Ok(()) => ArtifactStatus::Written,
            Err(e) => {
                warn!(artifact = name, error = %format!("{e:#}"), "failed to write artifact");
                ArtifactStatus::Failed {
                    error: format!("{e:#}"),
                }
            }
        };
        self.records.push(ArtifactRecord {
            name: name.to_string(),
            status,
        });
    }

    fn text(&mut self, name: &str, render: impl FnOnce() -> Result<String>) {
        self.attempt(name, |path| {
            let content = render()?;
            std::fs::write(path, content)
                .with_context(|| format!("failed to write {}", path.display()))
        });
    }

    fn skip(&mut self, name: &str, reason: impl Into<String>) {
        let reason = reason.into();
        info!(artifact = name, reason = %reason, "artifact skipped");
        self.records.push(ArtifactRecord {
            name: name.to_string(),
            status: ArtifactStatus::Skipped { reason },
        });
    }

    fn any_failed(&self) -> bool {
        self.records
            .iter()
            .any(|r| matches!(r.status, ArtifactStatus::Failed { .. }))
    }
}

/// ARIMA, VAR and combined panels, in that order.
fn forecast_panels(results: &AnalysisResults) -> [Vec<ForecastPanel<'_>>; 3] {
    let table = results.table();
    let days = results.config.output.history_days;
    let arima: Vec<ForecastPanel<'_>> = results
        .arima_forecasts()
        .map(|f| ForecastPanel {
            asset: f.asset.as_str(),
            history: charts::recent_history(table, &f.asset, days),
            layers: vec![ForecastLayer::arima(f)],
        })
        .collect();

    let var: Vec<ForecastPanel<'_>> = results
        .var_forecast()
        .into_iter()
        .flat_map(|v| v.forecasts.iter())
        .map(|f| ForecastPanel {
            asset: f.asset.as_str(),
            history: charts::recent_history(table, &f.asset, days),
            layers: vec![ForecastLayer::var(f)],
        })
        .collect();

    let combined: Vec<ForecastPanel<'_>> = results
        .config
        .forecast
        .targets
        .iter()
        .filter_map(|asset| {
            let mut layers: Vec<ForecastLayer<'_>> = results
                .arima_forecasts()
                .filter(|f| &f.asset == asset)
                .map(ForecastLayer::arima)
                .collect();
            if let Some(f) = results.var_forecast().and_then(|v| v.get(asset)) {
                layers.push(ForecastLayer::var(f));
            }
            (!layers.is_empty()).then(|| ForecastPanel {
                asset: asset.as_str(),
                history: charts::recent_history(table, asset, days),
                layers,
            })
        })
        .collect();

    [arima, var, combined]
}

/// Write every artifact of `results` into `output_dir`.
///
/// Fails only if the directory itself cannot be created; individual artifact
/// failures are recorded in the returned report and in the manifest.
pub fn save_artifacts(results: &AnalysisResults, output_dir: &Path) -> Result<ArtifactReport> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output dir: {}", output_dir.display()))?;
    let mut w = ArtifactWriter {
        dir: output_dir,
        records: Vec::new(),
    };

    // Charts
    w.attempt(NORMALIZED_PRICES_SVG, |p| charts::normalized_prices(results.table(), p));
    w.attempt(CORRELATION_HEATMAP_SVG, |p| charts::correlation_heatmap(&results.returns, p));
    match &results.causality {
        Ok(matrix) => w.attempt(GRANGER_HEATMAP_SVG, |p| charts::granger_heatmap(matrix, p)),
        Err(e) => w.skip(GRANGER_HEATMAP_SVG, format!("causality stage failed: {}", e.kind())),
    }

    let [arima, var, combined] = forecast_panels(results);
    let confidence = results.config.forecast.confidence * 100.0;
    for (name, title, panels, missing) in [
        (ARIMA_FORECAST_SVG, format!("ARIMA price forecasts ({confidence:.0}% intervals)"), arima, "no ARIMA forecast"),
        (VAR_FORECAST_SVG, format!("VAR price forecasts ({confidence:.0}% intervals)"), var, "no VAR forecast"),
        (COMBINED_FORECAST_SVG, "ARIMA vs VAR".to_string(), combined, "no forecast for any target"),
    ] {
        if panels.is_empty() {
            w.skip(name, missing);
        } else {
            w.attempt(name, |p| charts::forecast_chart(&title, &panels, p));
        }
    }

    let primary = results.config.primary_asset();
    match results.returns.iter().find(|r| r.asset() == primary) {
        Some(r) => w.attempt(RETURN_DISTRIBUTION_SVG, |p| charts::return_distribution(r, p)),
        None => w.skip(RETURN_DISTRIBUTION_SVG, format!("no returns for '{primary}'")),
    }

    // Tables
    w.text(FORECAST_SUMMARY_CSV, || forecast_summary_csv(&results.summary_rows()));
    match &results.causality {
        Ok(matrix) => w.text(GRANGER_SUMMARY_CSV, || granger_summary_csv(matrix)),
        Err(e) => w.skip(GRANGER_SUMMARY_CSV, format!("causality stage failed: {}", e.kind())),
    }
    w.text(STATIONARITY_CSV, || stationarity_csv(&results.stationarity));

    let generated_at = Utc::now();
    let status_so_far = |w: &ArtifactWriter<'_>| {
        if w.any_failed() {
            results.status().worst(RunStatus::Partial)
        } else {
            results.status()
        }
    };

    // Report, then manifest
    let status = status_so_far(&w);
    let so_far = w.records.clone();
    w.text(REPORT_MD, || Ok(generate_report(results, status, &so_far, generated_at)));

    let status = status_so_far(&w);
    let run_manifest = RunManifest::from_results(results, status, w.records.clone(), generated_at);
    w.attempt(MANIFEST_JSON, |p| manifest::write_manifest(p, &run_manifest));

    let status = status_so_far(&w);
    let written = w
        .records
        .iter()
        .filter(|r| r.status == ArtifactStatus::Written)
        .count();
    info!(dir = %output_dir.display(), written, total = w.records.len(), ?status, "artifacts saved");
    Ok(ArtifactReport {
        dir: output_dir.to_path_buf(),
        records: w.records,
        status,
    })
}

/// Record a run that stopped before any analysis: only `manifest.json` is
/// written.
pub fn write_failure_manifest(config: &AnalysisConfig, err: &PipelineError, output_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output dir: {}", output_dir.display()))?;
    let path = output_dir.join(MANIFEST_JSON);
    let manifest = RunManifest::from_fatal(config, err, Utc::now());
    manifest::write_manifest(&path, &manifest)?;
    Ok(path)
}
