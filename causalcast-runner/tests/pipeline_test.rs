//! End-to-end pipeline runs on synthetic data.

use chrono::NaiveDate;
use tempfile::TempDir;

use causalcast_core::data::{
    AssetSpec, DataError, DataProvider, FetchResult, PriceCache, SyntheticProvider,
};
use causalcast_runner::report::{self, load_manifest};
use causalcast_runner::{
    run_and_report, run_pipeline, AnalysisConfig, ArtifactStatus, RunOptions, RunStatus, Stage,
    StageStatus,
};

/// Serves the same synthetic path for every symbol.
struct TwinProvider(SyntheticProvider);

impl DataProvider for TwinProvider {
    fn name(&self) -> &str {
        "twin"
    }

    fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<FetchResult, DataError> {
        let mut result = self.0.fetch("TWIN", start, end)?;
        result.symbol = symbol.to_string();
        Ok(result)
    }
}

fn small_config(output: &TempDir) -> AnalysisConfig {
    let mut config = AnalysisConfig::default();
    config.data.start = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
    config.data.end = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
    config.arima.max_p = 2;
    config.arima.max_q = 2;
    config.var.max_lags = 5;
    config.output.dir = output.path().join("results");
    config
}

fn csv_rows(path: &std::path::Path) -> Vec<csv::StringRecord> {
    let mut rdr = csv::Reader::from_path(path).unwrap();
    rdr.records().map(|r| r.unwrap()).collect()
}

#[test]
fn synthetic_run_produces_every_artifact() {
    let out = TempDir::new().unwrap();
    let mut config = small_config(&out);
    config.forecast.targets = vec!["Bitcoin".into(), "Gold".into()];

    let outcome = run_and_report(&config, &SyntheticProvider::default(), None, &RunOptions::default()).unwrap();
    assert_eq!(outcome.status, RunStatus::Success);
    assert_eq!(outcome.exit_code(), 0);

    let artifacts = outcome.artifacts.as_ref().unwrap();
    assert_eq!(artifacts.records.len(), 12);
    for record in &artifacts.records {
        assert_eq!(record.status, ArtifactStatus::Written, "{}", record.name);
        assert!(artifacts.path(&record.name).exists(), "{}", record.name);
    }

    let results = outcome.results.as_ref().unwrap();
    assert_eq!(results.arima.len(), 2);
    assert_eq!(results.var_forecast().unwrap().forecasts.len(), 5);
    assert!(results.stages.iter().all(|s| s.status == StageStatus::Succeeded));

    // 2 ARIMA targets and 5 VAR assets, 30 steps each
    let rows = csv_rows(&artifacts.path(report::FORECAST_SUMMARY_CSV));
    assert_eq!(rows.len(), 7 * 30);
    assert_eq!(rows.iter().filter(|r| &r[0] == "ARIMA").count(), 60);
    for r in &rows {
        let point: f64 = r[4].parse().unwrap();
        let lower: f64 = r[5].parse().unwrap();
        let upper: f64 = r[6].parse().unwrap();
        assert!(lower <= point && point <= upper);
    }

    assert_eq!(csv_rows(&artifacts.path(report::GRANGER_SUMMARY_CSV)).len(), 20);
    assert_eq!(csv_rows(&artifacts.path(report::STATIONARITY_CSV)).len(), 10);

    let svg = std::fs::read_to_string(artifacts.path(report::ARIMA_FORECAST_SVG)).unwrap();
    assert!(svg.starts_with("<svg") || svg.contains("<svg"));

    let md = std::fs::read_to_string(artifacts.path(report::REPORT_MD)).unwrap();
    assert!(md.contains("**SYNTHETIC**"));
    assert!(md.contains(&results.run_id));
    assert!(md.contains("![01_normalized_prices.svg]"));
    assert!(md.contains("### ARIMA: Bitcoin"));
    assert!(md.contains("| sigma2 |"));
    assert!(md.contains("A_1 (lag 1)"));
    assert!(md.contains("Residual covariance"));

    let manifest = load_manifest(&artifacts.path(report::MANIFEST_JSON)).unwrap();
    assert_eq!(manifest.run_id, config.run_id());
    assert_eq!(manifest.status, RunStatus::Success);
    let data = manifest.data.unwrap();
    assert!(data.synthetic);
    assert_eq!(data.dataset_hash, results.acquisition.dataset_hash);
    assert_eq!(manifest.artifacts.len(), 11);
    assert!(manifest.failures.is_empty());

    let models = manifest.models.unwrap();
    for (record, run) in models.arima.iter().zip(&results.arima) {
        let fitted = record.fitted.as_ref().unwrap();
        assert_eq!(Some(fitted.order), record.fitted_order);
        assert_eq!(fitted.ar.len(), fitted.order.p);
        assert_eq!(fitted.ma.len(), fitted.order.q);
        assert!(fitted.sigma2 > 0.0 && fitted.aic.is_finite());
        assert_eq!(run.fitted.as_ref().map(|f| f.order), Some(fitted.order));
    }
    let var = models.var.fitted.unwrap();
    assert_eq!(Some(var.lag), models.var.lag);
    assert_eq!(var.coefficients.len(), var.lag);
    assert_eq!(var.intercept.len(), 5);
    assert_eq!(var.sigma_u.len(), 5);
}

#[test]
fn identical_series_fail_var_but_keep_arima() {
    let out = TempDir::new().unwrap();
    let mut config = small_config(&out);
    config.data.assets = vec![AssetSpec::new("Alpha", "AAA"), AssetSpec::new("Beta", "BBB")];
    config.forecast.targets = vec!["Alpha".into()];

    let provider = TwinProvider(SyntheticProvider::default());
    let outcome = run_and_report(&config, &provider, None, &RunOptions::default()).unwrap();
    assert_eq!(outcome.status, RunStatus::Partial);
    assert_ne!(outcome.exit_code(), 0);
    assert_eq!(outcome.exit_code(), 2);

    let results = outcome.results.as_ref().unwrap();
    let var_err = results.var.result.as_ref().unwrap_err();
    assert_eq!(var_err.kind(), "SingularMatrixError");
    assert!(results.arima[0].result.is_ok());

    let var_stage = results.stages.iter().find(|s| s.stage == Stage::Var).unwrap();
    assert!(matches!(&var_stage.status, StageStatus::Failed { kind, .. } if kind == "SingularMatrixError"));

    // The twin pair is reported as untestable, not as a stage failure
    let matrix = results.causality.as_ref().unwrap();
    assert_eq!(matrix.untestable().count(), 2);

    let artifacts = outcome.artifacts.as_ref().unwrap();
    let rows = csv_rows(&artifacts.path(report::FORECAST_SUMMARY_CSV));
    assert_eq!(rows.len(), 30);
    assert!(rows.iter().all(|r| &r[0] == "ARIMA" && &r[1] == "Alpha"));

    assert_eq!(artifacts.get(report::ARIMA_FORECAST_SVG), Some(&ArtifactStatus::Written));
    assert!(matches!(
        artifacts.get(report::VAR_FORECAST_SVG),
        Some(ArtifactStatus::Skipped { .. })
    ));
    assert_eq!(artifacts.get(report::COMBINED_FORECAST_SVG), Some(&ArtifactStatus::Written));

    let manifest = load_manifest(&artifacts.path(report::MANIFEST_JSON)).unwrap();
    assert_eq!(manifest.status, RunStatus::Partial);
    assert_eq!(manifest.failures.len(), 1);
    assert_eq!(manifest.failures[0].stage, Stage::Var);
    let models = manifest.models.unwrap();
    assert!(models.var.fitted.is_none());
    assert!(models.arima[0].fitted.is_some());
}

#[test]
fn offline_cache_miss_is_fatal_but_leaves_a_manifest() {
    let out = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    let config = small_config(&out);
    let cache = PriceCache::new(cache_dir.path());
    let opts = RunOptions {
        offline: true,
        refresh: false,
    };

    let outcome = run_and_report(&config, &SyntheticProvider::default(), Some(&cache), &opts).unwrap();
    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(outcome.exit_code(), 1);
    assert!(outcome.artifacts.is_none());
    let err = outcome.results.as_ref().unwrap_err();
    assert_eq!(err.stage(), Stage::Acquisition);
    assert_eq!(err.source_error().kind(), "RetrievalError");

    let dir = &config.output.dir;
    assert!(!dir.join(report::REPORT_MD).exists());
    let manifest = load_manifest(&dir.join(report::MANIFEST_JSON)).unwrap();
    assert_eq!(manifest.status, RunStatus::Failed);
    assert_eq!(manifest.failures[0].kind, "RetrievalError");
}

#[test]
fn cached_rerun_reproduces_the_analysis() {
    let out = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    let config = small_config(&out);
    let cache = PriceCache::new(cache_dir.path());
    let provider = SyntheticProvider::default();

    let first = run_pipeline(&config, &provider, Some(&cache), &RunOptions::default()).unwrap();
    assert!(!first.acquisition.from_cache);

    let opts = RunOptions {
        offline: true,
        refresh: false,
    };
    let second = run_pipeline(&config, &provider, Some(&cache), &opts).unwrap();
    assert!(second.acquisition.from_cache);
    assert_eq!(second.run_id, first.run_id);
    assert_eq!(second.table().dates(), first.table().dates());
    assert_eq!(second.acquisition.source, first.acquisition.source);
    assert_eq!(second.status(), RunStatus::Success);
}

#[test]
fn unwritable_artifact_makes_the_run_partial() {
    let out = TempDir::new().unwrap();
    let config = small_config(&out);
    // A directory squatting on the report path makes that one write fail
    std::fs::create_dir_all(config.output.dir.join(report::REPORT_MD)).unwrap();

    let outcome = run_and_report(&config, &SyntheticProvider::default(), None, &RunOptions::default()).unwrap();
    assert_eq!(outcome.status, RunStatus::Partial);
    assert_eq!(outcome.exit_code(), 2);

    let artifacts = outcome.artifacts.as_ref().unwrap();
    let failed: Vec<&str> = artifacts.failed().map(|r| r.name.as_str()).collect();
    assert_eq!(failed, vec![report::REPORT_MD]);
    assert_eq!(artifacts.get(report::FORECAST_SUMMARY_CSV), Some(&ArtifactStatus::Written));

    let manifest = load_manifest(&artifacts.path(report::MANIFEST_JSON)).unwrap();
    assert_eq!(manifest.status, RunStatus::Partial);
    assert!(manifest
        .artifacts
        .iter()
        .any(|a| a.name == report::REPORT_MD && matches!(a.status, ArtifactStatus::Failed { .. })));
    assert!(manifest.failures.is_empty());
}
