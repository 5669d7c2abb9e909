//! Run manifest (`manifest.json`).

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use causalcast_core::arima::{ArimaOrder, ArimaSummary};
use causalcast_core::data::DataSource;
use causalcast_core::var::VarSummary;

use super::ArtifactRecord;
use crate::config::{AnalysisConfig, RunId};
use crate::pipeline::{AnalysisResults, FailureRecord, PipelineError, RunStatus, StageRecord, StageStatus};

pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// Where the prices of a run came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataProvenance {
    pub source: DataSource,
    /// Prices were generated, not downloaded.
    pub synthetic: bool,
    pub from_cache: bool,
    pub cache_key: String,
    pub dataset_hash: String,
    pub rows: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArimaModelRecord {
    pub asset: String,
    pub selected_order: Option<ArimaOrder>,
    pub fitted_order: Option<ArimaOrder>,
    /// `(order, reason)` for every order that failed to fit.
    pub failed_orders: Vec<(ArimaOrder, String)>,
    pub fitted: Option<ArimaSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarModelRecord {
    pub lag: Option<usize>,
    pub aic_by_lag: Vec<(usize, f64)>,
    pub fitted: Option<VarSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecords {
    pub arima: Vec<ArimaModelRecord>,
    pub var: VarModelRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: u32,
    pub run_id: RunId,
    pub generated_at: DateTime<Utc>,
    pub status: RunStatus,
    pub config: AnalysisConfig,
    /// Absent when acquisition failed.
    pub data: Option<DataProvenance>,
    pub stages: Vec<StageRecord>,
    pub models: Option<ModelRecords>,
    pub failures: Vec<FailureRecord>,
    pub artifacts: Vec<ArtifactRecord>,
}

impl RunManifest {
    /// Manifest of a completed analysis.
    pub fn from_results(
        results: &AnalysisResults,
        status: RunStatus,
        artifacts: Vec<ArtifactRecord>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let acq = &results.acquisition;
        let data = DataProvenance {
            source: acq.source,
            synthetic: acq.source == DataSource::Synthetic,
            from_cache: acq.from_cache,
            cache_key: acq.cache_key.clone(),
            dataset_hash: acq.dataset_hash.clone(),
            rows: acq.table.len(),
            first_date: acq.table.dates().first().copied(),
            last_date: acq.table.last_date(),
        };
        let models = ModelRecords {
            arima: results
                .arima
                .iter()
                .map(|r| ArimaModelRecord {
                    asset: r.asset.clone(),
                    selected_order: r.selected_order,
                    fitted_order: r.fitted_order,
                    failed_orders: r.failed_orders.clone(),
                    fitted: r.fitted.clone(),
                })
                .collect(),
            var: VarModelRecord {
                lag: results.var_forecast().map(|v| v.lag),
                aic_by_lag: results.var.aic_by_lag.clone(),
                fitted: results.var.fitted.clone(),
            },
        };
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION,
            run_id: results.run_id.clone(),
            generated_at,
            status,
            config: results.config.clone(),
            data: Some(data),
            stages: results.stages.clone(),
            models: Some(models),
            failures: results.failures(),
            artifacts,
        }
    }

    /// Manifest of a run that stopped at acquisition or preprocessing.
    pub fn from_fatal(config: &AnalysisConfig, err: &PipelineError, generated_at: DateTime<Utc>) -> Self {
        let source = err.source_error();
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION,
            run_id: config.run_id(),
            generated_at,
            status: RunStatus::Failed,
            config: config.clone(),
            data: None,
            stages: vec![StageRecord {
                stage: err.stage(),
                status: StageStatus::Failed {
                    kind: source.kind().to_string(),
                    message: source.to_string(),
                },
                duration_ms: 0,
            }],
            models: None,
            failures: vec![FailureRecord {
                stage: err.stage(),
                asset: None,
                kind: source.kind().to_string(),
                message: source.to_string(),
            }],
            artifacts: Vec::new(),
        }
    }
}

pub fn write_manifest(path: &Path, manifest: &RunManifest) -> Result<()> {
    let json = serde_json::to_string_pretty(manifest).context("failed to serialize run manifest")?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write manifest to {}", path.display()))?;
    Ok(())
}

/// Read a manifest back, rejecting newer schema versions.
pub fn load_manifest(path: &Path) -> Result<RunManifest> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let manifest: RunManifest =
        serde_json::from_str(&json).context("failed to deserialize run manifest")?;
    if manifest.schema_version > MANIFEST_SCHEMA_VERSION {
        bail!(
            "unsupported manifest schema version {} (max supported: {})",
            manifest.schema_version,
            MANIFEST_SCHEMA_VERSION
        );
    }
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use causalcast_core::data::DataError;
    use causalcast_core::AnalysisError;

    fn fatal() -> PipelineError {
        PipelineError::Acquisition(AnalysisError::Retrieval {
            symbol: "BTC-USD".into(),
            source: DataError::NetworkUnreachable("timeout".into()),
        })
    }

    #[test]
    fn fatal_manifest_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let manifest = RunManifest::from_fatal(&AnalysisConfig::default(), &fatal(), Utc::now());
        write_manifest(&path, &manifest).unwrap();

        let loaded = load_manifest(&path).unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.status, RunStatus::Failed);
        assert!(loaded.data.is_none());
        assert_eq!(loaded.failures[0].kind, "RetrievalError");
    }

    #[test]
    fn newer_schema_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let mut manifest = RunManifest::from_fatal(&AnalysisConfig::default(), &fatal(), Utc::now());
        manifest.schema_version = MANIFEST_SCHEMA_VERSION + 1;
        write_manifest(&path, &manifest).unwrap();
        assert!(load_manifest(&path).is_err());
    }
}
