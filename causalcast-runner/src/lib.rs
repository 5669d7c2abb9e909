//! causalcast runner: configuration, pipeline orchestration and reporting.
//!
//! This crate builds on `causalcast-core` to provide:
//! - TOML analysis configuration with validation and a deterministic run id
//! - The staged pipeline (acquisition, preprocessing, then causality, ARIMA
//!   and VAR in parallel) with per-stage failure isolation
//! - SVG charts, CSV summaries, a Markdown report and the run manifest

pub mod config;
pub mod pipeline;
pub mod report;

use anyhow::Result;
use tracing::{error, warn};

use causalcast_core::data::{DataProvider, PriceCache};

pub use config::{AnalysisConfig, ConfigError, RunId};
pub use pipeline::{
    run_pipeline, AnalysisResults, ArimaRun, FailureRecord, PipelineError, RunOptions, RunStatus,
    Stage, StageRecord, StageStatus, VarRun,
};
pub use report::{save_artifacts, write_failure_manifest, ArtifactRecord, ArtifactReport, ArtifactStatus};

/// A finished run: analysis results (or the fatal error) plus artifacts.
#[derive(Debug)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub results: Result<AnalysisResults, PipelineError>,
    /// `None` when the pipeline stopped before analysis.
    pub artifacts: Option<ArtifactReport>,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }
}

/// Run the pipeline and write every artifact into `config.output.dir`.
///
/// Fatal pipeline errors still produce a manifest. Errors are returned only
/// when the output directory itself is unusable.
pub fn run_and_report(
    config: &AnalysisConfig,
    provider: &dyn DataProvider,
    cache: Option<&PriceCache>,
    opts: &RunOptions,
) -> Result<RunOutcome> {
    let output_dir = &config.output.dir;
    match run_pipeline(config, provider, cache, opts) {
        Ok(results) => {
            let artifacts = save_artifacts(&results, output_dir)?;
            Ok(RunOutcome {
                status: artifacts.status,
                results: Ok(results),
                artifacts: Some(artifacts),
            })
        }
        Err(err) => {
            error!(stage = err.stage().as_str(), error = %err, "run aborted");
            if let Err(e) = write_failure_manifest(config, &err, output_dir) {
                warn!(error = %format!("{e:#}"), "could not write failure manifest");
            }
            Ok(RunOutcome {
                status: RunStatus::Failed,
                results: Err(err),
                artifacts: None,
            })
        }
    }
}

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn results_are_send_sync() {
        assert_send::<AnalysisResults>();
        assert_sync::<AnalysisResults>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<AnalysisConfig>();
        assert_sync::<AnalysisConfig>();
        assert_send::<RunOptions>();
        assert_sync::<RunOptions>();
    }

    #[test]
    fn exit_codes() {
        assert_eq!(RunStatus::Success.exit_code(), 0);
        assert_eq!(RunStatus::Failed.exit_code(), 1);
        assert_eq!(RunStatus::Partial.exit_code(), 2);
        assert_eq!(RunStatus::Success.worst(RunStatus::Partial), RunStatus::Partial);
        assert_eq!(RunStatus::Failed.worst(RunStatus::Partial), RunStatus::Failed);
    }
}
