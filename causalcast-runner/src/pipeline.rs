//! Analysis pipeline: acquisition → preprocessing → {causality, ARIMA, VAR}.
//!
//! Acquisition and preprocessing failures are fatal and returned as
//! [`PipelineError`]. The three analysis stages run concurrently on the rayon
//! pool over immutable inputs; each one's failure is captured in
//! [`AnalysisResults`] and never affects the others.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use causalcast_core::arima::{ArimaForecaster, ArimaOrder, ArimaSummary};
use causalcast_core::causality::{granger_matrix, CausalityMatrix};
use causalcast_core::data::{acquire_prices, AcquireRequest, Acquisition, DataProvider, PriceCache};
use causalcast_core::forecast::{Forecast, ForecastSummaryRow};
use causalcast_core::preprocess::{assess_integration, StationarityReport};
use causalcast_core::series::{PriceTable, ReturnSeries};
use causalcast_core::var::{VarForecast, VarForecaster, VarSummary};
use causalcast_core::AnalysisError;

use crate::config::{AnalysisConfig, RunId};

/// Fatal failures: nothing downstream can run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("acquisition failed: {0}")]
    Acquisition(#[source] AnalysisError),
    #[error("preprocessing failed: {0}")]
    Preprocessing(#[source] AnalysisError),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Acquisition(_) => Stage::Acquisition,
            Self::Preprocessing(_) => Stage::Preprocessing,
        }
    }

    pub fn source_error(&self) -> &AnalysisError {
        match self {
            Self::Acquisition(e) | Self::Preprocessing(e) => e,
        }
    }
}

/// Run-time switches that do not change results.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Never contact the provider; a cache miss is fatal.
    pub offline: bool,
    /// Drop the cached prices for this configuration and fetch again.
    pub refresh: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Acquisition,
    Preprocessing,
    Causality,
    Arima,
    Var,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Acquisition => "acquisition",
            Self::Preprocessing => "preprocessing",
            Self::Causality => "causality",
            Self::Arima => "arima",
            Self::Var => "var",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    /// Some targets of the stage failed.
    Partial { detail: String },
    Failed { kind: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    #[serde(flatten)]
    pub status: StageStatus,
    pub duration_ms: u64,
}

/// Overall outcome of a run, mapped to the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    /// Some stage, target or artifact failed; everything else was produced.
    Partial,
    Failed,
}

impl RunStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failed => 1,
            Self::Partial => 2,
        }
    }

    /// The more severe of the two.
    pub fn worst(self, other: Self) -> Self {
        self.max(other)
    }
}

/// One failure anywhere in the analysis, for manifests and reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub stage: Stage,
    pub asset: Option<String>,
    pub kind: String,
    pub message: String,
}

impl FailureRecord {
    fn new(stage: Stage, asset: Option<&str>, err: &AnalysisError) -> Self {
        Self {
            stage,
            asset: asset.map(str::to_string),
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// ARIMA outcome for one forecast target.
#[derive(Debug)]
pub struct ArimaRun {
    pub asset: String,
    /// Order chosen by AIC, if selection succeeded.
    pub selected_order: Option<ArimaOrder>,
    /// Order actually used for the forecast (differs after a fallback).
    pub fitted_order: Option<ArimaOrder>,
    /// Orders that failed to fit, with the reason, in the order tried.
    pub failed_orders: Vec<(ArimaOrder, String)>,
    /// Estimates of the model behind the forecast.
    pub fitted: Option<ArimaSummary>,
    pub result: Result<Forecast, AnalysisError>,
}

/// VAR outcome for the whole return system.
#[derive(Debug)]
pub struct VarRun {
    /// `(lag, AIC)` for every lag that could be evaluated.
    pub aic_by_lag: Vec<(usize, f64)>,
    /// Estimates, present once the system was fitted.
    pub fitted: Option<VarSummary>,
    pub result: Result<VarForecast, AnalysisError>,
}

/// Everything a run produced.
#[derive(Debug)]
pub struct AnalysisResults {
    pub run_id: RunId,
    pub config: AnalysisConfig,
    pub acquisition: Acquisition,
    pub returns: Vec<ReturnSeries>,
    pub stationarity: StationarityReport,
    pub causality: Result<CausalityMatrix, AnalysisError>,
    pub arima: Vec<ArimaRun>,
    pub var: VarRun,
    pub stages: Vec<StageRecord>,
}

impl AnalysisResults {
    pub fn table(&self) -> &PriceTable {
        &self.acquisition.table
    }

    pub fn arima_forecasts(&self) -> impl Iterator<Item = &Forecast> {
        self.arima.iter().filter_map(|r| r.result.as_ref().ok())
    }

    pub fn var_forecast(&self) -> Option<&VarForecast> {
        self.var.result.as_ref().ok()
    }

    /// Tidy forecast rows: ARIMA targets first, then every VAR asset.
    pub fn summary_rows(&self) -> Vec<ForecastSummaryRow> {
        let var = self.var_forecast().into_iter().flat_map(|v| v.forecasts.iter());
        self.arima_forecasts()
            .chain(var)
            .flat_map(Forecast::summary_rows)
            .collect()
    }

    /// Every stage or target failure.
    pub fn failures(&self) -> Vec<FailureRecord> {
        let mut out = Vec::new();
        if let Err(e) = &self.causality {
            out.push(FailureRecord::new(Stage::Causality, None, e));
        }
        for run in &self.arima {
            if let Err(e) = &run.result {
                out.push(FailureRecord::new(Stage::Arima, Some(run.asset.as_str()), e));
            }
        }
        if let Err(e) = &self.var.result {
            out.push(FailureRecord::new(Stage::Var, None, e));
        }
        out
    }

    /// `Failed` when no forecaster produced anything, `Partial` when any
    /// stage or target failed.
    pub fn status(&self) -> RunStatus {
        if self.all_forecasters_failed() {
            RunStatus::Failed
        } else if self.failures().is_empty() {
            RunStatus::Success
        } else {
            RunStatus::Partial
        }
    }

    /// No forecaster produced a single forecast.
    pub fn all_forecasters_failed(&self) -> bool {
        self.arima_forecasts().next().is_none() && self.var.result.is_err()
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn failed(err: &AnalysisError) -> StageStatus {
    StageStatus::Failed {
        kind: err.kind().to_string(),
        message: err.to_string(),
    }
}

/// Run the full analysis for `config`.
pub fn run_pipeline(
    config: &AnalysisConfig,
    provider: &dyn DataProvider,
    cache: Option<&PriceCache>,
    opts: &RunOptions,
) -> Result<AnalysisResults, PipelineError> {
    let run_id = config.run_id();
    info!(run_id = %run_id, provider = provider.name(), "starting analysis run");
    let mut stages = Vec::with_capacity(5);

    // ── Acquisition ──
    let t = Instant::now();
    let request = AcquireRequest {
        assets: config.data.assets.clone(),
        start: config.data.start,
        end: config.data.end,
        alignment: config.data.alignment,
        offline: opts.offline,
        refresh: opts.refresh,
    };
    let acquisition = acquire_prices(provider, cache, &request).map_err(|e| {
        error!(error = %e, "acquisition failed");
        PipelineError::Acquisition(e)
    })?;
    stages.push(StageRecord {
        stage: Stage::Acquisition,
        status: StageStatus::Succeeded,
        duration_ms: elapsed_ms(t),
    });
    info!(
        rows = acquisition.table.len(),
        from_cache = acquisition.from_cache,
        source = ?acquisition.source,
        "acquisition complete"
    );

    // ── Preprocessing ──
    let t = Instant::now();
    let table = &acquisition.table;
    let (returns, stationarity) = table
        .log_returns()
        .and_then(|returns| {
            let report = assess_integration(table, &returns, config.stationarity.alpha)?;
            Ok((returns, report))
        })
        .map_err(|e| {
            error!(error = %e, "preprocessing failed");
            PipelineError::Preprocessing(e)
        })?;
    stages.push(StageRecord {
        stage: Stage::Preprocessing,
        status: StageStatus::Succeeded,
        duration_ms: elapsed_ms(t),
    });

    // ── Analysis stages, concurrently ──
    let ((causality, causality_ms), ((arima, arima_ms), (var, var_ms))) = rayon::join(
        || timed(|| run_causality(config, &returns, &stationarity)),
        || {
            rayon::join(
                || timed(|| run_arima_targets(config, table)),
                || timed(|| run_var(config, table, &returns, &stationarity)),
            )
        },
    );

    stages.push(StageRecord {
        stage: Stage::Causality,
        status: match &causality {
            Ok(_) => StageStatus::Succeeded,
            Err(e) => failed(e),
        },
        duration_ms: causality_ms,
    });
    stages.push(StageRecord {
        stage: Stage::Arima,
        status: arima_status(&arima),
        duration_ms: arima_ms,
    });
    stages.push(StageRecord {
        stage: Stage::Var,
        status: match &var.result {
            Ok(_) => StageStatus::Succeeded,
            Err(e) => failed(e),
        },
        duration_ms: var_ms,
    });

    Ok(AnalysisResults {
        run_id,
        config: config.clone(),
        acquisition,
        returns,
        stationarity,
        causality,
        arima,
        var,
        stages,
    })
}

fn timed<T>(f: impl FnOnce() -> T) -> (T, u64) {
    let t = Instant::now();
    let out = f();
    (out, elapsed_ms(t))
}

fn run_causality(
    config: &AnalysisConfig,
    returns: &[ReturnSeries],
    stationarity: &StationarityReport,
) -> Result<CausalityMatrix, AnalysisError> {
    let result = granger_matrix(
        returns,
        stationarity,
        config.causality.max_lag,
        config.causality.alpha,
    );
    match &result {
        Ok(m) => {
            let significant = m.summary().iter().filter(|r| r.significant).count();
            info!(pairs = m.entries.len(), significant, "causality stage complete");
            for e in m.untestable() {
                warn!(cause = %e.cause, effect = %e.effect, "pair could not be tested");
            }
        }
        Err(e) => error!(error = %e, "causality stage failed"),
    }
    result
}

fn run_arima_targets(config: &AnalysisConfig, table: &PriceTable) -> Vec<ArimaRun> {
    use rayon::prelude::*;
    config
        .forecast
        .targets
        .par_iter()
        .map(|asset| run_arima(config, table, asset))
        .collect()
}

/// Select, fit and forecast one target, stepping down through simpler orders
/// when the selected one fails to fit.
fn run_arima(config: &AnalysisConfig, table: &PriceTable, asset: &str) -> ArimaRun {
    let mut run = ArimaRun {
        asset: asset.to_string(),
        selected_order: None,
        fitted_order: None,
        failed_orders: Vec::new(),
        fitted: None,
        result: Err(AnalysisError::Validation {
            stage: "arima",
            reason: format!("'{asset}' was not attempted"),
        }),
    };

    let selected = table
        .series(asset)
        .ok_or_else(|| AnalysisError::Validation {
            stage: "arima",
            reason: format!("no prices for '{asset}'"),
        })
        .and_then(|series| ArimaForecaster::new(&series, config.arima_config()))
        .and_then(ArimaForecaster::select_order);
    let selected = match selected {
        Ok(s) => s,
        Err(e) => {
            error!(asset, error = %e, "ARIMA order selection failed");
            run.result = Err(e);
            return run;
        }
    };
    run.selected_order = Some(selected.order());

    let chain = std::iter::once(selected.order()).chain(selected.order().fallbacks());
    for order in chain {
        let attempt = selected
            .with_order(order)
            .fit()
            .and_then(|m| {
                let forecast = m.forecast(config.forecast.horizon, config.forecast.confidence)?;
                Ok((m.summary(), forecast))
            });
        match attempt {
            Ok((summary, forecast)) => {
                if order != selected.order() {
                    warn!(asset, selected = %selected.order(), fitted = %order, "ARIMA fell back to a simpler order");
                }
                info!(asset, %order, "ARIMA forecast complete");
                run.fitted_order = Some(order);
                run.fitted = Some(summary);
                run.result = Ok(forecast);
                return run;
            }
            Err(e @ (AnalysisError::Convergence { .. } | AnalysisError::SingularMatrix { .. })) => {
                warn!(asset, %order, error = %e, "ARIMA fit failed; trying a simpler order");
                run.failed_orders.push((order, e.to_string()));
                run.result = Err(e);
            }
            Err(e) => {
                error!(asset, %order, error = %e, "ARIMA forecast failed");
                run.result = Err(e);
                return run;
            }
        }
    }
    error!(asset, "no ARIMA order converged; forecast omitted");
    run
}

fn arima_status(runs: &[ArimaRun]) -> StageStatus {
    let failures: Vec<&ArimaRun> = runs.iter().filter(|r| r.result.is_err()).collect();
    match failures.as_slice() {
        [] => StageStatus::Succeeded,
        f if f.len() == runs.len() => {
            let kinds: Vec<&str> = f
                .iter()
                .filter_map(|r| r.result.as_ref().err().map(AnalysisError::kind))
                .collect();
            StageStatus::Failed {
                kind: kinds.first().copied().unwrap_or("ConvergenceError").to_string(),
                message: format!("every target failed ({})", kinds.join(", ")),
            }
        }
        f => StageStatus::Partial {
            detail: format!(
                "failed for {}",
                f.iter().map(|r| r.asset.as_str()).collect::<Vec<_>>().join(", ")
            ),
        },
    }
}

fn run_var(
    config: &AnalysisConfig,
    table: &PriceTable,
    returns: &[ReturnSeries],
    stationarity: &StationarityReport,
) -> VarRun {
    let mut aic_by_lag = Vec::new();
    let mut fitted = None;
    let result = VarForecaster::new(returns, table, stationarity, config.var_config())
        .and_then(VarForecaster::select_lag)
        .and_then(|selected| {
            aic_by_lag = selected.aic_by_lag().to_vec();
            selected.fit()
        })
        .and_then(|model| {
            fitted = Some(model.summary());
            model.forecast(config.forecast.horizon, config.forecast.confidence)
        });
    match &result {
        Ok(f) => info!(lag = f.lag, assets = f.forecasts.len(), "VAR forecast complete"),
        Err(e) => error!(error = %e, "VAR stage failed"),
    }
    VarRun {
        aic_by_lag,
        fitted,
        result,
    }
}
