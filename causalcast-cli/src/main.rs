//! causalcast: one batch run of the causality and forecasting analysis.
//!
//! Loads the configuration (or the built-in defaults), acquires prices,
//! runs every analysis stage and writes charts, tables, the report and the
//! manifest. The exit code is 0 on full success, 2 when part of the run
//! failed and 1 when nothing useful could be produced.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use causalcast_core::data::{DataProvider, PriceCache, SyntheticProvider, YahooProvider};
use causalcast_runner::{run_and_report, AnalysisConfig, RunOptions, RunOutcome, RunStatus};

#[derive(Parser)]
#[command(
    name = "causalcast",
    about = "Granger causality, ARIMA and VAR forecasts for a small asset universe",
    after_help = "Note: Yahoo's CL=F (crude oil) closed negative on 2020-04-20. A live run \
                  over the default 2018-2024 window therefore fails price validation; set \
                  [data] start after that date or replace CL=F in --config."
)]
struct Cli {
    /// TOML configuration file. Built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Never contact the data provider; requires cached prices.
    #[arg(long, default_value_t = false)]
    offline: bool,

    /// Use deterministic synthetic prices instead of downloading.
    #[arg(long, default_value_t = false)]
    synthetic: bool,

    /// Ignore cached prices and download again.
    #[arg(long, default_value_t = false)]
    refresh: bool,

    /// Overrides `data.cache_dir`.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Overrides `output.dir`.
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let code = match run(Cli::parse()) {
        Ok(outcome) => {
            print_summary(&outcome);
            outcome.exit_code()
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            RunStatus::Failed.exit_code()
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<RunOutcome> {
    let mut config = match &cli.config {
        Some(path) => AnalysisConfig::load(path)
            .with_context(|| format!("invalid configuration {}", path.display()))?,
        None => AnalysisConfig::default(),
    };
    if let Some(dir) = cli.cache_dir {
        config.data.cache_dir = dir;
    }
    if let Some(dir) = cli.output_dir {
        config.output.dir = dir;
    }

    info!(
        run_id = %config.run_id(),
        output = %config.output.dir.display(),
        synthetic = cli.synthetic,
        "configuration loaded"
    );

    let provider: Box<dyn DataProvider> = if cli.synthetic {
        Box::new(SyntheticProvider::default())
    } else {
        Box::new(YahooProvider::new().context("failed to build HTTP client")?)
    };
    let cache = PriceCache::new(&config.data.cache_dir);
    let opts = RunOptions {
        offline: cli.offline,
        refresh: cli.refresh,
    };
    run_and_report(&config, provider.as_ref(), Some(&cache), &opts)
}

fn print_summary(outcome: &RunOutcome) {
    println!();
    println!("=== Analysis Result ===");
    let results = match &outcome.results {
        Ok(results) => results,
        Err(err) => {
            println!("Status:   FAILED at {}", err.stage().as_str());
            println!("Error:    {} ({})", err.source_error(), err.source_error().kind());
            return;
        }
    };

    let table = results.table();
    println!("Run ID:   {}", results.run_id);
    if let (Some(first), Some(last)) = (table.dates().first(), table.last_date()) {
        println!("Data:     {first} to {last} ({} rows, {:?})", table.len(), results.acquisition.source);
    }
    println!("Status:   {:?}", outcome.status);

    if let Ok(matrix) = &results.causality {
        let significant: Vec<String> = matrix
            .summary()
            .into_iter()
            .filter(|r| r.significant)
            .map(|r| format!("{} -> {}", r.cause, r.effect))
            .collect();
        println!();
        println!("--- Granger causality (p < {}) ---", matrix.alpha);
        if significant.is_empty() {
            println!("none");
        }
        for pair in significant {
            println!("{pair}");
        }
    }

    println!();
    println!("--- Forecasts (final step) ---");
    println!(
        "{:<6} {:<10} {:<16} {:<11} {:>12} {:>12} {:>12}",
        "Model", "Asset", "Spec", "Date", "Point", "Lower", "Upper"
    );
    println!("{}", "-".repeat(85));
    let var = results.var_forecast().into_iter().flat_map(|v| v.forecasts.iter());
    for f in results.arima_forecasts().chain(var) {
        if let Some(p) = f.final_point() {
            println!(
                "{:<6} {:<10} {:<16} {:<11} {:>12.4} {:>12.4} {:>12.4}",
                f.model.as_str(),
                f.asset,
                f.spec,
                p.date.to_string(),
                p.point,
                p.lower,
                p.upper
            );
        }
    }

    let failures = results.failures();
    if !failures.is_empty() {
        println!();
        for f in &failures {
            let asset = f.asset.as_deref().unwrap_or("-");
            println!("FAILED: {} [{asset}] {}: {}", f.stage.as_str(), f.kind, f.message);
        }
    }
    if let Some(artifacts) = &outcome.artifacts {
        for a in artifacts.failed() {
            println!("ARTIFACT NOT WRITTEN: {}", a.name);
        }
        println!();
        println!("Artifacts saved to: {}", artifacts.dir.display());
    }
    if results.acquisition.source == causalcast_core::data::DataSource::Synthetic {
        println!("WARNING: Results based on SYNTHETIC data");
    }
    println!();
}
