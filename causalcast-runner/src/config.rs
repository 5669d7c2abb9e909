//! Serializable analysis configuration.
//!
//! Loaded from TOML; every section and field is optional and falls back to
//! the defaults of the reference analysis (five assets, 2018–2024, 30-day
//! Bitcoin forecast). Unknown keys are rejected so typos fail loudly.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use causalcast_core::arima::ArimaConfig;
use causalcast_core::data::{default_assets, validate_assets, AlignmentPolicy, AssetSpec};
use causalcast_core::fingerprint::short_hash;
use causalcast_core::var::VarConfig;

/// Content-addressed identifier of a run configuration.
pub type RunId = String;

/// Configuration errors surfaced before any analysis starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Complete configuration of one analysis run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub data: DataConfig,
    pub stationarity: StationarityConfig,
    pub causality: CausalityConfig,
    pub arima: ArimaSection,
    pub var: VarSection,
    pub forecast: ForecastConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DataConfig {
    pub assets: Vec<AssetSpec>,
    pub start: NaiveDate,
    /// Inclusive.
    pub end: NaiveDate,
    pub alignment: AlignmentPolicy,
    pub cache_dir: PathBuf,
}

// The default window spans the negative CL=F close of 2020-04-20, so a live
// download with these defaults stops at validation (exit 1). Synthetic runs
// are unaffected.
impl Default for DataConfig {
    fn default() -> Self {
        Self {
            assets: default_assets(),
            start: NaiveDate::from_ymd_opt(2018, 1, 1).unwrap_or_default(),
            end: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap_or_default(),
            alignment: AlignmentPolicy::ForwardFill,
            cache_dir: PathBuf::from("cache"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StationarityConfig {
    pub alpha: f64,
}

impl Default for StationarityConfig {
    fn default() -> Self {
        Self { alpha: 0.05 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CausalityConfig {
    pub max_lag: usize,
    pub alpha: f64,
}

impl Default for CausalityConfig {
    fn default() -> Self {
        Self {
            max_lag: 5,
            alpha: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ArimaSection {
    pub max_p: usize,
    pub max_d: usize,
    pub max_q: usize,
}

impl Default for ArimaSection {
    fn default() -> Self {
        let d = ArimaConfig::default();
        Self {
            max_p: d.max_p,
            max_d: d.max_d,
            max_q: d.max_q,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct VarSection {
    pub max_lags: usize,
}

impl Default for VarSection {
    fn default() -> Self {
        Self {
            max_lags: VarConfig::default().max_lags,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ForecastConfig {
    pub horizon: usize,
    pub confidence: f64,
    /// Assets that get an ARIMA forecast. The first one is the primary
    /// asset of the single-asset charts.
    pub targets: Vec<String>,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon: 30,
            confidence: 0.95,
            targets: vec!["Bitcoin".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub dir: PathBuf,
    /// Days of history shown before the forecast origin in forecast charts.
    pub history_days: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("results"),
            history_days: 90,
        }
    }
}

impl AnalysisConfig {
    /// Read and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_assets(&self.data.assets).map_err(|e| invalid("data.assets", e.to_string()))?;
        if self.data.end <= self.data.start {
            return Err(invalid(
                "data.end",
                format!("{} is not after {}", self.data.end, self.data.start),
            ));
        }
        for (field, alpha) in [
            ("stationarity.alpha", self.stationarity.alpha),
            ("causality.alpha", self.causality.alpha),
        ] {
            if !(alpha > 0.0 && alpha < 1.0) {
                return Err(invalid(field, format!("{alpha} outside (0, 1)")));
            }
        }
        if self.causality.max_lag == 0 {
            return Err(invalid("causality.max_lag", "must be at least 1"));
        }
        if self.var.max_lags == 0 {
            return Err(invalid("var.max_lags", "must be at least 1"));
        }
        if self.forecast.horizon == 0 {
            return Err(invalid("forecast.horizon", "must be at least 1"));
        }
        let c = self.forecast.confidence;
        if !(c > 0.0 && c < 1.0) {
            return Err(invalid("forecast.confidence", format!("{c} outside (0, 1)")));
        }
        if self.forecast.targets.is_empty() {
            return Err(invalid("forecast.targets", "at least one target is required"));
        }
        for target in &self.forecast.targets {
            if !self.data.assets.iter().any(|a| &a.label == target) {
                return Err(invalid(
                    "forecast.targets",
                    format!("'{target}' is not a configured asset label"),
                ));
            }
        }
        if self.output.history_days == 0 {
            return Err(invalid("output.history_days", "must be at least 1"));
        }
        Ok(())
    }

    /// Deterministic id for this configuration.
    ///
    /// Two runs with identical analysis settings share a run id. Output and
    /// cache locations are excluded: they do not change results.
    pub fn run_id(&self) -> RunId {
        let mut canonical = self.clone();
        canonical.data.cache_dir = PathBuf::new();
        canonical.output.dir = PathBuf::new();
        // Plain data with string keys always serializes
        let json = serde_json::to_string(&canonical).unwrap_or_default();
        short_hash(json.as_bytes())
    }

    pub fn arima_config(&self) -> ArimaConfig {
        ArimaConfig {
            max_p: self.arima.max_p,
            max_d: self.arima.max_d,
            max_q: self.arima.max_q,
            alpha: self.stationarity.alpha,
            ..ArimaConfig::default()
        }
    }

    pub fn var_config(&self) -> VarConfig {
        VarConfig {
            max_lags: self.var.max_lags,
        }
    }

    /// First forecast target.
    pub fn primary_asset(&self) -> &str {
        self.forecast
            .targets
            .first()
            .map(String::as_str)
            .unwrap_or_default()
    }
}
