//! Asset universe: display labels and their provider symbols.

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// One asset in the analysis: a human label used everywhere downstream and
/// the provider ticker used only for retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSpec {
    pub label: String,
    pub symbol: String,
}

impl AssetSpec {
    pub fn new(label: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            symbol: symbol.into(),
        }
    }
}

/// Bitcoin, Euro, Gold, S&P 500 and crude oil.
///
/// `CL=F` closed at -37.63 on 2020-04-20. Log-returns are undefined there,
/// so any window containing that date fails price validation with a
/// `DataQualityError`; pick a window after it or swap in `BZ=F` (Brent).
pub fn default_assets() -> Vec<AssetSpec> {
    vec![
        AssetSpec::new("Bitcoin", "BTC-USD"),
        AssetSpec::new("Euro", "EURUSD=X"),
        AssetSpec::new("Gold", "GC=F"),
        AssetSpec::new("SP500", "^GSPC"),
        AssetSpec::new("CrudeOil", "CL=F"),
    ]
}

/// Labels and symbols must be non-empty and unique; at least one asset.
pub fn validate_assets(assets: &[AssetSpec]) -> Result<(), AnalysisError> {
    if assets.is_empty() {
        return Err(AnalysisError::validation("universe", "no assets configured"));
    }
    let mut labels = std::collections::HashSet::new();
    let mut symbols = std::collections::HashSet::new();
    for a in assets {
        if a.label.trim().is_empty() || a.symbol.trim().is_empty() {
            return Err(AnalysisError::validation(
                "universe",
                format!("empty label or symbol in {a:?}"),
            ));
        }
        if a.label == "date" {
            return Err(AnalysisError::validation(
                "universe",
                "'date' is reserved and cannot be an asset label",
            ));
        }
        if !labels.insert(a.label.as_str()) {
            return Err(AnalysisError::validation(
                "universe",
                format!("duplicate label '{}'", a.label),
            ));
        }
        if !symbols.insert(a.symbol.as_str()) {
            return Err(AnalysisError::validation(
                "universe",
                format!("duplicate symbol '{}'", a.symbol),
            ));
        }
    }
    Ok(())
}
