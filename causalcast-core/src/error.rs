//! Pipeline error taxonomy.
//!
//! Every stage reports failures through [`AnalysisError`]. Each variant
//! carries enough context (asset, stage, parameters attempted) to reproduce
//! the failure from the run configuration alone.

use chrono::NaiveDate;
use thiserror::Error;

use crate::data::provider::DataError;
use crate::stats::LinalgError;

/// Failure classes of an analysis run.
///
/// `Retrieval` and `DataQuality` are fatal to the whole run. `Convergence`
/// and `SingularMatrix` are isolated to the model that raised them.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("retrieval failed for '{symbol}': {source}")]
    Retrieval {
        symbol: String,
        #[source]
        source: DataError,
    },

    #[error("data quality: {asset}{}: {reason}", .date.map(|d| format!(" on {d}")).unwrap_or_default())]
    DataQuality {
        asset: String,
        date: Option<NaiveDate>,
        reason: String,
    },

    #[error("validation failed in {stage}: {reason}")]
    Validation { stage: &'static str, reason: String },

    #[error("{model} did not converge for {asset} at order {order}: {reason}")]
    Convergence {
        model: &'static str,
        asset: String,
        order: String,
        reason: String,
    },

    #[error("singular matrix in {stage} ({params}): {source}")]
    SingularMatrix {
        stage: &'static str,
        params: String,
        #[source]
        source: LinalgError,
    },
}

impl AnalysisError {
    /// Short class name used in manifests and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Retrieval { .. } => "RetrievalError",
            Self::DataQuality { .. } => "DataQualityError",
            Self::Validation { .. } => "ValidationError",
            Self::Convergence { .. } => "ConvergenceError",
            Self::SingularMatrix { .. } => "SingularMatrixError",
        }
    }

    pub(crate) fn data_quality(
        asset: &str,
        date: Option<NaiveDate>,
        reason: impl Into<String>,
    ) -> Self {
        Self::DataQuality {
            asset: asset.to_string(),
            date,
            reason: reason.into(),
        }
    }

    pub(crate) fn validation(stage: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            stage,
            reason: reason.into(),
        }
    }
}
