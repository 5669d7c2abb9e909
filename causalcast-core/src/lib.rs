//! CausalCast core: price series, data acquisition, stationarity testing,
//! Granger causality, ARIMA and VAR forecasting.
//!
//! This crate contains the analysis itself:
//! - Aligned price tables and log-return series
//! - Cached multi-asset downloads with content fingerprints
//! - Augmented Dickey–Fuller tests and integration-order checks
//! - Pairwise Granger causality matrix
//! - Univariate ARIMA on log-prices with AIC order selection
//! - VAR on the joint return system with AIC lag selection
//! - Price-space forecasts with asymmetric confidence intervals

pub mod arima;
pub mod causality;
pub mod data;
pub mod error;
pub mod fingerprint;
pub mod forecast;
pub mod preprocess;
pub mod series;
pub mod stats;
pub mod var;

pub use error::AnalysisError;
