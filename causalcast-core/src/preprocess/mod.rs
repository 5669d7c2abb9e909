//! Preprocessing: log returns and stationarity testing.

pub mod adf;
pub mod integration;
pub mod returns;

pub use adf::{adf_max_lag, adf_test, critical_values, mackinnon_p, CriticalValues, StationarityResult};
pub use integration::{assess_integration, StationarityReport};
pub use returns::log_returns;
