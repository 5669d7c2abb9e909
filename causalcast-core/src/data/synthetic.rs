//! Synthetic price source for offline runs and tests.
//!
//! Produces a geometric random walk per symbol. The seed is derived from the
//! symbol with BLAKE3, so the same symbol always yields the same path and
//! different symbols yield independent ones. Weekends are skipped unless the
//! provider is configured for a seven-day calendar.

use chrono::{Datelike, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

use super::provider::{DataError, DataProvider, DataSource, FetchResult, RawPrice};

/// Deterministic geometric-random-walk provider.
#[derive(Debug, Clone)]
pub struct SyntheticProvider {
    pub start_price: f64,
    /// Mean daily log-return.
    pub drift: f64,
    /// Daily log-return standard deviation.
    pub volatility: f64,
    pub include_weekends: bool,
}

impl Default for SyntheticProvider {
    fn default() -> Self {
        Self {
            start_price: 100.0,
            drift: 0.0003,
            volatility: 0.015,
            include_weekends: false,
        }
    }
}

impl SyntheticProvider {
    fn seed_for(symbol: &str) -> [u8; 32] {
        *blake3::hash(symbol.as_bytes()).as_bytes()
    }

    /// Generate the path for `symbol` between `start` and `end` inclusive.
    pub fn generate(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Vec<RawPrice> {
        let mut rng = StdRng::from_seed(Self::seed_for(symbol));
        let dates: Vec<NaiveDate> = start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| {
                self.include_weekends || !matches!(d.weekday(), Weekday::Sat | Weekday::Sun)
            })
            .collect();
        let path = gbm_path(
            &mut rng,
            self.start_price,
            self.drift,
            self.volatility,
            dates.len(),
        );
        dates
            .into_iter()
            .zip(path)
            .map(|(date, close)| RawPrice { date, close })
            .collect()
    }
}

impl DataProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchResult, DataError> {
        let prices = self.generate(symbol, start, end);
        if prices.is_empty() {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        Ok(FetchResult {
            symbol: symbol.to_string(),
            prices,
            source: DataSource::Synthetic,
        })
    }
}

/// Geometric random walk of length `n` starting at `start_price`:
/// `ln p[t] = ln p[t-1] + drift + volatility·ε`, ε ~ N(0, 1).
pub fn gbm_path<R: rand::Rng>(
    rng: &mut R,
    start_price: f64,
    drift: f64,
    volatility: f64,
    n: usize,
) -> Vec<f64> {
    // Non-finite or negative volatility degenerates to a deterministic drift
    let sd = if volatility.is_finite() { volatility.max(0.0) } else { 0.0 };
    let mut out = Vec::with_capacity(n);
    let mut log_price = start_price.ln();
    for i in 0..n {
        if i > 0 {
            let eps: f64 = StandardNormal.sample(rng);
            log_price += drift + sd * eps;
        }
        out.push(log_price.exp());
    }
    out
}
