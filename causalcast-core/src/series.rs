//! Immutable series types shared by every stage.
//!
//! - `PriceSeries`: one asset's `(date, price)` observations
//! - `ReturnSeries`: one asset's `(date, log_return)` observations
//! - `PriceTable`: several assets aligned on one date axis
//!
//! Constructors validate ordering and shape; nothing mutates a series after
//! it is built.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

fn check_dates(asset: &str, dates: &[NaiveDate]) -> Result<(), AnalysisError> {
    for w in dates.windows(2) {
        if w[1] <= w[0] {
            return Err(AnalysisError::data_quality(
                asset,
                Some(w[1]),
                format!("dates not strictly increasing ({} then {})", w[0], w[1]),
            ));
        }
    }
    Ok(())
}

/// Daily prices for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    asset: String,
    dates: Vec<NaiveDate>,
    prices: Vec<f64>,
}

impl PriceSeries {
    pub fn new(
        asset: impl Into<String>,
        dates: Vec<NaiveDate>,
        prices: Vec<f64>,
    ) -> Result<Self, AnalysisError> {
        let asset = asset.into();
        if dates.len() != prices.len() {
            return Err(AnalysisError::data_quality(
                &asset,
                None,
                format!("{} dates but {} prices", dates.len(), prices.len()),
            ));
        }
        check_dates(&asset, &dates)?;
        Ok(Self {
            asset,
            dates,
            prices,
        })
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn prices(&self) -> &[f64] {
        &self.prices
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn last(&self) -> Option<(NaiveDate, f64)> {
        Some((*self.dates.last()?, *self.prices.last()?))
    }

    /// Natural log of every price. Callers validate positivity first.
    pub fn log_prices(&self) -> Vec<f64> {
        self.prices.iter().map(|p| p.ln()).collect()
    }
}

/// Daily log-returns for one asset.
///
/// `dates[i]` is the date of the later price in each pair, so the first
/// price date of the source series has no return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnSeries {
    asset: String,
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl ReturnSeries {
    pub fn new(
        asset: impl Into<String>,
        dates: Vec<NaiveDate>,
        values: Vec<f64>,
    ) -> Result<Self, AnalysisError> {
        let asset = asset.into();
        if dates.len() != values.len() {
            return Err(AnalysisError::data_quality(
                &asset,
                None,
                format!("{} dates but {} returns", dates.len(), values.len()),
            ));
        }
        check_dates(&asset, &dates)?;
        Ok(Self {
            asset,
            dates,
            values,
        })
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Several assets' prices on a shared, strictly increasing date axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTable {
    dates: Vec<NaiveDate>,
    assets: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl PriceTable {
    pub fn new(
        dates: Vec<NaiveDate>,
        assets: Vec<String>,
        columns: Vec<Vec<f64>>,
    ) -> Result<Self, AnalysisError> {
        if assets.len() != columns.len() {
            return Err(AnalysisError::validation(
                "price_table",
                format!("{} asset labels but {} columns", assets.len(), columns.len()),
            ));
        }
        for (asset, col) in assets.iter().zip(&columns) {
            if col.len() != dates.len() {
                return Err(AnalysisError::data_quality(
                    asset,
                    None,
                    format!("{} prices for {} dates", col.len(), dates.len()),
                ));
            }
        }
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = assets.iter().find(|a| !seen.insert(a.as_str())) {
            return Err(AnalysisError::validation(
                "price_table",
                format!("duplicate asset label '{dup}'"),
            ));
        }
        check_dates("price_table", &dates)?;
        Ok(Self {
            dates,
            assets,
            columns,
        })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn column(&self, asset: &str) -> Option<&[f64]> {
        let idx = self.assets.iter().position(|a| a == asset)?;
        Some(&self.columns[idx])
    }

    /// The column for `asset` as an owned series.
    pub fn series(&self, asset: &str) -> Option<PriceSeries> {
        let col = self.column(asset)?;
        Some(PriceSeries {
            asset: asset.to_string(),
            dates: self.dates.clone(),
            prices: col.to_vec(),
        })
    }

    /// Every column as a series, in table order.
    pub fn all_series(&self) -> Vec<PriceSeries> {
        self.assets
            .iter()
            .zip(&self.columns)
            .map(|(asset, col)| PriceSeries {
                asset: asset.clone(),
                dates: self.dates.clone(),
                prices: col.clone(),
            })
            .collect()
    }

    /// Log-returns of every column, failing on the first bad price.
    pub fn log_returns(&self) -> Result<Vec<ReturnSeries>, AnalysisError> {
        self.all_series()
            .iter()
            .map(crate::preprocess::log_returns)
            .collect()
    }
}
