//! Acquisition orchestrator: cache lookup, per-asset fetch, alignment,
//! validation, cache write.

use chrono::NaiveDate;
use tracing::{info, warn};

use super::align::{align_prices, AlignmentPolicy};
use super::cache::PriceCache;
use super::provider::{DataError, DataProvider, DataSource};
use super::universe::{validate_assets, AssetSpec};
use crate::error::AnalysisError;
use crate::fingerprint::{cache_key, dataset_hash};
use crate::series::PriceTable;

/// What to acquire and how.
#[derive(Debug, Clone)]
pub struct AcquireRequest {
    pub assets: Vec<AssetSpec>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub alignment: AlignmentPolicy,
    /// Never touch the provider; a cache miss is an error.
    pub offline: bool,
    /// Ignore any cached entry and fetch again.
    pub refresh: bool,
}

/// An aligned, validated price table and where it came from.
#[derive(Debug, Clone)]
pub struct Acquisition {
    pub table: PriceTable,
    /// Origin of the prices (the provider that produced them, even on a cache hit).
    pub source: DataSource,
    pub from_cache: bool,
    pub cache_key: String,
    pub dataset_hash: String,
}

/// Produce the aligned price table for `request`.
///
/// Any per-asset failure aborts with `Retrieval` naming the symbol. A table
/// with non-positive or non-finite prices fails with `DataQuality`.
pub fn acquire_prices(
    provider: &dyn DataProvider,
    cache: Option<&PriceCache>,
    request: &AcquireRequest,
) -> Result<Acquisition, AnalysisError> {
    validate_assets(&request.assets)?;
    if request.end <= request.start {
        return Err(AnalysisError::validation(
            "acquisition",
            format!("end {} is not after start {}", request.end, request.start),
        ));
    }

    let key = cache_key(
        provider.name(),
        &request.assets,
        request.start,
        request.end,
        request.alignment,
    );
    let labels: Vec<String> = request.assets.iter().map(|a| a.label.clone()).collect();

    if let Some(cache) = cache {
        if request.refresh && !request.offline {
            cache
                .invalidate(&key)
                .map_err(|e| retrieval_error(&request.assets, e))?;
        }
        let hit = cache
            .load(&key, &labels)
            .map_err(|e| retrieval_error(&request.assets, e))?;
        if let Some(table) = hit {
            validate_prices(&table)?;
            let source = cache
                .get_meta(&key)
                .map(|m| m.source)
                .unwrap_or(DataSource::Cache);
            info!(key = %key, rows = table.len(), ?source, "loaded prices from cache");
            return Ok(Acquisition {
                dataset_hash: dataset_hash(&table),
                table,
                source,
                from_cache: true,
                cache_key: key,
            });
        }
    }

    if request.offline {
        return Err(retrieval_error(&request.assets, DataError::Offline));
    }

    let mut fetched = Vec::with_capacity(request.assets.len());
    let mut source = DataSource::YahooFinance;
    for asset in &request.assets {
        info!(asset = %asset.label, symbol = %asset.symbol, provider = provider.name(), "fetching prices");
        let result = provider
            .fetch(&asset.symbol, request.start, request.end)
            .map_err(|e| AnalysisError::Retrieval {
                symbol: asset.symbol.clone(),
                source: e,
            })?;
        if result.prices.is_empty() {
            return Err(AnalysisError::Retrieval {
                symbol: asset.symbol.clone(),
                source: DataError::SymbolNotFound {
                    symbol: asset.symbol.clone(),
                },
            });
        }
        source = result.source;
        fetched.push((asset.label.clone(), result.prices));
    }

    let table = align_prices(&fetched, request.alignment)?;
    validate_prices(&table)?;
    info!(
        rows = table.len(),
        first = ?table.dates().first(),
        last = ?table.last_date(),
        alignment = %request.alignment,
        "aligned price table"
    );

    if let Some(cache) = cache {
        // A failed cache write only costs a re-download next time
        if let Err(e) = cache.write(&key, &table, source) {
            warn!(key = %key, error = %e, "failed to write price cache");
        }
    }

    Ok(Acquisition {
        dataset_hash: dataset_hash(&table),
        table,
        source,
        from_cache: false,
        cache_key: key,
    })
}

/// Every price must be finite and strictly positive.
pub fn validate_prices(table: &PriceTable) -> Result<(), AnalysisError> {
    for label in table.assets() {
        let Some(col) = table.column(label) else {
            continue;
        };
        if let Some((i, p)) = col
            .iter()
            .enumerate()
            .find(|(_, p)| !p.is_finite() || **p <= 0.0)
        {
            return Err(AnalysisError::data_quality(
                label,
                table.dates().get(i).copied(),
                format!("invalid price {p}"),
            ));
        }
    }
    Ok(())
}

fn retrieval_error(assets: &[AssetSpec], source: DataError) -> AnalysisError {
    let symbol = assets
        .iter()
        .map(|a| a.symbol.as_str())
        .collect::<Vec<_>>()
        .join(",");
    AnalysisError::Retrieval { symbol, source }
}
