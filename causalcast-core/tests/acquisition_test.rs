//! Acquisition through the synthetic provider and an on-disk cache.

use chrono::NaiveDate;
use tempfile::TempDir;

use causalcast_core::data::{
    acquire_prices, default_assets, AcquireRequest, AlignmentPolicy, DataSource, PriceCache,
    SyntheticProvider,
};
use causalcast_core::preprocess::assess_integration;

fn request(offline: bool, refresh: bool) -> AcquireRequest {
    AcquireRequest {
        assets: default_assets(),
        start: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
        end: NaiveDate::from_ymd_opt(2022, 12, 31).unwrap(),
        alignment: AlignmentPolicy::ForwardFill,
        offline,
        refresh,
    }
}

#[test]
fn second_acquisition_is_served_from_cache() {
    let dir = TempDir::new().unwrap();
    let cache = PriceCache::new(dir.path());
    let provider = SyntheticProvider::default();

    let first = acquire_prices(&provider, Some(&cache), &request(false, false)).unwrap();
    assert!(!first.from_cache);
    assert_eq!(first.source, DataSource::Synthetic);
    assert_eq!(first.table.assets().len(), 5);
    assert!(cache.data_path(&first.cache_key).exists());

    let second = acquire_prices(&provider, Some(&cache), &request(true, false)).unwrap();
    assert!(second.from_cache);
    assert_eq!(second.source, DataSource::Synthetic);
    assert_eq!(second.cache_key, first.cache_key);
    assert_eq!(second.table.dates(), first.table.dates());
    assert_eq!(second.table.assets(), first.table.assets());
    for asset in first.table.assets() {
        let a = first.table.column(asset).unwrap();
        let b = second.table.column(asset).unwrap();
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() <= 1e-9 * x.abs());
        }
    }
}

#[test]
fn refresh_bypasses_the_cache() {
    let dir = TempDir::new().unwrap();
    let cache = PriceCache::new(dir.path());
    let provider = SyntheticProvider::default();

    acquire_prices(&provider, Some(&cache), &request(false, false)).unwrap();
    let refreshed = acquire_prices(&provider, Some(&cache), &request(false, true)).unwrap();
    assert!(!refreshed.from_cache);
}

#[test]
fn offline_miss_is_a_retrieval_error() {
    let dir = TempDir::new().unwrap();
    let cache = PriceCache::new(dir.path());
    let err = acquire_prices(&SyntheticProvider::default(), Some(&cache), &request(true, false))
        .unwrap_err();
    assert_eq!(err.kind(), "RetrievalError");
}

#[test]
fn synthetic_universe_feeds_stationarity_checks() {
    let acq = acquire_prices(&SyntheticProvider::default(), None, &request(false, false)).unwrap();
    let table = &acq.table;
    // Weekday calendar over two years
    assert!(table.len() > 500 && table.len() < 530);
    let returns = table.log_returns().unwrap();
    assert_eq!(returns.len(), 5);
    assert!(returns.iter().all(|r| r.len() == table.len() - 1));

    let report = assess_integration(table, &returns, 0.05).unwrap();
    assert!(report.non_stationary_returns().is_empty());
}
