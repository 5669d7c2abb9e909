//! Stationarity behaviour on simulated price paths.
//!
//! ADF is a hypothesis test, so single draws can land on either side; the
//! assertions count outcomes over several seeds.

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use causalcast_core::preprocess::{adf_test, assess_integration};
use causalcast_core::series::PriceTable;
use causalcast_core::stats::difference;

fn random_walk(seed: u64, n: usize) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 0.02).unwrap();
    let mut level = 100f64.ln();
    (0..n)
        .map(|_| {
            level += noise.sample(&mut rng);
            level
        })
        .collect()
}

fn table(columns: Vec<(&str, Vec<f64>)>) -> PriceTable {
    let n = columns[0].1.len();
    let start = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
    let dates = start.iter_days().take(n).collect();
    let (assets, cols): (Vec<String>, Vec<Vec<f64>>) = columns
        .into_iter()
        .map(|(a, logs)| (a.to_string(), logs.into_iter().map(f64::exp).collect()))
        .unzip();
    PriceTable::new(dates, assets, cols).unwrap()
}

#[test]
fn random_walk_levels_are_mostly_non_stationary() {
    let non_stationary = (0..10)
        .filter(|&seed| {
            let r = adf_test(&random_walk(seed, 750), "rw", 0.05).unwrap();
            !r.stationary
        })
        .count();
    assert!(non_stationary >= 8, "only {non_stationary}/10 non-stationary");
}

#[test]
fn random_walk_differences_are_stationary() {
    for seed in 0..10 {
        let diffs = difference(&random_walk(seed, 750), 1);
        let r = adf_test(&diffs, "rw Δ", 0.05).unwrap();
        assert!(r.stationary, "seed {seed}: p = {}", r.p_value);
        assert!(r.p_value < 0.01);
    }
}

#[test]
fn critical_values_are_ordered() {
    let r = adf_test(&random_walk(3, 400), "rw", 0.05).unwrap();
    let cv = r.critical_values;
    assert!(cv.one_pct < cv.five_pct && cv.five_pct < cv.ten_pct);
    assert_eq!(r.stationary, r.p_value < 0.05);
}

#[test]
fn integration_report_flags_nothing_for_ordinary_prices() {
    let t = table(vec![("A", random_walk(11, 600)), ("B", random_walk(12, 600))]);
    let returns = t.log_returns().unwrap();
    let report = assess_integration(&t, &returns, 0.05).unwrap();
    assert_eq!(report.levels.len(), 2);
    assert_eq!(report.returns.len(), 2);
    assert!(report.non_stationary_returns().is_empty());
    assert!(report.returns_for("B").is_some_and(|r| r.stationary));
    assert!(report.returns_for("C").is_none());
}

#[test]
fn too_short_series_is_a_validation_error() {
    let err = adf_test(&[1.0, 2.0, 3.0], "tiny", 0.05).unwrap_err();
    assert_eq!(err.kind(), "ValidationError");
}
