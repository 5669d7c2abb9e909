//! Granger causality on series with a known lead–lag structure.

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use causalcast_core::causality::{granger_matrix, granger_test, PairOutcome};
use causalcast_core::forecast::integrate_returns;
use causalcast_core::preprocess::{assess_integration, StationarityReport};
use causalcast_core::series::{PriceTable, ReturnSeries};

/// `b` is white noise; `a_t = 0.5·b_{t-1} + ε_t`.
fn lead_lag(seed: u64, n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 0.01).unwrap();
    let b: Vec<f64> = (0..n).map(|_| noise.sample(&mut rng)).collect();
    let a: Vec<f64> = (0..n)
        .map(|t| {
            let lead = if t > 0 { 0.5 * b[t - 1] } else { 0.0 };
            lead + noise.sample(&mut rng)
        })
        .collect();
    (a, b)
}

fn system(columns: Vec<(&str, Vec<f64>)>) -> (PriceTable, Vec<ReturnSeries>, StationarityReport) {
    let n = columns[0].1.len();
    let start = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
    let dates = start.iter_days().take(n + 1).collect();
    let (assets, cols): (Vec<String>, Vec<Vec<f64>>) = columns
        .into_iter()
        .map(|(label, r)| {
            let mut logs = vec![50f64.ln()];
            logs.extend(integrate_returns(50f64.ln(), &r));
            (label.to_string(), logs.into_iter().map(f64::exp).collect())
        })
        .unzip();
    let table = PriceTable::new(dates, assets, cols).unwrap();
    let returns = table.log_returns().unwrap();
    let report = assess_integration(&table, &returns, 0.05).unwrap();
    (table, returns, report)
}

#[test]
fn leading_series_causes_follower() {
    let seeds = 100;
    let mut reverse_significant = 0;
    for seed in 0..seeds {
        let (a, b) = lead_lag(seed, 500);
        let (_, returns, report) = system(vec![("A", a), ("B", b)]);
        let matrix = granger_matrix(&returns, &report, 5, 0.05).unwrap();

        assert!(matrix.is_significant("B", "A"), "seed {seed}: B → A missed");
        let p = matrix.p_value("B", "A").unwrap();
        assert!(p < 1e-6, "seed {seed}: p = {p}");
        if matrix.is_significant("A", "B") {
            reverse_significant += 1;
        }
    }
    // The minimum over five lags rejects a true null somewhat more often than alpha
    let rate = reverse_significant as f64 / seeds as f64;
    assert!(rate <= 0.2, "A → B significant in {reverse_significant}/{seeds}");
}

#[test]
fn best_lag_carries_the_minimum_p_value() {
    let (a, b) = lead_lag(100, 600);
    let test = granger_test(&b, &a, 4).unwrap();
    let best = test.best().unwrap();
    assert_eq!(Some(best.p_value), test.min_p_value());
    assert!(test.lags.iter().all(|r| r.p_value >= best.p_value));
}

#[test]
fn per_lag_degrees_of_freedom() {
    let (a, b) = lead_lag(7, 300);
    let test = granger_test(&b, &a, 3).unwrap();
    assert_eq!(test.lags.len(), 3);
    for r in &test.lags {
        assert_eq!(r.df_num, r.lag);
        // n − ℓ rows, 2ℓ + 1 regressors
        assert_eq!(r.df_den, 300 - r.lag - 2 * r.lag - 1);
        assert!((0.0..=1.0).contains(&r.p_value));
    }
}

#[test]
fn summary_lists_every_ordered_pair() {
    let (a, b) = lead_lag(3, 400);
    let (_, c) = lead_lag(4, 400);
    let (_, returns, report) = system(vec![("A", a), ("B", b), ("C", c)]);
    let matrix = granger_matrix(&returns, &report, 3, 0.05).unwrap();
    let rows = matrix.summary();
    assert_eq!(rows.len(), 6);
    assert!(rows[0].significant);
    assert_eq!((rows[0].cause.as_str(), rows[0].effect.as_str()), ("B", "A"));
    for pair in rows.windows(2) {
        if pair[0].significant == pair[1].significant {
            assert!(pair[0].min_p_value <= pair[1].min_p_value);
        }
    }
}

#[test]
fn duplicated_series_is_untestable_not_fatal() {
    let (a, b) = lead_lag(9, 300);
    let (_, returns, report) = system(vec![("A", a.clone()), ("B", b), ("A2", a)]);
    let matrix = granger_matrix(&returns, &report, 2, 0.05).unwrap();
    assert!(matches!(
        matrix.entry("A", "A2").map(|e| &e.outcome),
        Some(PairOutcome::Untestable { .. })
    ));
    assert!(matrix.untestable().count() >= 2);
    assert!(matrix.is_significant("B", "A"));
}

#[test]
fn non_stationary_input_fails_the_stage() {
    let (a, b) = lead_lag(5, 300);
    let (_, returns, mut report) = system(vec![("A", a), ("B", b)]);
    report.returns[0].stationary = false;
    let err = granger_matrix(&returns, &report, 3, 0.05).unwrap_err();
    assert_eq!(err.kind(), "ValidationError");
}

#[test]
fn too_few_observations_for_max_lag() {
    let (a, b) = lead_lag(6, 40);
    let (_, returns, report) = system(vec![("A", a), ("B", b)]);
    let err = granger_matrix(&returns, &report, 15, 0.05).unwrap_err();
    assert_eq!(err.kind(), "ValidationError");
}
