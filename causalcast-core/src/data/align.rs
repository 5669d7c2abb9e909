//! Multi-asset time alignment.
//!
//! Assets trade on different calendars (crypto every day, futures and FX on
//! weekdays, equities on exchange days). Alignment turns per-asset
//! observations into one [`PriceTable`] on a shared date axis.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::provider::RawPrice;
use crate::error::AnalysisError;
use crate::series::PriceTable;

/// How dates missing for some assets are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentPolicy {
    /// Union of all dates; each asset carries its last observed price forward.
    /// Leading dates before every asset has traded once are dropped.
    #[default]
    ForwardFill,
    /// Only dates on which every asset has an observation.
    Intersection,
}

impl AlignmentPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ForwardFill => "forward_fill",
            Self::Intersection => "intersection",
        }
    }
}

impl std::fmt::Display for AlignmentPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Align `(label, observations)` pairs into a table, keeping the given asset
/// order. Non-finite closes count as missing.
pub fn align_prices(
    inputs: &[(String, Vec<RawPrice>)],
    policy: AlignmentPolicy,
) -> Result<PriceTable, AnalysisError> {
    if inputs.is_empty() {
        return Err(AnalysisError::validation("alignment", "no assets to align"));
    }

    let lookups: Vec<HashMap<NaiveDate, f64>> = inputs
        .iter()
        .map(|(_, prices)| {
            prices
                .iter()
                .filter(|p| p.close.is_finite())
                .map(|p| (p.date, p.close))
                .collect()
        })
        .collect();

    for ((label, _), lookup) in inputs.iter().zip(&lookups) {
        if lookup.is_empty() {
            return Err(AnalysisError::data_quality(
                label,
                None,
                "no usable observations",
            ));
        }
    }

    let all_dates: BTreeSet<NaiveDate> = lookups.iter().flat_map(|m| m.keys().copied()).collect();

    let (dates, columns) = match policy {
        AlignmentPolicy::Intersection => {
            let dates: Vec<NaiveDate> = all_dates
                .into_iter()
                .filter(|d| lookups.iter().all(|m| m.contains_key(d)))
                .collect();
            let columns = lookups
                .iter()
                .map(|m| dates.iter().map(|d| m[d]).collect())
                .collect();
            (dates, columns)
        }
        AlignmentPolicy::ForwardFill => {
            let mut last: Vec<Option<f64>> = vec![None; lookups.len()];
            let mut dates = Vec::new();
            let mut columns: Vec<Vec<f64>> = vec![Vec::new(); lookups.len()];
            for date in all_dates {
                for (slot, m) in last.iter_mut().zip(&lookups) {
                    if let Some(&p) = m.get(&date) {
                        *slot = Some(p);
                    }
                }
                if last.iter().all(Option::is_some) {
                    dates.push(date);
                    for (col, p) in columns.iter_mut().zip(&last) {
                        col.extend(*p);
                    }
                }
            }
            (dates, columns)
        }
    };

    if dates.len() < 2 {
        return Err(AnalysisError::validation(
            "alignment",
            format!("only {} common date(s) under {policy} alignment", dates.len()),
        ));
    }

    let labels = inputs.iter().map(|(label, _)| label.clone()).collect();
    PriceTable::new(dates, labels, columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(date: &str, close: f64) -> RawPrice {
        RawPrice {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            close,
        }
    }

    fn inputs() -> Vec<(String, Vec<RawPrice>)> {
        vec![
            (
                "Bitcoin".into(),
                vec![
                    p("2024-01-05", 10.0),
                    p("2024-01-06", 11.0),
                    p("2024-01-07", 12.0),
                    p("2024-01-08", 13.0),
                ],
            ),
            (
                "Gold".into(),
                // No weekend trading, and no data before the 5th
                vec![p("2024-01-05", 100.0), p("2024-01-08", 101.0)],
            ),
            (
                "Euro".into(),
                vec![p("2024-01-04", 1.1), p("2024-01-05", 1.2), p("2024-01-08", 1.3)],
            ),
        ]
    }

    #[test]
    fn forward_fill_carries_last_price_over_gaps() {
        let table = align_prices(&inputs(), AlignmentPolicy::ForwardFill).unwrap();
        // 2024-01-04 dropped: Bitcoin and Gold had no observation yet
        assert_eq!(table.len(), 4);
        assert_eq!(table.column("Gold").unwrap(), &[100.0, 100.0, 100.0, 101.0]);
        assert_eq!(table.column("Euro").unwrap(), &[1.2, 1.2, 1.2, 1.3]);
        assert_eq!(table.assets(), &["Bitcoin", "Gold", "Euro"]);
    }

    #[test]
    fn intersection_keeps_common_dates_only() {
        let table = align_prices(&inputs(), AlignmentPolicy::Intersection).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.column("Bitcoin").unwrap(), &[10.0, 13.0]);
    }

    #[test]
    fn nan_close_is_treated_as_missing() {
        let data = vec![
            ("A".to_string(), vec![p("2024-01-01", 1.0), p("2024-01-02", f64::NAN), p("2024-01-03", 3.0)]),
            ("B".to_string(), vec![p("2024-01-01", 5.0), p("2024-01-02", 6.0), p("2024-01-03", 7.0)]),
        ];
        let table = align_prices(&data, AlignmentPolicy::ForwardFill).unwrap();
        assert_eq!(table.column("A").unwrap(), &[1.0, 1.0, 3.0]);
    }

    #[test]
    fn asset_without_data_is_a_quality_error() {
        let data = vec![
            ("A".to_string(), vec![p("2024-01-01", 1.0), p("2024-01-02", 2.0)]),
            ("B".to_string(), Vec::new()),
        ];
        let err = align_prices(&data, AlignmentPolicy::ForwardFill).unwrap_err();
        assert_eq!(err.kind(), "DataQualityError");
    }

    #[test]
    fn disjoint_calendars_fail_intersection() {
        let data = vec![
            ("A".to_string(), vec![p("2024-01-01", 1.0), p("2024-01-02", 2.0)]),
            ("B".to_string(), vec![p("2024-01-03", 1.0), p("2024-01-04", 2.0)]),
        ];
        let err = align_prices(&data, AlignmentPolicy::Intersection).unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
    }
}
