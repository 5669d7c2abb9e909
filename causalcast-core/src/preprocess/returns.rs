//! Log-return transform.

use crate::error::AnalysisError;
use crate::series::{PriceSeries, ReturnSeries};

/// `r[t] = ln(p[t] / p[t-1])`, dated at `t`.
///
/// A non-positive or non-finite price fails with `DataQuality` naming the
/// asset and the offending date.
pub fn log_returns(prices: &PriceSeries) -> Result<ReturnSeries, AnalysisError> {
    let values = prices.prices();
    let dates = prices.dates();
    if values.len() < 2 {
        return Err(AnalysisError::data_quality(
            prices.asset(),
            None,
            format!("need at least 2 prices for returns, have {}", values.len()),
        ));
    }
    if let Some(i) = values.iter().position(|p| !p.is_finite() || *p <= 0.0) {
        return Err(AnalysisError::data_quality(
            prices.asset(),
            Some(dates[i]),
            format!("invalid price {}", values[i]),
        ));
    }

    let returns = values.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
    ReturnSeries::new(prices.asset(), dates[1..].to_vec(), returns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn series(prices: Vec<f64>) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let dates = start.iter_days().take(prices.len()).collect();
        PriceSeries::new("Bitcoin", dates, prices).unwrap()
    }

    #[test]
    fn one_shorter_and_dated_at_later_price() {
        let s = series(vec![100.0, 110.0, 99.0]);
        let r = log_returns(&s).unwrap();
        assert_eq!(r.len(), 2);
        assert_eq!(r.dates()[0], s.dates()[1]);
        assert!((r.values()[0] - (1.1f64).ln()).abs() < 1e-15);
    }

    #[test]
    fn zero_price_names_date() {
        let s = series(vec![100.0, 0.0, 99.0]);
        let err = log_returns(&s).unwrap_err();
        match err {
            AnalysisError::DataQuality { asset, date, .. } => {
                assert_eq!(asset, "Bitcoin");
                assert_eq!(date, Some(s.dates()[1]));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn single_price_is_rejected() {
        assert!(log_returns(&series(vec![100.0])).is_err());
    }
}
