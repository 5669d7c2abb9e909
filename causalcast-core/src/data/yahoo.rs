//! Yahoo Finance price provider.
//!
//! Fetches daily closes from Yahoo's v8 chart API. Transient failures
//! (connection errors, timeouts, HTTP 429 and 5xx) are retried with
//! exponential backoff; anything else fails immediately. A `Retry-After`
//! header on a 429 stretches the wait, up to [`MAX_RETRY_WAIT`].
//!
//! Yahoo Finance has no official API and is subject to unannounced format
//! changes. Parsing failures surface as `ResponseFormatChanged`.

use super::provider::{DataError, DataProvider, DataSource, FetchResult, RawPrice};
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const CHART_API: &str = "https://query2.finance.yahoo.com/v8/finance/chart";

/// Longest wait honoured from a `Retry-After` header.
pub const MAX_RETRY_WAIT: Duration = Duration::from_secs(30);

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

/// Yahoo Finance data provider.
pub struct YahooProvider {
    client: reqwest::blocking::Client,
    max_attempts: u32,
    base_delay: Duration,
    base_url: String,
}

impl YahooProvider {
    /// Provider with a 30 s per-request timeout and 3 attempts per symbol.
    pub fn new() -> Result<Self, DataError> {
        Self::with_retry(Duration::from_secs(30), 3, Duration::from_millis(500))
    }

    pub fn with_retry(
        timeout: Duration,
        max_attempts: u32,
        base_delay: Duration,
    ) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_attempts: max_attempts.max(1),
            base_delay,
            base_url: CHART_API.to_string(),
        })
    }

    /// Point the provider at another chart endpoint (a mirror or local stub).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Build the chart API URL for a symbol and date range. `end` is
    /// inclusive: the query runs to midnight after it.
    fn chart_url(base_url: &str, symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
        let start_ts = start.and_time(chrono::NaiveTime::MIN).and_utc().timestamp();
        let end_ts = end
            .succ_opt()
            .unwrap_or(end)
            .and_time(chrono::NaiveTime::MIN)
            .and_utc()
            .timestamp();
        let encoded: String = symbol
            .chars()
            .map(|c| match c {
                '^' => "%5E".to_string(),
                '=' => "%3D".to_string(),
                other => other.to_string(),
            })
            .collect();
        format!(
            "{base_url}/{encoded}\
             ?period1={start_ts}&period2={end_ts}&interval=1d\
             &includeAdjustedClose=true"
        )
    }

    /// Parse the chart API response into daily closes.
    fn parse_response(symbol: &str, resp: ChartResponse) -> Result<Vec<RawPrice>, DataError> {
        let result = resp.chart.result.ok_or_else(|| match resp.chart.error {
            Some(err) if err.code == "Not Found" => DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            },
            Some(err) => {
                DataError::ResponseFormatChanged(format!("{}: {}", err.code, err.description))
            }
            None => DataError::ResponseFormatChanged("empty result with no error".into()),
        })?;

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("result array is empty".into()))?;

        let timestamps = data.timestamp.ok_or_else(|| DataError::SymbolNotFound {
            symbol: symbol.to_string(),
        })?;

        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("no quote data".into()))?;

        let adj_closes = data
            .indicators
            .adjclose
            .and_then(|v| v.into_iter().next())
            .map(|a| a.adjclose);

        let mut prices = Vec::with_capacity(timestamps.len());
        for (i, &ts) in timestamps.iter().enumerate() {
            let date = chrono::DateTime::from_timestamp(ts, 0)
                .map(|dt| dt.naive_utc().date())
                .ok_or_else(|| {
                    DataError::ResponseFormatChanged(format!("invalid timestamp: {ts}"))
                })?;

            let adj = adj_closes.as_ref().and_then(|v| v.get(i).copied().flatten());
            let close = adj.or_else(|| quote.close.get(i).copied().flatten());

            // Rows with no close at all are non-trading placeholders
            if let Some(close) = close {
                prices.push(RawPrice { date, close });
            }
        }

        // Intraday snapshots can repeat the last date
        prices.dedup_by_key(|p| p.date);

        if prices.is_empty() {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        Ok(prices)
    }

    fn fetch_once(&self, url: &str, symbol: &str) -> Result<Vec<RawPrice>, Attempt> {
        let resp = match self.client.get(url).send() {
            Ok(resp) => resp,
            Err(e) if e.is_connect() || e.is_timeout() => {
                return Err(Attempt::retry(DataError::NetworkUnreachable(e.to_string())))
            }
            Err(e) => return Err(Attempt::Fatal(DataError::NetworkUnreachable(e.to_string()))),
        };

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Err(Attempt::Retry {
                error: DataError::RateLimited {
                    retry_after_secs: retry_after.unwrap_or(0),
                },
                wait: retry_after.map(Duration::from_secs),
            });
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Attempt::Fatal(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            }));
        }
        if status.is_server_error() {
            return Err(Attempt::retry(DataError::Other(format!(
                "HTTP {status} for {symbol}"
            ))));
        }
        if !status.is_success() {
            return Err(Attempt::Fatal(DataError::Other(format!(
                "HTTP {status} for {symbol}"
            ))));
        }

        let chart: ChartResponse = resp.json().map_err(|e| {
            Attempt::Fatal(DataError::ResponseFormatChanged(format!(
                "failed to parse response for {symbol}: {e}"
            )))
        })?;
        Self::parse_response(symbol, chart).map_err(Attempt::Fatal)
    }
}

enum Attempt {
    /// Transient; `wait` is the server's requested delay, if any.
    Retry {
        error: DataError,
        wait: Option<Duration>,
    },
    Fatal(DataError),
}

impl Attempt {
    fn retry(error: DataError) -> Self {
        Self::Retry { error, wait: None }
    }
}

/// Delay before retry number `retry` (1-based): exponential backoff from
/// `base`, stretched to a server hint capped at [`MAX_RETRY_WAIT`].
fn retry_delay(base: Duration, retry: u32, hint: Option<Duration>) -> Duration {
    let backoff = base.saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)));
    match hint {
        Some(h) => backoff.max(h.min(MAX_RETRY_WAIT)),
        None => backoff,
    }
}

impl DataProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchResult, DataError> {
        let url = Self::chart_url(&self.base_url, symbol, start, end);
        let mut last_error = None;
        let mut hint = None;

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                let delay = retry_delay(self.base_delay, attempt, hint);
                debug!(symbol, attempt, ?delay, "retrying Yahoo request");
                std::thread::sleep(delay);
            }

            match self.fetch_once(&url, symbol) {
                Ok(prices) => {
                    let prices = prices
                        .into_iter()
                        .filter(|p| p.date >= start && p.date <= end)
                        .collect();
                    return Ok(FetchResult {
                        symbol: symbol.to_string(),
                        prices,
                        source: DataSource::YahooFinance,
                    });
                }
                Err(Attempt::Fatal(e)) => return Err(e),
                Err(Attempt::Retry { error, wait }) => {
                    warn!(symbol, attempt = attempt + 1, error = %error, "transient fetch failure");
                    last_error = Some(error);
                    hint = wait;
                }
            }
        }

        Err(DataError::RetriesExhausted {
            attempts: self.max_attempts,
            last: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempt made".into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<Vec<RawPrice>, DataError> {
        let resp: ChartResponse = serde_json::from_str(json).unwrap();
        YahooProvider::parse_response("BTC-USD", resp)
    }

    #[test]
    fn prefers_adjusted_close() {
        let json = r#"{"chart":{"result":[{"timestamp":[1704153600,1704240000],
            "indicators":{"quote":[{"close":[100.0,101.0]}],
            "adjclose":[{"adjclose":[99.0,null]}]}}],"error":null}}"#;
        let prices = parse(json).unwrap();
        assert_eq!(prices.len(), 2);
        assert_eq!(prices[0].close, 99.0);
        assert_eq!(prices[1].close, 101.0);
        assert_eq!(prices[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
    }

    #[test]
    fn skips_rows_without_close() {
        let json = r#"{"chart":{"result":[{"timestamp":[1704153600,1704240000],
            "indicators":{"quote":[{"close":[null,101.0]}]}}],"error":null}}"#;
        let prices = parse(json).unwrap();
        assert_eq!(prices.len(), 1);
        assert_eq!(prices[0].close, 101.0);
    }

    #[test]
    fn not_found_error_maps_to_symbol_not_found() {
        let json = r#"{"chart":{"result":null,
            "error":{"code":"Not Found","description":"No data found"}}}"#;
        assert!(matches!(
            parse(json),
            Err(DataError::SymbolNotFound { .. })
        ));
    }

    #[test]
    fn missing_timestamps_means_no_data() {
        let json = r#"{"chart":{"result":[{"indicators":{"quote":[{"close":[]}]}}],"error":null}}"#;
        assert!(matches!(
            parse(json),
            Err(DataError::SymbolNotFound { .. })
        ));
    }

    #[test]
    fn url_encodes_index_and_fx_symbols() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let url = YahooProvider::chart_url(CHART_API, "^GSPC", start, end);
        assert!(url.contains("/chart/%5EGSPC?"));
        let url = YahooProvider::chart_url(CHART_API, "EURUSD=X", start, end);
        assert!(url.contains("/chart/EURUSD%3DX?"));
        assert!(url.contains("period1=1704067200"));
        // 2024-02-01 00:00 UTC: the end date itself is included
        assert!(url.contains("period2=1706745600"));
    }

    #[test]
    fn retry_delay_backs_off_and_caps_server_hints() {
        let base = Duration::from_millis(500);
        assert_eq!(retry_delay(base, 1, None), base);
        assert_eq!(retry_delay(base, 2, None), Duration::from_secs(1));
        assert_eq!(retry_delay(base, 1, Some(Duration::from_secs(5))), Duration::from_secs(5));
        assert_eq!(retry_delay(base, 1, Some(Duration::from_secs(3600))), MAX_RETRY_WAIT);
        // A hint shorter than the backoff does not shorten it
        assert_eq!(retry_delay(base, 3, Some(Duration::ZERO)), Duration::from_secs(2));
    }

    // ── Retry behaviour against a local HTTP stub ──

    const PAYLOAD: &str = r#"{"chart":{"result":[{"timestamp":[1704153600,1704240000],
        "indicators":{"quote":[{"close":[100.0,101.0]}]}}],"error":null}}"#;

    fn http(status: &str, extra_headers: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\n{extra_headers}\
             Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    /// Serve `responses` in order, one connection each; the handle yields the
    /// number of requests answered.
    fn serve(responses: Vec<String>) -> (String, std::thread::JoinHandle<usize>) {
        use std::io::{Read, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            let mut served = 0;
            for response in responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = stream.read(&mut buf).unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                }
                stream.write_all(response.as_bytes()).unwrap();
                served += 1;
            }
            served
        });
        (format!("http://{addr}/chart"), handle)
    }

    fn local_provider(base_url: String) -> YahooProvider {
        let client = reqwest::blocking::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        YahooProvider {
            client,
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            base_url,
        }
    }

    fn january() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
    }

    #[test]
    fn server_errors_are_retried_until_success() {
        let (url, server) = serve(vec![
            http("503 Service Unavailable", "", ""),
            http("429 Too Many Requests", "Retry-After: 0\r\n", ""),
            http("200 OK", "", PAYLOAD),
        ]);
        let (start, end) = january();
        let result = local_provider(url).fetch("BTC-USD", start, end).unwrap();
        assert_eq!(result.prices.len(), 2);
        assert_eq!(result.source, DataSource::YahooFinance);
        assert_eq!(server.join().unwrap(), 3);
    }

    #[test]
    fn attempts_are_bounded() {
        let (url, server) = serve(vec![http("503 Service Unavailable", "", ""); 3]);
        let (start, end) = january();
        let err = local_provider(url).fetch("BTC-USD", start, end).unwrap_err();
        assert!(matches!(err, DataError::RetriesExhausted { attempts: 3, .. }), "{err}");
        assert_eq!(server.join().unwrap(), 3);
    }

    #[test]
    fn not_found_is_not_retried() {
        let (url, server) = serve(vec![http("404 Not Found", "", "")]);
        let (start, end) = january();
        let err = local_provider(url).fetch("NOPE", start, end).unwrap_err();
        assert!(matches!(err, DataError::SymbolNotFound { ref symbol } if symbol == "NOPE"), "{err}");
        assert_eq!(server.join().unwrap(), 1);
    }
}
