use crate::config::ExchangeConfig;
use crate::errors::{MonitorError, Result};
use crate::market::{Candle, CandleSource};
use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

const DAILY_INTERVAL: &str = "1d";
const OPEN_TIME_INDEX: usize = 0;
const CLOSE_INDEX: usize = 4;
/// Extra wait after an IP ban expires.
const BAN_GRACE: Duration = Duration::from_secs(5);
/// Longest ban the scan waits out. Longer bans abandon the pass.
pub const MAX_BAN_WAIT: Duration = Duration::from_secs(5 * 60);

static BAN_UNTIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"until\s+(\d+)").expect("static regex"));

/// Binance spot REST client. Implements both market data seams.
pub struct BinanceClient {
    pub(crate) http: Client,
    pub(crate) base_url: String,
}

impl BinanceClient {
    pub fn new(config: &ExchangeConfig, timeout: Duration) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(key) = &config.api_key {
            let value = reqwest::header::HeaderValue::from_str(key)
                .map_err(|_| MonitorError::config("BINANCE_API_KEY is not a valid header value"))?;
            headers.insert(reqwest::header::HeaderName::from_static("x-mbx-apikey"), value);
        }

        let http = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .pool_max_idle_per_host(8)
            .build()?;

        Ok(Self {
            http,
            base_url: config.rest_url.clone(),
        })
    }
}

#[async_trait]
impl CandleSource for BinanceClient {
    async fn daily_candles(&self, symbol: &str, count: usize) -> Result<Vec<Candle>> {
        let url = format!("{}/api/v3/klines", self.base_url);
        let query = [
            ("symbol", symbol.to_string()),
            ("interval", DAILY_INTERVAL.to_string()),
            ("limit", count.to_string()),
        ];

        let response = self.http.get(&url).query(&query).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let (error, wait) = error_for_status(symbol, status, &body, Utc::now().timestamp_millis());
            warn!(%symbol, %status, error = %error, "Kline request rejected");
            if !wait.is_zero() {
                warn!(?wait, "Waiting for exchange ban to expire");
                tokio::time::sleep(wait).await;
            }
            return Err(error);
        }

        let rows: Vec<Vec<Value>> = response.json().await?;
        let candles = parse_klines(symbol, &rows)?;
        debug!(
            %symbol,
            count = candles.len(),
            last_open_time = candles.last().map(|c| c.open_time),
            "Fetched daily candles"
        );
        Ok(candles)
    }
}

/// Maps a rejected kline response to the error the scan acts on and how long
/// to pause before the next request. Waits never exceed `MAX_BAN_WAIT`.
pub(crate) fn error_for_status(
    symbol: &str,
    status: StatusCode,
    body: &str,
    now_ms: i64,
) -> (MonitorError, Duration) {
    if status != StatusCode::IM_A_TEAPOT && status != StatusCode::TOO_MANY_REQUESTS {
        return (MonitorError::fetch(symbol, format!("HTTP {}", status)), Duration::ZERO);
    }

    match ban_wait(body, now_ms) {
        Some(wait) if wait > MAX_BAN_WAIT => (MonitorError::Banned { retry_after: wait }, Duration::ZERO),
        Some(wait) => (MonitorError::RateLimited { retry_after: wait }, wait),
        None => (
            MonitorError::RateLimited {
                retry_after: Duration::ZERO,
            },
            Duration::ZERO,
        ),
    }
}

/// Time left on a `-1003` IP ban (plus grace), if the body carries one that
/// has not yet expired. Binance embeds the expiry as epoch ms.
pub(crate) fn ban_wait(body: &str, now_ms: i64) -> Option<Duration> {
    if !body.contains("-1003") {
        return None;
    }
    let until = parse_ban_until(body)?;
    let remaining = until.checked_sub(u64::try_from(now_ms).ok()?)?;
    if remaining == 0 {
        return None;
    }
    Some(Duration::from_millis(remaining) + BAN_GRACE)
}

/// Converts raw kline rows (`[openTime, open, high, low, close, ...]`) into candles.
pub(crate) fn parse_klines(symbol: &str, rows: &[Vec<Value>]) -> Result<Vec<Candle>> {
    rows.iter()
        .map(|row| {
            let open_time = row
                .get(OPEN_TIME_INDEX)
                .and_then(Value::as_i64)
                .ok_or_else(|| MonitorError::fetch(symbol, "kline row without open time"))?;
            let close = row
                .get(CLOSE_INDEX)
                .and_then(close_price)
                .ok_or_else(|| MonitorError::fetch(symbol, "missing or unparseable close"))?;
            if !close.is_finite() || close <= 0.0 {
                return Err(MonitorError::fetch(
                    symbol,
                    format!("non-positive close {}", close),
                ));
            }
            Ok(Candle { open_time, close })
        })
        .collect()
}

// Binance sends decimals as strings
fn close_price(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

pub(crate) fn parse_ban_until(body: &str) -> Option<u64> {
    BAN_UNTIL_RE
        .captures(body)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(value: Value) -> Vec<Vec<Value>> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_parse_klines_string_closes() {
        let raw = rows(json!([
            [1700000000000i64, "1.0", "1.2", "0.9", "1.10000000", "100", 1700086399999i64, "0", 10, "0", "0", "0"],
            [1700086400000i64, "1.1", "1.3", "1.0", "1.25", "120", 1700172799999i64, "0", 12, "0", "0", "0"]
        ]));

        let candles = parse_klines("ABCUSDT", &raw).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open_time, 1700000000000);
        assert_eq!(candles[0].close, 1.1);
        assert_eq!(candles[1].close, 1.25);
    }

    #[test]
    fn test_parse_klines_rejects_bad_rows() {
        let empty_close = rows(json!([[1700000000000i64, "1", "1", "1", "", "0"]]));
        assert!(matches!(
            parse_klines("ABCUSDT", &empty_close),
            Err(MonitorError::Fetch { .. })
        ));

        let garbage = rows(json!([[1700000000000i64, "1", "1", "1", "abc", "0"]]));
        assert!(parse_klines("ABCUSDT", &garbage).is_err());

        let zero = rows(json!([[1700000000000i64, "1", "1", "1", "0.0", "0"]]));
        assert!(parse_klines("ABCUSDT", &zero).is_err());

        let short = rows(json!([[1700000000000i64, "1"]]));
        assert!(parse_klines("ABCUSDT", &short).is_err());
    }

    #[test]
    fn test_parse_ban_until() {
        let body = r#"{"code":-1003,"msg":"Way too much request weight used; IP banned until 1700000123456. Please use WebSocket Streams for live updates to avoid bans."}"#;
        assert_eq!(parse_ban_until(body), Some(1700000123456));
        assert_eq!(parse_ban_until(r#"{"code":-1003,"msg":"Too many requests"}"#), None);
    }

    const NOW_MS: i64 = 1_700_000_000_000;

    fn banned_body(until_ms: i64) -> String {
        format!(
            r#"{{"code":-1003,"msg":"Way too much request weight used; IP banned until {}. Please use WebSocket Streams for live updates to avoid bans."}}"#,
            until_ms
        )
    }

    #[test]
    fn test_ban_wait() {
        // 90s left
        assert_eq!(
            ban_wait(&banned_body(NOW_MS + 90_000), NOW_MS),
            Some(Duration::from_secs(95))
        );
        // Already expired
        assert_eq!(ban_wait(&banned_body(NOW_MS - 1), NOW_MS), None);
        assert_eq!(ban_wait(&banned_body(NOW_MS), NOW_MS), None);
        // No ban expiry in the body
        assert_eq!(ban_wait(r#"{"code":-1003,"msg":"Too many requests"}"#, NOW_MS), None);
        assert_eq!(ban_wait(r#"{"code":-1121,"msg":"banned until 1800000000000"}"#, NOW_MS), None);
    }

    #[test]
    fn test_short_ban_is_waited_out() {
        let body = banned_body(NOW_MS + 60_000);
        let (error, wait) = error_for_status("ABCUSDT", StatusCode::TOO_MANY_REQUESTS, &body, NOW_MS);
        assert_eq!(wait, Duration::from_secs(65));
        assert!(wait <= MAX_BAN_WAIT);
        assert!(matches!(error, MonitorError::RateLimited { retry_after } if retry_after == wait));
    }

    #[test]
    fn test_long_ban_abandons_scan_without_waiting() {
        let three_days = 3 * 24 * 3600 * 1000;
        let body = banned_body(NOW_MS + three_days);
        let (error, wait) = error_for_status("ABCUSDT", StatusCode::IM_A_TEAPOT, &body, NOW_MS);
        assert_eq!(wait, Duration::ZERO);
        match error {
            MonitorError::Banned { retry_after } => assert!(retry_after > MAX_BAN_WAIT),
            other => panic!("expected ban, got {:?}", other),
        }
    }

    #[test]
    fn test_rate_limit_without_expiry_skips_symbol() {
        let (error, wait) =
            error_for_status("ABCUSDT", StatusCode::TOO_MANY_REQUESTS, "slow down", NOW_MS);
        assert_eq!(wait, Duration::ZERO);
        assert!(matches!(error, MonitorError::RateLimited { retry_after } if retry_after.is_zero()));
    }

    #[test]
    fn test_other_statuses_are_fetch_errors() {
        for status in [StatusCode::BAD_REQUEST, StatusCode::NOT_FOUND, StatusCode::BAD_GATEWAY] {
            let (error, wait) = error_for_status("ABCUSDT", status, &banned_body(NOW_MS + 60_000), NOW_MS);
            assert_eq!(wait, Duration::ZERO);
            match error {
                MonitorError::Fetch { symbol, reason } => {
                    assert_eq!(symbol, "ABCUSDT");
                    assert!(reason.contains(status.as_str()));
                }
                other => panic!("expected fetch error, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_numeric_close_is_accepted() {
        let raw = rows(json!([[1700000000000i64, "1", "1", "1", 2.5, "0"]]));
        assert_eq!(parse_klines("ABCUSDT", &raw).unwrap()[0].close, 2.5);
    }
}
