//! Configuration loaded from environment variables.

use crate::errors::{MonitorError, Result};
use chrono::NaiveTime;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_REST_URL: &str = "https://api.binance.com";
const DEFAULT_STATE_FILE: &str = "state.json";
const DEFAULT_REPORT_TIME: &str = "08:00";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Exchange connection settings.
#[derive(Clone)]
pub struct ExchangeConfig {
    pub rest_url: String,
    /// Sent as `X-MBX-APIKEY` when present. Market data endpoints work without it.
    pub api_key: Option<String>,
    pub secret_key: Option<String>,
}

impl fmt::Debug for ExchangeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeConfig")
            .field("rest_url", &self.rest_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub exchange: ExchangeConfig,
    pub webhook_url: String,
    pub state_file: PathBuf,
    /// Local wall-clock time of the daily pass
    pub report_time: NaiveTime,
    /// Applies to every exchange and webhook request
    pub request_timeout: Duration,
    pub log_level: String,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let webhook_url = get("DINGTALK_WEBHOOK_URL")
            .ok_or_else(|| MonitorError::config("DINGTALK_WEBHOOK_URL is required"))?;
        if !webhook_url.starts_with("http://") && !webhook_url.starts_with("https://") {
            return Err(MonitorError::config(
                "DINGTALK_WEBHOOK_URL must be an http(s) URL",
            ));
        }

        let report_time_raw = get("REPORT_TIME").unwrap_or_else(|| DEFAULT_REPORT_TIME.to_string());
        let report_time = NaiveTime::parse_from_str(&report_time_raw, "%H:%M").map_err(|_| {
            MonitorError::config(format!("Invalid REPORT_TIME '{}', expected HH:MM", report_time_raw))
        })?;

        let request_timeout = match get("REQUEST_TIMEOUT_SECS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(MonitorError::config(format!(
                        "Invalid REQUEST_TIMEOUT_SECS '{}'",
                        raw
                    )));
                }
            },
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        Ok(Self {
            exchange: ExchangeConfig {
                rest_url: get("BINANCE_REST_URL")
                    .unwrap_or_else(|| DEFAULT_REST_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                api_key: get("BINANCE_API_KEY"),
                secret_key: get("BINANCE_SECRET_KEY"),
            },
            webhook_url,
            state_file: PathBuf::from(
                get("STATE_FILE").unwrap_or_else(|| DEFAULT_STATE_FILE.to_string()),
            ),
            report_time,
            request_timeout,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }
}
