//! Error types for the MA60 monitor.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the monitor.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Missing or invalid configuration (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persisted state exists but could not be read or parsed
    #[error("Failed to load state from {path:?}: {source}")]
    StateLoad {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// State could not be serialized or written
    #[error("Failed to save state to {path:?}: {source}")]
    StateSave {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A single symbol's candles could not be retrieved
    #[error("Fetch failed for {symbol}: {reason}")]
    Fetch { symbol: String, reason: String },

    /// The exchange answered 418/429; the symbol is skipped
    #[error("Rate limited by exchange, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// IP ban too long to wait out; the rest of the scan is abandoned
    #[error("Banned by exchange for {retry_after:?}")]
    Banned { retry_after: Duration },

    /// Webhook delivery failure
    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl MonitorError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn fetch(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fetch {
            symbol: symbol.into(),
            reason: reason.into(),
        }
    }

    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::Delivery(msg.into())
    }

    pub fn state_load<E>(path: impl Into<PathBuf>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::StateLoad {
            path: path.into(),
            source: Box::new(source),
        }
    }

    pub fn state_save<E>(path: impl Into<PathBuf>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::StateSave {
            path: path.into(),
            source: Box::new(source),
        }
    }
}

/// Result type alias using MonitorError.
pub type Result<T> = std::result::Result<T, MonitorError>;
