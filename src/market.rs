//! Market data seams used by the analysis pass.

use crate::errors::Result;
use async_trait::async_trait;

/// One daily candle. Only the close matters to the MA60 logic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    pub open_time: i64,
    pub close: f64,
}

/// Supplies daily candles for a symbol.
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Returns up to `count` of the most recent daily candles, oldest first.
    async fn daily_candles(&self, symbol: &str, count: usize) -> Result<Vec<Candle>>;
}

/// Supplies the symbols eligible for analysis.
#[async_trait]
pub trait SymbolLister: Send + Sync {
    /// USDT-quoted symbols that are trading and spot-tradable.
    async fn eligible_symbols(&self) -> Result<Vec<String>>;
}
