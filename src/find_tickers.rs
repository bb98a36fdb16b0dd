use crate::errors::Result;
use crate::klines::BinanceClient;
use crate::market::SymbolLister;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

const QUOTE_ASSET: &str = "USDT";
const TRADING_STATUS: &str = "TRADING";

#[derive(Deserialize, Debug)]
pub(crate) struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SymbolInfo {
    pub symbol: String,
    pub status: String,
    pub quote_asset: String,
    #[serde(default)]
    pub is_spot_trading_allowed: bool,
}

impl SymbolInfo {
    fn is_eligible(&self) -> bool {
        self.quote_asset == QUOTE_ASSET && self.status == TRADING_STATUS && self.is_spot_trading_allowed
    }
}

pub(crate) fn eligible_symbols(info: ExchangeInfo) -> Vec<String> {
    info.symbols
        .into_iter()
        .filter(SymbolInfo::is_eligible)
        .map(|s| s.symbol)
        .collect()
}

#[async_trait]
impl SymbolLister for BinanceClient {
    async fn eligible_symbols(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/v3/exchangeInfo", self.base_url);
        let info: ExchangeInfo = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let total = info.symbols.len();
        let symbols = eligible_symbols(info);
        info!(total, eligible = symbols.len(), "Fetched exchange info");
        Ok(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_usdt_spot_trading() {
        let raw = r#"{
            "timezone": "UTC",
            "symbols": [
                {"symbol": "BTCUSDT", "status": "TRADING", "baseAsset": "BTC", "quoteAsset": "USDT", "isSpotTradingAllowed": true},
                {"symbol": "ETHBTC", "status": "TRADING", "baseAsset": "ETH", "quoteAsset": "BTC", "isSpotTradingAllowed": true},
                {"symbol": "LUNAUSDT", "status": "BREAK", "baseAsset": "LUNA", "quoteAsset": "USDT", "isSpotTradingAllowed": true},
                {"symbol": "XYZUSDT", "status": "TRADING", "baseAsset": "XYZ", "quoteAsset": "USDT", "isSpotTradingAllowed": false},
                {"symbol": "OLDUSDT", "status": "TRADING", "baseAsset": "OLD", "quoteAsset": "USDT"},
                {"symbol": "SOLUSDT", "status": "TRADING", "baseAsset": "SOL", "quoteAsset": "USDT", "isSpotTradingAllowed": true}
            ]
        }"#;

        let info: ExchangeInfo = serde_json::from_str(raw).unwrap();
        assert_eq!(eligible_symbols(info), vec!["BTCUSDT", "SOLUSDT"]);
    }
}
