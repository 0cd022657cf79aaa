//! Binance spot market data over the public REST API.
//!
//! Only the two unauthenticated endpoints the pipeline needs: `exchangeInfo`
//! for the tradable symbol list and `klines` for OHLCV history.

use crate::domain::errors::UpstreamError;
use crate::domain::market::symbol::to_exchange_symbol;
use crate::domain::market::{RawCandle, Timeframe};
use crate::domain::ports::MarketDataSource;
use crate::infrastructure::core::http_client_factory::{
    HttpClientConfig, HttpClientFactory, build_url_with_query,
};
use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Binance caps a single klines request at this many bars.
const MAX_KLINES: usize = 1000;

pub struct BinanceMarketSource {
    client: ClientWithMiddleware,
    base_url: String,
}

impl BinanceMarketSource {
    pub fn new(base_url: impl Into<String>, http: &HttpClientConfig) -> Self {
        Self {
            client: HttpClientFactory::create_client(http),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, UpstreamError> {
        let url = build_url_with_query(&format!("{}{}", self.base_url, path), params)
            .map_err(|e| UpstreamError::Exchange(format!("invalid url for {}: {}", path, e)))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| UpstreamError::Network(format!("{} request failed: {}", path, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Exchange(format!(
                "{} returned {}: {}",
                path, status, body
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| UpstreamError::Exchange(format!("failed to parse {}: {}", path, e)))
    }
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    status: String,
    #[serde(rename = "baseAsset")]
    base_asset: String,
    #[serde(rename = "quoteAsset")]
    quote_asset: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

/// Kline arrays are `[open_time, open, high, low, close, volume, ...]`, prices as strings.
fn kline_to_candle(kline: &Value) -> Option<RawCandle> {
    let fields = kline.as_array()?;
    let field = |i: usize| fields.get(i).cloned().unwrap_or(Value::Null);
    Some(RawCandle {
        timestamp: field(0),
        open: field(1),
        high: field(2),
        low: field(3),
        close: field(4),
        volume: field(5),
    })
}

#[async_trait]
impl MarketDataSource for BinanceMarketSource {
    async fn fetch_markets(&self) -> Result<HashSet<String>, UpstreamError> {
        info!("BinanceMarketSource: fetching exchangeInfo");
        let info: ExchangeInfo = self.get_json("/api/v3/exchangeInfo", &[]).await?;

        let markets: HashSet<String> = info
            .symbols
            .into_iter()
            .filter(|s| s.status == "TRADING")
            .map(|s| format!("{}/{}", s.base_asset, s.quote_asset))
            .collect();
        debug!("BinanceMarketSource: {} tradable symbols", markets.len());
        Ok(markets)
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<RawCandle>, UpstreamError> {
        let api_symbol = to_exchange_symbol(symbol);
        let limit = limit.clamp(1, MAX_KLINES).to_string();
        let klines: Vec<Value> = self
            .get_json(
                "/api/v3/klines",
                &[
                    ("symbol", api_symbol.as_str()),
                    ("interval", timeframe.to_binance_string()),
                    ("limit", limit.as_str()),
                ],
            )
            .await?;

        let candles: Vec<RawCandle> = klines.iter().filter_map(kline_to_candle).collect();
        if candles.len() < klines.len() {
            warn!(
                "BinanceMarketSource: {} malformed klines for {}",
                klines.len() - candles.len(),
                symbol
            );
        }
        debug!("BinanceMarketSource: {} klines for {}", candles.len(), symbol);
        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kline_to_candle() {
        let kline = json!([1700000000000i64, "100.5", "101.0", "99.0", "100.8", "1234.5", 1700003599999i64]);
        let candle = kline_to_candle(&kline).unwrap();
        let bar = candle.coerce("BTC/USDT").unwrap();
        assert_eq!(bar.timestamp, 1_700_000_000_000);
        assert_eq!(bar.open, 100.5);
        assert_eq!(bar.volume, 1234.5);

        // short rows become missing fields, not a panic
        let short = kline_to_candle(&json!([1, "1.0"])).unwrap();
        assert!(short.coerce("BTC/USDT").is_none());
        assert!(kline_to_candle(&json!({"a": 1})).is_none());
    }

    #[test]
    fn test_exchange_info_parsing() {
        let body = json!({
            "symbols": [
                {"symbol": "BTCUSDT", "status": "TRADING", "baseAsset": "BTC", "quoteAsset": "USDT"},
                {"symbol": "LUNAUSDT", "status": "BREAK", "baseAsset": "LUNA", "quoteAsset": "USDT"}
            ]
        });
        let info: ExchangeInfo = serde_json::from_value(body).unwrap();
        let trading: Vec<_> = info.symbols.iter().filter(|s| s.status == "TRADING").collect();
        assert_eq!(trading.len(), 1);
        assert_eq!(trading[0].base_asset, "BTC");
    }
}
