use super::indicators::IndicatorEngine;
use crate::domain::errors::SignalError;
use crate::domain::market::{AnnotatedBar, Bar, RawCandle, Timeframe};
use crate::domain::ports::{BarSource, MarketDataSource, SnapshotStore};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Snapshot-first bar source.
///
/// Rows already in the snapshot are served without touching the exchange.
/// Fetched history is coerced, annotated and appended; upstream and storage
/// errors never escape as anything but `DataUnavailable`.
pub struct MarketDataCache {
    upstream: Arc<dyn MarketDataSource>,
    snapshot: Arc<dyn SnapshotStore>,
    engine: IndicatorEngine,
}

impl MarketDataCache {
    pub fn new(
        upstream: Arc<dyn MarketDataSource>,
        snapshot: Arc<dyn SnapshotStore>,
        engine: IndicatorEngine,
    ) -> Self {
        Self {
            upstream,
            snapshot,
            engine,
        }
    }

    pub fn engine(&self) -> &IndicatorEngine {
        &self.engine
    }

    /// Known exchange symbols, for validating tracked symbols.
    pub async fn markets(&self) -> Result<HashSet<String>, SignalError> {
        self.upstream
            .fetch_markets()
            .await
            .map_err(|e| SignalError::data_unavailable("*", e))
    }

    /// Always fetches upstream and appends only bars newer than the latest cached one.
    ///
    /// Returns the merged history re-annotated end to end, so indicators on the
    /// new bars see the full preceding window.
    pub async fn refresh(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<AnnotatedBar>, SignalError> {
        let cached = self.load_cached(symbol).await?;
        let latest = cached.last().map(|r| r.bar.timestamp);

        let fetched = self.fetch_bars(symbol, timeframe, limit).await?;
        let fresh: Vec<Bar> = fetched
            .into_iter()
            .filter(|b| latest.is_none_or(|ts| b.timestamp > ts))
            .collect();

        if fresh.is_empty() {
            debug!("MarketDataCache: {} is up to date", symbol);
            if cached.is_empty() {
                return Err(SignalError::data_unavailable(symbol, "no candles returned"));
            }
            return Ok(cached);
        }

        let fresh_keys: HashSet<i64> = fresh.iter().map(|b| b.timestamp).collect();
        let merged: Vec<Bar> = cached.into_iter().map(|r| r.bar).chain(fresh).collect();
        let annotated = self.engine.annotate(merged)?;

        let new_rows: Vec<AnnotatedBar> = annotated
            .iter()
            .filter(|r| fresh_keys.contains(&r.bar.timestamp))
            .cloned()
            .collect();
        self.persist(symbol, &new_rows).await;

        Ok(annotated)
    }

    async fn load_cached(&self, symbol: &str) -> Result<Vec<AnnotatedBar>, SignalError> {
        self.snapshot.load_symbol(symbol).await.map_err(|e| {
            warn!("MarketDataCache: snapshot unreadable for {}: {:#}", symbol, e);
            SignalError::data_unavailable(symbol, format!("snapshot unreadable: {}", e))
        })
    }

    async fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Bar>, SignalError> {
        info!(
            "MarketDataCache: fetching {} {} bars for {}",
            limit, timeframe, symbol
        );
        let raw = self
            .upstream
            .fetch_ohlcv(symbol, timeframe, limit)
            .await
            .map_err(|e| {
                warn!("MarketDataCache: upstream failed for {}: {}", symbol, e);
                SignalError::data_unavailable(symbol, e)
            })?;

        Ok(coerce_candles(symbol, &raw))
    }

    async fn persist(&self, symbol: &str, rows: &[AnnotatedBar]) {
        match self.snapshot.append(rows).await {
            Ok(n) => debug!("MarketDataCache: stored {} new rows for {}", n, symbol),
            Err(e) => warn!(
                "MarketDataCache: failed to append {} rows for {}: {:#}",
                rows.len(),
                symbol,
                e
            ),
        }
    }
}

#[async_trait]
impl BarSource for MarketDataCache {
    async fn get_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<AnnotatedBar>, SignalError> {
        let cached = self.load_cached(symbol).await?;
        if !cached.is_empty() {
            debug!(
                "MarketDataCache: serving {} cached rows for {}",
                cached.len(),
                symbol
            );
            return Ok(cached);
        }

        let bars = self.fetch_bars(symbol, timeframe, limit).await?;
        if bars.is_empty() {
            return Err(SignalError::data_unavailable(symbol, "no valid candles returned"));
        }

        let annotated = self.engine.annotate(bars)?;
        self.persist(symbol, &annotated).await;
        Ok(annotated)
    }
}

/// Coerces raw candles, dropping incomplete rows with a warning.
pub fn coerce_candles(symbol: &str, raw: &[RawCandle]) -> Vec<Bar> {
    let bars: Vec<Bar> = raw.iter().filter_map(|c| c.coerce(symbol)).collect();
    let dropped = raw.len() - bars.len();
    if dropped > 0 {
        warn!(
            "MarketDataCache: dropped {} of {} candles for {} with missing or non-numeric fields",
            dropped,
            raw.len(),
            symbol
        );
    }
    bars
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mock::{InMemorySnapshot, MockMarketSource};

    fn cache(source: Arc<MockMarketSource>, snapshot: Arc<InMemorySnapshot>) -> MarketDataCache {
        MarketDataCache::new(source, snapshot, IndicatorEngine::default())
    }

    #[tokio::test]
    async fn test_miss_fetches_and_appends() {
        let source = Arc::new(MockMarketSource::trending("BTC/USDT", 60, 0.5));
        let snapshot = Arc::new(InMemorySnapshot::default());
        let cache = cache(source.clone(), snapshot.clone());

        let bars = cache
            .get_bars("BTC/USDT", Timeframe::OneHour, 60)
            .await
            .unwrap();
        assert_eq!(bars.len(), 60);
        assert!(bars.iter().all(|b| b.bar.symbol == "BTC/USDT"));
        assert_eq!(snapshot.len().await, 60);
        assert_eq!(source.ohlcv_calls(), 1);
    }

    #[tokio::test]
    async fn test_hit_makes_no_network_call() {
        let source = Arc::new(MockMarketSource::trending("BTC/USDT", 60, 0.5));
        let snapshot = Arc::new(InMemorySnapshot::default());
        let cache = cache(source.clone(), snapshot.clone());

        cache.get_bars("BTC/USDT", Timeframe::OneHour, 60).await.unwrap();
        let again = cache.get_bars("BTC/USDT", Timeframe::OneHour, 60).await.unwrap();
        assert_eq!(again.len(), 60);
        assert_eq!(source.ohlcv_calls(), 1);
        assert_eq!(snapshot.len().await, 60);
    }

    #[tokio::test]
    async fn test_upstream_failure_is_data_unavailable() {
        let source = Arc::new(MockMarketSource::failing());
        let cache = cache(source, Arc::new(InMemorySnapshot::default()));
        let err = cache
            .get_bars("BTC/USDT", Timeframe::OneHour, 60)
            .await
            .unwrap_err();
        assert!(matches!(err, SignalError::DataUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_unreadable_snapshot_is_data_unavailable() {
        let source = Arc::new(MockMarketSource::trending("BTC/USDT", 60, 0.5));
        let snapshot = Arc::new(InMemorySnapshot::default());
        snapshot.set_corrupt(true);
        let cache = cache(source, snapshot);
        let err = cache
            .get_bars("BTC/USDT", Timeframe::OneHour, 60)
            .await
            .unwrap_err();
        assert!(matches!(err, SignalError::DataUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_refresh_appends_only_newer_bars() {
        let source = Arc::new(MockMarketSource::trending("BTC/USDT", 50, 0.5));
        let snapshot = Arc::new(InMemorySnapshot::default());
        let cache = cache(source.clone(), snapshot.clone());

        cache.get_bars("BTC/USDT", Timeframe::OneHour, 50).await.unwrap();
        assert_eq!(snapshot.len().await, 50);

        source.extend("BTC/USDT", 5);
        let merged = cache.refresh("BTC/USDT", Timeframe::OneHour, 55).await.unwrap();
        assert_eq!(merged.len(), 55);
        assert_eq!(snapshot.len().await, 55);
        assert!(merged.windows(2).all(|w| w[0].bar.timestamp < w[1].bar.timestamp));
        assert!(merged.last().unwrap().indicators.is_complete());
    }

    #[test]
    fn test_coerce_drops_bad_rows() {
        use serde_json::json;
        let good = RawCandle {
            timestamp: json!(1),
            open: json!("1.0"),
            high: json!(2.0),
            low: json!(0.5),
            close: json!(1.5),
            volume: json!(10),
        };
        let bad = RawCandle {
            close: json!("n/a"),
            ..good.clone()
        };
        let bars = coerce_candles("ETH/USDT", &[good, bad]);
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].open, 1.0);
    }
}
