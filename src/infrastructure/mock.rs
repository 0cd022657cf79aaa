use crate::application::session::render::render_menu;
use crate::domain::errors::UpstreamError;
use crate::domain::market::{AnnotatedBar, RawCandle, Timeframe};
use crate::domain::ports::{ChatTransport, MarketDataSource, SnapshotStore};
use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

const SERIES_START_MS: i64 = 1_700_000_000_000;

#[derive(Debug, Clone, Copy)]
struct SeriesSpec {
    start_price: f64,
    step: f64,
    interval_ms: i64,
    len: usize,
}

/// Deterministic candle `i` of a drifting series.
///
/// Price moves by `step` on four bars out of five and by `-step` on the fifth,
/// plus a small sine wiggle that never flips the sign of a move.
pub fn synthetic_candle(i: usize, start_price: f64, step: f64, interval_ms: i64) -> RawCandle {
    let close_at = |k: usize| {
        let downs = (k + 1) / 5;
        start_price + step * (k as f64 - 2.0 * downs as f64) + 0.3 * step * (k as f64 * 0.37).sin()
    };
    let close = close_at(i);
    let open = if i == 0 { close } else { close_at(i - 1) };
    let wick = step.abs() * 0.5 + 0.1;
    RawCandle {
        timestamp: json!(SERIES_START_MS + i as i64 * interval_ms),
        open: json!(open),
        high: json!(open.max(close) + wick),
        low: json!(open.min(close) - wick),
        close: json!(close),
        volume: json!(100.0 + (i % 7) as f64 * 10.0),
    }
}

/// In-process exchange serving synthetic or scripted candles.
pub struct MockMarketSource {
    series: Mutex<HashMap<String, SeriesSpec>>,
    scripted: Mutex<HashMap<String, Vec<RawCandle>>>,
    fail: AtomicBool,
    ohlcv_calls: AtomicUsize,
}

impl Default for MockMarketSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMarketSource {
    pub fn new() -> Self {
        Self {
            series: Mutex::new(HashMap::new()),
            scripted: Mutex::new(HashMap::new()),
            fail: AtomicBool::new(false),
            ohlcv_calls: AtomicUsize::new(0),
        }
    }

    /// Hourly series of `len` bars starting at 100 with the given drift.
    pub fn trending(symbol: &str, len: usize, step: f64) -> Self {
        let source = Self::new();
        source.add_series(symbol, len, 100.0, step, Timeframe::OneHour.to_millis());
        source
    }

    pub fn failing() -> Self {
        let source = Self::new();
        source.set_failing(true);
        source
    }

    pub fn add_series(&self, symbol: &str, len: usize, start_price: f64, step: f64, interval_ms: i64) {
        if let Ok(mut series) = self.series.lock() {
            series.insert(
                symbol.to_string(),
                SeriesSpec {
                    start_price,
                    step,
                    interval_ms,
                    len,
                },
            );
        }
    }

    pub fn add_candles(&self, symbol: &str, candles: Vec<RawCandle>) {
        if let Ok(mut scripted) = self.scripted.lock() {
            scripted.insert(symbol.to_string(), candles);
        }
    }

    /// Grows a synthetic series by `n` bars.
    pub fn extend(&self, symbol: &str, n: usize) {
        if let Ok(mut series) = self.series.lock()
            && let Some(spec) = series.get_mut(symbol)
        {
            spec.len += n;
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn ohlcv_calls(&self) -> usize {
        self.ohlcv_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataSource for MockMarketSource {
    async fn fetch_markets(&self) -> Result<HashSet<String>, UpstreamError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(UpstreamError::Network("mock exchange offline".to_string()));
        }
        let mut markets: HashSet<String> = self
            .series
            .lock()
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default();
        if let Ok(scripted) = self.scripted.lock() {
            markets.extend(scripted.keys().cloned());
        }
        Ok(markets)
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        _timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<RawCandle>, UpstreamError> {
        self.ohlcv_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(UpstreamError::Network("mock exchange offline".to_string()));
        }

        let scripted = self
            .scripted
            .lock()
            .ok()
            .and_then(|s| s.get(symbol).cloned());
        if let Some(candles) = scripted {
            let skip = candles.len().saturating_sub(limit);
            return Ok(candles.into_iter().skip(skip).collect());
        }

        let spec = self.series.lock().ok().and_then(|s| s.get(symbol).copied());
        let Some(spec) = spec else {
            return Err(UpstreamError::Exchange(format!("unknown symbol {}", symbol)));
        };

        let start = spec.len.saturating_sub(limit);
        debug!("MockMarketSource: serving bars {}..{} of {}", start, spec.len, symbol);
        Ok((start..spec.len)
            .map(|i| synthetic_candle(i, spec.start_price, spec.step, spec.interval_ms))
            .collect())
    }
}

/// Snapshot store kept in memory.
#[derive(Default)]
pub struct InMemorySnapshot {
    rows: RwLock<Vec<AnnotatedBar>>,
    corrupt: AtomicBool,
}

impl InMemorySnapshot {
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Makes every read fail, as an unreadable file would.
    pub fn set_corrupt(&self, corrupt: bool) {
        self.corrupt.store(corrupt, Ordering::SeqCst);
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshot {
    async fn load_symbol(&self, symbol: &str) -> Result<Vec<AnnotatedBar>> {
        if self.corrupt.load(Ordering::SeqCst) {
            bail!("snapshot is corrupt");
        }
        let mut rows: Vec<AnnotatedBar> = self
            .rows
            .read()
            .await
            .iter()
            .filter(|r| r.bar.symbol == symbol)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.bar.timestamp);
        Ok(rows)
    }

    async fn append(&self, rows: &[AnnotatedBar]) -> Result<usize> {
        let mut stored = self.rows.write().await;
        let mut keys: HashSet<(String, i64)> = stored
            .iter()
            .map(|r| (r.bar.symbol.clone(), r.bar.timestamp))
            .collect();
        let before = stored.len();
        for row in rows {
            if keys.insert((row.bar.symbol.clone(), row.bar.timestamp)) {
                stored.push(row.clone());
            }
        }
        Ok(stored.len() - before)
    }
}

/// Chat transport that records every outbound message.
#[derive(Default)]
pub struct RecordingTransport {
    sent: RwLock<Vec<(i64, String)>>,
}

impl RecordingTransport {
    pub async fn messages(&self) -> Vec<(i64, String)> {
        self.sent.read().await.clone()
    }

    pub async fn texts_for(&self, chat_id: i64) -> Vec<String> {
        self.sent
            .read()
            .await
            .iter()
            .filter(|(id, _)| *id == chat_id)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        self.sent.write().await.push((chat_id, text.to_string()));
        Ok(())
    }

    async fn send_menu(&self, chat_id: i64, tracked: &[String]) -> Result<()> {
        self.send_text(chat_id, &render_menu(tracked)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_drift_pattern() {
        let close = |i| synthetic_candle(i, 100.0, 1.0, 60_000).close.as_f64().unwrap();
        // every fifth move is down, the rest up
        for i in 1..40 {
            let up = close(i) > close(i - 1);
            assert_eq!(up, i % 5 != 4, "bar {}", i);
        }
    }

    #[tokio::test]
    async fn test_fetch_returns_tail() {
        let source = MockMarketSource::trending("BTC/USDT", 50, 1.0);
        let candles = source
            .fetch_ohlcv("BTC/USDT", Timeframe::OneHour, 10)
            .await
            .unwrap();
        assert_eq!(candles.len(), 10);
        assert_eq!(
            candles[0].timestamp,
            json!(SERIES_START_MS + 40 * Timeframe::OneHour.to_millis())
        );
        assert!(source.fetch_ohlcv("XRP/USDT", Timeframe::OneHour, 10).await.is_err());
        assert!(source.fetch_markets().await.unwrap().contains("BTC/USDT"));
    }
}
