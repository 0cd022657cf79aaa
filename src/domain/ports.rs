use crate::domain::errors::{SignalError, UpstreamError};
use crate::domain::market::{AnnotatedBar, RawCandle, Timeframe};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;

/// Exchange connectivity: market listing and OHLCV history.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch_markets(&self) -> Result<HashSet<String>, UpstreamError>;
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<RawCandle>, UpstreamError>;
}

/// Indicator-annotated history for a symbol, as consumed by training.
#[async_trait]
pub trait BarSource: Send + Sync {
    async fn get_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<AnnotatedBar>, SignalError>;
}

/// Outbound side of the chat transport.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()>;

    /// Token picker for `tracked` symbols: one signal action per symbol plus clear.
    async fn send_menu(&self, chat_id: i64, tracked: &[String]) -> Result<()>;
}

/// Durable, append-only store of annotated bars keyed by `(symbol, timestamp)`.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// All rows for `symbol`, ordered by timestamp. Empty when none are stored.
    async fn load_symbol(&self, symbol: &str) -> Result<Vec<AnnotatedBar>>;

    /// Appends rows whose key is not yet present. Returns how many were written.
    async fn append(&self, rows: &[AnnotatedBar]) -> Result<usize>;
}
