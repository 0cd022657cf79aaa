use crate::domain::market::{AnnotatedBar, Bar, IndicatorSet, TrendLabel};
use crate::domain::ports::SnapshotStore;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

const INDICATOR_COLUMNS: [&str; 11] = [
    "rsi",
    "sma",
    "volatility",
    "market_volume",
    "macd",
    "macd_signal",
    "bb_upper",
    "bb_middle",
    "bb_lower",
    "atr",
    "adx",
];

/// Snapshot of every fetched bar and its indicators in a single Parquet file.
///
/// Appends rewrite the file through a temp file and rename, so readers only
/// ever see a complete file.
pub struct ParquetSnapshot {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ParquetSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SnapshotStore for ParquetSnapshot {
    async fn load_symbol(&self, symbol: &str) -> Result<Vec<AnnotatedBar>> {
        let path = self.path.clone();
        let symbol = symbol.to_string();
        tokio::task::spawn_blocking(move || {
            let mut rows: Vec<AnnotatedBar> = read_rows(&path)?
                .into_iter()
                .filter(|r| r.bar.symbol == symbol)
                .collect();
            rows.sort_by_key(|r| r.bar.timestamp);
            Ok(rows)
        })
        .await
        .context("snapshot read task failed")?
    }

    async fn append(&self, rows: &[AnnotatedBar]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let _guard = self.write_lock.lock().await;
        let path = self.path.clone();
        let incoming = rows.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut existing = read_rows(&path)?;
            let mut keys: HashSet<(String, i64)> = existing
                .iter()
                .map(|r| (r.bar.symbol.clone(), r.bar.timestamp))
                .collect();

            let before = existing.len();
            for row in incoming {
                if keys.insert((row.bar.symbol.clone(), row.bar.timestamp)) {
                    existing.push(row);
                }
            }
            let appended = existing.len() - before;
            if appended == 0 {
                debug!("ParquetSnapshot: nothing new to append");
                return Ok(0);
            }

            write_rows_atomic(&path, &existing)?;
            info!(
                "ParquetSnapshot: appended {} rows to {:?} ({} total)",
                appended,
                path,
                existing.len()
            );
            Ok(appended)
        })
        .await
        .context("snapshot write task failed")?
    }
}

fn read_rows(path: &Path) -> Result<Vec<AnnotatedBar>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).with_context(|| format!("open snapshot {:?}", path))?;
    let df = ParquetReader::new(file)
        .finish()
        .with_context(|| format!("read snapshot {:?}", path))?;
    dataframe_to_rows(&df)
}

fn write_rows_atomic(path: &Path, rows: &[AnnotatedBar]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("create {:?}", parent))?;
    }

    let mut df = rows_to_dataframe(rows)?;
    let tmp_path = path.with_extension("parquet.tmp");
    let file = File::create(&tmp_path).with_context(|| format!("create {:?}", tmp_path))?;
    if let Err(e) = ParquetWriter::new(file).finish(&mut df) {
        let _ = std::fs::remove_file(&tmp_path);
        bail!("write snapshot {:?}: {}", tmp_path, e);
    }
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("atomic rename to {:?}", path))?;
    Ok(())
}

fn indicator_values(set: &IndicatorSet) -> [Option<f64>; 11] {
    [
        set.rsi,
        set.sma,
        set.volatility,
        set.market_volume,
        set.macd,
        set.macd_signal,
        set.bb_upper,
        set.bb_middle,
        set.bb_lower,
        set.atr,
        set.adx,
    ]
}

fn rows_to_dataframe(rows: &[AnnotatedBar]) -> Result<DataFrame> {
    let f64_col = |name: &str, f: fn(&Bar) -> f64| {
        Column::new(name.into(), rows.iter().map(|r| f(&r.bar)).collect::<Vec<f64>>())
    };

    let mut columns = vec![
        Column::new(
            "timestamp".into(),
            rows.iter().map(|r| r.bar.timestamp).collect::<Vec<i64>>(),
        ),
        f64_col("open", |b| b.open),
        f64_col("high", |b| b.high),
        f64_col("low", |b| b.low),
        f64_col("close", |b| b.close),
        f64_col("volume", |b| b.volume),
        Column::new(
            "symbol".into(),
            rows.iter()
                .map(|r| r.bar.symbol.clone())
                .collect::<Vec<String>>(),
        ),
    ];

    for (i, name) in INDICATOR_COLUMNS.iter().enumerate() {
        let values: Vec<Option<f64>> = rows
            .iter()
            .map(|r| indicator_values(&r.indicators)[i])
            .collect();
        columns.push(Column::new((*name).into(), values));
    }

    columns.push(Column::new(
        "trend".into(),
        rows.iter()
            .map(|r| r.indicators.trend.map(|t| t.as_str()))
            .collect::<Vec<Option<&str>>>(),
    ));

    DataFrame::new(columns).context("build snapshot dataframe")
}

fn f64_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Float64Chunked> {
    df.column(name)
        .with_context(|| format!("missing column '{}'", name))?
        .f64()
        .with_context(|| format!("column '{}' is not f64", name))
}

fn dataframe_to_rows(df: &DataFrame) -> Result<Vec<AnnotatedBar>> {
    let timestamps = df
        .column("timestamp")
        .context("missing column 'timestamp'")?
        .i64()
        .context("column 'timestamp' is not i64")?;
    let symbols = df
        .column("symbol")
        .context("missing column 'symbol'")?
        .str()
        .context("column 'symbol' is not a string")?;
    let trends = df
        .column("trend")
        .context("missing column 'trend'")?
        .str()
        .context("column 'trend' is not a string")?;

    let open = f64_column(df, "open")?;
    let high = f64_column(df, "high")?;
    let low = f64_column(df, "low")?;
    let close = f64_column(df, "close")?;
    let volume = f64_column(df, "volume")?;
    let indicators = INDICATOR_COLUMNS
        .iter()
        .map(|name| f64_column(df, name))
        .collect::<Result<Vec<_>>>()?;

    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let (Some(timestamp), Some(symbol)) = (timestamps.get(i), symbols.get(i)) else {
            bail!("snapshot row {} has no key", i);
        };
        let (Some(o), Some(h), Some(l), Some(c), Some(v)) = (
            open.get(i),
            high.get(i),
            low.get(i),
            close.get(i),
            volume.get(i),
        ) else {
            bail!("snapshot row {} has missing OHLCV", i);
        };
        let ind = |k: usize| indicators[k].get(i);

        rows.push(AnnotatedBar {
            bar: Bar {
                symbol: symbol.to_string(),
                timestamp,
                open: o,
                high: h,
                low: l,
                close: c,
                volume: v,
            },
            indicators: IndicatorSet {
                rsi: ind(0),
                sma: ind(1),
                volatility: ind(2),
                market_volume: ind(3),
                macd: ind(4),
                macd_signal: ind(5),
                bb_upper: ind(6),
                bb_middle: ind(7),
                bb_lower: ind(8),
                atr: ind(9),
                adx: ind(10),
                trend: trends.get(i).and_then(TrendLabel::parse),
            },
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_path() -> PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir()
            .join(format!("signalbot_snapshot_{}_{}", std::process::id(), n))
            .join("snapshot.parquet")
    }

    fn row(symbol: &str, ts: i64, with_indicators: bool) -> AnnotatedBar {
        let indicators = if with_indicators {
            IndicatorSet {
                rsi: Some(55.0),
                sma: Some(100.0),
                adx: Some(30.0),
                trend: Some(TrendLabel::Trending),
                ..Default::default()
            }
        } else {
            IndicatorSet::default()
        };
        AnnotatedBar {
            bar: Bar {
                symbol: symbol.to_string(),
                timestamp: ts,
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.5,
                volume: 12.0,
            },
            indicators,
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let snapshot = ParquetSnapshot::new(temp_path());
        assert!(snapshot.load_symbol("BTC/USDT").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_and_load_preserves_nulls() {
        let snapshot = ParquetSnapshot::new(temp_path());
        let rows = vec![row("BTC/USDT", 2, true), row("BTC/USDT", 1, false)];
        assert_eq!(snapshot.append(&rows).await.unwrap(), 2);

        let loaded = snapshot.load_symbol("BTC/USDT").await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].bar.timestamp, 1);
        assert_eq!(loaded[0].indicators, IndicatorSet::default());
        assert_eq!(loaded[1].indicators.rsi, Some(55.0));
        assert_eq!(loaded[1].indicators.trend, Some(TrendLabel::Trending));
        assert_eq!(loaded[1].indicators.macd, None);
    }

    #[tokio::test]
    async fn test_append_skips_existing_keys_and_grows() {
        let snapshot = ParquetSnapshot::new(temp_path());
        snapshot
            .append(&[row("BTC/USDT", 1, false), row("ETH/USDT", 1, false)])
            .await
            .unwrap();
        let appended = snapshot
            .append(&[row("BTC/USDT", 1, true), row("BTC/USDT", 2, false)])
            .await
            .unwrap();
        assert_eq!(appended, 1);

        assert_eq!(snapshot.load_symbol("BTC/USDT").await.unwrap().len(), 2);
        assert_eq!(snapshot.load_symbol("ETH/USDT").await.unwrap().len(), 1);
        assert!(snapshot.load_symbol("SOL/USDT").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_error() {
        let path = temp_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"not parquet").unwrap();
        let snapshot = ParquetSnapshot::new(path);
        assert!(snapshot.load_symbol("BTC/USDT").await.is_err());
    }
}
