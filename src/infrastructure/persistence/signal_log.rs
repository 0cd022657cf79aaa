use crate::domain::trading::SignalInfo;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// One CSV row. Field order is the column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub timestamp: String,
    pub symbol: String,
    pub signal: String,
    pub entry_range_low: String,
    pub entry_range_high: String,
    pub take_profit: String,
    pub stop_loss: String,
    pub current_price: String,
}

impl From<&SignalInfo> for SignalRecord {
    fn from(info: &SignalInfo) -> Self {
        Self {
            timestamp: info.timestamp.to_rfc3339(),
            symbol: info.symbol.clone(),
            signal: info.signal.to_string(),
            entry_range_low: info.entry_range.0.to_string(),
            entry_range_high: info.entry_range.1.to_string(),
            take_profit: info.take_profit.to_string(),
            stop_loss: info.stop_loss.to_string(),
            current_price: info.current_price.to_string(),
        }
    }
}

/// Append-only CSV log of delivered signals.
pub struct SignalLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SignalLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one row; the header is written only when the file is new.
    ///
    /// File I/O runs on the blocking pool while the write lock is held.
    pub async fn append(&self, info: &SignalInfo) -> Result<()> {
        let _guard = self.lock.lock().await;

        let record = SignalRecord::from(info);
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_row(&path, &record))
            .await
            .context("signal log write task failed")??;

        debug!("SignalLog: logged {} {}", info.symbol, info.signal);
        Ok(())
    }

    /// Reads every logged row back.
    pub fn read_all(&self) -> Result<Vec<SignalRecord>> {
        let mut rdr = csv::Reader::from_path(&self.path)
            .with_context(|| format!("open signal log {:?}", self.path))?;
        rdr.deserialize()
            .collect::<Result<Vec<SignalRecord>, csv::Error>>()
            .context("parse signal log")
    }
}

fn write_row(path: &Path, record: &SignalRecord) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("create {:?}", parent))?;
    }
    let file_exists = path.exists();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open signal log {:?}", path))?;

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);
    wtr.serialize(record).context("serialize signal record")?;
    wtr.flush().context("flush signal log")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trading::{Direction, SignalLevels};
    use chrono::Utc;
    use std::sync::Arc;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("signalbot_log_{}_{}", std::process::id(), name))
            .join("signals.csv")
    }

    fn info(price: f64) -> SignalInfo {
        SignalInfo::from_price(
            "BTC/USDT",
            Direction::Long,
            price,
            SignalLevels::default(),
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_header_written_once() {
        let path = temp_path("header");
        let _ = std::fs::remove_file(&path);
        let log = SignalLog::new(&path);
        log.append(&info(100.0)).await.unwrap();
        log.append(&info(101.0)).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "timestamp,symbol,signal,entry_range_low,entry_range_high,take_profit,stop_loss,current_price"
        );
        let rows = log.read_all().unwrap();
        assert_eq!(rows[1].current_price, "101");
        assert_eq!(rows[0].take_profit, "102.00");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_are_serialized() {
        let path = temp_path("concurrent");
        let _ = std::fs::remove_file(&path);
        let log = Arc::new(SignalLog::new(&path));

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let log = log.clone();
                tokio::spawn(async move { log.append(&info(100.0 + i as f64)).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let rows = log.read_all().unwrap();
        assert_eq!(rows.len(), 20);
        assert!(rows.iter().all(|r| r.symbol == "BTC/USDT"));
    }
}
