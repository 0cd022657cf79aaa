#![allow(dead_code)]

use signalbot::application::market_data::indicators::IndicatorEngine;
use signalbot::application::market_data::snapshot_cache::MarketDataCache;
use signalbot::application::ml::classifier_store::{ClassifierStore, TrainingParams};
use signalbot::application::session::{SessionSettings, SignalService};
use signalbot::domain::market::Timeframe;
use signalbot::infrastructure::mock::{MockMarketSource, RecordingTransport};
use signalbot::infrastructure::persistence::parquet_snapshot::ParquetSnapshot;
use signalbot::infrastructure::persistence::signal_log::SignalLog;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_DIR: AtomicU64 = AtomicU64::new(0);

/// Fresh empty directory per call.
pub fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "signalbot_it_{}_{}_{}",
        name,
        std::process::id(),
        NEXT_DIR.fetch_add(1, Ordering::SeqCst)
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

pub fn training_params() -> TrainingParams {
    TrainingParams {
        n_trees: 20,
        timeframe: Timeframe::OneHour,
        history_limit: 720,
        ..Default::default()
    }
}

pub fn settings() -> SessionSettings {
    SessionSettings {
        timeframe: Timeframe::OneHour,
        limit: 720,
        ..Default::default()
    }
}

pub struct Harness {
    pub dir: PathBuf,
    pub source: Arc<MockMarketSource>,
    pub cache: Arc<MarketDataCache>,
    pub store: Arc<ClassifierStore>,
    pub log: Arc<SignalLog>,
    pub transport: Arc<RecordingTransport>,
    pub service: Arc<SignalService>,
}

/// Everything wired against an hourly mock exchange and files under a temp dir.
pub fn harness(name: &str, source: MockMarketSource, settings: SessionSettings) -> Harness {
    let dir = temp_dir(name);
    let source = Arc::new(source);
    let cache = Arc::new(MarketDataCache::new(
        source.clone(),
        Arc::new(ParquetSnapshot::new(dir.join("all_tickers_data.parquet"))),
        IndicatorEngine::default(),
    ));
    let store = Arc::new(ClassifierStore::new(dir.join("model.json"), training_params()));
    let log = Arc::new(SignalLog::new(dir.join("signal_log.csv")));
    let transport = Arc::new(RecordingTransport::default());
    let service = Arc::new(SignalService::new(
        cache.clone(),
        store.clone(),
        log.clone(),
        transport.clone(),
        vec!["BTC/USDT".to_string()],
        settings,
    ));
    Harness {
        dir,
        source,
        cache,
        store,
        log,
        transport,
        service,
    }
}
