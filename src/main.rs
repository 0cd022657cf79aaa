use anyhow::{Context, Result};
use signalbot::application::market_data::indicators::IndicatorEngine;
use signalbot::application::market_data::snapshot_cache::MarketDataCache;
use signalbot::application::ml::classifier_store::ClassifierStore;
use signalbot::application::session::{SessionManager, SignalService};
use signalbot::config::{Config, Mode};
use signalbot::domain::ports::{ChatTransport, MarketDataSource};
use signalbot::infrastructure::binance::BinanceMarketSource;
use signalbot::infrastructure::mock::MockMarketSource;
use signalbot::infrastructure::persistence::parquet_snapshot::ParquetSnapshot;
use signalbot::infrastructure::persistence::signal_log::SignalLog;
use signalbot::infrastructure::telegram::TelegramTransport;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{Level, error, info, warn};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    info!("Starting signalbot...");
    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        "Mode: {:?}, timeframe: {}, limit: {}",
        config.mode, config.strategy.timeframe, config.strategy.limit
    );

    let upstream: Arc<dyn MarketDataSource> = match config.mode {
        Mode::Binance => Arc::new(BinanceMarketSource::new(
            &config.transport.binance_base_url,
            &config.transport.http_config(),
        )),
        Mode::Mock => {
            let mock = MockMarketSource::new();
            for symbol in &config.model.training_symbols {
                mock.add_series(
                    symbol,
                    config.strategy.limit,
                    100.0,
                    0.5,
                    config.strategy.timeframe.to_millis(),
                );
            }
            Arc::new(mock)
        }
    };

    let snapshot = Arc::new(ParquetSnapshot::new(&config.storage.snapshot_path));
    let cache = Arc::new(MarketDataCache::new(
        upstream,
        snapshot,
        IndicatorEngine::default(),
    ));
    let store = Arc::new(ClassifierStore::new(
        &config.storage.model_path,
        config.training_params(),
    ));

    match store
        .load_or_train(&config.model.training_symbols, cache.as_ref())
        .await
    {
        Ok(bundle) => info!(
            "Model ready: {} rows, trained {}",
            bundle.training_rows, bundle.trained_at
        ),
        Err(e) => warn!("Model not ready at startup, will retry on first signal: {}", e),
    }

    let token = config
        .transport
        .telegram_token
        .clone()
        .context("TELEGRAM_TOKEN not found in environment variables")?;
    let telegram = Arc::new(TelegramTransport::new(
        &config.transport.telegram_api_url,
        &token,
        config.transport.poll_timeout_secs,
        &config.transport.http_config(),
    ));
    let transport: Arc<dyn ChatTransport> = telegram.clone();

    let service = Arc::new(SignalService::new(
        cache,
        store,
        Arc::new(SignalLog::new(&config.storage.signal_log_path)),
        transport,
        config.model.training_symbols.clone(),
        config.session_settings(),
    ));
    let manager = Arc::new(SessionManager::new(service, config.strategy.session_idle));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller = tokio::spawn(telegram.run_polling(manager.clone(), shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested");
    let _ = shutdown_tx.send(true);
    if let Err(e) = poller.await {
        error!("Polling task failed: {}", e);
    }
    manager.shutdown().await;
    info!("Bot stopped.");
    Ok(())
}
