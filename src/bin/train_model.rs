use anyhow::{Context, Result};
use clap::Parser;
use signalbot::application::market_data::indicators::IndicatorEngine;
use signalbot::application::market_data::snapshot_cache::MarketDataCache;
use signalbot::application::ml::classifier_store::{ClassifierStore, TrainingParams};
use signalbot::domain::market::Timeframe;
use signalbot::infrastructure::binance::BinanceMarketSource;
use signalbot::infrastructure::core::http_client_factory::HttpClientConfig;
use signalbot::infrastructure::persistence::parquet_snapshot::ParquetSnapshot;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

/// Trains the direction classifier offline and writes the model file.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Comma-separated symbols to pool for training
    #[arg(long, value_delimiter = ',', default_value = "BTC/USDT,ETH/USDT,BNB/USDT,SOL/USDT,XRP/USDT")]
    symbols: Vec<String>,

    /// Bar timeframe (1m, 5m, 15m, 1h, 4h, 1d)
    #[arg(long, default_value = "1d")]
    timeframe: Timeframe,

    /// Bars to fetch per symbol
    #[arg(long, default_value_t = 500)]
    limit: usize,

    /// Path to output model file
    #[arg(long, default_value = "data/model.json")]
    output: PathBuf,

    /// Parquet snapshot used as the bar cache
    #[arg(long, default_value = "data/all_tickers_data.parquet")]
    snapshot: PathBuf,

    /// Exchange REST endpoint
    #[arg(long, default_value = "https://api.binance.com")]
    base_url: String,

    /// Number of trees in the random forest
    #[arg(long, default_value_t = 100)]
    n_trees: usize,

    /// Maximum depth of trees
    #[arg(long, default_value_t = 10)]
    max_depth: u16,

    /// Minimum samples required to split an internal node
    #[arg(long, default_value_t = 2)]
    min_split: usize,

    /// Seed for the train/test split and the forest
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let args = Args::parse();
    info!("Training on {:?} ({} x {})", args.symbols, args.limit, args.timeframe);

    let upstream = Arc::new(BinanceMarketSource::new(
        &args.base_url,
        &HttpClientConfig::default(),
    ));
    let cache = MarketDataCache::new(
        upstream,
        Arc::new(ParquetSnapshot::new(&args.snapshot)),
        IndicatorEngine::default(),
    );

    let store = ClassifierStore::new(
        &args.output,
        TrainingParams {
            n_trees: args.n_trees,
            max_depth: args.max_depth,
            min_samples_split: args.min_split,
            seed: args.seed,
            timeframe: args.timeframe,
            history_limit: args.limit,
            ..Default::default()
        },
    );

    let bundle = store
        .train(&args.symbols, &cache)
        .await
        .context("Training failed")?;
    store.save(&bundle).await.context("Failed to save model")?;

    println!("Model saved to {:?}", args.output);
    println!("  Rows:     {}", bundle.training_rows);
    println!("  Features: {}", bundle.feature_names.join(", "));
    match bundle.evaluation {
        Some(eval) => {
            println!("  Hold-out (n={}):", eval.test_rows);
            println!("    Accuracy:  {:.3}", eval.accuracy);
            println!("    Precision: {:.3}", eval.precision);
            println!("    Recall:    {:.3}", eval.recall);
            println!("    F1:        {:.3}", eval.f1);
        }
        None => println!("  No hold-out rows; evaluation skipped"),
    }
    Ok(())
}
