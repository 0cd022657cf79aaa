mod common;

use common::{harness, settings};
use signalbot::application::strategies::ml_signal;
use signalbot::domain::ports::BarSource;
use signalbot::domain::trading::{Direction, SignalLevels};
use signalbot::infrastructure::mock::MockMarketSource;

#[tokio::test]
async fn test_signal_request_end_to_end() {
    let h = harness("e2e", MockMarketSource::trending("BTC/USDT", 720, 1.0), settings());
    let mut ctx = h.service.new_context(42);

    let outcome = h.service.handle_signal(&mut ctx, "btc").await;

    let signal = outcome.delivered.expect("a signal should be delivered");
    assert_eq!(signal.symbol, "BTC/USDT");
    assert_eq!(signal.signal, Direction::Long);
    assert!(signal.take_profit > signal.current_price);
    assert!(signal.current_price > signal.stop_loss);
    assert!(signal.entry_range.0 < signal.current_price);
    assert!(signal.entry_range.1 > signal.current_price);
    assert!(outcome.retrain.is_none());

    // model trained on first use and persisted
    assert!(h.dir.join("model.json").exists());
    assert!(h.dir.join("all_tickers_data.parquet").exists());

    let records = h.log.read_all().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].symbol, "BTC/USDT");
    assert_eq!(records[0].signal, "Long");

    let texts = h.transport.texts_for(42).await;
    assert!(texts.iter().any(|t| t.starts_with("Signal for BTC/USDT")));
    assert!(texts.iter().any(|t| t.starts_with("Current trend for BTC/USDT")));

    // the ML prediction is remembered for scoring on the next bar
    assert!(ctx.retrain.has_pending("BTC/USDT"));
}

#[tokio::test]
async fn test_second_request_reuses_snapshot_and_model() {
    let h = harness("e2e_reuse", MockMarketSource::trending("BTC/USDT", 720, 1.0), settings());
    let mut ctx = h.service.new_context(1);

    h.service.handle_signal(&mut ctx, "BTC").await;
    let first_model = h.store.current().await.expect("model loaded").id;

    h.source.extend("BTC/USDT", 1);
    let outcome = h.service.handle_signal(&mut ctx, "BTC").await;

    assert!(outcome.delivered.is_some());
    assert_eq!(h.store.current().await.unwrap().id, first_model);
    assert_eq!(h.log.read_all().unwrap().len(), 2);
}

#[tokio::test]
async fn test_exchange_down_replies_and_logs_nothing() {
    let h = harness("e2e_down", MockMarketSource::failing(), settings());
    let mut ctx = h.service.new_context(7);

    let outcome = h.service.handle_signal(&mut ctx, "BTC").await;

    assert!(outcome.delivered.is_none());
    assert!(!h.log.path().exists());
    let texts = h.transport.texts_for(7).await;
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("Could not get market data for BTC/USDT"));
}

#[tokio::test]
async fn test_short_history_falls_back_to_average_price() {
    // too few bars for any complete indicator row, enough for the average
    let h = harness("e2e_short", MockMarketSource::trending("BTC/USDT", 20, 1.0), settings());
    let mut ctx = h.service.new_context(3);

    let outcome = h.service.handle_signal(&mut ctx, "BTC").await;

    let signal = outcome.delivered.expect("average-price signal still delivered");
    assert_eq!(signal.symbol, "BTC/USDT");
    let texts = h.transport.texts_for(3).await;
    assert!(texts.iter().any(|t| t.contains("model is unavailable")));
    assert!(!ctx.retrain.has_pending("BTC/USDT"));
}

#[tokio::test]
async fn test_model_predicts_long_on_rising_series() {
    let h = harness("e2e_model", MockMarketSource::trending("BTC/USDT", 720, 1.0), settings());
    let symbols = vec!["BTC/USDT".to_string()];

    let bundle = h
        .store
        .load_or_train(&symbols, h.cache.as_ref())
        .await
        .expect("model trains on the mock series");
    let bars = h
        .cache
        .get_bars("BTC/USDT", settings().timeframe, 720)
        .await
        .unwrap();
    assert_eq!(bars.len(), 720);

    let min_bars = h.cache.engine().config().min_bars();
    let signal = ml_signal::generate(&bundle, &bars, "BTC/USDT", SignalLevels::default(), min_bars)
        .expect("model signal on a full history");
    assert_eq!(signal.signal, Direction::Long);
}

#[tokio::test]
async fn test_unlisted_token_is_rejected_before_fetching_bars() {
    let h = harness("e2e_unlisted", MockMarketSource::trending("BTC/USDT", 720, 1.0), settings());
    let mut ctx = h.service.new_context(11);

    let outcome = h.service.handle_signal(&mut ctx, "doge").await;

    assert!(outcome.delivered.is_none());
    assert_eq!(h.source.ohlcv_calls(), 0);
    assert!(!h.log.path().exists());
    let texts = h.transport.texts_for(11).await;
    assert_eq!(texts, vec!["Token DOGE/USDT is not available on the exchange."]);
}
