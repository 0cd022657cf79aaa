mod common;

use common::{harness, settings, temp_dir, training_params};
use signalbot::application::ml::classifier_store::{
    ClassifierStore, TrainingParams, fit_bundle, load_bundle, save_bundle,
};
use signalbot::application::ml::feature_builder;
use signalbot::domain::errors::SignalError;
use signalbot::domain::ml::feature_registry::features_to_vector;
use signalbot::domain::ports::BarSource;
use signalbot::infrastructure::mock::MockMarketSource;
use std::sync::Arc;

fn btc() -> Vec<String> {
    vec!["BTC/USDT".to_string()]
}

#[tokio::test]
async fn test_saved_bundle_predicts_identically() {
    let h = harness("persist_roundtrip", MockMarketSource::trending("BTC/USDT", 720, 1.0), settings());
    let bars = h.cache.get_bars("BTC/USDT", settings().timeframe, 720).await.unwrap();
    let set = feature_builder::build(&bars);
    let bundle = fit_bundle(&set, &training_params()).unwrap();

    let path = h.dir.join("roundtrip.json");
    save_bundle(&bundle, &path).await.unwrap();
    let loaded = load_bundle(&path).await.unwrap().expect("file exists");

    assert_eq!(loaded.id, bundle.id);
    assert_eq!(loaded.feature_names, bundle.feature_names);
    assert_eq!(loaded.training_rows, bundle.training_rows);
    for row in bars.iter().filter_map(|b| features_to_vector(&b.indicators)).take(50) {
        assert_eq!(loaded.predict(&row).unwrap(), bundle.predict(&row).unwrap());
    }
}

#[tokio::test]
async fn test_missing_file_is_none() {
    let dir = temp_dir("persist_missing");
    assert!(load_bundle(&dir.join("model.json")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_corrupt_file_is_model_unavailable() {
    let dir = temp_dir("persist_corrupt");
    let path = dir.join("model.json");
    std::fs::write(&path, b"{ not a model").unwrap();

    let err = load_bundle(&path).await.err().expect("corrupt file rejected");
    assert!(matches!(err, SignalError::ModelUnavailable { .. }));

    // the store surfaces the same error rather than silently retraining
    let store = ClassifierStore::new(&path, training_params());
    let source = MockMarketSource::trending("BTC/USDT", 720, 1.0);
    let h = harness("persist_corrupt_src", source, settings());
    let err = store.load_or_train(&btc(), h.cache.as_ref()).await.err();
    assert!(matches!(err, Some(SignalError::ModelUnavailable { .. })));
}

#[tokio::test]
async fn test_schema_mismatch_is_model_unavailable() {
    let h = harness("persist_schema", MockMarketSource::trending("BTC/USDT", 720, 1.0), settings());
    h.store.load_or_train(&btc(), h.cache.as_ref()).await.unwrap();

    let mut json: serde_json::Value =
        serde_json::from_slice(&std::fs::read(h.store.path()).unwrap()).unwrap();
    json["feature_names"] = serde_json::json!(["close", "volume"]);
    std::fs::write(h.store.path(), serde_json::to_vec(&json).unwrap()).unwrap();

    let err = load_bundle(h.store.path()).await.err().expect("schema mismatch rejected");
    assert!(matches!(err, SignalError::ModelUnavailable { .. }));
}

#[tokio::test]
async fn test_store_loads_persisted_model_without_training() {
    let h = harness("persist_reload", MockMarketSource::trending("BTC/USDT", 720, 1.0), settings());
    let trained = h.store.load_or_train(&btc(), h.cache.as_ref()).await.unwrap();

    let fresh = ClassifierStore::new(h.store.path(), training_params());
    let offline = MockMarketSource::failing();
    let offline_h = harness("persist_reload_offline", offline, settings());
    let loaded = fresh
        .load_or_train(&btc(), offline_h.cache.as_ref())
        .await
        .unwrap();

    assert_eq!(loaded.id, trained.id);
    assert_eq!(offline_h.source.ohlcv_calls(), 0);
}

#[tokio::test]
async fn test_readers_see_whole_bundles_during_swaps() {
    let h = harness("persist_swap", MockMarketSource::trending("BTC/USDT", 720, 1.0), settings());
    let bars = h.cache.get_bars("BTC/USDT", settings().timeframe, 720).await.unwrap();
    let row = bars
        .iter()
        .rev()
        .find_map(|b| features_to_vector(&b.indicators))
        .unwrap();
    h.store.load_or_train(&btc(), h.cache.as_ref()).await.unwrap();

    let set = feature_builder::build(&bars);
    let store = h.store.clone();
    let writer = tokio::spawn(async move {
        for seed in 0..5 {
            let params = TrainingParams {
                seed,
                n_trees: 5,
                ..training_params()
            };
            let bundle = fit_bundle(&set, &params).unwrap();
            store.swap(bundle).await;
            tokio::task::yield_now().await;
        }
    });

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store: Arc<ClassifierStore> = h.store.clone();
            let row = row.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    let bundle = store.current().await.expect("bundle present");
                    // model and scaler always come from the same fit
                    assert_eq!(bundle.feature_names.len(), row.len());
                    bundle.predict(&row).unwrap();
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
}
