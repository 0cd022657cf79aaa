use super::feature_builder::{self, TrainingSet};
use crate::domain::errors::SignalError;
use crate::domain::market::Timeframe;
use crate::domain::ml::feature_registry::{current_schema, schema_matches};
use crate::domain::ports::BarSource;
use crate::domain::trading::Direction;
use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use smartcore::api::{Transformer, UnsupervisedEstimator};
use smartcore::ensemble::random_forest_classifier::{
    RandomForestClassifier, RandomForestClassifierParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::preprocessing::numerical::{StandardScaler, StandardScalerParameters};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

pub type Classifier = RandomForestClassifier<f64, u32, DenseMatrix<f64>, Vec<u32>>;
pub type Scaler = StandardScaler<f64>;

/// Hold-out metrics measured on the test split at training time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelEvaluation {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub test_rows: usize,
}

impl ModelEvaluation {
    /// Binary metrics with `1` as the positive class. Zero denominators yield 0.
    pub fn from_predictions(predicted: &[u32], actual: &[u32]) -> Self {
        let n = predicted.len().min(actual.len());
        let (mut tp, mut fp, mut fn_, mut correct) = (0usize, 0usize, 0usize, 0usize);
        for (p, a) in predicted.iter().zip(actual.iter()) {
            if p == a {
                correct += 1;
            }
            match (*p, *a) {
                (1, 1) => tp += 1,
                (1, _) => fp += 1,
                (_, 1) => fn_ += 1,
                _ => {}
            }
        }

        let ratio = |num: usize, den: usize| if den > 0 { num as f64 / den as f64 } else { 0.0 };
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            accuracy: ratio(correct, n),
            precision,
            recall,
            f1,
            test_rows: n,
        }
    }
}

/// Model and scaler fitted together. Never mutated after construction.
#[derive(Serialize, Deserialize)]
pub struct ClassifierBundle {
    pub id: Uuid,
    pub model: Classifier,
    pub scaler: Scaler,
    pub feature_names: Vec<String>,
    pub trained_at: DateTime<Utc>,
    pub training_rows: usize,
    pub evaluation: Option<ModelEvaluation>,
}

impl ClassifierBundle {
    /// Scales one feature row with this bundle's scaler and predicts direction.
    pub fn predict(&self, features: &[f64]) -> Result<Direction, SignalError> {
        let scaled = self.scale(features)?;
        let predictions = self
            .model
            .predict(&scaled)
            .map_err(|e| SignalError::model_unavailable(format!("prediction failed: {}", e)))?;
        predictions
            .first()
            .map(|label| Direction::from_label(*label))
            .ok_or_else(|| SignalError::model_unavailable("no prediction returned"))
    }

    pub fn scale(&self, features: &[f64]) -> Result<DenseMatrix<f64>, SignalError> {
        if features.len() != self.feature_names.len() {
            return Err(SignalError::model_unavailable(format!(
                "expected {} features, got {}",
                self.feature_names.len(),
                features.len()
            )));
        }
        let row = to_matrix(&[features.to_vec()])?;
        self.scaler
            .transform(&row)
            .map_err(|e| SignalError::model_unavailable(format!("scaling failed: {}", e)))
    }
}

/// Random forest hyperparameters and split settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingParams {
    pub n_trees: usize,
    pub max_depth: u16,
    pub min_samples_split: usize,
    pub test_fraction: f64,
    pub seed: u64,
    pub timeframe: Timeframe,
    pub history_limit: usize,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 10,
            min_samples_split: 2,
            test_fraction: 0.2,
            seed: 42,
            timeframe: Timeframe::OneDay,
            history_limit: 500,
        }
    }
}

/// Fits the scaler on the pooled matrix, splits train/test with a fixed seed,
/// fits the forest on the train rows and scores it on the test rows.
pub fn fit_bundle(set: &TrainingSet, params: &TrainingParams) -> Result<ClassifierBundle, SignalError> {
    if set.is_empty() {
        return Err(SignalError::NoTrainingData { symbols: 0 });
    }

    let pooled = to_matrix(&set.features)?;
    let scaler = Scaler::fit(&pooled, StandardScalerParameters::default())
        .map_err(|e| SignalError::model_unavailable(format!("scaler fit failed: {}", e)))?;

    let mut indices: Vec<usize> = (0..set.len()).collect();
    let mut rng = StdRng::seed_from_u64(params.seed);
    indices.shuffle(&mut rng);
    let test_len = ((set.len() as f64) * params.test_fraction).floor() as usize;
    let test_len = if test_len >= set.len() { 0 } else { test_len };
    let (test_idx, train_idx) = indices.split_at(test_len);

    let rows = |idx: &[usize]| -> (Vec<Vec<f64>>, Vec<u32>) {
        (
            idx.iter().map(|&i| set.features[i].clone()).collect(),
            idx.iter().map(|&i| set.targets[i]).collect(),
        )
    };
    let (x_train, y_train) = rows(train_idx);
    let (x_test, y_test) = rows(test_idx);

    let x_train = scaler
        .transform(&to_matrix(&x_train)?)
        .map_err(|e| SignalError::model_unavailable(format!("scaling failed: {}", e)))?;

    let forest_params = RandomForestClassifierParameters::default()
        .with_n_trees(params.n_trees as _)
        .with_max_depth(params.max_depth)
        .with_min_samples_split(params.min_samples_split)
        .with_seed(params.seed);

    info!(
        "Training Random Forest Classifier (Trees: {}, Depth: {}, MinSplit: {}) on {} rows...",
        params.n_trees,
        params.max_depth,
        params.min_samples_split,
        y_train.len()
    );
    let model = Classifier::fit(&x_train, &y_train, forest_params)
        .map_err(|e| SignalError::model_unavailable(format!("training failed: {}", e)))?;

    let evaluation = if x_test.is_empty() {
        None
    } else {
        let x_test = scaler
            .transform(&to_matrix(&x_test)?)
            .map_err(|e| SignalError::model_unavailable(format!("scaling failed: {}", e)))?;
        let predicted = model
            .predict(&x_test)
            .map_err(|e| SignalError::model_unavailable(format!("prediction failed: {}", e)))?;
        let eval = ModelEvaluation::from_predictions(&predicted, &y_test);
        info!(
            "Hold-out (n={}): accuracy={:.2} precision={:.2} recall={:.2} f1={:.2}",
            eval.test_rows, eval.accuracy, eval.precision, eval.recall, eval.f1
        );
        Some(eval)
    };

    Ok(ClassifierBundle {
        id: Uuid::new_v4(),
        model,
        scaler,
        feature_names: current_schema(),
        trained_at: Utc::now(),
        training_rows: set.len(),
        evaluation,
    })
}

fn to_matrix(rows: &[Vec<f64>]) -> Result<DenseMatrix<f64>, SignalError> {
    DenseMatrix::from_2d_vec(&rows.to_vec())
        .map_err(|e| SignalError::model_unavailable(format!("matrix creation failed: {}", e)))
}

/// Reads a persisted bundle. `Ok(None)` when the file does not exist.
///
/// A file that exists but cannot be decoded, or was trained on a different
/// feature schema, is `ModelUnavailable`.
pub async fn load_bundle(path: &Path) -> Result<Option<ClassifierBundle>, SignalError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(SignalError::model_unavailable(format!(
                "failed to read {:?}: {}",
                path, e
            )));
        }
    };

    let bundle: ClassifierBundle = serde_json::from_slice(&bytes).map_err(|e| {
        SignalError::model_unavailable(format!("failed to deserialize {:?}: {}", path, e))
    })?;

    if !schema_matches(&bundle.feature_names) {
        return Err(SignalError::model_unavailable(format!(
            "{:?} was trained on features {:?}",
            path, bundle.feature_names
        )));
    }

    Ok(Some(bundle))
}

/// Writes the bundle to a temp file next to `path`, then renames it into place.
pub async fn save_bundle(bundle: &ClassifierBundle, path: &Path) -> Result<(), SignalError> {
    let bytes = serde_json::to_vec(bundle)
        .map_err(|e| SignalError::model_unavailable(format!("failed to serialize model: {}", e)))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| SignalError::model_unavailable(format!("create {:?}: {}", parent, e)))?;
    }

    let tmp_path = path.with_extension(format!("tmp-{}", Uuid::new_v4().simple()));
    if let Err(e) = tokio::fs::write(&tmp_path, &bytes).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(SignalError::model_unavailable(format!(
            "write {:?}: {}",
            tmp_path, e
        )));
    }
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(SignalError::model_unavailable(format!(
            "atomic rename to {:?} failed: {}",
            path, e
        )));
    }

    info!("Model and scaler saved to {:?}", path);
    Ok(())
}

/// Owns the live bundle and its file.
///
/// Readers take an `Arc` snapshot; retraining builds a new bundle and swaps the
/// pointer, so an in-flight reader keeps the pair it started with.
pub struct ClassifierStore {
    path: PathBuf,
    params: TrainingParams,
    current: RwLock<Option<Arc<ClassifierBundle>>>,
    write_lock: Mutex<()>,
    retraining: AtomicBool,
}

impl ClassifierStore {
    pub fn new(path: impl Into<PathBuf>, params: TrainingParams) -> Self {
        Self {
            path: path.into(),
            params,
            current: RwLock::new(None),
            write_lock: Mutex::new(()),
            retraining: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn params(&self) -> &TrainingParams {
        &self.params
    }

    pub async fn current(&self) -> Option<Arc<ClassifierBundle>> {
        self.current.read().await.clone()
    }

    /// Replaces the live bundle and returns the new snapshot.
    pub async fn swap(&self, bundle: ClassifierBundle) -> Arc<ClassifierBundle> {
        let bundle = Arc::new(bundle);
        let previous = self.current.write().await.replace(bundle.clone());
        info!(
            "ClassifierStore: swapped bundle {} -> {}",
            previous.map(|b| b.id.to_string()).unwrap_or_else(|| "none".to_string()),
            bundle.id
        );
        bundle
    }

    /// Returns the live bundle, else the persisted one, else trains and persists a new one.
    pub async fn load_or_train(
        &self,
        symbols: &[String],
        source: &dyn BarSource,
    ) -> Result<Arc<ClassifierBundle>, SignalError> {
        if let Some(bundle) = self.current().await {
            return Ok(bundle);
        }

        match load_bundle(&self.path).await? {
            Some(bundle) => {
                info!("Model and scaler loaded from {:?}", self.path);
                Ok(self.swap(bundle).await)
            }
            None => {
                info!("Model file {:?} not found. Training a new model.", self.path);
                let bundle = self.train(symbols, source).await.map_err(|e| match e {
                    SignalError::ModelUnavailable { .. } => e,
                    other => SignalError::model_unavailable(format!("training failed: {}", other)),
                })?;
                self.save(&bundle).await?;
                Ok(self.swap(bundle).await)
            }
        }
    }

    /// Gathers history for every symbol and fits a new bundle.
    ///
    /// Symbols whose data cannot be fetched are logged and skipped.
    pub async fn train(
        &self,
        symbols: &[String],
        source: &dyn BarSource,
    ) -> Result<ClassifierBundle, SignalError> {
        let mut pooled = TrainingSet::default();
        for symbol in symbols {
            match source
                .get_bars(symbol, self.params.timeframe, self.params.history_limit)
                .await
            {
                Ok(bars) => {
                    let set = feature_builder::build(&bars);
                    if set.is_empty() {
                        warn!("ClassifierStore: no usable rows for {}", symbol);
                    } else {
                        info!("ClassifierStore: {} training rows from {}", set.len(), symbol);
                        pooled.extend(set);
                    }
                }
                Err(e) => warn!("ClassifierStore: skipping {}: {}", symbol, e),
            }
        }

        if pooled.is_empty() {
            error!("No data to train the model.");
            return Err(SignalError::NoTrainingData {
                symbols: symbols.len(),
            });
        }

        let params = self.params.clone();
        tokio::task::spawn_blocking(move || fit_bundle(&pooled, &params))
            .await
            .map_err(|e| SignalError::model_unavailable(format!("training task failed: {}", e)))?
    }

    /// Persists under the store's single-writer lock.
    pub async fn save(&self, bundle: &ClassifierBundle) -> Result<(), SignalError> {
        let _guard = self.write_lock.lock().await;
        save_bundle(bundle, &self.path).await
    }

    /// Train, persist, swap. The live bundle is untouched on failure.
    pub async fn retrain(
        &self,
        symbols: &[String],
        source: &dyn BarSource,
    ) -> Result<Arc<ClassifierBundle>, SignalError> {
        let bundle = self.train(symbols, source).await?;
        self.save(&bundle).await?;
        Ok(self.swap(bundle).await)
    }

    /// Claims the single retrain slot; `None` if a retrain is already running.
    pub fn try_begin_retrain(self: &Arc<Self>) -> Option<RetrainPermit> {
        self.retraining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RetrainPermit {
                store: self.clone(),
            })
    }

    pub fn is_retraining(&self) -> bool {
        self.retraining.load(Ordering::Acquire)
    }
}

/// Releases the retrain slot on drop.
pub struct RetrainPermit {
    store: Arc<ClassifierStore>,
}

impl Drop for RetrainPermit {
    fn drop(&mut self) {
        self.store.retraining.store(false, Ordering::Release);
    }
}
