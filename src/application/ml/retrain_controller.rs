use super::classifier_store::ClassifierStore;
use crate::domain::market::{AnnotatedBar, Bar};
use crate::domain::ports::BarSource;
use crate::domain::trading::Direction;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Exponentially weighted hit rate with a one-shot breach latch.
///
/// Starts at 1.0. A breach (accuracy below threshold) fires once; the latch
/// re-arms only after accuracy is back at or above the threshold.
#[derive(Debug, Clone)]
pub struct AccuracyTracker {
    alpha: f64,
    threshold: f64,
    accuracy: f64,
    armed: bool,
}

impl AccuracyTracker {
    pub fn new(alpha: f64, threshold: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            threshold,
            accuracy: 1.0,
            armed: true,
        }
    }

    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    /// Folds in one outcome. Returns `true` when a retrain should start.
    pub fn observe(&mut self, predicted: Direction, realized: Direction) -> bool {
        let hit = if predicted == realized { 1.0 } else { 0.0 };
        self.accuracy = self.alpha * hit + (1.0 - self.alpha) * self.accuracy;

        if self.accuracy >= self.threshold {
            self.armed = true;
            return false;
        }
        if self.armed {
            self.armed = false;
            return true;
        }
        false
    }
}

#[derive(Debug, Clone, PartialEq)]
struct PendingPrediction {
    timestamp: i64,
    close: f64,
    predicted: Direction,
}

/// Per-session feedback loop: remembers what was predicted and scores it once
/// the following bar is known.
#[derive(Debug, Clone)]
pub struct RetrainController {
    tracker: AccuracyTracker,
    pending: HashMap<String, PendingPrediction>,
}

impl RetrainController {
    pub fn new(alpha: f64, threshold: f64) -> Self {
        Self {
            tracker: AccuracyTracker::new(alpha, threshold),
            pending: HashMap::new(),
        }
    }

    pub fn accuracy(&self) -> f64 {
        self.tracker.accuracy()
    }

    pub fn has_pending(&self, symbol: &str) -> bool {
        self.pending.contains_key(symbol)
    }

    /// Remembers `predicted` for the bar it was made on. Replaces any older entry.
    pub fn record_prediction(&mut self, symbol: &str, bar: &Bar, predicted: Direction) {
        self.pending.insert(
            symbol.to_string(),
            PendingPrediction {
                timestamp: bar.timestamp,
                close: bar.close,
                predicted,
            },
        );
    }

    /// Scores the pending prediction for `symbol` against the first later bar.
    ///
    /// Returns `true` when the outcome breaches the accuracy threshold.
    pub fn resolve(&mut self, symbol: &str, bars: &[AnnotatedBar]) -> bool {
        let Some(pending) = self.pending.get(symbol) else {
            return false;
        };
        let Some(next) = bars.iter().find(|b| b.bar.timestamp > pending.timestamp) else {
            debug!("RetrainController: {} has no bar after {}", symbol, pending.timestamp);
            return false;
        };

        let realized = Direction::realized(pending.close, next.bar.close);
        let predicted = pending.predicted;
        self.pending.remove(symbol);
        self.observe(symbol, predicted, realized)
    }

    /// Folds in one `(predicted, realized)` outcome.
    pub fn observe(&mut self, symbol: &str, predicted: Direction, realized: Direction) -> bool {
        let fire = self.tracker.observe(predicted, realized);
        info!(
            "RetrainController: {} predicted {} realized {} -> accuracy {:.3}",
            symbol,
            predicted,
            realized,
            self.tracker.accuracy()
        );
        if fire {
            warn!(
                "RetrainController: accuracy {:.3} below threshold, retrain due",
                self.tracker.accuracy()
            );
        }
        fire
    }
}

/// Starts a background retrain unless one is already running.
///
/// On success the store persists and swaps the new bundle; on failure the
/// current bundle stays live.
pub fn schedule_retrain(
    store: Arc<ClassifierStore>,
    source: Arc<dyn BarSource>,
    symbols: Vec<String>,
) -> Option<JoinHandle<()>> {
    let Some(permit) = store.try_begin_retrain() else {
        info!("Retrain already in progress, skipping");
        return None;
    };

    Some(tokio::spawn(async move {
        let _permit = permit;
        info!("Retraining model on {} symbol(s)", symbols.len());
        match store.retrain(&symbols, source.as_ref()).await {
            Ok(bundle) => info!(
                "Model retrained: {} rows, bundle {}",
                bundle.training_rows, bundle.id
            ),
            Err(e) => error!("Retrain failed, keeping current model: {}", e),
        }
    }))
}
