use super::{parse_env, parse_list};
use crate::application::ml::classifier_store::TrainingParams;
use crate::domain::market::Timeframe;
use anyhow::Result;

/// Classifier hyperparameters and the retrain policy.
#[derive(Debug, Clone)]
pub struct ModelEnvConfig {
    pub n_trees: usize,
    pub max_depth: u16,
    pub min_samples_split: usize,
    pub seed: u64,
    pub test_fraction: f64,
    pub training_symbols: Vec<String>,
    pub accuracy_alpha: f64,
    pub retrain_threshold: f64,
}

impl ModelEnvConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            n_trees: parse_env("MODEL_N_TREES", 100)?,
            max_depth: parse_env("MODEL_MAX_DEPTH", 10)?,
            min_samples_split: parse_env("MODEL_MIN_SAMPLES_SPLIT", 2)?,
            seed: parse_env("MODEL_SEED", 42)?,
            test_fraction: parse_env("MODEL_TEST_FRACTION", 0.2)?,
            training_symbols: parse_list(
                "TRAINING_SYMBOLS",
                &["BTC/USDT", "ETH/USDT", "BNB/USDT", "SOL/USDT", "XRP/USDT"],
            ),
            accuracy_alpha: parse_env("ACCURACY_ALPHA", 0.1)?,
            retrain_threshold: parse_env("RETRAIN_THRESHOLD", 0.7)?,
        })
    }

    pub fn training_params(&self, timeframe: Timeframe, history_limit: usize) -> TrainingParams {
        TrainingParams {
            n_trees: self.n_trees,
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            test_fraction: self.test_fraction,
            seed: self.seed,
            timeframe,
            history_limit,
        }
    }
}
