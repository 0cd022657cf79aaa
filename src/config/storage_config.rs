use std::env;
use std::path::PathBuf;

/// File locations for the snapshot, model and signal log.
#[derive(Debug, Clone)]
pub struct StorageEnvConfig {
    pub snapshot_path: PathBuf,
    pub model_path: PathBuf,
    pub signal_log_path: PathBuf,
}

impl StorageEnvConfig {
    pub fn from_env() -> Self {
        let data_dir = PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()));
        let path = |key: &str, file: &str| {
            env::var(key)
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join(file))
        };

        Self {
            snapshot_path: path("SNAPSHOT_FILE", "all_tickers_data.parquet"),
            model_path: path("MODEL_FILE", "model.json"),
            signal_log_path: path("SIGNAL_LOG_FILE", "signal_log.csv"),
        }
    }
}
