pub mod parquet_snapshot;
pub mod signal_log;
