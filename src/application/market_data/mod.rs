pub mod indicators;
pub mod snapshot_cache;
