//! Configuration loaded from environment variables.
//!
//! Split by concern: signal strategy, model training, storage paths and
//! external transports. Every key has a default except the chat token.

mod model_config;
mod storage_config;
mod strategy_config;
mod transport_config;

pub use model_config::ModelEnvConfig;
pub use storage_config::StorageEnvConfig;
pub use strategy_config::StrategyEnvConfig;
pub use transport_config::TransportEnvConfig;

use crate::application::ml::classifier_store::TrainingParams;
use crate::application::session::SessionSettings;
use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

/// Where market data comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Mock,
    Binance,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(Mode::Mock),
            "binance" => Ok(Mode::Binance),
            _ => anyhow::bail!("Invalid MODE: {}. Must be 'mock' or 'binance'", s),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub strategy: StrategyEnvConfig,
    pub model: ModelEnvConfig,
    pub storage: StorageEnvConfig,
    pub transport: TransportEnvConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mode = env::var("MODE")
            .unwrap_or_else(|_| "binance".to_string())
            .parse::<Mode>()?;

        Ok(Self {
            mode,
            strategy: StrategyEnvConfig::from_env().context("strategy configuration")?,
            model: ModelEnvConfig::from_env().context("model configuration")?,
            storage: StorageEnvConfig::from_env(),
            transport: TransportEnvConfig::from_env().context("transport configuration")?,
        })
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            timeframe: self.strategy.timeframe,
            limit: self.strategy.limit,
            avg_period: self.strategy.avg_period,
            levels: self.strategy.levels(),
            aggregate_threshold: self.strategy.aggregate_threshold,
            max_tracked_symbols: self.strategy.max_tracked_symbols,
            quote_asset: self.strategy.quote_asset.clone(),
            accuracy_alpha: self.model.accuracy_alpha,
            retrain_threshold: self.model.retrain_threshold,
            volatility_factor: self.strategy.volatility_factor,
            volume_factor: self.strategy.volume_factor,
            data_rows: self.strategy.data_rows,
        }
    }

    pub fn training_params(&self) -> TrainingParams {
        self.model.training_params(self.strategy.timeframe, self.strategy.limit)
    }
}

/// Reads `key`, falling back to `default` when unset. A set but unparsable value is an error.
pub(crate) fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Failed to parse {}", key)),
        Err(_) => Ok(default),
    }
}

pub(crate) fn parse_list(key: &str, default: &[&str]) -> Vec<String> {
    match env::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => default.iter().map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Mock".parse::<Mode>().unwrap(), Mode::Mock);
        assert_eq!("binance".parse::<Mode>().unwrap(), Mode::Binance);
        assert!("alpaca".parse::<Mode>().is_err());
    }

    #[test]
    fn test_parse_env_defaults_when_unset() {
        let value: usize = parse_env("SIGNALBOT_TEST_UNSET_KEY", 7).unwrap();
        assert_eq!(value, 7);
        assert_eq!(
            parse_list("SIGNALBOT_TEST_UNSET_LIST", &["BTC/USDT"]),
            vec!["BTC/USDT".to_string()]
        );
    }
}
