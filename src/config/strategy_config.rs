use super::parse_env;
use crate::domain::market::Timeframe;
use crate::domain::trading::SignalLevels;
use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Signal generation and session parameters.
#[derive(Debug, Clone)]
pub struct StrategyEnvConfig {
    pub timeframe: Timeframe,
    pub limit: usize,
    pub avg_period: usize,
    pub entry_pct: f64,
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    pub aggregate_threshold: usize,
    pub max_tracked_symbols: usize,
    pub quote_asset: String,
    pub volatility_factor: f64,
    pub volume_factor: f64,
    pub data_rows: usize,
    pub session_idle: Duration,
}

impl StrategyEnvConfig {
    pub fn from_env() -> Result<Self> {
        let timeframe = env::var("TIMEFRAME")
            .unwrap_or_else(|_| "1d".to_string())
            .parse::<Timeframe>()
            .context("Failed to parse TIMEFRAME")?;

        Ok(Self {
            timeframe,
            limit: parse_env("LIMIT", 500)?,
            avg_period: parse_env("AVG_PERIOD", 5)?,
            entry_pct: parse_env("ENTRY_PCT", 1.0)?,
            take_profit_pct: parse_env("TAKE_PROFIT_PCT", 2.0)?,
            stop_loss_pct: parse_env("STOP_LOSS_PCT", 2.0)?,
            aggregate_threshold: parse_env("AGGREGATE_THRESHOLD", 1)?,
            max_tracked_symbols: parse_env("MAX_TRACKED_SYMBOLS", 5)?,
            quote_asset: env::var("QUOTE_ASSET").unwrap_or_else(|_| "USDT".to_string()),
            volatility_factor: parse_env("VOLATILITY_ALERT_FACTOR", 1.5)?,
            volume_factor: parse_env("VOLUME_ALERT_FACTOR", 1.5)?,
            data_rows: parse_env("DATA_PREVIEW_ROWS", 10)?,
            session_idle: Duration::from_secs(parse_env("SESSION_IDLE_SECS", 1800)?),
        })
    }

    pub fn levels(&self) -> SignalLevels {
        SignalLevels {
            entry_pct: self.entry_pct,
            take_profit_pct: self.take_profit_pct,
            stop_loss_pct: self.stop_loss_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_defaults() {
        let config = StrategyEnvConfig::from_env().unwrap();
        assert_eq!(config.limit, 500);
        assert_eq!(config.avg_period, 5);
        assert_eq!(config.levels(), SignalLevels::default());
        assert_eq!(config.max_tracked_symbols, 5);
        assert_eq!(config.session_idle, Duration::from_secs(1800));
    }
}
