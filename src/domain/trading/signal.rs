use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Maps a binary next-bar label (1 = up) to a direction.
    pub fn from_label(label: u32) -> Self {
        if label == 1 {
            Direction::Long
        } else {
            Direction::Short
        }
    }

    /// Direction actually realized between two closes.
    pub fn realized(close: f64, next_close: f64) -> Self {
        if next_close > close {
            Direction::Long
        } else {
            Direction::Short
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "Long"),
            Direction::Short => write!(f, "Short"),
        }
    }
}

impl FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "long" => Ok(Direction::Long),
            "short" => Ok(Direction::Short),
            _ => anyhow::bail!("Invalid direction: {}. Must be 'Long' or 'Short'", s),
        }
    }
}

/// Percent offsets used to derive entry band, take-profit and stop-loss.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalLevels {
    pub entry_pct: f64,
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
}

impl Default for SignalLevels {
    fn default() -> Self {
        Self {
            entry_pct: 1.0,
            take_profit_pct: 2.0,
            stop_loss_pct: 2.0,
        }
    }
}

/// A delivered trading signal. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalInfo {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub signal: Direction,
    pub current_price: Decimal,
    pub entry_range: (Decimal, Decimal),
    pub take_profit: Decimal,
    pub stop_loss: Decimal,
}

impl SignalInfo {
    /// Derives price levels from `price`.
    ///
    /// Returns `None` when the price or any percentage is not representable.
    pub fn from_price(
        symbol: &str,
        signal: Direction,
        price: f64,
        levels: SignalLevels,
        timestamp: DateTime<Utc>,
    ) -> Option<Self> {
        let price = Decimal::from_f64(price)?;
        let pct = |p: f64| Decimal::from_f64(p).map(|d| d / dec!(100));
        let entry = pct(levels.entry_pct)?;
        let tp = pct(levels.take_profit_pct)?;
        let sl = pct(levels.stop_loss_pct)?;

        Some(Self {
            timestamp,
            symbol: symbol.to_string(),
            signal,
            current_price: price,
            entry_range: (price * (Decimal::ONE - entry), price * (Decimal::ONE + entry)),
            take_profit: price * (Decimal::ONE + tp),
            stop_loss: price * (Decimal::ONE - sl),
        })
    }

    /// Same price levels, different label.
    pub fn with_direction(&self, signal: Direction) -> Self {
        Self {
            signal,
            ..self.clone()
        }
    }
}
