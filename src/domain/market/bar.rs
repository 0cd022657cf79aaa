use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One OHLCV sample. Uniqueness key is `(symbol, timestamp)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    /// Open time, Unix milliseconds.
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Regime classification derived from ADX.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendLabel {
    Trending,
    Ranging,
}

impl TrendLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendLabel::Trending => "Trending",
            TrendLabel::Ranging => "Ranging",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Trending" => Some(TrendLabel::Trending),
            "Ranging" => Some(TrendLabel::Ranging),
            _ => None,
        }
    }
}

impl fmt::Display for TrendLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-bar indicator values. `None` means the trailing window has not filled yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub rsi: Option<f64>,
    pub sma: Option<f64>,
    pub volatility: Option<f64>,
    pub market_volume: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_middle: Option<f64>,
    pub bb_lower: Option<f64>,
    pub atr: Option<f64>,
    pub adx: Option<f64>,
    pub trend: Option<TrendLabel>,
}

impl IndicatorSet {
    /// True when every indicator is defined.
    pub fn is_complete(&self) -> bool {
        self.rsi.is_some()
            && self.sma.is_some()
            && self.volatility.is_some()
            && self.market_volume.is_some()
            && self.macd.is_some()
            && self.macd_signal.is_some()
            && self.bb_upper.is_some()
            && self.bb_middle.is_some()
            && self.bb_lower.is_some()
            && self.atr.is_some()
            && self.adx.is_some()
            && self.trend.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedBar {
    pub bar: Bar,
    pub indicators: IndicatorSet,
}

/// A candle exactly as the exchange returned it, before numeric coercion.
#[derive(Debug, Clone)]
pub struct RawCandle {
    pub timestamp: Value,
    pub open: Value,
    pub high: Value,
    pub low: Value,
    pub close: Value,
    pub volume: Value,
}

impl RawCandle {
    /// Coerce all fields to numbers and tag with `symbol`.
    ///
    /// Returns `None` when any field is missing or not a finite number.
    pub fn coerce(&self, symbol: &str) -> Option<Bar> {
        let timestamp = coerce_timestamp(&self.timestamp)?;
        Some(Bar {
            symbol: symbol.to_string(),
            timestamp,
            open: coerce_number(&self.open)?,
            high: coerce_number(&self.high)?,
            low: coerce_number(&self.low)?,
            close: coerce_number(&self.close)?,
            volume: coerce_number(&self.volume)?,
        })
    }
}

/// Numbers and numeric strings become `Some`; anything else (including NaN/inf) is missing.
pub fn coerce_number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

fn coerce_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
