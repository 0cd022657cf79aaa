use crate::domain::market::IndicatorSet;

/// Ordered list of feature names.
/// The scaler and classifier are fit on columns in exactly this order and the
/// persisted bundle records it; any change here invalidates saved models.
pub const FEATURE_NAMES: &[&str] = &[
    "rsi",
    "sma",
    "volatility",
    "market_volume",
    "macd",
    "macd_signal",
    "bb_upper",
    "bb_middle",
    "bb_lower",
    "atr",
];

pub const FEATURE_COUNT: usize = 10;

/// Extracts the feature vector, or `None` if any feature is still undefined.
pub fn features_to_vector(set: &IndicatorSet) -> Option<Vec<f64>> {
    Some(vec![
        set.rsi?,
        set.sma?,
        set.volatility?,
        set.market_volume?,
        set.macd?,
        set.macd_signal?,
        set.bb_upper?,
        set.bb_middle?,
        set.bb_lower?,
        set.atr?,
    ])
}

/// Whether a persisted schema matches the one compiled into this binary.
pub fn schema_matches(names: &[String]) -> bool {
    names.len() == FEATURE_NAMES.len()
        && names.iter().zip(FEATURE_NAMES).all(|(a, b)| a == b)
}

pub fn current_schema() -> Vec<String> {
    FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
}
