use crate::application::ml::classifier_store::ClassifierBundle;
use crate::domain::errors::SignalError;
use crate::domain::market::AnnotatedBar;
use crate::domain::ml::feature_registry::features_to_vector;
use crate::domain::trading::{SignalInfo, SignalLevels};
use chrono::Utc;
use tracing::info;

/// Predicts the next-bar direction for `symbol` and derives price levels.
///
/// Uses the most recent fully-defined row, scaled with the bundle's own
/// scaler. Levels are taken from the latest close. `min_bars` is the
/// annotating engine's longest warmup.
pub fn generate(
    bundle: &ClassifierBundle,
    bars: &[AnnotatedBar],
    symbol: &str,
    levels: SignalLevels,
    min_bars: usize,
) -> Result<SignalInfo, SignalError> {
    let Some(last) = bars.last() else {
        return Err(SignalError::signal_unavailable(symbol, "no bars"));
    };

    if bars.len() < min_bars {
        return Err(SignalError::signal_unavailable(
            symbol,
            format!("need {} bars, have {}", min_bars, bars.len()),
        ));
    }

    let features = bars
        .iter()
        .rev()
        .find_map(|b| features_to_vector(&b.indicators))
        .ok_or_else(|| SignalError::signal_unavailable(symbol, "no fully-defined feature row"))?;

    let direction = bundle
        .predict(&features)
        .map_err(|e| SignalError::signal_unavailable(symbol, e))?;

    let price = last.bar.close;
    let info = SignalInfo::from_price(symbol, direction, price, levels, Utc::now())
        .ok_or_else(|| SignalError::signal_unavailable(symbol, format!("price {} not representable", price)))?;

    info!("Generated signal for {}: {} at {}", symbol, info.signal, info.current_price);
    Ok(info)
}
