use crate::domain::market::AnnotatedBar;
use crate::domain::trading::{Direction, SignalInfo, SignalLevels};
use chrono::Utc;
use statrs::statistics::{Data, Distribution};
use tracing::{info, warn};

/// Long when the latest close is above the mean of the last `avg_period` closes.
///
/// Returns `None` (with a warning) when there are fewer than `avg_period` bars.
pub fn average_price_signal(
    bars: &[AnnotatedBar],
    symbol: &str,
    avg_period: usize,
    levels: SignalLevels,
) -> Option<SignalInfo> {
    if avg_period == 0 || bars.len() < avg_period {
        warn!(
            "Not enough data for average-price signal on {} ({} < {})",
            symbol,
            bars.len(),
            avg_period
        );
        return None;
    }

    let closes: Vec<f64> = bars[bars.len() - avg_period..]
        .iter()
        .map(|b| b.bar.close)
        .collect();
    let current = *closes.last()?;
    let average = Data::new(closes).mean()?;

    let direction = if current > average {
        Direction::Long
    } else {
        Direction::Short
    };

    let info = SignalInfo::from_price(symbol, direction, current, levels, Utc::now())?;
    info!(
        "Average-price signal for {}: {} at {} (avg {:.4})",
        symbol, direction, current, average
    );
    Some(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::{Bar, IndicatorSet};

    fn bars(closes: &[f64]) -> Vec<AnnotatedBar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| AnnotatedBar {
                bar: Bar {
                    symbol: "ETH/USDT".to_string(),
                    timestamp: i as i64,
                    open: *c,
                    high: *c,
                    low: *c,
                    close: *c,
                    volume: 1.0,
                },
                indicators: IndicatorSet::default(),
            })
            .collect()
    }

    #[test]
    fn test_above_average_is_long() {
        let info = average_price_signal(
            &bars(&[1.0, 2.0, 3.0, 4.0, 5.0]),
            "ETH/USDT",
            5,
            SignalLevels::default(),
        )
        .unwrap();
        assert_eq!(info.signal, Direction::Long);
    }

    #[test]
    fn test_at_or_below_average_is_short() {
        let flat = average_price_signal(&bars(&[2.0; 5]), "ETH/USDT", 5, SignalLevels::default());
        assert_eq!(flat.unwrap().signal, Direction::Short);

        let falling = average_price_signal(
            &bars(&[9.0, 1.0, 5.0, 4.0, 3.0, 2.0]),
            "ETH/USDT",
            5,
            SignalLevels::default(),
        );
        assert_eq!(falling.unwrap().signal, Direction::Short);
    }

    #[test]
    fn test_not_enough_data() {
        assert!(average_price_signal(&bars(&[1.0, 2.0]), "ETH/USDT", 5, SignalLevels::default()).is_none());
    }
}
