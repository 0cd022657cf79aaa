use crate::domain::trading::{Direction, SignalInfo};
use tracing::debug;

/// Majority vote over the non-null signals.
///
/// The result carries the last non-null signal's price levels, symbol and
/// timestamp, relabelled with the winning direction. On a tie the label of
/// the most recently seen tied signal wins. `None` when fewer than
/// `threshold` signals are present.
pub fn aggregate(signals: &[Option<SignalInfo>], threshold: usize) -> Option<SignalInfo> {
    let (mut longs, mut shorts) = (0usize, 0usize);
    let mut last: Option<&SignalInfo> = None;

    for signal in signals.iter().flatten() {
        match signal.signal {
            Direction::Long => longs += 1,
            Direction::Short => shorts += 1,
        }
        last = Some(signal);
    }

    let last = last?;
    let total = longs + shorts;
    if total < threshold {
        debug!("Aggregator: {} signal(s) below threshold {}", total, threshold);
        return None;
    }

    let winner = match longs.cmp(&shorts) {
        std::cmp::Ordering::Greater => Direction::Long,
        std::cmp::Ordering::Less => Direction::Short,
        std::cmp::Ordering::Equal => last.signal,
    };

    debug!(
        "Aggregator: {} long / {} short -> {} for {}",
        longs, shorts, winner, last.symbol
    );
    Some(last.with_direction(winner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trading::SignalLevels;
    use chrono::{TimeZone, Utc};

    fn signal(direction: Direction, price: f64, second: u32) -> Option<SignalInfo> {
        SignalInfo::from_price(
            "BTC/USDT",
            direction,
            price,
            SignalLevels::default(),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, second).unwrap(),
        )
    }

    #[test]
    fn test_empty_and_all_null() {
        assert!(aggregate(&[], 1).is_none());
        assert!(aggregate(&[None, None], 1).is_none());
    }

    #[test]
    fn test_majority_with_last_signal_fields() {
        let signals = vec![
            signal(Direction::Long, 100.0, 1),
            signal(Direction::Long, 101.0, 2),
            None,
            signal(Direction::Long, 102.0, 3),
            signal(Direction::Short, 103.0, 4),
        ];
        let result = aggregate(&signals, 1).unwrap();
        let last = signals[4].clone().unwrap();
        assert_eq!(result.signal, Direction::Long);
        assert_eq!(result.current_price, last.current_price);
        assert_eq!(result.entry_range, last.entry_range);
        assert_eq!(result.take_profit, last.take_profit);
        assert_eq!(result.stop_loss, last.stop_loss);
        assert_eq!(result.timestamp, last.timestamp);
    }

    #[test]
    fn test_tie_goes_to_most_recent() {
        let signals = vec![signal(Direction::Long, 100.0, 1), signal(Direction::Short, 99.0, 2)];
        assert_eq!(aggregate(&signals, 1).unwrap().signal, Direction::Short);

        let signals = vec![signal(Direction::Short, 100.0, 1), signal(Direction::Long, 99.0, 2)];
        assert_eq!(aggregate(&signals, 1).unwrap().signal, Direction::Long);
    }

    #[test]
    fn test_threshold() {
        let signals = vec![signal(Direction::Long, 100.0, 1), None];
        assert!(aggregate(&signals, 2).is_none());
        assert!(aggregate(&signals, 1).is_some());
    }
}
