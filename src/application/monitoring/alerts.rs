use crate::domain::market::AnnotatedBar;
use statrs::statistics::{Data, Distribution};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    HighVolatility,
    HighVolume,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketAlert {
    pub symbol: String,
    pub kind: AlertKind,
    pub latest: f64,
    pub mean: f64,
}

impl fmt::Display for MarketAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.kind {
            AlertKind::HighVolatility => "High volatility",
            AlertKind::HighVolume => "High volume",
        };
        write!(
            f,
            "{} for {}: {:.4} vs mean {:.4}",
            label, self.symbol, self.latest, self.mean
        )
    }
}

/// Flags the latest volatility / rolling volume when it exceeds `factor` times
/// the series mean. Undefined values are ignored.
pub fn detect_alerts(
    bars: &[AnnotatedBar],
    volatility_factor: f64,
    volume_factor: f64,
) -> Vec<MarketAlert> {
    let Some(last) = bars.last() else {
        return Vec::new();
    };
    let symbol = &last.bar.symbol;

    let checks: [(AlertKind, fn(&AnnotatedBar) -> Option<f64>, f64); 2] = [
        (AlertKind::HighVolatility, |b| b.indicators.volatility, volatility_factor),
        (AlertKind::HighVolume, |b| b.indicators.market_volume, volume_factor),
    ];

    checks
        .into_iter()
        .filter_map(|(kind, value, factor)| {
            let latest = value(last)?;
            let mean = Data::new(bars.iter().filter_map(value).collect::<Vec<f64>>()).mean()?;
            (latest > mean * factor).then(|| MarketAlert {
                symbol: symbol.clone(),
                kind,
                latest,
                mean,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::{Bar, IndicatorSet};

    fn bar(volatility: Option<f64>, volume: Option<f64>) -> AnnotatedBar {
        AnnotatedBar {
            bar: Bar {
                symbol: "SOL/USDT".to_string(),
                timestamp: 0,
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 1.0,
            },
            indicators: IndicatorSet {
                volatility,
                market_volume: volume,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_spike_raises_alert() {
        let mut bars: Vec<_> = (0..9).map(|_| bar(Some(1.0), Some(10.0))).collect();
        bars.push(bar(Some(5.0), Some(11.0)));
        let alerts = detect_alerts(&bars, 1.5, 1.5);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::HighVolatility);
        assert!(alerts[0].to_string().contains("SOL/USDT"));
    }

    #[test]
    fn test_undefined_latest_is_ignored() {
        let bars = vec![bar(Some(1.0), Some(1.0)), bar(None, None)];
        assert!(detect_alerts(&bars, 1.5, 1.5).is_empty());
        assert!(detect_alerts(&[], 1.5, 1.5).is_empty());
    }
}
