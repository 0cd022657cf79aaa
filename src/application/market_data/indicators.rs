use crate::domain::errors::SignalError;
use crate::domain::market::{AnnotatedBar, Bar, IndicatorSet, TrendLabel};
use statrs::statistics::{Data, Distribution};
use ta::Next;
use ta::indicators::{
    AverageTrueRange, BollingerBands, MovingAverageConvergenceDivergence, RelativeStrengthIndex,
    SimpleMovingAverage,
};
use tracing::{debug, warn};

/// Indicator periods. These are part of the feature schema: changing them
/// changes what a persisted model was trained on.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorConfig {
    pub rsi_period: usize,
    pub sma_period: usize,
    pub macd_fast_period: usize,
    pub macd_slow_period: usize,
    pub macd_signal_period: usize,
    pub bb_period: usize,
    pub bb_std_dev: f64,
    pub atr_period: usize,
    pub adx_period: usize,
    pub adx_trend_threshold: f64,
    /// Window for rolling close std (volatility) and rolling mean volume.
    pub stats_window: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            sma_period: 5,
            macd_fast_period: 12,
            macd_slow_period: 26,
            macd_signal_period: 9,
            bb_period: 20,
            bb_std_dev: 2.0,
            atr_period: 14,
            adx_period: 14,
            adx_trend_threshold: 25.0,
            stats_window: 20,
        }
    }
}

impl IndicatorConfig {
    fn sma_warmup(&self) -> usize {
        self.sma_period - 1
    }

    fn rsi_warmup(&self) -> usize {
        self.rsi_period
    }

    fn atr_warmup(&self) -> usize {
        self.atr_period
    }

    fn bb_warmup(&self) -> usize {
        self.bb_period - 1
    }

    fn stats_warmup(&self) -> usize {
        self.stats_window - 1
    }

    fn macd_warmup(&self) -> usize {
        self.macd_slow_period - 1
    }

    fn macd_signal_warmup(&self) -> usize {
        self.macd_slow_period + self.macd_signal_period - 2
    }

    fn adx_warmup(&self) -> usize {
        2 * self.adx_period - 1
    }

    /// Minimum number of bars before the first fully-defined row exists.
    pub fn min_bars(&self) -> usize {
        [
            self.sma_warmup(),
            self.rsi_warmup(),
            self.atr_warmup(),
            self.bb_warmup(),
            self.stats_warmup(),
            self.macd_signal_warmup(),
            self.adx_warmup(),
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
            + 1
    }
}

/// ADX with Wilder's smoothing.
///
/// DI sums are seeded with the first `period` true ranges; ADX is seeded with
/// the mean of the first `period` DX values, so the first value appears on
/// bar index `2 * period - 1`.
pub struct ManualAdx {
    period: usize,
    prev: Option<(f64, f64, f64)>,
    tr_smooth: f64,
    plus_dm_smooth: f64,
    minus_dm_smooth: f64,
    dx_sum: f64,
    adx_smooth: f64,
    count: usize,
}

impl ManualAdx {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev: None,
            tr_smooth: 0.0,
            plus_dm_smooth: 0.0,
            minus_dm_smooth: 0.0,
            dx_sum: 0.0,
            adx_smooth: 0.0,
            count: 0,
        }
    }

    pub fn next(&mut self, high: f64, low: f64, close: f64) -> Option<f64> {
        let Some((prev_high, prev_low, prev_close)) = self.prev.replace((high, low, close)) else {
            return None;
        };

        let tr = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());
        let up_move = high - prev_high;
        let down_move = prev_low - low;
        let plus_dm = if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        };
        let minus_dm = if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        };

        self.count += 1;
        let n = self.period as f64;

        if self.count <= self.period {
            self.tr_smooth += tr;
            self.plus_dm_smooth += plus_dm;
            self.minus_dm_smooth += minus_dm;
            if self.count < self.period {
                return None;
            }
        } else {
            self.tr_smooth = self.tr_smooth - (self.tr_smooth / n) + tr;
            self.plus_dm_smooth = self.plus_dm_smooth - (self.plus_dm_smooth / n) + plus_dm;
            self.minus_dm_smooth = self.minus_dm_smooth - (self.minus_dm_smooth / n) + minus_dm;
        }

        let dx = if self.tr_smooth > 0.0 {
            let plus_di = 100.0 * self.plus_dm_smooth / self.tr_smooth;
            let minus_di = 100.0 * self.minus_dm_smooth / self.tr_smooth;
            let sum_di = plus_di + minus_di;
            if sum_di > 0.0 {
                100.0 * (plus_di - minus_di).abs() / sum_di
            } else {
                0.0
            }
        } else {
            0.0
        };

        // DX values seen so far: count - period + 1
        let dx_seen = self.count + 1 - self.period;
        if dx_seen < self.period {
            self.dx_sum += dx;
            None
        } else if dx_seen == self.period {
            self.dx_sum += dx;
            self.adx_smooth = self.dx_sum / n;
            Some(self.adx_smooth)
        } else {
            self.adx_smooth = (self.adx_smooth * (n - 1.0) + dx) / n;
            Some(self.adx_smooth)
        }
    }
}

/// Computes the indicator columns for an ordered bar series.
pub struct IndicatorEngine {
    config: IndicatorConfig,
}

impl Default for IndicatorEngine {
    fn default() -> Self {
        Self::new(IndicatorConfig::default())
    }
}

impl IndicatorEngine {
    pub fn new(config: IndicatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IndicatorConfig {
        &self.config
    }

    /// Annotates each bar with its `IndicatorSet`.
    ///
    /// Bars with non-finite high/low/close are dropped first. Values are `None`
    /// until their trailing window has filled; nothing is imputed.
    pub fn annotate(&self, bars: Vec<Bar>) -> Result<Vec<AnnotatedBar>, SignalError> {
        let input_len = bars.len();
        let mut bars: Vec<Bar> = bars
            .into_iter()
            .filter(|b| b.high.is_finite() && b.low.is_finite() && b.close.is_finite())
            .collect();
        if bars.len() < input_len {
            warn!(
                "IndicatorEngine: dropped {} bar(s) with non-numeric high/low/close",
                input_len - bars.len()
            );
        }
        if bars.is_empty() {
            return Err(SignalError::InsufficientHistory {
                required: self.config.min_bars(),
                available: 0,
            });
        }
        bars.sort_by_key(|b| b.timestamp);

        let cfg = &self.config;
        let invalid = |e: ta::errors::TaError| {
            warn!("IndicatorEngine: invalid indicator parameters: {:?}", e);
            SignalError::InsufficientHistory {
                required: cfg.min_bars(),
                available: 0,
            }
        };

        let mut rsi = RelativeStrengthIndex::new(cfg.rsi_period).map_err(invalid)?;
        let mut sma = SimpleMovingAverage::new(cfg.sma_period).map_err(invalid)?;
        let mut macd = MovingAverageConvergenceDivergence::new(
            cfg.macd_fast_period,
            cfg.macd_slow_period,
            cfg.macd_signal_period,
        )
        .map_err(invalid)?;
        let mut bb = BollingerBands::new(cfg.bb_period, cfg.bb_std_dev).map_err(invalid)?;
        let mut atr = AverageTrueRange::new(cfg.atr_period).map_err(invalid)?;
        let mut adx = ManualAdx::new(cfg.adx_period);

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

        let mut annotated = Vec::with_capacity(bars.len());
        for (i, bar) in bars.into_iter().enumerate() {
            let defined = |warmup: usize, value: f64| (i >= warmup).then_some(value);

            let rsi_val = rsi.next(bar.close);
            let sma_val = sma.next(bar.close);
            let macd_val = macd.next(bar.close);
            let bb_val = bb.next(bar.close);
            let atr_val = match data_item(&bar) {
                Some(item) => atr.next(&item),
                None => atr.next(bar.close),
            };
            let adx_val = adx.next(bar.high, bar.low, bar.close);

            let window = |values: &[f64]| -> Data<Vec<f64>> {
                Data::new(values[i + 1 - cfg.stats_window..=i].to_vec())
            };
            let (volatility, market_volume) = if i >= cfg.stats_warmup() {
                (window(&closes).std_dev(), window(&volumes).mean())
            } else {
                (None, None)
            };

            let indicators = IndicatorSet {
                rsi: defined(cfg.rsi_warmup(), rsi_val),
                sma: defined(cfg.sma_warmup(), sma_val),
                volatility,
                market_volume,
                macd: defined(cfg.macd_warmup(), macd_val.macd),
                macd_signal: defined(cfg.macd_signal_warmup(), macd_val.signal),
                bb_upper: defined(cfg.bb_warmup(), bb_val.upper),
                bb_middle: defined(cfg.bb_warmup(), bb_val.average),
                bb_lower: defined(cfg.bb_warmup(), bb_val.lower),
                atr: defined(cfg.atr_warmup(), atr_val),
                adx: adx_val,
                trend: adx_val.map(|v| classify_trend(v, cfg.adx_trend_threshold)),
            };

            annotated.push(AnnotatedBar { bar, indicators });
        }

        debug!(
            "IndicatorEngine: annotated {} bars ({} fully defined)",
            annotated.len(),
            annotated.iter().filter(|b| b.indicators.is_complete()).count()
        );
        Ok(annotated)
    }
}

/// `Trending` strictly above the threshold, `Ranging` otherwise.
pub fn classify_trend(adx: f64, threshold: f64) -> TrendLabel {
    if adx > threshold {
        TrendLabel::Trending
    } else {
        TrendLabel::Ranging
    }
}

/// `ta` rejects items whose open/close fall outside high/low; widen the range
/// to contain them rather than dropping the bar.
fn data_item(bar: &Bar) -> Option<ta::DataItem> {
    let high = bar.high.max(bar.open).max(bar.close);
    let low = bar.low.min(bar.open).min(bar.close);
    ta::DataItem::builder()
        .open(bar.open)
        .high(high)
        .low(low)
        .close(bar.close)
        .volume(bar.volume.max(0.0))
        .build()
        .ok()
}
