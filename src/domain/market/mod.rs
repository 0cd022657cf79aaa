pub mod bar;
pub mod symbol;
pub mod timeframe;

pub use bar::{AnnotatedBar, Bar, IndicatorSet, RawCandle, TrendLabel};
pub use timeframe::Timeframe;
