pub mod signal;

pub use signal::{Direction, SignalInfo, SignalLevels};
