// Bars, indicators, timeframes, symbols
pub mod market;

// Feature schema shared by training and inference
pub mod ml;

// Port interfaces
pub mod ports;

// Signals and price levels
pub mod trading;

// Domain-specific error types
pub mod errors;
