// Bar cache and indicator annotation
pub mod market_data;

// Feature building, model lifecycle and retraining
pub mod ml;

// Volatility and volume alerts
pub mod monitoring;

// Per-chat conversation state and dispatch
pub mod session;

// Signal producers and the aggregator
pub mod strategies;
