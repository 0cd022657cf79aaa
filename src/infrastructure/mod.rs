pub mod binance;
pub mod core;
pub mod mock;
pub mod persistence;
pub mod telegram;
