pub mod aggregator;
pub mod average_price;
pub mod ml_signal;

pub use aggregator::aggregate;
pub use average_price::average_price_signal;
