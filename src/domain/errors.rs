use thiserror::Error;

/// Failures of the signal pipeline.
///
/// Callers match on the variant; the message is for logs and never parsed.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("Market data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("Insufficient history: need {required} bars, have {available}")]
    InsufficientHistory { required: usize, available: usize },

    #[error("No usable training rows across {symbols} symbol(s)")]
    NoTrainingData { symbols: usize },

    #[error("Model unavailable: {reason}")]
    ModelUnavailable { reason: String },

    #[error("Signal unavailable for {symbol}: {reason}")]
    SignalUnavailable { symbol: String, reason: String },
}

impl SignalError {
    pub fn data_unavailable(symbol: &str, reason: impl ToString) -> Self {
        SignalError::DataUnavailable {
            symbol: symbol.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn model_unavailable(reason: impl ToString) -> Self {
        SignalError::ModelUnavailable {
            reason: reason.to_string(),
        }
    }

    pub fn signal_unavailable(symbol: &str, reason: impl ToString) -> Self {
        SignalError::SignalUnavailable {
            symbol: symbol.to_string(),
            reason: reason.to_string(),
        }
    }

    /// "No data" / "no signal" outcomes are expected conditions, not faults.
    pub fn is_absence(&self) -> bool {
        matches!(
            self,
            SignalError::DataUnavailable { .. }
                | SignalError::InsufficientHistory { .. }
                | SignalError::SignalUnavailable { .. }
        )
    }
}

/// Errors raised by the upstream exchange collaborator.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Exchange error: {0}")]
    Exchange(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_error_formatting() {
        let err = SignalError::InsufficientHistory {
            required: 34,
            available: 10,
        };
        let msg = err.to_string();
        assert!(msg.contains("34"));
        assert!(msg.contains("10"));

        let err = SignalError::data_unavailable("BTC/USDT", "timeout");
        assert!(err.to_string().contains("BTC/USDT"));
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_absence_classification() {
        assert!(SignalError::data_unavailable("ETH/USDT", "x").is_absence());
        assert!(SignalError::signal_unavailable("ETH/USDT", "x").is_absence());
        assert!(!SignalError::model_unavailable("corrupt").is_absence());
        assert!(!SignalError::NoTrainingData { symbols: 3 }.is_absence());
    }
}
