use serde::Serialize;
use thiserror::Error;

/// All errors generated in `barter-flow`.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
pub enum FlowError {
    #[error("invalid trade: {0}")]
    Validation(#[from] ValidationError),

    #[error("notional {0} has no order size bucket (buckets end at 1e8)")]
    UnmappedNotional(f64),

    #[error("tick size must be finite and greater than zero, got: {0}")]
    InvalidTickSize(f64),

    #[error("order book level has non-finite price or quantity: ({price}, {quantity})")]
    InvalidLevel { price: f64, quantity: f64 },

    #[error("candle row at {timestamp} has a non-finite field")]
    InvalidCandle { timestamp: i64 },

    #[error("unsupported timeframe: {0}")]
    InvalidTimeframe(String),

    #[error("data source error: {0}")]
    Source(String),

    #[error("background runtime error: {0}")]
    Runtime(String),

    #[error("job panicked: {0}")]
    JobPanicked(String),

    #[error("blocking wait requested from inside an async runtime")]
    BlockingInRuntime,
}

impl FlowError {
    /// Determine if an error received from a [`MarketDataSource`](crate::source::MarketDataSource)
    /// stream means the stream is dead and the consuming job should stop.
    #[allow(clippy::match_like_matches_macro)]
    pub fn is_terminal(&self) -> bool {
        match self {
            FlowError::Runtime(_) => true,
            FlowError::Source(error_msg) => {
                let error_lower = error_msg.to_lowercase();
                error_lower.contains("terminated")
                    || error_lower.contains("connectionclosed")
                    || error_lower.contains("alreadyclosed")
                    || error_lower.contains("io(")
                    || error_lower.contains("timeout")
            }
            _ => false,
        }
    }
}

/// Reasons a raw trade is rejected before it reaches the running statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
pub enum ValidationError {
    #[error("trade is missing required field: {0}")]
    MissingField(&'static str),

    #[error("trade field {field} is not a finite number: {value}")]
    NotANumber { field: &'static str, value: String },

    #[error("trade field {field} is negative: {value}")]
    Negative { field: &'static str, value: f64 },

    #[error("invalid trade side: {0}")]
    InvalidSide(String),
}
