//! Normalised market data consumed from a [`MarketDataSource`](crate::source::MarketDataSource).

/// Trade batches (raw and validated trades).
pub mod trade;

/// Order book snapshots.
pub mod book;

/// OHLCV candles, timeframes and historical fetch requests.
pub mod candle;
