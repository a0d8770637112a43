use crate::{
    error::FlowError,
    instrument::{ExchangeId, Symbol},
    subscription::{
        book::OrderBookSnapshot,
        candle::{CandleRequest, CandleRow},
        trade::TradeRecord,
    },
};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Stream of trade batches yielded by [`MarketDataSource::watch_trades`].
pub type TradeBatchStream = BoxStream<'static, Result<Vec<TradeRecord>, FlowError>>;

/// Stream of order book snapshots yielded by [`MarketDataSource::watch_order_book`].
pub type OrderBookStream = BoxStream<'static, Result<OrderBookSnapshot, FlowError>>;

/// Exchange connector the streaming jobs consume from.
///
/// Streams end when the subscription ends. An `Err` item is not necessarily the end of a
/// stream, see [`FlowError::is_terminal`].
#[async_trait]
pub trait MarketDataSource: Send + Sync + 'static {
    /// Subscribe to public trades of `symbols` on `exchange`.
    async fn watch_trades(
        &self,
        exchange: &ExchangeId,
        symbols: &[Symbol],
    ) -> Result<TradeBatchStream, FlowError>;

    /// Subscribe to full order book snapshots of `symbols` on `exchange`.
    async fn watch_order_book(
        &self,
        exchange: &ExchangeId,
        symbols: &[Symbol],
    ) -> Result<OrderBookStream, FlowError>;

    /// One-shot historical candle fetch.
    async fn fetch_candles(&self, request: CandleRequest) -> Result<Vec<CandleRow>, FlowError>;
}
