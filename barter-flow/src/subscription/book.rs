use chrono::{DateTime, Utc};
use derive_more::Constructor;
use serde::{Deserialize, Serialize};

/// Raw order book price level.
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug, Default, Constructor, Deserialize, Serialize)]
pub struct OrderBookLevel {
    pub price: f64,
    pub quantity: f64,
}

impl From<(f64, f64)> for OrderBookLevel {
    fn from((price, quantity): (f64, f64)) -> Self {
        Self { price, quantity }
    }
}

/// Full order book snapshot as yielded by an order book stream.
#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct OrderBookSnapshot {
    pub time_exchange: Option<DateTime<Utc>>,
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
}

impl OrderBookSnapshot {
    pub fn new<Iter, L>(bids: Iter, asks: Iter) -> Self
    where
        Iter: IntoIterator<Item = L>,
        L: Into<OrderBookLevel>,
    {
        Self {
            time_exchange: None,
            bids: bids.into_iter().map(L::into).collect(),
            asks: asks.into_iter().map(L::into).collect(),
        }
    }
}
