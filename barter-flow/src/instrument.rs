use derive_more::{Constructor, Display, From};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Exchange identifier as understood by the [`MarketDataSource`](crate::source::MarketDataSource),
/// eg/ "binance", "bybit".
#[derive(
    Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, From, Deserialize, Serialize,
)]
pub struct ExchangeId(pub SmolStr);

impl From<&str> for ExchangeId {
    fn from(value: &str) -> Self {
        Self(SmolStr::new(value))
    }
}

impl ExchangeId {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Traded symbol, eg/ "BTCUSD", "BTC/USDT".
#[derive(
    Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, From, Deserialize, Serialize,
)]
pub struct Symbol(pub SmolStr);

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Self(SmolStr::new(value))
    }
}

impl Symbol {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Identity of all aggregated trade statistics. State is never merged across exchanges.
#[derive(
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Debug,
    Display,
    Constructor,
    Deserialize,
    Serialize,
)]
#[display("{exchange}: {symbol}")]
pub struct AggregateKey {
    pub exchange: ExchangeId,
    pub symbol: Symbol,
}

/// Aggressor side of a trade.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }

    /// Parse the textual side used by exchange trade payloads. Only the exact lowercase
    /// values are accepted.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "buy" => Some(Side::Buy),
            "sell" => Some(Side::Sell),
            _ => None,
        }
    }

    /// +1 for buys, -1 for sells.
    pub fn sign(&self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_key_display() {
        let key = AggregateKey::new(ExchangeId::from("binance"), Symbol::from("BTCUSD"));
        assert_eq!(key.to_string(), "binance: BTCUSD");
    }

    #[test]
    fn test_side_parse() {
        struct TestCase {
            input: &'static str,
            expected: Option<Side>,
        }

        let tests = vec![
            TestCase {
                // TC0: buy
                input: "buy",
                expected: Some(Side::Buy),
            },
            TestCase {
                // TC1: sell
                input: "sell",
                expected: Some(Side::Sell),
            },
            TestCase {
                // TC2: capitalised side is not accepted
                input: "Buy",
                expected: None,
            },
            TestCase {
                // TC3: unknown side
                input: "hold",
                expected: None,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            assert_eq!(Side::parse(test.input), test.expected, "TC{} failed", index);
        }
    }
}
