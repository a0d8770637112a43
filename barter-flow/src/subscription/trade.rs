use crate::{
    error::ValidationError,
    instrument::{Side, Symbol},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Numeric field as it arrives from an exchange payload: either a JSON number or a numeric
/// string.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawNumber {
    Float(f64),
    Text(SmolStr),
}

impl RawNumber {
    /// Parse to a finite `f64`. `NaN` and infinities are treated as unparsable.
    pub fn parse(&self) -> Option<f64> {
        let value = match self {
            RawNumber::Float(value) => *value,
            RawNumber::Text(text) => text.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

impl From<f64> for RawNumber {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for RawNumber {
    fn from(value: &str) -> Self {
        Self::Text(SmolStr::new(value))
    }
}

impl std::fmt::Display for RawNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawNumber::Float(value) => write!(f, "{value}"),
            RawNumber::Text(text) => write!(f, "{text}"),
        }
    }
}

/// Unvalidated trade as yielded by a trade stream batch.
///
/// Every field the statistics depend on is optional so that malformed exchange payloads are
/// representable and can be rejected by [`TradeRecord::validate`].
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct TradeRecord {
    pub symbol: Symbol,
    #[serde(default)]
    pub price: Option<RawNumber>,
    #[serde(default)]
    pub amount: Option<RawNumber>,
    #[serde(default)]
    pub side: Option<SmolStr>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl TradeRecord {
    /// Construct a well-formed [`TradeRecord`].
    pub fn new<S>(symbol: S, price: f64, amount: f64, side: Side, timestamp: DateTime<Utc>) -> Self
    where
        S: Into<Symbol>,
    {
        Self {
            symbol: symbol.into(),
            price: Some(RawNumber::Float(price)),
            amount: Some(RawNumber::Float(amount)),
            side: Some(SmolStr::new_static(side.as_str())),
            timestamp: Some(timestamp),
        }
    }

    /// Check presence of price, amount and side, then parse them. Amount and price must be
    /// finite and non-negative.
    pub fn validate(&self) -> Result<PublicTrade, ValidationError> {
        let price = self
            .price
            .as_ref()
            .ok_or(ValidationError::MissingField("price"))?;
        let amount = self
            .amount
            .as_ref()
            .ok_or(ValidationError::MissingField("amount"))?;
        let side = self
            .side
            .as_ref()
            .ok_or(ValidationError::MissingField("side"))?;

        let amount = amount.parse().ok_or_else(|| ValidationError::NotANumber {
            field: "amount",
            value: amount.to_string(),
        })?;

        let side = Side::parse(side).ok_or_else(|| ValidationError::InvalidSide(side.to_string()))?;

        let price = price.parse().ok_or_else(|| ValidationError::NotANumber {
            field: "price",
            value: price.to_string(),
        })?;

        for (field, value) in [("price", price), ("amount", amount)] {
            if value < 0.0 {
                return Err(ValidationError::Negative { field, value });
            }
        }

        Ok(PublicTrade {
            symbol: self.symbol.clone(),
            price,
            amount,
            side,
            timestamp: self.timestamp,
        })
    }
}

/// Validated trade.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct PublicTrade {
    pub symbol: Symbol,
    pub price: f64,
    pub amount: f64,
    pub side: Side,
    pub timestamp: Option<DateTime<Utc>>,
}

impl PublicTrade {
    /// Trade value in quote currency.
    pub fn notional(&self) -> f64 {
        self.price * self.amount
    }

    /// Base amount signed by aggressor side.
    pub fn signed_amount(&self) -> f64 {
        self.side.sign() * self.amount
    }

    /// Notional signed by aggressor side.
    pub fn signed_notional(&self) -> f64 {
        self.signed_amount() * self.price
    }
}
