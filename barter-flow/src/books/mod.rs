//! Order book depth views: optional tick-size price grouping, best-first sorting, truncation
//! and per-side cumulative quantity.

use crate::{error::FlowError, subscription::book::OrderBookLevel};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Price field a [`DepthView`] is keyed by, so a caller can label its axes.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceField {
    /// Raw level prices.
    Price,
    /// Prices floored to a multiple of the tick size.
    PriceGroup,
}

impl PriceField {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceField::Price => "price",
            PriceField::PriceGroup => "price_group",
        }
    }
}

impl std::fmt::Display for PriceField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Level of a [`DepthView`]. `cumulative_quantity` is the running quantity sum from the best
/// price of the side up to and including this level.
#[derive(Copy, Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct DepthLevel {
    pub price: f64,
    pub quantity: f64,
    pub cumulative_quantity: f64,
}

/// Sorted, truncated and accumulated order book. Bids are ordered highest price first, asks
/// lowest price first.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct DepthView {
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
    pub price_field: PriceField,
}

impl DepthView {
    pub fn best_bid(&self) -> Option<&DepthLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&DepthLevel> {
        self.asks.first()
    }

    /// Best ask price minus best bid price.
    pub fn spread(&self) -> Option<f64> {
        Some(self.best_ask()?.price - self.best_bid()?.price)
    }

    pub fn mid_price(&self) -> Option<f64> {
        Some((self.best_ask()?.price + self.best_bid()?.price) / 2.0)
    }

    /// Largest cumulative quantity of the bid side (depth axis range).
    pub fn max_bid_cumulative(&self) -> f64 {
        self.bids.last().map_or(0.0, |level| level.cumulative_quantity)
    }

    /// Largest cumulative quantity of the ask side (depth axis range).
    pub fn max_ask_cumulative(&self) -> f64 {
        self.asks.last().map_or(0.0, |level| level.cumulative_quantity)
    }
}

/// Build a [`DepthView`] from raw order book levels.
///
/// With `aggregate` set, each side is rolled up into groups of `floor(price / tick_size) *
/// tick_size` with quantities summed per group. Otherwise levels pass through unchanged and
/// `tick_size` is ignored. Each side is then sorted best price first, truncated to `levels`
/// entries and accumulated.
pub fn process(
    bids: &[OrderBookLevel],
    asks: &[OrderBookLevel],
    tick_size: f64,
    aggregate: bool,
    levels: usize,
) -> Result<DepthView, FlowError> {
    if aggregate && !(tick_size.is_finite() && tick_size > 0.0) {
        return Err(FlowError::InvalidTickSize(tick_size));
    }

    if let Some(invalid) = bids
        .iter()
        .chain(asks)
        .find(|level| !(level.price.is_finite() && level.quantity.is_finite()))
    {
        return Err(FlowError::InvalidLevel {
            price: invalid.price,
            quantity: invalid.quantity,
        });
    }

    let (mut bids, mut asks, price_field) = if aggregate {
        (
            group(bids, tick_size)?,
            group(asks, tick_size)?,
            PriceField::PriceGroup,
        )
    } else {
        (bids.to_vec(), asks.to_vec(), PriceField::Price)
    };

    bids.sort_by(|a, b| b.price.total_cmp(&a.price));
    asks.sort_by(|a, b| a.price.total_cmp(&b.price));

    Ok(DepthView {
        bids: accumulate(&bids[..bids.len().min(levels)]),
        asks: accumulate(&asks[..asks.len().min(levels)]),
        price_field,
    })
}

/// Roll levels up into tick-size price groups, summing quantities.
///
/// Groups are keyed by the floored tick count itself, so distinct groups stay distinct at any
/// finite magnitude.
fn group(levels: &[OrderBookLevel], tick_size: f64) -> Result<Vec<OrderBookLevel>, FlowError> {
    let mut ticks = levels
        .iter()
        .map(|level| {
            let group = (level.price / tick_size).floor();
            match (group * tick_size).is_finite() {
                true => Ok((group, level.quantity)),
                false => Err(FlowError::InvalidLevel {
                    price: level.price,
                    quantity: level.quantity,
                }),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    ticks.sort_by(|(a, _), (b, _)| a.total_cmp(b));

    Ok(ticks
        .into_iter()
        .chunk_by(|(group, _)| *group)
        .into_iter()
        .map(|(group, chunk)| {
            OrderBookLevel::new(group * tick_size, chunk.map(|(_, quantity)| quantity).sum())
        })
        .collect())
}

fn accumulate(levels: &[OrderBookLevel]) -> Vec<DepthLevel> {
    levels
        .iter()
        .scan(0.0, |cumulative, level| {
            *cumulative += level.quantity;
            Some(DepthLevel {
                price: level.price,
                quantity: level.quantity,
                cumulative_quantity: *cumulative,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels(input: &[(f64, f64)]) -> Vec<OrderBookLevel> {
        input.iter().copied().map(OrderBookLevel::from).collect()
    }

    fn view(levels: &[DepthLevel]) -> Vec<(f64, f64, f64)> {
        levels
            .iter()
            .map(|level| (level.price, level.quantity, level.cumulative_quantity))
            .collect()
    }

    #[test]
    fn test_process_groups_bids_by_tick_size() {
        let bids = levels(&[(103.0, 2.0), (107.0, 3.0), (95.0, 1.0)]);

        let actual = process(&bids, &[], 10.0, true, 5).unwrap();

        assert_eq!(actual.price_field, PriceField::PriceGroup);
        assert_eq!(view(&actual.bids), vec![(100.0, 5.0, 5.0), (90.0, 1.0, 6.0)]);
        assert!(actual.asks.is_empty());
    }

    #[test]
    fn test_process() {
        struct TestCase {
            bids: Vec<OrderBookLevel>,
            asks: Vec<OrderBookLevel>,
            tick_size: f64,
            aggregate: bool,
            levels: usize,
            expected_bids: Vec<(f64, f64, f64)>,
            expected_asks: Vec<(f64, f64, f64)>,
        }

        let tests = vec![
            TestCase {
                // TC0: raw levels sorted best first, asks ascending
                bids: levels(&[(99.0, 1.0), (101.0, 2.0), (100.0, 3.0)]),
                asks: levels(&[(105.0, 1.0), (102.0, 4.0)]),
                tick_size: 10.0,
                aggregate: false,
                levels: 10,
                expected_bids: vec![(101.0, 2.0, 2.0), (100.0, 3.0, 5.0), (99.0, 1.0, 6.0)],
                expected_asks: vec![(102.0, 4.0, 4.0), (105.0, 1.0, 5.0)],
            },
            TestCase {
                // TC1: truncated to levels, best prices kept
                bids: levels(&[(99.0, 1.0), (101.0, 2.0), (100.0, 3.0)]),
                asks: levels(&[(105.0, 1.0), (102.0, 4.0), (103.0, 0.5)]),
                tick_size: 10.0,
                aggregate: false,
                levels: 2,
                expected_bids: vec![(101.0, 2.0, 2.0), (100.0, 3.0, 5.0)],
                expected_asks: vec![(102.0, 4.0, 4.0), (103.0, 0.5, 4.5)],
            },
            TestCase {
                // TC2: asks grouped by floor of the tick
                bids: vec![],
                asks: levels(&[(101.0, 1.0), (109.9, 1.0), (110.0, 2.0), (125.0, 1.0)]),
                tick_size: 10.0,
                aggregate: true,
                levels: 5,
                expected_bids: vec![],
                expected_asks: vec![(100.0, 2.0, 2.0), (110.0, 2.0, 4.0), (120.0, 1.0, 5.0)],
            },
            TestCase {
                // TC3: zero levels yields empty views
                bids: levels(&[(99.0, 1.0)]),
                asks: levels(&[(101.0, 1.0)]),
                tick_size: 1.0,
                aggregate: true,
                levels: 0,
                expected_bids: vec![],
                expected_asks: vec![],
            },
            TestCase {
                // TC4: fractional tick size
                bids: levels(&[(1.26, 1.0), (1.24, 2.0), (1.21, 4.0)]),
                asks: vec![],
                tick_size: 0.5,
                aggregate: true,
                levels: 5,
                expected_bids: vec![(1.0, 7.0, 7.0)],
                expected_asks: vec![],
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = process(
                &test.bids,
                &test.asks,
                test.tick_size,
                test.aggregate,
                test.levels,
            )
            .unwrap();
            assert_eq!(view(&actual.bids), test.expected_bids, "TC{} bids failed", index);
            assert_eq!(view(&actual.asks), test.expected_asks, "TC{} asks failed", index);
        }
    }

    #[test]
    fn test_process_keeps_large_price_groups_distinct() {
        let bids = levels(&[(1e19, 1.0), (2e19, 1.0), (2e19, 0.5)]);

        let actual = process(&bids, &[], 1.0, true, 10).unwrap();

        assert_eq!(
            view(&actual.bids),
            vec![(2e19, 1.5, 1.5), (1e19, 1.0, 2.5)]
        );
    }

    #[test]
    fn test_process_rejects_price_group_beyond_f64_range() {
        let bids = levels(&[(1e300, 1.0)]);

        assert!(matches!(
            process(&bids, &[], 1e-10, true, 10),
            Err(FlowError::InvalidLevel { .. })
        ));
    }

    #[test]
    fn test_process_cumulative_is_non_decreasing() {
        let bids = levels(&[(10.0, 0.5), (12.0, 1.5), (11.0, 0.0), (9.0, 3.0)]);
        let actual = process(&bids, &[], 1.0, false, 100).unwrap();

        assert!(
            actual
                .bids
                .windows(2)
                .all(|pair| pair[0].cumulative_quantity <= pair[1].cumulative_quantity)
        );
        assert_eq!(actual.max_bid_cumulative(), 5.0);
    }

    #[test]
    fn test_process_rejects_invalid_input() {
        let valid = levels(&[(100.0, 1.0)]);

        assert_eq!(
            process(&valid, &valid, 0.0, true, 5),
            Err(FlowError::InvalidTickSize(0.0))
        );
        assert!(matches!(
            process(&valid, &valid, f64::NAN, true, 5),
            Err(FlowError::InvalidTickSize(_))
        ));

        // tick size is irrelevant without aggregation
        assert!(process(&valid, &valid, 0.0, false, 5).is_ok());

        let invalid = levels(&[(f64::INFINITY, 1.0)]);
        assert!(matches!(
            process(&valid, &invalid, 1.0, false, 5),
            Err(FlowError::InvalidLevel { .. })
        ));
    }

    #[test]
    fn test_depth_view_best_prices() {
        let view = process(
            &levels(&[(99.0, 1.0), (100.0, 1.0)]),
            &levels(&[(101.0, 1.0), (103.0, 2.0)]),
            1.0,
            false,
            10,
        )
        .unwrap();

        assert_eq!(view.best_bid().map(|level| level.price), Some(100.0));
        assert_eq!(view.best_ask().map(|level| level.price), Some(101.0));
        assert_eq!(view.spread(), Some(1.0));
        assert_eq!(view.mid_price(), Some(100.5));
        assert_eq!(view.max_ask_cumulative(), 3.0);
        assert_eq!(view.price_field.as_str(), "price");
    }
}
