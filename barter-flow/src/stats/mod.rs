//! Running trade statistics: order size classification, per-(exchange, symbol) volume and
//! CVD accumulation, and structured snapshots of the result.

/// Order size buckets and the notional classifier.
pub mod classifier;

/// Validating trade batch aggregator.
pub mod aggregator;

/// Structured report of the aggregator state, renderable as a text grid.
pub mod snapshot;

pub use aggregator::{
    Category, IngestPolicy, IngestReport, Metric, MetricSet, SharedTradeStats, StatBucket,
    TradeRejection, TradeStatsAggregator,
};
pub use classifier::{SizeBucket, classify};
pub use snapshot::{TradeStatsRow, TradeStatsSnapshot};
