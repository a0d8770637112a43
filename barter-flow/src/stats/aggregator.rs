use super::{
    classifier::{SizeBucket, classify},
    snapshot::{TradeStatsRow, TradeStatsSnapshot},
};
use crate::{
    error::ValidationError,
    instrument::{AggregateKey, ExchangeId},
    subscription::trade::{PublicTrade, TradeRecord},
};
use fnv::FnvBuildHasher;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// [`TradeStatsAggregator`] shared between the background jobs that write to it and the control
/// thread that reads snapshots.
pub type SharedTradeStats = Arc<Mutex<TradeStatsAggregator>>;

/// What to do with the rest of a batch once an invalid trade is found.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestPolicy {
    /// Stop at the first invalid trade. Trades earlier in the batch keep their effect.
    #[default]
    AbortRemainder,
    /// Skip invalid trades and keep processing the batch.
    SkipInvalid,
}

/// Top level statistic category.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
pub enum Category {
    #[serde(rename = "volume")]
    Volume,
    #[serde(rename = "CVD")]
    Cvd,
}

impl Category {
    pub fn label(&self) -> &'static str {
        match self {
            Category::Volume => "volume",
            Category::Cvd => "CVD",
        }
    }
}

/// Metric within a [`Category`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
pub enum Metric {
    TotalBase,
    TotalUsd,
    Bucket(SizeBucket),
    /// Base amount of trades too large for any [`SizeBucket`].
    Unbucketed,
}

/// Running accumulators of one [`Category`].
#[derive(Copy, Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct MetricSet {
    pub total_base: f64,
    pub total_usd: f64,
    pub buckets: [f64; 5],
    pub unbucketed: f64,
}

impl MetricSet {
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::TotalBase => self.total_base,
            Metric::TotalUsd => self.total_usd,
            Metric::Bucket(bucket) => self.buckets[bucket.index()],
            Metric::Unbucketed => self.unbucketed,
        }
    }

    fn get_mut(&mut self, metric: Metric) -> &mut f64 {
        match metric {
            Metric::TotalBase => &mut self.total_base,
            Metric::TotalUsd => &mut self.total_usd,
            Metric::Bucket(bucket) => &mut self.buckets[bucket.index()],
            Metric::Unbucketed => &mut self.unbucketed,
        }
    }
}

/// Volume and cumulative volume delta statistics of one [`AggregateKey`].
///
/// Volume figures never decrease, CVD figures may go negative.
#[derive(Copy, Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct StatBucket {
    pub volume: MetricSet,
    pub cvd: MetricSet,
}

impl StatBucket {
    pub fn category(&self, category: Category) -> &MetricSet {
        match category {
            Category::Volume => &self.volume,
            Category::Cvd => &self.cvd,
        }
    }

    pub fn get(&self, category: Category, metric: Metric) -> f64 {
        self.category(category).get(metric)
    }

    fn add(&mut self, category: Category, metric: Metric, value: f64) {
        let metrics = match category {
            Category::Volume => &mut self.volume,
            Category::Cvd => &mut self.cvd,
        };
        *metrics.get_mut(metric) += value;
    }

    /// Apply one validated trade, returning its [`SizeBucket`] (`None` when unbucketed).
    fn apply(&mut self, trade: &PublicTrade) -> Option<SizeBucket> {
        let signed = trade.signed_amount();

        self.add(Category::Volume, Metric::TotalBase, trade.amount);
        self.add(Category::Volume, Metric::TotalUsd, trade.notional());
        self.add(Category::Cvd, Metric::TotalBase, signed);
        self.add(Category::Cvd, Metric::TotalUsd, trade.signed_notional());

        let (metric, bucket) = match classify(trade.notional()) {
            Ok(bucket) => (Metric::Bucket(bucket), Some(bucket)),
            Err(error) => {
                warn!(
                    symbol = %trade.symbol,
                    %error,
                    "trade notional above largest size bucket, recording as unbucketed"
                );
                (Metric::Unbucketed, None)
            }
        };
        self.add(Category::Volume, metric, trade.amount);
        self.add(Category::Cvd, metric, signed);

        bucket
    }
}

/// Invalid trade found while ingesting a batch.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct TradeRejection {
    /// Position of the trade within its batch.
    pub index: usize,
    pub error: ValidationError,
}

/// Outcome of [`TradeStatsAggregator::ingest`].
#[derive(Clone, PartialEq, Debug, Default, Serialize)]
pub struct IngestReport {
    pub applied: usize,
    pub rejected: Vec<TradeRejection>,
    /// Number of trades left unprocessed after an [`IngestPolicy::AbortRemainder`] stop.
    pub abandoned: usize,
    /// Number of applied trades whose notional is above the largest [`SizeBucket`].
    pub unbucketed: usize,
    /// Keys updated by this batch, in first-touched order.
    pub keys: Vec<AggregateKey>,
}

impl IngestReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Running per-(exchange, symbol) trade statistics.
///
/// State is created on first reference and kept for the lifetime of the aggregator.
#[derive(Clone, Debug, Default)]
pub struct TradeStatsAggregator {
    policy: IngestPolicy,
    stats: IndexMap<AggregateKey, StatBucket, FnvBuildHasher>,
}

impl TradeStatsAggregator {
    pub fn new(policy: IngestPolicy) -> Self {
        Self {
            policy,
            stats: IndexMap::default(),
        }
    }

    pub fn policy(&self) -> IngestPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: IngestPolicy) {
        self.policy = policy;
    }

    /// Validate and apply a batch of trades received from `exchange`.
    ///
    /// Never fails: invalid trades are logged and reported in the [`IngestReport`]. With
    /// [`IngestPolicy::AbortRemainder`] the first invalid trade ends processing of the batch
    /// while trades applied before it are kept.
    pub fn ingest(&mut self, exchange: &ExchangeId, batch: &[TradeRecord]) -> IngestReport {
        let mut report = IngestReport::default();

        for (index, record) in batch.iter().enumerate() {
            let trade = match record.validate() {
                Ok(trade) => trade,
                Err(error) => {
                    warn!(
                        %exchange,
                        symbol = %record.symbol,
                        index,
                        %error,
                        "rejected invalid trade"
                    );
                    report.rejected.push(TradeRejection { index, error });

                    match self.policy {
                        IngestPolicy::AbortRemainder => {
                            report.abandoned = batch.len() - index - 1;
                            break;
                        }
                        IngestPolicy::SkipInvalid => continue,
                    }
                }
            };

            let key = AggregateKey::new(exchange.clone(), trade.symbol.clone());
            if self.stats.entry(key.clone()).or_default().apply(&trade).is_none() {
                report.unbucketed += 1;
            }
            report.applied += 1;

            if !report.keys.contains(&key) {
                report.keys.push(key);
            }
        }

        debug!(
            %exchange,
            applied = report.applied,
            rejected = report.rejected.len(),
            abandoned = report.abandoned,
            unbucketed = report.unbucketed,
            "ingested trade batch"
        );

        report
    }

    pub fn stats(&self, key: &AggregateKey) -> Option<&StatBucket> {
        self.stats.get(key)
    }

    /// Known keys in first-seen order.
    pub fn keys(&self) -> impl Iterator<Item = &AggregateKey> {
        self.stats.keys()
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Full-precision report of every known key, in first-seen order.
    pub fn snapshot(&self) -> TradeStatsSnapshot {
        TradeStatsSnapshot {
            rows: self
                .stats
                .iter()
                .map(|(key, stats)| TradeStatsRow {
                    key: key.clone(),
                    stats: *stats,
                })
                .collect(),
        }
    }
}
