//! # Barter-Flow
//! Streaming job orchestration and order flow aggregation for market data front-ends.
//!
//! A [`JobOrchestrator`] owns a dedicated background thread running a single threaded tokio
//! runtime. The control thread switches between symbols; each switch blocks on a historical
//! candle backfill and then starts trade and order book streaming jobs consuming a
//! [`MarketDataSource`]. Results are pushed to a [`FlowObserver`] as [`FlowEvent`]s:
//! * Trade batches are validated and aggregated into per-(exchange, symbol) volume and
//!   cumulative volume delta statistics, segmented by order size bucket
//!   ([`TradeStatsAggregator`]).
//! * Order book snapshots are grouped by tick size, sorted, truncated and accumulated into a
//!   [`DepthView`](books::DepthView) ([`books::process`]).
//! * Historical candles are delivered as fetched and can be resampled into coarser timeframes
//!   ([`candles::resample`]).
//!
//! The aggregation functions are plain synchronous code and usable without the orchestrator.

/// All [`Error`](std::error::Error)s generated in Barter-Flow.
pub mod error;

/// Exchange, symbol and side identifiers.
pub mod instrument;

/// Normalised trade, order book and candle data.
pub mod subscription;

/// Order size classification and running trade statistics.
pub mod stats;

/// Order book depth views.
pub mod books;

/// Candle resampling.
pub mod candles;

/// [`MarketDataSource`] collaborator consumed by the streaming jobs.
pub mod source;

/// [`FlowEvent`] output and the [`FlowObserver`] sink.
pub mod observer;

/// Stream adapters used by the streaming jobs.
pub mod streams;

/// Background runtime, job registry and [`JobOrchestrator`].
pub mod jobs;

/// [`OrchestratorConfig`] and its environment overrides.
pub mod config;

pub use config::{BookSettings, OrchestratorConfig};
pub use error::{FlowError, ValidationError};
pub use instrument::{AggregateKey, ExchangeId, Side, Symbol};
pub use jobs::{
    orchestrator::{JobOrchestrator, SwitchReport},
    registry::{JobName, JobOutcome, JobState},
    runtime::Deadline,
};
pub use observer::{FlowEvent, FlowObserver, NoopObserver};
pub use source::MarketDataSource;
pub use stats::{TradeStatsAggregator, TradeStatsSnapshot};
