use crate::{
    books::DepthView,
    instrument::{AggregateKey, ExchangeId, Symbol},
    jobs::registry::{JobName, JobState},
    stats::StatBucket,
    subscription::candle::{CandleRow, Timeframe},
};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

/// Output produced by the background jobs for the presentation layer.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub enum FlowEvent {
    /// Updated statistics of one key after a trade batch was ingested.
    TradeStats { key: AggregateKey, stats: StatBucket },
    /// Depth view of the latest order book snapshot.
    Depth {
        exchange: ExchangeId,
        symbol: Symbol,
        view: DepthView,
    },
    /// Historical candles fetched during a symbol switch.
    Candles {
        exchange: ExchangeId,
        symbol: Symbol,
        timeframe: Timeframe,
        rows: Vec<CandleRow>,
    },
    /// Job lifecycle transition.
    Job { name: JobName, state: JobState },
}

/// Sink for [`FlowEvent`]s. Called from the background runtime, so implementations must not
/// block.
pub trait FlowObserver: Send + Sync {
    fn on_event(&self, event: FlowEvent);
}

/// [`FlowObserver`] that discards every event.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopObserver;

impl FlowObserver for NoopObserver {
    fn on_event(&self, _: FlowEvent) {}
}

impl FlowObserver for mpsc::UnboundedSender<FlowEvent> {
    fn on_event(&self, event: FlowEvent) {
        if self.send(event).is_err() {
            debug!("FlowEvent receiver dropped, discarding event");
        }
    }
}
