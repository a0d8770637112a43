use super::{
    registry::{JobId, JobName, JobOutcome, JobRegistry, JobState},
    runtime::{BackgroundRuntime, Deadline, panic_message},
};
use crate::{
    books,
    config::{BookSettings, OrchestratorConfig},
    error::FlowError,
    instrument::{ExchangeId, Symbol},
    observer::{FlowEvent, FlowObserver},
    source::MarketDataSource,
    stats::{SharedTradeStats, TradeStatsAggregator, TradeStatsSnapshot},
    streams::timeout::TimeoutStream,
    subscription::candle::{CandleRequest, Timeframe},
};
use chrono::Utc;
use futures::{Stream, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};

/// Summary of one [`JobOrchestrator::switch_symbol`] call.
#[derive(Clone, PartialEq, Debug)]
pub struct SwitchReport {
    pub symbol: Symbol,
    /// Every tracked job was cancelled because the active symbol changed.
    pub global_teardown: bool,
    /// Number of jobs cancelled by the global teardown.
    pub cancelled: usize,
    /// The trade job of the symbol was cancelled for a forced resubscription.
    pub trades_resubscribed: bool,
    /// Number of historical candle rows fetched.
    pub backfill: JobOutcome<usize>,
    /// Streaming jobs submitted by this switch.
    pub started: Vec<JobName>,
}

/// Owns the background runtime and the registry of named streaming jobs.
///
/// All methods are called from the control thread. Streaming jobs run on the background
/// runtime, write to the shared trade statistics and report through the [`FlowObserver`].
pub struct JobOrchestrator {
    config: OrchestratorConfig,
    source: Arc<dyn MarketDataSource>,
    observer: Arc<dyn FlowObserver>,
    trade_stats: SharedTradeStats,
    book_settings: Arc<RwLock<BookSettings>>,
    registry: JobRegistry,
    active_symbol: Option<Symbol>,
    runtime: BackgroundRuntime,
}

impl std::fmt::Debug for JobOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobOrchestrator")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("active_symbol", &self.active_symbol)
            .finish_non_exhaustive()
    }
}

impl JobOrchestrator {
    /// Start the background runtime. No job runs until [`Self::submit`] or
    /// [`Self::switch_symbol`] is called.
    pub fn new(
        config: OrchestratorConfig,
        source: Arc<dyn MarketDataSource>,
        observer: Arc<dyn FlowObserver>,
    ) -> Result<Self, FlowError> {
        let runtime = BackgroundRuntime::start(&config.thread_name)?;

        Ok(Self {
            trade_stats: Arc::new(Mutex::new(TradeStatsAggregator::new(config.ingest_policy))),
            book_settings: Arc::new(RwLock::new(config.book)),
            registry: JobRegistry::default(),
            active_symbol: None,
            config,
            source,
            observer,
            runtime,
        })
    }

    /// Schedule `job` on the background runtime and track it under `name`.
    ///
    /// Collisions are not checked: a tracked `name` has its registry entry replaced while the
    /// earlier job keeps running untracked. Check [`Self::is_tracked`] first where that matters.
    ///
    /// The job outcome is logged and emitted as [`FlowEvent::Job`], never returned.
    pub fn submit<Fut>(&self, name: JobName, job: Fut) -> JobId
    where
        Fut: Future<Output = Result<(), FlowError>> + Send + 'static,
    {
        let handle = self.runtime.handle();
        let task = handle.spawn(job);

        let (id, replaced) = self.registry.insert(name.clone(), task.abort_handle());
        if replaced.is_some() {
            warn!(job = %name, %id, "job submitted under a tracked name, replacing registry entry");
        }

        info!(job = %name, %id, "job submitted");
        self.observer.on_event(FlowEvent::Job {
            name: name.clone(),
            state: JobState::Running,
        });

        let registry = self.registry.clone();
        let observer = Arc::clone(&self.observer);
        handle.spawn(async move {
            let state = match task.await {
                Ok(Ok(())) => {
                    info!(job = %name, %id, "job completed");
                    JobState::Completed
                }
                Ok(Err(error)) => {
                    error!(job = %name, %id, %error, "job failed");
                    JobState::Failed
                }
                Err(error) if error.is_cancelled() => {
                    info!(job = %name, %id, "job cancelled");
                    JobState::Cancelled
                }
                Err(error) => {
                    error!(job = %name, %id, panic = %panic_message(error), "job panicked");
                    JobState::Failed
                }
            };

            if registry.remove_if(&name, id) {
                debug!(job = %name, %id, "job removed from registry");
            }

            observer.on_event(FlowEvent::Job { name, state });
        });

        id
    }

    /// Run `job` on the background runtime and block the calling thread until it settles or
    /// `deadline` elapses.
    ///
    /// Every outcome other than completion is logged here and handed back as a value, never
    /// as a panic or `Err`.
    pub fn run_blocking<Fut, T>(&self, label: &str, job: Fut, deadline: Deadline) -> JobOutcome<T>
    where
        Fut: Future<Output = Result<T, FlowError>> + Send + 'static,
        T: Send + 'static,
    {
        debug!(job = label, ?deadline, "blocking on job");

        let outcome = self.runtime.run_blocking(job, deadline);
        match &outcome {
            JobOutcome::Completed(_) => debug!(job = label, "blocking job completed"),
            JobOutcome::Failed(error) => error!(job = label, %error, "blocking job failed"),
            JobOutcome::Cancelled => warn!(job = label, "blocking job cancelled"),
            JobOutcome::TimedOut => warn!(job = label, ?deadline, "blocking job timed out, aborted"),
        }

        outcome
    }

    /// Cancel the job tracked under `name`, if any. The job stops at its next suspension point
    /// but leaves the registry immediately.
    pub fn cancel(&self, name: &JobName) -> bool {
        match self.registry.remove(name) {
            Some(abort) => {
                abort.abort();
                info!(job = %name, "job cancellation requested");
                true
            }
            None => {
                debug!(job = %name, "cancel requested for untracked job");
                false
            }
        }
    }

    /// Cancel every tracked job and clear the registry, returning how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let jobs = self.registry.drain();
        for (name, abort) in &jobs {
            abort.abort();
            debug!(job = %name, "job cancellation requested");
        }

        info!(cancelled = jobs.len(), "cancelled all jobs");
        jobs.len()
    }

    /// Make `symbol` the active symbol.
    ///
    /// 1. A different active symbol tears every tracked job down.
    /// 2. `force_resubscribe_trades` cancels the trade job of `symbol` (even if already active).
    /// 3. Historical candles of the configured horizon are fetched, blocking the caller up to
    ///    the configured backfill deadline. A failed backfill, including a lookback window out
    ///    of the representable time range, does not stop the switch.
    /// 4. Trade and order book streaming jobs of `symbol` are submitted unless already tracked.
    pub fn switch_symbol(
        &mut self,
        exchange: &ExchangeId,
        symbol: &Symbol,
        timeframe: Timeframe,
        force_resubscribe_trades: bool,
    ) -> SwitchReport {
        info!(
            %exchange,
            %symbol,
            %timeframe,
            force_resubscribe_trades,
            active = ?self.active_symbol,
            "switching symbol"
        );

        let mut report = SwitchReport {
            symbol: symbol.clone(),
            global_teardown: false,
            cancelled: 0,
            trades_resubscribed: false,
            backfill: JobOutcome::Cancelled,
            started: Vec::new(),
        };

        if self
            .active_symbol
            .as_ref()
            .is_some_and(|active| active != symbol)
        {
            report.global_teardown = true;
            report.cancelled = self.cancel_all();
        }

        let trades = JobName::trades(symbol);
        if force_resubscribe_trades {
            report.trades_resubscribed = self.cancel(&trades);
        }

        report.backfill = self.backfill(exchange, symbol, timeframe);

        if !self.is_tracked(&trades) {
            self.submit(
                trades.clone(),
                trade_job(self.job_context(), exchange.clone(), symbol.clone()),
            );
            report.started.push(trades);
        }

        let order_book = JobName::order_book(symbol);
        if !self.is_tracked(&order_book) {
            self.submit(
                order_book.clone(),
                order_book_job(self.job_context(), exchange.clone(), symbol.clone()),
            );
            report.started.push(order_book);
        }

        self.active_symbol = Some(symbol.clone());

        info!(
            %symbol,
            started = report.started.len(),
            backfill = ?report.backfill.state(),
            "symbol switched"
        );

        report
    }

    /// Blocking historical candle fetch, emitting the rows as [`FlowEvent::Candles`].
    fn backfill(
        &self,
        exchange: &ExchangeId,
        symbol: &Symbol,
        timeframe: Timeframe,
    ) -> JobOutcome<usize> {
        let since = match timeframe.since(Utc::now(), self.config.backfill_horizon) {
            Ok(since) => since,
            Err(error) => {
                error!(%symbol, %timeframe, %error, "backfill window out of range, skipping fetch");
                return JobOutcome::Failed(error);
            }
        };

        let request = CandleRequest {
            exchanges: vec![exchange.clone()],
            symbols: vec![symbol.clone()],
            timeframes: vec![timeframe],
            since,
            persist: self.config.persist_candles,
        };

        let source = Arc::clone(&self.source);
        let observer = Arc::clone(&self.observer);
        let exchange = exchange.clone();
        let symbol = symbol.clone();

        let label = format!("backfill_{symbol}");
        self.run_blocking(
            &label,
            async move {
                let rows = source.fetch_candles(request).await?;
                let fetched = rows.len();
                observer.on_event(FlowEvent::Candles {
                    exchange,
                    symbol,
                    timeframe,
                    rows,
                });
                Ok(fetched)
            },
            self.config.backfill_deadline,
        )
    }

    fn job_context(&self) -> JobContext {
        JobContext {
            source: Arc::clone(&self.source),
            observer: Arc::clone(&self.observer),
            trade_stats: Arc::clone(&self.trade_stats),
            book_settings: Arc::clone(&self.book_settings),
            idle_timeout: self.config.stream_idle_timeout,
        }
    }

    pub fn is_tracked(&self, name: &JobName) -> bool {
        self.registry.contains(name)
    }

    /// Tracked job names, sorted.
    pub fn tracked_jobs(&self) -> Vec<JobName> {
        self.registry.names()
    }

    pub fn active_symbol(&self) -> Option<&Symbol> {
        self.active_symbol.as_ref()
    }

    /// Consistent snapshot of the running trade statistics.
    pub fn trade_stats(&self) -> TradeStatsSnapshot {
        self.trade_stats.lock().snapshot()
    }

    /// Shared handle to the running trade statistics.
    pub fn trade_stats_handle(&self) -> SharedTradeStats {
        Arc::clone(&self.trade_stats)
    }

    pub fn book_settings(&self) -> BookSettings {
        *self.book_settings.read()
    }

    /// Replace the depth view settings, picked up by the next order book snapshot.
    pub fn set_book_settings(&self, settings: BookSettings) {
        info!(?settings, "order book settings updated");
        *self.book_settings.write() = settings;
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }
}

impl Drop for JobOrchestrator {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// Shared state a streaming job runs with.
struct JobContext {
    source: Arc<dyn MarketDataSource>,
    observer: Arc<dyn FlowObserver>,
    trade_stats: SharedTradeStats,
    book_settings: Arc<RwLock<BookSettings>>,
    idle_timeout: Option<Duration>,
}

/// Streaming job feeding trade batches into the shared [`TradeStatsAggregator`].
async fn trade_job(
    context: JobContext,
    exchange: ExchangeId,
    symbol: Symbol,
) -> Result<(), FlowError> {
    let JobContext {
        source,
        observer,
        trade_stats,
        idle_timeout,
        ..
    } = context;

    let stream = source
        .watch_trades(&exchange, std::slice::from_ref(&symbol))
        .await?;

    drive(&symbol, stream, idle_timeout, |batch| {
        let updates = {
            let mut aggregator = trade_stats.lock();
            let report = aggregator.ingest(&exchange, &batch);
            report
                .keys
                .into_iter()
                .filter_map(|key| aggregator.stats(&key).copied().map(|stats| (key, stats)))
                .collect::<Vec<_>>()
        };

        for (key, stats) in updates {
            observer.on_event(FlowEvent::TradeStats { key, stats });
        }
    })
    .await
}

/// Streaming job turning order book snapshots into depth views with the current
/// [`BookSettings`].
async fn order_book_job(
    context: JobContext,
    exchange: ExchangeId,
    symbol: Symbol,
) -> Result<(), FlowError> {
    let JobContext {
        source,
        observer,
        book_settings,
        idle_timeout,
        ..
    } = context;

    let stream = source
        .watch_order_book(&exchange, std::slice::from_ref(&symbol))
        .await?;

    drive(&symbol, stream, idle_timeout, |snapshot| {
        let settings = *book_settings.read();
        match books::process(
            &snapshot.bids,
            &snapshot.asks,
            settings.tick_size,
            settings.aggregate,
            settings.levels,
        ) {
            Ok(view) => observer.on_event(FlowEvent::Depth {
                exchange: exchange.clone(),
                symbol: symbol.clone(),
                view,
            }),
            Err(error) => warn!(%exchange, %symbol, %error, "skipping unprocessable order book"),
        }
    })
    .await
}

/// Consume a source stream until it ends, handing every item to `on_item`.
///
/// Non-terminal errors are logged and skipped. A terminal error, or the idle timeout elapsing,
/// ends the job with an `Err`.
async fn drive<T, F>(
    symbol: &Symbol,
    stream: impl Stream<Item = Result<T, FlowError>> + Unpin,
    idle_timeout: Option<Duration>,
    on_item: F,
) -> Result<(), FlowError>
where
    F: FnMut(T),
{
    let Some(idle_timeout) = idle_timeout else {
        return consume(symbol, stream, on_item).await;
    };

    let mut stream = TimeoutStream::new(stream, idle_timeout);
    consume(symbol, &mut stream, on_item).await?;

    match stream.timed_out() {
        true => Err(FlowError::Source(format!(
            "{symbol} stream idle timeout after {}s",
            idle_timeout.as_secs()
        ))),
        false => Ok(()),
    }
}

async fn consume<T, F>(
    symbol: &Symbol,
    mut stream: impl Stream<Item = Result<T, FlowError>> + Unpin,
    mut on_item: F,
) -> Result<(), FlowError>
where
    F: FnMut(T),
{
    while let Some(item) = stream.next().await {
        match item {
            Ok(item) => on_item(item),
            Err(error) if error.is_terminal() => return Err(error),
            Err(error) => warn!(%symbol, %error, "skipping source stream error"),
        }
    }

    info!(%symbol, "source stream ended");
    Ok(())
}
