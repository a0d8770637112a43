use super::registry::JobOutcome;
use crate::error::FlowError;
use serde::{Deserialize, Serialize};
use std::{
    future::Future,
    sync::mpsc::{self as std_mpsc, RecvTimeoutError},
    thread::JoinHandle,
    time::Duration,
};
use tokio::{
    runtime::Handle,
    sync::oneshot,
    task::JoinError,
};
use tracing::{debug, error, warn};

/// Default [`Deadline`] of blocking waits on the background runtime.
pub const DEFAULT_BLOCKING_DEADLINE: Duration = Duration::from_secs(120);

/// Upper bound on how long a blocking wait lets its job run.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
pub enum Deadline {
    /// Abort the job and report [`JobOutcome::TimedOut`] once the duration elapses.
    Within(Duration),
    /// Wait until the job settles, however long that takes.
    Unbounded,
}

impl Default for Deadline {
    fn default() -> Self {
        Self::Within(DEFAULT_BLOCKING_DEADLINE)
    }
}

/// Dedicated OS thread running a single threaded tokio runtime that hosts every background job.
///
/// Jobs are spawned through the runtime [`Handle`], which may be used from any thread. Dropping
/// the [`BackgroundRuntime`] stops the runtime, dropping every task still running on it, and
/// joins the thread.
#[derive(Debug)]
pub struct BackgroundRuntime {
    handle: Handle,
    shutdown_tx: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl BackgroundRuntime {
    /// Start the background thread and wait until its runtime is ready.
    pub fn start(thread_name: &str) -> Result<Self, FlowError> {
        let (handle_tx, handle_rx) = std_mpsc::sync_channel(1);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let thread = std::thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(error) => {
                        let _ = handle_tx.send(Err(FlowError::Runtime(error.to_string())));
                        return;
                    }
                };

                if handle_tx.send(Ok(runtime.handle().clone())).is_err() {
                    return;
                }

                // Drives every spawned job until shutdown is requested (or the sender dropped)
                runtime.block_on(async move {
                    let _ = shutdown_rx.await;
                });
                debug!("background runtime shutting down");
            })
            .map_err(|error| FlowError::Runtime(error.to_string()))?;

        let handle = handle_rx.recv().map_err(|_| {
            FlowError::Runtime("background thread exited before its runtime started".to_string())
        })??;

        debug!(thread = thread_name, "background runtime started");

        Ok(Self {
            handle,
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Run `future` on the background runtime and block the calling thread until it settles or
    /// `deadline` elapses, in which case the job is aborted.
    ///
    /// Must not be called from inside an async runtime: blocking a runtime thread on a job of
    /// the (possibly same) runtime would deadlock, so
    /// [`FlowError::BlockingInRuntime`] is returned instead.
    pub fn run_blocking<Fut, T>(&self, future: Fut, deadline: Deadline) -> JobOutcome<T>
    where
        Fut: Future<Output = Result<T, FlowError>> + Send + 'static,
        T: Send + 'static,
    {
        if Handle::try_current().is_ok() {
            return JobOutcome::Failed(FlowError::BlockingInRuntime);
        }

        let (outcome_tx, outcome_rx) = std_mpsc::sync_channel(1);

        let job = self.handle.spawn(future);
        let abort = job.abort_handle();

        self.handle.spawn(async move {
            let outcome = match job.await {
                Ok(Ok(value)) => JobOutcome::Completed(value),
                Ok(Err(error)) => JobOutcome::Failed(error),
                Err(error) if error.is_cancelled() => JobOutcome::Cancelled,
                Err(error) => JobOutcome::Failed(FlowError::JobPanicked(panic_message(error))),
            };
            let _ = outcome_tx.send(outcome);
        });

        let received = match deadline {
            Deadline::Unbounded => outcome_rx
                .recv()
                .map_err(|_| RecvTimeoutError::Disconnected),
            Deadline::Within(timeout) => outcome_rx.recv_timeout(timeout),
        };

        match received {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => {
                abort.abort();
                JobOutcome::TimedOut
            }
            Err(RecvTimeoutError::Disconnected) => JobOutcome::Failed(FlowError::Runtime(
                "background runtime stopped before the job settled".to_string(),
            )),
        }
    }
}

impl Drop for BackgroundRuntime {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }

        let Some(thread) = self.thread.take() else {
            return;
        };

        // Joining from a runtime thread would block it, so detach instead
        if Handle::try_current().is_ok() {
            warn!("BackgroundRuntime dropped inside an async runtime, detaching its thread");
            return;
        }

        if thread.join().is_err() {
            error!("background runtime thread panicked");
        }
    }
}

/// Human readable payload of a panicked task.
pub fn panic_message(error: JoinError) -> String {
    match error.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|message| message.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string()),
        Err(error) => error.to_string(),
    }
}
