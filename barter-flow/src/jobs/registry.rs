use crate::{error::FlowError, instrument::Symbol};
use derive_more::{Display, From};
use fnv::FnvHashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smol_str::{SmolStr, format_smolstr};
use std::sync::Arc;
use tokio::task::AbortHandle;

/// Unique name of a tracked job, eg/ "trades_BTCUSD".
#[derive(
    Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, From, Deserialize, Serialize,
)]
pub struct JobName(pub SmolStr);

impl JobName {
    /// Name of the trade streaming job of `symbol`.
    pub fn trades(symbol: &Symbol) -> Self {
        Self(format_smolstr!("trades_{symbol}"))
    }

    /// Name of the order book streaming job of `symbol`.
    pub fn order_book(symbol: &Symbol) -> Self {
        Self(format_smolstr!("orderbook_{symbol}"))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for JobName {
    fn from(value: &str) -> Self {
        Self(SmolStr::new(value))
    }
}

/// Registry-unique identifier of one job submission. Re-submitting a name yields a new id.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Deserialize, Serialize,
)]
pub struct JobId(pub u64);

/// Lifecycle state of a job: `Running` until it settles into one of the other states.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_finished(&self) -> bool {
        !matches!(self, JobState::Running)
    }
}

/// Settled result of a job awaited with
/// [`JobOrchestrator::run_blocking`](super::orchestrator::JobOrchestrator::run_blocking).
#[derive(Clone, PartialEq, Debug)]
pub enum JobOutcome<T> {
    Completed(T),
    Failed(FlowError),
    Cancelled,
    /// The deadline elapsed first and the job was aborted.
    TimedOut,
}

impl<T> JobOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed(_))
    }

    pub fn state(&self) -> JobState {
        match self {
            JobOutcome::Completed(_) => JobState::Completed,
            JobOutcome::Failed(_) => JobState::Failed,
            JobOutcome::Cancelled | JobOutcome::TimedOut => JobState::Cancelled,
        }
    }

    pub fn map<U, F>(self, op: F) -> JobOutcome<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            JobOutcome::Completed(value) => JobOutcome::Completed(op(value)),
            JobOutcome::Failed(error) => JobOutcome::Failed(error),
            JobOutcome::Cancelled => JobOutcome::Cancelled,
            JobOutcome::TimedOut => JobOutcome::TimedOut,
        }
    }

    /// Completed value, discarding every other outcome.
    pub fn ok(self) -> Option<T> {
        match self {
            JobOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct JobEntry {
    id: JobId,
    abort: AbortHandle,
}

#[derive(Debug, Default)]
struct RegistryState {
    next_id: u64,
    jobs: FnvHashMap<JobName, JobEntry>,
}

/// Thread safe name -> job registry. Membership is the source of truth for "is this job
/// active".
///
/// Written from both the control thread (submit / cancel) and the background runtime
/// (completion), so every access goes through one mutex that is never held across an
/// `.await`.
#[derive(Clone, Debug, Default)]
pub struct JobRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl JobRegistry {
    /// Track `abort` under `name`, returning the new [`JobId`] and the handle of the entry it
    /// replaced, if any.
    pub fn insert(&self, name: JobName, abort: AbortHandle) -> (JobId, Option<AbortHandle>) {
        let mut state = self.state.lock();
        let id = JobId(state.next_id);
        state.next_id += 1;

        let replaced = state
            .jobs
            .insert(name, JobEntry { id, abort })
            .map(|entry| entry.abort);

        (id, replaced)
    }

    /// Remove `name` only if it is still tracked under `id`.
    pub fn remove_if(&self, name: &JobName, id: JobId) -> bool {
        let mut state = self.state.lock();
        match state.jobs.get(name) {
            Some(entry) if entry.id == id => {
                state.jobs.remove(name);
                true
            }
            _ => false,
        }
    }

    /// Remove `name`, returning its abort handle.
    pub fn remove(&self, name: &JobName) -> Option<AbortHandle> {
        self.state.lock().jobs.remove(name).map(|entry| entry.abort)
    }

    /// Remove every entry.
    pub fn drain(&self) -> Vec<(JobName, AbortHandle)> {
        self.state
            .lock()
            .jobs
            .drain()
            .map(|(name, entry)| (name, entry.abort))
            .collect()
    }

    pub fn contains(&self, name: &JobName) -> bool {
        self.state.lock().jobs.contains_key(name)
    }

    pub fn id(&self, name: &JobName) -> Option<JobId> {
        self.state.lock().jobs.get(name).map(|entry| entry.id)
    }

    /// Tracked job names, sorted.
    pub fn names(&self) -> Vec<JobName> {
        let mut names = self.state.lock().jobs.keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.state.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap()
    }

    fn pending_job(runtime: &tokio::runtime::Runtime) -> AbortHandle {
        runtime
            .spawn(futures::future::pending::<()>())
            .abort_handle()
    }

    #[test]
    fn test_job_name_constructors() {
        let symbol = Symbol::from("BTCUSD");
        assert_eq!(JobName::trades(&symbol).as_str(), "trades_BTCUSD");
        assert_eq!(JobName::order_book(&symbol).as_str(), "orderbook_BTCUSD");
    }

    #[test]
    fn test_registry_replace_and_stale_removal() {
        let runtime = runtime();
        let registry = JobRegistry::default();
        let name = JobName::from("trades_BTCUSD");

        let (first, replaced) = registry.insert(name.clone(), pending_job(&runtime));
        assert!(replaced.is_none());

        let (second, replaced) = registry.insert(name.clone(), pending_job(&runtime));
        assert!(replaced.is_some());
        assert_ne!(first, second);

        // completion of the replaced job must not evict the newer entry
        assert!(!registry.remove_if(&name, first));
        assert_eq!(registry.id(&name), Some(second));

        assert!(registry.remove_if(&name, second));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_names_sorted_and_drain() {
        let runtime = runtime();
        let registry = JobRegistry::default();

        for name in ["trades_ETHUSD", "orderbook_ETHUSD", "trades_BTCUSD"] {
            registry.insert(JobName::from(name), pending_job(&runtime));
        }

        assert_eq!(
            registry.names(),
            vec![
                JobName::from("orderbook_ETHUSD"),
                JobName::from("trades_BTCUSD"),
                JobName::from("trades_ETHUSD"),
            ]
        );

        assert_eq!(registry.drain().len(), 3);
        assert_eq!(registry.len(), 0);
        assert!(registry.remove(&JobName::from("trades_BTCUSD")).is_none());
    }

    #[test]
    fn test_job_outcome_state() {
        struct TestCase {
            input: JobOutcome<()>,
            expected: JobState,
        }

        let tests = vec![
            TestCase {
                // TC0: completed
                input: JobOutcome::Completed(()),
                expected: JobState::Completed,
            },
            TestCase {
                // TC1: failed
                input: JobOutcome::Failed(FlowError::Source("closed".to_string())),
                expected: JobState::Failed,
            },
            TestCase {
                // TC2: timed out jobs are aborted
                input: JobOutcome::TimedOut,
                expected: JobState::Cancelled,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            assert_eq!(test.input.state(), test.expected, "TC{} failed", index);
        }
    }
}
