use crate::{jobs::runtime::Deadline, stats::IngestPolicy};
use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Duration};
use tracing::warn;

/// Order book depth view settings, adjustable while the order book job runs.
#[derive(Copy, Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BookSettings {
    /// Price group width used when `aggregate` is set.
    pub tick_size: f64,
    pub aggregate: bool,
    /// Levels kept per side.
    pub levels: usize,
}

impl Default for BookSettings {
    fn default() -> Self {
        Self {
            tick_size: 10.0,
            aggregate: true,
            levels: 100,
        }
    }
}

/// [`JobOrchestrator`](crate::jobs::orchestrator::JobOrchestrator) configuration.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct OrchestratorConfig {
    /// Number of timeframe periods fetched by the historical backfill.
    pub backfill_horizon: u32,
    /// How long a symbol switch blocks on the historical backfill.
    pub backfill_deadline: Deadline,
    /// Forwarded to the source with every historical fetch.
    pub persist_candles: bool,
    /// End a streaming job if its source stays silent this long.
    pub stream_idle_timeout: Option<Duration>,
    pub ingest_policy: IngestPolicy,
    pub book: BookSettings,
    /// Name of the background runtime thread.
    pub thread_name: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            backfill_horizon: 365,
            backfill_deadline: Deadline::default(),
            persist_candles: false,
            stream_idle_timeout: None,
            ingest_policy: IngestPolicy::default(),
            book: BookSettings::default(),
            thread_name: "barter-flow-jobs".to_string(),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_backfill_horizon(mut self, horizon: u32) -> Self {
        self.backfill_horizon = horizon;
        self
    }

    pub fn with_backfill_deadline(mut self, deadline: Deadline) -> Self {
        self.backfill_deadline = deadline;
        self
    }

    pub fn with_persist_candles(mut self, persist: bool) -> Self {
        self.persist_candles = persist;
        self
    }

    pub fn with_stream_idle_timeout(mut self, timeout: Duration) -> Self {
        self.stream_idle_timeout = Some(timeout);
        self
    }

    pub fn with_ingest_policy(mut self, policy: IngestPolicy) -> Self {
        self.ingest_policy = policy;
        self
    }

    pub fn with_book(mut self, book: BookSettings) -> Self {
        self.book = book;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Default configuration with `FLOW_*` environment variable overrides applied.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Default configuration with overrides read through `lookup`. Values that fail to parse
    /// are logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(horizon) = parse_var(&lookup, "FLOW_BACKFILL_HORIZON") {
            config.backfill_horizon = horizon;
        }

        if let Some(secs) = parse_var::<u64, _>(&lookup, "FLOW_BACKFILL_TIMEOUT_SECS") {
            config.backfill_deadline = match secs {
                0 => Deadline::Unbounded,
                secs => Deadline::Within(Duration::from_secs(secs)),
            };
        }

        if let Some(secs) = parse_var::<u64, _>(&lookup, "FLOW_STREAM_IDLE_TIMEOUT_SECS") {
            config.stream_idle_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        if let Some(persist) = parse_var(&lookup, "FLOW_PERSIST_CANDLES") {
            config.persist_candles = persist;
        }

        if let Some(tick_size) = parse_var::<f64, _>(&lookup, "FLOW_BOOK_TICK_SIZE") {
            if tick_size.is_finite() && tick_size > 0.0 {
                config.book.tick_size = tick_size;
            } else {
                warn!(tick_size, "ignoring FLOW_BOOK_TICK_SIZE, must be greater than zero");
            }
        }

        if let Some(levels) = parse_var(&lookup, "FLOW_BOOK_LEVELS") {
            config.book.levels = levels;
        }

        if let Some(aggregate) = parse_var(&lookup, "FLOW_BOOK_AGGREGATE") {
            config.book.aggregate = aggregate;
        }

        if let Some(policy) = lookup("FLOW_INGEST_POLICY") {
            match policy.trim() {
                "abort_remainder" => config.ingest_policy = IngestPolicy::AbortRemainder,
                "skip_invalid" => config.ingest_policy = IngestPolicy::SkipInvalid,
                other => warn!(value = other, "ignoring unknown FLOW_INGEST_POLICY"),
            }
        }

        if let Some(name) = lookup("FLOW_THREAD_NAME") {
            config.thread_name = name;
        }

        config
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key)?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(key, %value, "ignoring unparsable environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<HashMap<_, _>>();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.backfill_horizon, 365);
        assert_eq!(
            config.backfill_deadline,
            Deadline::Within(Duration::from_secs(120))
        );
        assert!(!config.persist_candles);
        assert_eq!(config.stream_idle_timeout, None);
        assert_eq!(config.ingest_policy, IngestPolicy::AbortRemainder);
        assert_eq!(config.book, BookSettings::default());
        assert_eq!(config.book.tick_size, 10.0);
        assert_eq!(config.book.levels, 100);
    }

    #[test]
    fn test_config_builder() {
        let config = OrchestratorConfig::default()
            .with_backfill_horizon(30)
            .with_backfill_deadline(Deadline::Unbounded)
            .with_persist_candles(true)
            .with_stream_idle_timeout(Duration::from_secs(90))
            .with_ingest_policy(IngestPolicy::SkipInvalid)
            .with_thread_name("jobs");

        assert_eq!(config.backfill_horizon, 30);
        assert_eq!(config.backfill_deadline, Deadline::Unbounded);
        assert!(config.persist_candles);
        assert_eq!(config.stream_idle_timeout, Some(Duration::from_secs(90)));
        assert_eq!(config.ingest_policy, IngestPolicy::SkipInvalid);
        assert_eq!(config.thread_name, "jobs");
    }

    #[test]
    fn test_config_from_lookup() {
        struct TestCase {
            vars: Vec<(&'static str, &'static str)>,
            expected: OrchestratorConfig,
        }

        let tests = vec![
            TestCase {
                // TC0: no overrides
                vars: vec![],
                expected: OrchestratorConfig::default(),
            },
            TestCase {
                // TC1: zero backfill timeout means unbounded
                vars: vec![("FLOW_BACKFILL_TIMEOUT_SECS", "0")],
                expected: OrchestratorConfig::default().with_backfill_deadline(Deadline::Unbounded),
            },
            TestCase {
                // TC2: book overrides
                vars: vec![
                    ("FLOW_BOOK_TICK_SIZE", "0.5"),
                    ("FLOW_BOOK_LEVELS", "20"),
                    ("FLOW_BOOK_AGGREGATE", "false"),
                ],
                expected: OrchestratorConfig::default().with_book(BookSettings {
                    tick_size: 0.5,
                    aggregate: false,
                    levels: 20,
                }),
            },
            TestCase {
                // TC3: unparsable and invalid values are ignored
                vars: vec![
                    ("FLOW_BACKFILL_HORIZON", "a year"),
                    ("FLOW_BOOK_TICK_SIZE", "-1"),
                    ("FLOW_INGEST_POLICY", "yolo"),
                ],
                expected: OrchestratorConfig::default(),
            },
            TestCase {
                // TC4: policy and stream timeout
                vars: vec![
                    ("FLOW_INGEST_POLICY", "skip_invalid"),
                    ("FLOW_STREAM_IDLE_TIMEOUT_SECS", " 45 "),
                    ("FLOW_BACKFILL_HORIZON", "90"),
                ],
                expected: OrchestratorConfig::default()
                    .with_ingest_policy(IngestPolicy::SkipInvalid)
                    .with_stream_idle_timeout(Duration::from_secs(45))
                    .with_backfill_horizon(90),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = OrchestratorConfig::from_lookup(lookup(&test.vars));
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }
}
