//! Fan-out aggregator.
//!
//! Sends one search term to every enabled search backend at once and merges
//! what comes back. The pipeline holds no state between invocations.
//!
//! # Algorithm
//!
//! 1. Spawn one task per enabled backend, each under its own timeout.
//! 2. Collect in fixed priority order: tabular, file store, code repo.
//! 3. A failed, panicking or timed-out backend contributes nothing and is
//!    reported unreachable; the others are unaffected.
//! 4. Truncate each backend's hits to its cap, then concatenate.
//! 5. Zero hits overall yields [`FanOutOutcome::NoMatches`].
//!
//! Dropping the returned future detaches the spawned searches: they run to
//! completion and their results are discarded.

use std::collections::HashMap;
use std::time::Duration;

use crate::config::AggregatorConfig;
use crate::error::BackendError;
use crate::models::{BackendKind, Hit};
use crate::traits::BackendRegistry;

/// Timeout and caps applied to every fan-out.
#[derive(Debug, Clone)]
pub struct FanOutPolicy {
    pub timeout: Duration,
    pub caps: HashMap<BackendKind, usize>,
}

impl FanOutPolicy {
    pub fn from_config(config: &AggregatorConfig) -> Self {
        let caps = BackendKind::SEARCHABLE
            .iter()
            .map(|k| (*k, config.cap_for(*k)))
            .collect();
        Self {
            timeout: config.timeout(),
            caps,
        }
    }

    pub fn cap(&self, kind: BackendKind) -> usize {
        self.caps.get(&kind).copied().unwrap_or(1)
    }
}

impl Default for FanOutPolicy {
    fn default() -> Self {
        Self::from_config(&AggregatorConfig::default())
    }
}

/// Per-backend summary of one fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendReport {
    pub kind: BackendKind,
    pub reachable: bool,
    /// Raw hit count before truncation.
    pub matched: usize,
    /// Hits kept after truncation.
    pub returned: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FanOutOutcome {
    Matches(Vec<Hit>),
    NoMatches,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanOut {
    pub outcome: FanOutOutcome,
    pub backends: Vec<BackendReport>,
}

impl FanOut {
    pub fn hits(&self) -> &[Hit] {
        match &self.outcome {
            FanOutOutcome::Matches(hits) => hits,
            FanOutOutcome::NoMatches => &[],
        }
    }

    pub fn is_no_match(&self) -> bool {
        self.outcome == FanOutOutcome::NoMatches
    }

    /// Total raw matches across reachable backends.
    pub fn total_matches(&self) -> usize {
        self.backends.iter().map(|b| b.matched).sum()
    }

    pub fn report(&self, kind: BackendKind) -> Option<&BackendReport> {
        self.backends.iter().find(|b| b.kind == kind)
    }

    pub fn unreachable(&self) -> Vec<BackendKind> {
        self.backends
            .iter()
            .filter(|b| !b.reachable)
            .map(|b| b.kind)
            .collect()
    }
}

pub struct Aggregator {
    backends: BackendRegistry,
    policy: FanOutPolicy,
}

impl Aggregator {
    pub fn new(backends: BackendRegistry, policy: FanOutPolicy) -> Self {
        Self { backends, policy }
    }

    pub fn backends(&self) -> &BackendRegistry {
        &self.backends
    }

    /// Search every backend in `enabled` that has a registered adapter.
    /// Identity lookup never takes part.
    pub async fn fan_out(&self, term: &str, enabled: &[BackendKind]) -> FanOut {
        let mut kinds: Vec<BackendKind> = enabled
            .iter()
            .copied()
            .filter(|k| *k != BackendKind::IdentityLookup)
            .collect();
        kinds.sort();
        kinds.dedup();

        let mut tasks = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let Some(backend) = self.backends.find(kind) else {
                continue;
            };
            let term = term.to_string();
            let timeout = self.policy.timeout;
            let handle =
                tokio::spawn(async move { tokio::time::timeout(timeout, backend.search(&term)).await });
            tasks.push((kind, handle));
        }

        let mut merged = Vec::new();
        let mut reports = Vec::with_capacity(tasks.len());

        for (kind, handle) in tasks {
            let result = match handle.await {
                Ok(Ok(Ok(hits))) => Ok(hits),
                Ok(Ok(Err(BackendError::NotFound))) => Ok(Vec::new()),
                Ok(Ok(Err(e))) => Err(e.to_string()),
                Ok(Err(_)) => Err(format!(
                    "timed out after {}s",
                    self.policy.timeout.as_secs_f32()
                )),
                Err(e) if e.is_panic() => Err("adapter panicked".to_string()),
                Err(e) => Err(e.to_string()),
            };

            match result {
                Ok(mut hits) => {
                    let matched = hits.len();
                    hits.truncate(self.policy.cap(kind));
                    reports.push(BackendReport {
                        kind,
                        reachable: true,
                        matched,
                        returned: hits.len(),
                        error: None,
                    });
                    merged.extend(hits);
                }
                Err(reason) => {
                    tracing::warn!(backend = %kind, %reason, "search failed, continuing without it");
                    reports.push(BackendReport {
                        kind,
                        reachable: false,
                        matched: 0,
                        returned: 0,
                        error: Some(reason),
                    });
                }
            }
        }

        let outcome = if merged.is_empty() {
            FanOutOutcome::NoMatches
        } else {
            FanOutOutcome::Matches(merged)
        };
        FanOut {
            outcome,
            backends: reports,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendResult;
    use crate::traits::SearchBackend;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Canned {
        kind: BackendKind,
        count: usize,
    }

    #[async_trait]
    impl SearchBackend for Canned {
        fn kind(&self) -> BackendKind {
            self.kind
        }
        fn description(&self) -> &str {
            "canned"
        }
        async fn search(&self, term: &str) -> BackendResult<Vec<Hit>> {
            Ok((0..self.count)
                .map(|i| Hit {
                    source: self.kind,
                    title: format!("{}-{}-{}", self.kind, term, i),
                    detail: String::new(),
                    link: None,
                    native_id: None,
                })
                .collect())
        }
    }

    enum Misbehave {
        Sleep(Duration),
        Panic,
        Fail,
    }

    struct Broken {
        kind: BackendKind,
        how: Misbehave,
    }

    #[async_trait]
    impl SearchBackend for Broken {
        fn kind(&self) -> BackendKind {
            self.kind
        }
        fn description(&self) -> &str {
            "broken"
        }
        async fn search(&self, _term: &str) -> BackendResult<Vec<Hit>> {
            match self.how {
                Misbehave::Sleep(d) => {
                    tokio::time::sleep(d).await;
                    Ok(Vec::new())
                }
                Misbehave::Panic => panic!("adapter bug"),
                Misbehave::Fail => Err(BackendError::unavailable(self.kind, "connection refused")),
            }
        }
    }

    fn with_broken(kind: BackendKind, how: Misbehave, timeout: Duration) -> Aggregator {
        let mut reg = BackendRegistry::new();
        reg.register(Arc::new(Canned {
            kind: BackendKind::Tabular,
            count: 5,
        }));
        reg.register(Arc::new(Canned {
            kind: BackendKind::FileStore,
            count: 2,
        }));
        reg.register(Arc::new(Broken { kind, how }));
        let policy = FanOutPolicy {
            timeout,
            ..FanOutPolicy::default()
        };
        Aggregator::new(reg, policy)
    }

    fn assert_isolated(out: &FanOut, bad: BackendKind) {
        let report = out.report(bad).unwrap();
        assert!(!report.reachable);
        assert!(report.error.is_some());
        assert_eq!(out.unreachable(), vec![bad]);
        assert_eq!(out.hits().len(), 4);
        assert!(out.hits().iter().all(|h| h.source != bad));
    }

    fn aggregator(counts: &[(BackendKind, usize)]) -> Aggregator {
        let mut reg = BackendRegistry::new();
        for (kind, count) in counts {
            reg.register(Arc::new(Canned {
                kind: *kind,
                count: *count,
            }));
        }
        Aggregator::new(reg, FanOutPolicy::default())
    }

    #[tokio::test]
    async fn test_caps_and_priority_order() {
        let agg = aggregator(&[
            (BackendKind::CodeRepo, 4),
            (BackendKind::FileStore, 5),
            (BackendKind::Tabular, 10),
        ]);
        let out = agg.fan_out("x", &BackendKind::SEARCHABLE).await;
        let sources: Vec<_> = out.hits().iter().map(|h| h.source).collect();
        assert_eq!(
            sources,
            vec![
                BackendKind::Tabular,
                BackendKind::Tabular,
                BackendKind::Tabular,
                BackendKind::FileStore,
                BackendKind::CodeRepo
            ]
        );
        assert_eq!(out.total_matches(), 19);
        assert_eq!(out.report(BackendKind::Tabular).unwrap().returned, 3);
    }

    #[tokio::test]
    async fn test_only_enabled_backends_are_queried() {
        let agg = aggregator(&[(BackendKind::Tabular, 1), (BackendKind::CodeRepo, 1)]);
        let out = agg.fan_out("x", &[BackendKind::CodeRepo]).await;
        assert_eq!(out.backends.len(), 1);
        assert_eq!(out.hits()[0].source, BackendKind::CodeRepo);
    }

    #[tokio::test]
    async fn test_no_matches_is_explicit() {
        let agg = aggregator(&[(BackendKind::Tabular, 0), (BackendKind::FileStore, 0)]);
        let out = agg.fan_out("x", &BackendKind::SEARCHABLE).await;
        assert!(out.is_no_match());
        assert!(out.backends.iter().all(|b| b.reachable));
    }

    #[tokio::test]
    async fn test_identity_never_fans_out() {
        let agg = aggregator(&[(BackendKind::Tabular, 1)]);
        let out = agg
            .fan_out("x", &[BackendKind::IdentityLookup, BackendKind::Tabular])
            .await;
        assert_eq!(out.backends.len(), 1);
    }

    #[tokio::test]
    async fn test_slow_backend_times_out_without_stalling_others() {
        let timeout = Duration::from_millis(200);
        let agg = with_broken(
            BackendKind::CodeRepo,
            Misbehave::Sleep(Duration::from_secs(5)),
            timeout,
        );
        let started = std::time::Instant::now();
        let out = agg.fan_out("x", &BackendKind::SEARCHABLE).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_isolated(&out, BackendKind::CodeRepo);
        assert!(out
            .report(BackendKind::CodeRepo)
            .unwrap()
            .error
            .as_deref()
            .unwrap()
            .contains("timed out"));
    }

    #[tokio::test]
    async fn test_panicking_backend_is_isolated() {
        let agg = with_broken(BackendKind::CodeRepo, Misbehave::Panic, Duration::from_secs(5));
        let out = agg.fan_out("x", &BackendKind::SEARCHABLE).await;

        assert_isolated(&out, BackendKind::CodeRepo);
        assert_eq!(
            out.report(BackendKind::CodeRepo).unwrap().error.as_deref(),
            Some("adapter panicked")
        );
    }

    #[tokio::test]
    async fn test_failing_backend_leaves_other_results_unchanged() {
        let healthy = aggregator(&[(BackendKind::Tabular, 5), (BackendKind::FileStore, 2)]);
        let baseline = healthy.fan_out("x", &BackendKind::SEARCHABLE).await;

        let agg = with_broken(BackendKind::CodeRepo, Misbehave::Fail, Duration::from_secs(5));
        let out = agg.fan_out("x", &BackendKind::SEARCHABLE).await;

        assert_isolated(&out, BackendKind::CodeRepo);
        assert_eq!(out.hits(), baseline.hits());
        assert_eq!(
            out.report(BackendKind::Tabular),
            baseline.report(BackendKind::Tabular)
        );
        assert_eq!(out.total_matches(), 7);
    }
}
