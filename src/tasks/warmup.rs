//! Warm-Up Scheduler
//!
//! Fans population tasks for a list of root entities out over a bounded
//! set of tokio tasks. Every task runs under its own timeout and the whole
//! run under an overall deadline; a failing or slow entity is counted and
//! logged, never allowed to abort the batch.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::error::Result;
use crate::models::{Dict, Role, SysConfig};

// == Warm-Up Root ==
/// A root entity a warm-up task is dispatched for.
pub trait WarmUpRoot: Send + 'static {
    /// Short identifier used in logs.
    fn label(&self) -> String;
}

impl WarmUpRoot for i64 {
    fn label(&self) -> String {
        self.to_string()
    }
}

impl WarmUpRoot for Dict {
    fn label(&self) -> String {
        format!("{}({})", self.dict_code, self.id)
    }
}

impl WarmUpRoot for Role {
    fn label(&self) -> String {
        format!("{}({})", self.code, self.id)
    }
}

impl WarmUpRoot for SysConfig {
    fn label(&self) -> String {
        self.config_key.clone()
    }
}

// == Warm-Up Report ==
/// Outcome of one warm-up run. `succeeded + failed + timed_out == total`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WarmUpReport {
    pub domain: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub elapsed_ms: u64,
    /// True when caching is off for the domain and nothing ran
    pub skipped: bool,
}

impl WarmUpReport {
    pub fn skipped(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            skipped: true,
            ..Default::default()
        }
    }

    /// Every root entity was populated.
    pub fn is_complete(&self) -> bool {
        self.succeeded == self.total
    }
}

enum Outcome {
    Done,
    Failed,
    TimedOut,
}

// == Scheduler ==
#[derive(Debug, Clone)]
pub struct WarmUpScheduler {
    concurrency: usize,
    entity_timeout: Duration,
    overall_timeout: Duration,
}

impl Default for WarmUpScheduler {
    fn default() -> Self {
        Self::new(8, Duration::from_secs(10), Duration::from_secs(120))
    }
}

impl WarmUpScheduler {
    pub fn new(concurrency: usize, entity_timeout: Duration, overall_timeout: Duration) -> Self {
        Self {
            concurrency: concurrency.max(1),
            entity_timeout,
            overall_timeout,
        }
    }

    /// Runs `task` once per root, at most `concurrency` at a time.
    ///
    /// Roots not yet dispatched when the overall deadline passes, and tasks
    /// still running at that point, are counted as timed out.
    pub async fn run<T, F, Fut>(&self, domain: &str, roots: Vec<T>, task: F) -> WarmUpReport
    where
        T: WarmUpRoot,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.overall_timeout;
        let total = roots.len();
        info!(domain, total, concurrency = self.concurrency, "warm-up started");

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let task = Arc::new(task);
        let mut set = JoinSet::new();
        let mut dispatched = 0usize;

        for root in roots {
            let permit =
                match tokio::time::timeout_at(deadline, Arc::clone(&semaphore).acquire_owned()).await
                {
                    Ok(Ok(permit)) => permit,
                    _ => break,
                };

            let task = Arc::clone(&task);
            let entity_timeout = self.entity_timeout;
            let domain = domain.to_string();
            set.spawn(async move {
                let _permit = permit;
                let label = root.label();
                match tokio::time::timeout(entity_timeout, task(root)).await {
                    Ok(Ok(())) => Outcome::Done,
                    Ok(Err(e)) => {
                        warn!(domain = %domain, entity = %label, error = %e, "warm-up entity failed");
                        Outcome::Failed
                    }
                    Err(_) => {
                        warn!(domain = %domain, entity = %label, "warm-up entity timed out");
                        Outcome::TimedOut
                    }
                }
            });
            dispatched += 1;
        }

        let mut report = WarmUpReport {
            domain: domain.to_string(),
            total,
            timed_out: total - dispatched,
            ..Default::default()
        };

        loop {
            match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(joined)) => tally(&mut report, joined),
                Ok(None) => break,
                Err(_) => {
                    warn!(domain, remaining = set.len(), "warm-up deadline reached, aborting");
                    set.abort_all();
                    while let Some(joined) = set.join_next().await {
                        tally(&mut report, joined);
                    }
                    break;
                }
            }
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            domain,
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            timed_out = report.timed_out,
            elapsed_ms = report.elapsed_ms,
            "warm-up finished"
        );
        report
    }
}

fn tally(report: &mut WarmUpReport, joined: std::result::Result<Outcome, tokio::task::JoinError>) {
    match joined {
        Ok(Outcome::Done) => report.succeeded += 1,
        Ok(Outcome::Failed) => report.failed += 1,
        Ok(Outcome::TimedOut) => report.timed_out += 1,
        Err(e) if e.is_cancelled() => report.timed_out += 1,
        Err(e) => {
            warn!(domain = %report.domain, error = %e, "warm-up task panicked");
            report.failed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let scheduler = WarmUpScheduler::default();
        let roots: Vec<i64> = (0..10).collect();

        let report = scheduler
            .run("dict", roots, |id| async move {
                if id % 3 == 0 {
                    Err(CacheError::Source(anyhow::anyhow!("boom {}", id)))
                } else {
                    Ok::<(), CacheError>(())
                }
            })
            .await;

        assert_eq!(report.total, 10);
        assert_eq!(report.failed, 4);
        assert_eq!(report.succeeded, 6);
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let scheduler = WarmUpScheduler::new(2, Duration::from_secs(1), Duration::from_secs(5));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (r, p) = (Arc::clone(&running), Arc::clone(&peak));
        let report = scheduler
            .run("role", (0..8i64).collect(), move |_| {
                let (running, peak) = (Arc::clone(&r), Arc::clone(&p));
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok::<(), CacheError>(())
                }
            })
            .await;

        assert!(report.is_complete());
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_entity_timeout_counts_as_timed_out() {
        let scheduler =
            WarmUpScheduler::new(4, Duration::from_millis(20), Duration::from_secs(5));
        let report = scheduler
            .run("menu", vec![1i64, 2], |id| async move {
                if id == 2 {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
                Ok::<(), CacheError>(())
            })
            .await;

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.timed_out, 1);
    }

    #[tokio::test]
    async fn test_overall_deadline_stops_the_run() {
        let scheduler =
            WarmUpScheduler::new(1, Duration::from_secs(10), Duration::from_millis(50));
        let report = scheduler
            .run("config", (0..5i64).collect(), |_| async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok::<(), CacheError>(())
            })
            .await;

        assert_eq!(report.total, 5);
        assert_eq!(report.succeeded + report.failed + report.timed_out, 5);
        assert!(report.timed_out >= 3);
        assert!(report.elapsed_ms < 1000);
    }

    #[tokio::test]
    async fn test_empty_run_is_complete() {
        let report = WarmUpScheduler::default()
            .run("dict", Vec::<i64>::new(), |_| async move { Ok::<(), CacheError>(()) })
            .await;
        assert!(report.is_complete());
        assert_eq!(report.total, 0);
    }
}
