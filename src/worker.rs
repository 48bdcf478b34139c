use crate::backoff::{Backoff, BackoffPolicy, Decision};
use crate::document::{Template, synthesize_batch};
use crate::metrics::latency::LatencyRecorder;
use crate::metrics::progress::Progress;
use crate::store::{ErrorClass, StoreClient};
use std::sync::Arc;
use tokio::time::{Instant, sleep};

pub struct WorkerConfig {
    pub id: usize,
    /// Documents this worker must get acknowledged.
    pub target: u64,
    pub batch_size: u64,
    pub partition_key: String,
    pub template: Template,
    pub policy: BackoffPolicy,
    /// Re-query the request charge every N acknowledged batches; 0 queries once.
    pub cost_refresh_batches: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerOutcome {
    Completed,
    Failed(String),
}

#[derive(Clone, Debug)]
pub struct WorkerReport {
    pub worker: usize,
    pub target: u64,
    pub inserted: u64,
    pub batches: u64,
    pub throttled: u64,
    pub transient: u64,
    pub peak_backoff: u32,
    pub final_backoff: u32,
    pub outcome: WorkerOutcome,
    pub latency: LatencyRecorder,
}

impl WorkerReport {
    fn new(worker: usize, target: u64) -> Self {
        Self {
            worker,
            target,
            inserted: 0,
            batches: 0,
            throttled: 0,
            transient: 0,
            peak_backoff: 0,
            final_backoff: 0,
            outcome: WorkerOutcome::Completed,
            latency: LatencyRecorder::new(),
        }
    }

    pub(crate) fn aborted(worker: usize, target: u64, reason: String) -> Self {
        Self {
            outcome: WorkerOutcome::Failed(reason),
            ..Self::new(worker, target)
        }
    }

    pub fn is_completed(&self) -> bool {
        self.outcome == WorkerOutcome::Completed
    }
}

/// Documents each of `workers` must insert so together they cover `total`.
pub fn work_unit(total: u64, workers: usize) -> u64 {
    if workers == 0 {
        return 0;
    }
    total.div_ceil(workers as u64)
}

/// Cached request charge, refreshed on the configured cadence.
struct CostTracker {
    refresh_every: u64,
    cached: Option<f64>,
    since_query: u64,
}

impl CostTracker {
    fn new(refresh_every: u64) -> Self {
        Self {
            refresh_every,
            cached: None,
            since_query: 0,
        }
    }

    fn due(&self) -> bool {
        match self.cached {
            None => true,
            Some(_) => self.refresh_every > 0 && self.since_query >= self.refresh_every,
        }
    }

    async fn charge(&mut self, worker: usize, store: &dyn StoreClient) -> f64 {
        if self.due() {
            match store.last_operation_cost().await {
                Ok(Some(ru)) => {
                    self.cached = Some(ru);
                    self.since_query = 0;
                }
                Ok(None) => {
                    tracing::warn!(worker, "request charge not found for operation");
                    self.cached = Some(0.0);
                    self.since_query = 0;
                }
                Err(e) => {
                    // Retried on the next batch; the cached charge is not reused.
                    tracing::warn!(worker, error = %e, "request charge query failed");
                    return 0.0;
                }
            }
        }
        self.since_query += 1;
        self.cached.unwrap_or(0.0)
    }
}

/// Insert `cfg.target` documents, retrying throttled and transient failures
/// with the same batch. A fatal store error ends only this worker.
pub async fn run_worker(
    cfg: WorkerConfig,
    store: Arc<dyn StoreClient>,
    progress: Arc<Progress>,
) -> WorkerReport {
    let worker = cfg.id;
    let mut report = WorkerReport::new(worker, cfg.target);
    let mut backoff = Backoff::new(cfg.policy.clone());
    let mut cost = CostTracker::new(cfg.cost_refresh_batches);
    let batch_size = cfg.batch_size.max(1);
    tracing::debug!(worker, target = cfg.target, batch_size, "worker starting");

    while report.inserted < cfg.target {
        let count = batch_size.min(cfg.target - report.inserted);
        let batch = synthesize_batch(&cfg.template, &cfg.partition_key, count as usize);

        loop {
            let started = Instant::now();
            let result = store.submit_batch(&batch).await;
            let elapsed = started.elapsed();
            match backoff.observe(result) {
                Decision::Success => {
                    report.latency.record(elapsed);
                    break;
                }
                Decision::RetryAfter { delay, cause } => {
                    report.peak_backoff = report.peak_backoff.max(backoff.factor());
                    if cause == ErrorClass::Throttle {
                        report.throttled += 1;
                        tracing::warn!(
                            worker,
                            backoff = backoff.factor(),
                            sleep_ms = delay.as_millis() as u64,
                            "throttled, backing off"
                        );
                    } else {
                        report.transient += 1;
                        tracing::warn!(
                            worker,
                            sleep_ms = delay.as_millis() as u64,
                            "connection failure, retrying batch"
                        );
                    }
                    sleep(delay).await;
                }
                Decision::Fatal(err) => {
                    tracing::error!(
                        worker,
                        error = %err,
                        inserted = report.inserted,
                        "failed with unknown error, exiting"
                    );
                    report.final_backoff = backoff.factor();
                    report.outcome = WorkerOutcome::Failed(err.to_string());
                    return report;
                }
            }
        }

        progress.add_inserted(count);
        report.inserted += count;
        report.batches += 1;
        let ru = cost.charge(worker, store.as_ref()).await;
        progress.add_capacity_units(ru);
    }

    report.final_backoff = backoff.factor();
    tracing::debug!(
        worker,
        inserted = report.inserted,
        batches = report.batches,
        "worker finished"
    );
    report
}
