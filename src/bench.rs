use crate::backoff::BackoffPolicy;
use crate::config::BenchConfig;
use crate::document::Template;
use crate::metrics::latency::{LatencyRecorder, LatencySummary};
use crate::metrics::progress::Progress;
use crate::monitor::{Monitor, Sample};
use crate::output::OutputWriter;
use crate::store::StoreClient;
use crate::worker::{WorkerConfig, WorkerReport, run_worker, work_unit};
use anyhow::Result;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

/// Everything the insertion engine needs, already validated.
#[derive(Clone, Debug)]
pub struct RunPlan {
    pub workers: usize,
    pub documents: u64,
    pub batch_size: u64,
    pub partition_key: String,
    pub policy: BackoffPolicy,
    pub cost_refresh_batches: u64,
    pub tick: Duration,
}

impl From<&BenchConfig> for RunPlan {
    fn from(cfg: &BenchConfig) -> Self {
        Self {
            workers: cfg.workers,
            documents: cfg.documents,
            batch_size: cfg.batch_size,
            partition_key: cfg.partition_key.clone(),
            policy: cfg.backoff.clone(),
            cost_refresh_batches: cfg.cost_refresh_batches,
            tick: cfg.tick(),
        }
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub requested: u64,
    pub inserted: u64,
    pub capacity_units: f64,
    pub last: Sample,
    pub workers: Vec<WorkerReport>,
    pub latency: LatencySummary,
}

impl RunSummary {
    pub fn failed_workers(&self) -> usize {
        self.workers.iter().filter(|w| !w.is_completed()).count()
    }

    pub fn throttled(&self) -> u64 {
        self.workers.iter().map(|w| w.throttled).sum()
    }

    pub fn transient(&self) -> u64 {
        self.workers.iter().map(|w| w.transient).sum()
    }

    pub fn all_completed(&self) -> bool {
        self.failed_workers() == 0
    }

    pub fn lines(&self) -> Vec<String> {
        let rule = "-".repeat(69);
        let ms = |us: u64| us as f64 / 1000.0;
        let mut lines = vec![
            String::new(),
            "Summary:".to_string(),
            rule.clone(),
            format!(
                "Inserted {} docs @ {:.2} writes/s, {:.2} RU/s",
                self.last.inserted, self.last.insert_rate, self.last.capacity_rate
            ),
            format!(
                "Batch latency p50/p95/p99/max: {:.2}/{:.2}/{:.2}/{:.2} ms (mean {:.2} ms) over {} batches",
                ms(self.latency.p50_us),
                ms(self.latency.p95_us),
                ms(self.latency.p99_us),
                ms(self.latency.max_us),
                self.latency.mean_us / 1000.0,
                self.latency.count
            ),
            format!(
                "Throttled {} times, {} connection retries",
                self.throttled(),
                self.transient()
            ),
            rule,
        ];
        if self.all_completed() {
            lines.push("Benchmark completed successfully.".into());
        } else {
            lines.push(format!(
                "Benchmark finished with {} of {} workers failed; inserted {} of {} requested docs.",
                self.failed_workers(),
                self.workers.len(),
                self.inserted,
                self.requested
            ));
        }
        lines
    }
}

/// Spawn every worker, sample progress until none is alive, then collect
/// their reports and write the summary.
pub async fn run(
    plan: &RunPlan,
    store: Arc<dyn StoreClient>,
    template: Template,
    out: &mut OutputWriter,
) -> Result<RunSummary> {
    let progress = Arc::new(Progress::new());
    let monitor = Monitor::new(plan.tick);
    let per_worker = work_unit(plan.documents, plan.workers);
    tracing::info!(
        workers = plan.workers,
        per_worker,
        batch_size = plan.batch_size,
        "starting inserts"
    );

    let handles: Vec<_> = (0..plan.workers)
        .map(|id| {
            let cfg = WorkerConfig {
                id,
                target: per_worker,
                batch_size: plan.batch_size,
                partition_key: plan.partition_key.clone(),
                template: template.clone(),
                policy: plan.policy.clone(),
                cost_refresh_batches: plan.cost_refresh_batches,
            };
            tokio::spawn(run_worker(cfg, store.clone(), progress.clone()))
        })
        .collect();

    let sampled = match monitor.run(progress.as_ref(), &handles, out).await {
        Ok(sample) => Some(sample),
        Err(e) => {
            tracing::error!(error = %e, "progress output failed, waiting for workers unsampled");
            None
        }
    };

    let mut workers = Vec::with_capacity(plan.workers);
    for (id, joined) in join_all(handles).await.into_iter().enumerate() {
        match joined {
            Ok(report) => workers.push(report),
            Err(e) => {
                tracing::error!(worker = id, error = %e, "worker task aborted");
                workers.push(WorkerReport::aborted(id, per_worker, e.to_string()));
            }
        }
    }
    let last = sampled.unwrap_or_else(|| monitor.sample(progress.as_ref(), 0));
    let mut latency = LatencyRecorder::new();
    for w in &workers {
        latency.merge(&w.latency);
    }

    let summary = RunSummary {
        requested: plan.documents,
        inserted: progress.inserted(),
        capacity_units: progress.capacity_units(),
        last,
        workers,
        latency: latency.summary(),
    };
    for line in summary.lines() {
        out.write_line(&line)?;
    }
    Ok(summary)
}
