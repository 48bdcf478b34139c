#![cfg(feature = "store-mock")]
use docdb_bench::backoff::BackoffPolicy;
use docdb_bench::bench::{self, RunPlan};
use docdb_bench::document::Template;
use docdb_bench::metrics::progress::Progress;
use docdb_bench::output::OutputWriter;
use docdb_bench::store::mock::{Fault, MockStore};
use docdb_bench::worker::{WorkerConfig, WorkerOutcome, run_worker};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn template() -> Template {
    Template::from_value(json!({
        "pk": "placeholder",
        "sensor": "thermo-1",
        "reading": { "celsius": 21.5, "ok": true },
        "history": [1, 2, 3]
    }))
    .expect("template")
}

fn plan(workers: usize, documents: u64, batch_size: u64) -> RunPlan {
    RunPlan {
        workers,
        documents,
        batch_size,
        partition_key: "pk".into(),
        policy: BackoffPolicy::default(),
        cost_refresh_batches: 0,
        tick: Duration::from_secs(1),
    }
}

#[tokio::test(start_paused = true)]
async fn single_worker_batched_run_inserts_everything() {
    let store = Arc::new(MockStore::new().with_charge(2.5));
    let mut out = OutputWriter::new_buffer();
    let summary = bench::run(&plan(1, 100, 10), store.clone(), template(), &mut out)
        .await
        .expect("run");

    assert_eq!(store.calls(), 10);
    assert_eq!(summary.inserted, 100);
    assert_eq!(summary.throttled(), 0);
    let w = &summary.workers[0];
    assert_eq!(w.batches, 10);
    assert_eq!(w.final_backoff, 0);
    assert_eq!(w.peak_backoff, 0);
    assert!((summary.capacity_units - 25.0).abs() < 1e-9);
    assert!(summary.all_completed());
    assert_eq!(out.lines().last().unwrap(), "Benchmark completed successfully.");
}

#[tokio::test(start_paused = true)]
async fn throttled_worker_backs_off_then_decays() {
    let store = Arc::new(MockStore::new().with_script([
        Fault::Throttle,
        Fault::Throttle,
        Fault::Throttle,
    ]));
    let progress = Arc::new(Progress::new());
    let cfg = WorkerConfig {
        id: 7,
        target: 1,
        batch_size: 1,
        partition_key: "pk".into(),
        template: template(),
        policy: BackoffPolicy::default(),
        cost_refresh_batches: 0,
    };
    let started = tokio::time::Instant::now();
    let report = run_worker(cfg, store.clone(), progress.clone()).await;

    assert_eq!(report.throttled, 3);
    assert_eq!(report.peak_backoff, 3);
    assert_eq!(report.final_backoff, 2);
    assert_eq!(report.outcome, WorkerOutcome::Completed);
    assert_eq!(progress.inserted(), 1);
    // 1s + 2s + 3s of backoff
    assert!(started.elapsed() >= Duration::from_secs(6));
    assert_eq!(store.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn unbatched_workers_split_the_load() {
    let store = Arc::new(MockStore::new().capturing("pk"));
    let mut out = OutputWriter::new_buffer();
    let summary = bench::run(&plan(5, 50, 1), store.clone(), template(), &mut out)
        .await
        .expect("run");

    assert_eq!(summary.inserted, 50);
    assert_eq!(summary.workers.len(), 5);
    for w in &summary.workers {
        assert_eq!(w.inserted, 10);
        assert_eq!(w.batches, 10);
    }
    let keys: HashSet<_> = store.captured_keys().await.into_iter().collect();
    assert_eq!(keys.len(), 50);
    assert!(!keys.contains("placeholder"));
}

#[tokio::test(start_paused = true)]
async fn fatal_error_stops_only_that_worker() {
    let store = Arc::new(MockStore::new().with_script([
        Fault::Ok,
        Fault::Ok,
        Fault::Ok,
        Fault::Ok,
        Fault::Fatal,
    ]));
    let mut out = OutputWriter::new_buffer();
    let summary = bench::run(&plan(1, 10, 1), store.clone(), template(), &mut out)
        .await
        .expect("run");

    assert_eq!(summary.inserted, 4);
    assert!(summary.inserted < summary.requested);
    assert_eq!(summary.last.inserted, 4);
    assert_eq!(summary.failed_workers(), 1);
    assert!(matches!(summary.workers[0].outcome, WorkerOutcome::Failed(_)));
    assert_eq!(store.calls(), 5);
    assert!(
        out.lines()
            .last()
            .unwrap()
            .contains("1 of 1 workers failed; inserted 4 of 10")
    );
}

#[tokio::test(start_paused = true)]
async fn siblings_finish_when_one_worker_dies() {
    let store = Arc::new(MockStore::new().with_script([Fault::Fatal]));
    let mut out = OutputWriter::new_buffer();
    let summary = bench::run(&plan(3, 30, 5), store, template(), &mut out)
        .await
        .expect("run");

    assert_eq!(summary.failed_workers(), 1);
    assert_eq!(summary.inserted, 20);
    assert_eq!(summary.last.active_workers, 0);
}

#[tokio::test(start_paused = true)]
async fn sustained_throttling_still_completes() {
    let store = Arc::new(MockStore::new().with_throttle_every(3).with_charge(1.0));
    let mut out = OutputWriter::new_buffer();
    let summary = bench::run(&plan(4, 200, 5), store.clone(), template(), &mut out)
        .await
        .expect("run");

    assert!(summary.all_completed());
    assert_eq!(summary.inserted, 200);
    assert!(summary.throttled() > 0);
    assert_eq!(store.acknowledged(), 200);
    assert!(summary.workers.iter().all(|w| w.final_backoff <= w.peak_backoff));
}

#[tokio::test(start_paused = true)]
async fn monitor_rates_match_counts() {
    let store = Arc::new(
        MockStore::new()
            .with_latency(Duration::from_millis(300))
            .with_charge(3.0),
    );
    let mut out = OutputWriter::new_buffer();
    let summary = bench::run(&plan(2, 20, 2), store, template(), &mut out)
        .await
        .expect("run");

    let last = &summary.last;
    assert!(last.elapsed_secs > 0.0);
    assert!((last.insert_rate - last.inserted as f64 / last.elapsed_secs).abs() < 1e-9);
    assert!((last.capacity_rate - last.capacity_units / last.elapsed_secs).abs() < 1e-9);
    // 10 batches per worker at 300ms each keeps workers alive for several ticks
    let status_lines = out.lines().iter().filter(|l| l.starts_with('[')).count();
    assert!(status_lines >= 3, "{:?}", out.lines());
    assert!(summary.latency.p50_us >= 300_000);
    assert!(summary.latency.max_us >= summary.latency.p99_us);
    // histogram buckets are 256us wide at this magnitude
    assert!((summary.latency.mean_us - 300_000.0).abs() < 1_000.0);
    let latency_line = out
        .lines()
        .iter()
        .find(|l| l.starts_with("Batch latency"))
        .expect("latency line");
    assert!(latency_line.contains("p50/p95/p99/max"), "{latency_line}");
    assert!(latency_line.contains(" ms (mean "), "{latency_line}");
    assert!(latency_line.ends_with("over 20 batches"), "{latency_line}");
}

#[cfg(target_os = "linux")]
#[tokio::test(start_paused = true)]
async fn output_failure_still_waits_for_every_worker() {
    let store = Arc::new(MockStore::new().with_latency(Duration::from_millis(400)));
    let mut out = OutputWriter::new_csv("/dev/full").await.expect("open");
    let summary = bench::run(&plan(2, 20, 2), store.clone(), template(), &mut out)
        .await
        .expect("run");

    assert!(summary.all_completed());
    assert_eq!(summary.inserted, 20);
    assert_eq!(store.acknowledged(), 20);
    assert_eq!(summary.last.inserted, 20);
    assert_eq!(summary.last.active_workers, 0);
}

#[tokio::test(start_paused = true)]
async fn uneven_split_overshoots_by_less_than_worker_count() {
    let store = Arc::new(MockStore::new());
    let mut out = OutputWriter::new_buffer();
    let summary = bench::run(&plan(4, 10, 2), store, template(), &mut out)
        .await
        .expect("run");

    assert!(summary.inserted >= 10);
    assert!(summary.inserted < 10 + 4);
    assert_eq!(summary.inserted, 12);
}
