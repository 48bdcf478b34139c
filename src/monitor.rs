use crate::metrics::progress::Progress;
use crate::output::OutputWriter;
use anyhow::Result;
use serde::Serialize;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};

/// Anything that can report how many workers are still running.
pub trait Liveness {
    fn active(&self) -> usize;
}

impl<T> Liveness for [JoinHandle<T>] {
    fn active(&self) -> usize {
        self.iter().filter(|h| !h.is_finished()).count()
    }
}

impl<T> Liveness for Vec<JoinHandle<T>> {
    fn active(&self) -> usize {
        self.as_slice().active()
    }
}

/// One monitor reading. Rates are cumulative averages since start.
#[derive(Clone, Debug, Serialize)]
pub struct Sample {
    pub timestamp: String,
    pub elapsed_secs: f64,
    pub inserted: u64,
    pub insert_rate: f64,
    pub capacity_units: f64,
    pub capacity_rate: f64,
    pub active_workers: usize,
}

impl Sample {
    pub fn compute(
        elapsed: Duration,
        inserted: u64,
        capacity_units: f64,
        active_workers: usize,
    ) -> Self {
        let secs = elapsed.as_secs_f64();
        let per_sec = |v: f64| if secs > 0.0 { v / secs } else { 0.0 };
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            elapsed_secs: secs,
            inserted,
            insert_rate: per_sec(inserted as f64),
            capacity_units,
            capacity_rate: per_sec(capacity_units),
            active_workers,
        }
    }

    pub fn status_line(&self) -> String {
        format!(
            "[{}s] Inserted {} docs @ {:.2} writes/s, {:.2} RU/s ({} active workers)",
            self.elapsed_secs as u64,
            self.inserted,
            self.insert_rate,
            self.capacity_rate,
            self.active_workers
        )
    }
}

pub struct Monitor {
    tick: Duration,
    started: Instant,
}

impl Monitor {
    /// Starts the clock immediately; create it before spawning workers.
    pub fn new(tick: Duration) -> Self {
        Self {
            tick,
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn sample(&self, progress: &Progress, active: usize) -> Sample {
        Sample::compute(
            self.elapsed(),
            progress.inserted(),
            progress.capacity_units(),
            active,
        )
    }

    /// Sample once per tick until no worker is alive. Returns the last sample.
    pub async fn run<L>(
        &self,
        progress: &Progress,
        workers: &L,
        out: &mut OutputWriter,
    ) -> Result<Sample>
    where
        L: Liveness + ?Sized,
    {
        loop {
            sleep(self.tick).await;
            let active = workers.active();
            let sample = self.sample(progress, active);
            out.write_sample(&sample).await?;
            if active == 0 {
                return Ok(sample);
            }
        }
    }
}
