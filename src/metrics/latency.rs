use hdrhistogram::Histogram;
use std::time::Duration;

// 1us to 10min, 3 significant digits
const MAX_MICROS: u64 = 600_000_000;

/// Submit-latency histogram owned by a single worker; merged after the run.
#[derive(Clone, Debug)]
pub struct LatencyRecorder {
    hist: Histogram<u64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LatencySummary {
    pub count: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
    pub mean_us: f64,
}

impl Default for LatencyRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyRecorder {
    pub fn new() -> Self {
        Self {
            hist: Histogram::new_with_bounds(1, MAX_MICROS, 3).expect("static histogram bounds"),
        }
    }

    pub fn record(&mut self, elapsed: Duration) {
        let us = (elapsed.as_micros() as u64).max(1);
        self.hist.saturating_record(us);
    }

    pub fn merge(&mut self, other: &LatencyRecorder) {
        if let Err(e) = self.hist.add(&other.hist) {
            tracing::warn!(error = ?e, "dropping latency samples on merge");
        }
    }

    pub fn summary(&self) -> LatencySummary {
        if self.hist.is_empty() {
            return LatencySummary::default();
        }
        LatencySummary {
            count: self.hist.len(),
            p50_us: self.hist.value_at_quantile(0.5),
            p95_us: self.hist.value_at_quantile(0.95),
            p99_us: self.hist.value_at_quantile(0.99),
            max_us: self.hist.max(),
            mean_us: self.hist.mean(),
        }
    }
}
