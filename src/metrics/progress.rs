use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide insert counters shared by every worker and read by the monitor.
///
/// Both counters only grow. Updates are commutative, so no ordering across
/// workers is needed; the capacity accumulator stores `f64` bits and adds via CAS.
#[derive(Debug, Default)]
pub struct Progress {
    inserted: AtomicU64,
    capacity_bits: AtomicU64,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_inserted(&self, n: u64) {
        self.inserted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inserted(&self) -> u64 {
        self.inserted.load(Ordering::Relaxed)
    }

    /// Negative or non-finite charges are dropped so the total stays monotonic.
    pub fn add_capacity_units(&self, units: f64) {
        if !units.is_finite() || units <= 0.0 {
            return;
        }
        let _ = self
            .capacity_bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some((f64::from_bits(bits) + units).to_bits())
            });
    }

    pub fn capacity_units(&self) -> f64 {
        f64::from_bits(self.capacity_bits.load(Ordering::Acquire))
    }
}
