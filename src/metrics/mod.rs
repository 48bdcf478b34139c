pub mod latency;
pub mod progress;
