//! Performance utilities: CPU pinning and latency measurement.

pub mod cpu;
pub mod metrics;

pub use cpu::{num_cores, pin_to_core, set_realtime_priority};
pub use metrics::LatencyRecorder;
