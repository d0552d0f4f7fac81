//! Common utilities for all binaries
//!
//! Shared CLI flags and the bootstrap that applies them.

use anyhow::Result;
use clap::Parser;

/// Common CLI arguments for all binaries
#[derive(Parser, Debug)]
pub struct CommonArgs {
    /// Log level
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Emit JSON-formatted logs
    #[arg(long)]
    pub json_logs: bool,

    /// CPU core to pin the replay thread to
    #[arg(short = 'c', long)]
    pub cpu_core: Option<usize>,

    /// Enable real-time priority (requires privileges)
    #[arg(long)]
    pub realtime: bool,
}

impl CommonArgs {
    /// Initialize logging and condition the hot thread.
    pub fn bootstrap(&self) -> Result<()> {
        muninn_core::utils::init_logger(&self.log_level, self.json_logs);

        if let Some(core) = self.cpu_core {
            muninn_core::perf::pin_to_core(core)?;
        }

        #[cfg(target_os = "linux")]
        if self.realtime {
            muninn_core::perf::set_realtime_priority(50)?;
        }

        #[cfg(not(target_os = "linux"))]
        if self.realtime {
            tracing::warn!("Real-time priority only supported on Linux");
        }

        Ok(())
    }
}

/// Print final replay statistics
pub fn print_stats(stats: &muninn_core::RunnerStats) {
    tracing::info!("=== Replay Statistics ===");
    tracing::info!("Events processed: {}", stats.events);
    tracing::info!("Silent no-ops: {}", stats.no_ops);
    tracing::info!("Instruments seen: {}", stats.instruments);
    tracing::info!("Chunks published: {}", stats.chunks);
    tracing::info!("Chunks per event: {:.2}", stats.chunks_per_event());
}
