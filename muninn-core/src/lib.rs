//! Muninn Core - Market-By-Order Book Builder
//!
//! Muninn ingests a tick-by-tick exchange stream and maintains, per
//! instrument, an authoritative 20-level aggregated order book. It
//! publishes a compact stream of fixed 64-byte delta chunks over a
//! shared-memory-style transport so downstream strategies can
//! reconstruct the book without ever observing a transiently crossed
//! state.
//!
//! ## Architecture
//! - **Zero heap allocations** in the steady-state event path
//! - **Cache-line sized** transport chunks (64 bytes)
//! - **Speculative crossing**: aggressive orders pre-match opposing
//!   liquidity before the exchange confirms trades, with full rollback
//!   on self-trade cancels
//! - **Single-threaded per instrument**; instruments shard freely
//!
//! ## Core Modules
//! - `core`: zero-overhead domain types (sides, tick kinds, orders)
//! - `data`: wire formats, recorded-stream mapping, reference validation
//! - `book`: price levels, delta emitter, per-instrument MBO engine
//! - `engine`: instrument demux and replay counters
//! - `transport`: chunk sink seam plus a SPSC chunk ring
//! - `reconstruct`: receiver-side book rebuild and crossing expansion
//! - `perf`: CPU pinning, latency recording
//! - `testing`: programmable synthetic input streams

pub mod book;
pub mod core;
pub mod data;
pub mod engine;
pub mod perf;
pub mod reconstruct;
pub mod testing;
pub mod transport;
pub mod utils;

pub use crate::core::types::{OrderInfo, Side, TickKind};
pub use book::{crossing_enabled, set_crossing_enabled, Mbo};
pub use data::{DeltaChunk, InputFeed, InputRecord, OutputRecord, ReferenceFeed};
pub use engine::{Runner, RunnerStats};
pub use reconstruct::{Observer, Reconstructor};
pub use transport::{ChunkSink, VecSink};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::book::{set_crossing_enabled, Mbo};
    pub use crate::core::types::{OrderInfo, Side, TickKind};
    pub use crate::data::{
        compare, DeltaChunk, InputFeed, InputRecord, OutputRecord, ReferenceFeed, ValidationConfig,
    };
    pub use crate::engine::{Runner, RunnerStats};
    pub use crate::perf::LatencyRecorder;
    pub use crate::reconstruct::{Observer, Reconstructor};
    pub use crate::transport::{chunk_ring, ChunkSink, VecSink};
}
