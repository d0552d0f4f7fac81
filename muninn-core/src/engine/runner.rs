//! Instrument demultiplexer
//!
//! Routes each input record to its instrument's engine (created lazily
//! on first sight) and forwards the emitted chunks into the transport.
//! One runner per thread; instruments may be sharded across runners but
//! a single instrument never spans two.

use crate::book::mbo::Mbo;
use crate::core::types::Token;
use crate::data::wire::InputRecord;
use crate::engine::stats::RunnerStats;
use crate::transport::ChunkSink;
use ahash::AHashMap;

/// Token -> engine map plus replay counters.
pub struct Runner {
    engines: AHashMap<Token, Mbo>,
    stats: RunnerStats,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    pub fn new() -> Self {
        Self {
            engines: AHashMap::new(),
            stats: RunnerStats::new(),
        }
    }

    /// Apply one input record and forward its chunks to the sink.
    pub fn process<S: ChunkSink>(&mut self, rec: &InputRecord, sink: &mut S) {
        let engine = self.engines.entry(rec.token).or_insert_with(|| {
            self.stats.instruments += 1;
            Mbo::new(rec.token)
        });

        let chunks = engine.apply(rec);
        self.stats.events += 1;
        if chunks.is_empty() {
            self.stats.no_ops += 1;
            return;
        }
        self.stats.chunks += chunks.len() as u64;
        for chunk in chunks {
            sink.push(chunk);
        }
    }

    pub fn stats(&self) -> &RunnerStats {
        &self.stats
    }

    /// Engine for an instrument, if any event for it has been seen.
    pub fn engine(&self, token: Token) -> Option<&Mbo> {
        self.engines.get(&token)
    }
}
