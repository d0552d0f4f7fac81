//! Publisher-side book machinery: levels, delta emitter, per-instrument
//! engine, and the process-wide crossing gate.

pub mod emitter;
pub mod levels;
pub mod mbo;

#[cfg(test)]
mod ledger_proptest;

pub use emitter::DeltaEmitter;
pub use levels::PriceLevels;
pub use mbo::{Mbo, PendingCross, ResidualOrigin};

use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide gate for the speculative crossing path. Set once at
/// startup, read-only afterwards; engines sample it at creation.
static CROSSING_ENABLED: AtomicBool = AtomicBool::new(false);

pub fn set_crossing_enabled(enabled: bool) {
    CROSSING_ENABLED.store(enabled, Ordering::Relaxed);
}

#[inline]
pub fn crossing_enabled() -> bool {
    CROSSING_ENABLED.load(Ordering::Relaxed)
}
