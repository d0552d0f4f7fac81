//! Wire-format and container-sizing constants
//!
//! All depth- and size-related values MUST use these constants, never
//! hardcoded literals. Compile-time assertions below catch any drift
//! between the constants and the actual `#[repr(C)]` struct layouts.

use crate::data::wire::{BookLevel, DeltaChunk, InputRecord, OutputRecord};

/// Observable price levels per side.
pub const BOOK_DEPTH: usize = 20;

/// Size of one normalized exchange input record on disk.
pub const INPUT_RECORD_SIZE: usize = 40;

/// Size of one delta chunk: exactly one cache line.
pub const DELTA_CHUNK_SIZE: usize = 64;

/// Usable delta payload per chunk (chunk minus the 6-byte header).
pub const CHUNK_PAYLOAD_SIZE: usize = 58;

/// Size of one reference output record used by the validation harness.
pub const OUTPUT_RECORD_SIZE: usize = 708;

/// Static per-event chunk capacity. Exceeding it is a fatal
/// implementation error, not a recoverable condition.
pub const MAX_CHUNKS_PER_EVENT: usize = 20;

/// Serialized delta widths, tag byte included.
pub const TICK_INFO_WIDTH: usize = 36;
pub const UPDATE_WIDTH: usize = 12;
pub const INSERT_WIDTH: usize = 24;
pub const CROSSING_COMPLETE_WIDTH: usize = 1;

/// Pre-reservation for the per-instrument order map.
pub const ORDER_MAP_RESERVE: usize = 1024;

/// Pre-reservation for each side's level vector.
pub const LEVELS_RESERVE: usize = 256;

/// Pre-reservation for the speculative crossing ledger.
pub const CROSS_FILLS_RESERVE: usize = 4;

// Compile-time layout checks. A mismatch here means the wire structs no
// longer match the recorded file formats.
const _: () = {
    if core::mem::size_of::<InputRecord>() != INPUT_RECORD_SIZE {
        panic!("InputRecord must be exactly 40 bytes");
    }
    if core::mem::size_of::<DeltaChunk>() != DELTA_CHUNK_SIZE {
        panic!("DeltaChunk must be exactly 64 bytes");
    }
    if core::mem::align_of::<DeltaChunk>() != 64 {
        panic!("DeltaChunk must be cache-line aligned");
    }
    if core::mem::size_of::<BookLevel>() != 16 {
        panic!("BookLevel must be exactly 16 bytes");
    }
    if core::mem::size_of::<OutputRecord>() != OUTPUT_RECORD_SIZE {
        panic!("OutputRecord must be exactly 708 bytes");
    }
};

// The widest delta must fit an otherwise-empty payload, and a TickInfo
// plus at least one level delta must not overflow two chunks.
const _: () = {
    if TICK_INFO_WIDTH > CHUNK_PAYLOAD_SIZE {
        panic!("TickInfo must fit a chunk payload");
    }
    if UPDATE_WIDTH > CHUNK_PAYLOAD_SIZE - TICK_INFO_WIDTH {
        panic!("an Update must fit behind a TickInfo in one chunk");
    }
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_wire_sizes() {
        assert_eq!(std::mem::size_of::<InputRecord>(), INPUT_RECORD_SIZE);
        assert_eq!(std::mem::size_of::<DeltaChunk>(), DELTA_CHUNK_SIZE);
        assert_eq!(std::mem::size_of::<OutputRecord>(), OUTPUT_RECORD_SIZE);
        assert_eq!(std::mem::align_of::<DeltaChunk>(), 64);
    }

    #[test]
    fn verify_chunk_payload_accounting() {
        // 4-byte token + 1-byte flags + 1-byte delta count + payload.
        assert_eq!(4 + 1 + 1 + CHUNK_PAYLOAD_SIZE, DELTA_CHUNK_SIZE);
    }
}
