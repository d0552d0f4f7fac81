//! Delta serialization into fixed 64-byte chunks
//!
//! The emitter owns a static array of chunks and packs one event's delta
//! primitives into them in emission order. Two policies live here and
//! nowhere else:
//!
//! - **Tick-info first**: the first delta of an event must be a TickInfo.
//!   Emitting anything else first is an implementation bug and aborts.
//! - **Top-20 filter**: Update/Insert deltas addressing index >= 20 are
//!   silently dropped. Callers emit unconditionally; the book keeps full
//!   depth internally while the wire carries only the observable window.
//!
//! When a delta does not fit the current chunk's remaining payload a new
//! chunk is begun; records never straddle chunks. `finalize` marks the
//! last chunk so the receiver knows the book is consistent.

use crate::core::types::{Count, OrderId, Price, Qty, Side, TickKind, Token};
use crate::data::constants::{
    BOOK_DEPTH, CHUNK_PAYLOAD_SIZE, CROSSING_COMPLETE_WIDTH, INSERT_WIDTH,
    MAX_CHUNKS_PER_EVENT, TICK_INFO_WIDTH, UPDATE_WIDTH,
};
use crate::data::wire::{
    pack_side_index, DeltaChunk, TAG_CROSSING_COMPLETE, TAG_INSERT, TAG_TICK_INFO, TAG_UPDATE,
    TICK_FLAG_ASK, TICK_FLAG_EXCHANGE,
};

/// Per-event delta packer. One per book engine, reset between events.
pub struct DeltaEmitter {
    chunks: [DeltaChunk; MAX_CHUNKS_PER_EVENT],
    num_chunks: usize,
    /// Bytes used in the current chunk's payload.
    used: usize,
    token: Token,
    has_tick: bool,
}

impl DeltaEmitter {
    pub fn new(token: Token) -> Self {
        Self {
            chunks: [DeltaChunk::new(token); MAX_CHUNKS_PER_EVENT],
            num_chunks: 0,
            used: 0,
            token,
            has_tick: false,
        }
    }

    /// Discard the previous event's chunks and start fresh.
    #[inline]
    pub fn reset(&mut self) {
        self.num_chunks = 0;
        self.used = 0;
        self.has_tick = false;
    }

    /// True once the current event has emitted its TickInfo.
    #[inline(always)]
    pub fn has_deltas(&self) -> bool {
        self.num_chunks > 0
    }

    /// Chunks emitted so far for the current event.
    #[inline]
    pub fn chunks(&self) -> &[DeltaChunk] {
        &self.chunks[..self.num_chunks]
    }

    /// Mark the last chunk as final and return the event's chunk sequence.
    ///
    /// The final flag is the receiver's synchronization boundary: no
    /// snapshot may be presented downstream before it is consumed.
    pub fn finalize(&mut self) -> &[DeltaChunk] {
        assert!(
            self.num_chunks > 0,
            "finalize called on an event that emitted nothing"
        );
        self.chunks[self.num_chunks - 1].set_final();
        &self.chunks[..self.num_chunks]
    }

    fn append(&mut self, bytes: &[u8]) {
        if self.num_chunks == 0 || self.used + bytes.len() > CHUNK_PAYLOAD_SIZE {
            assert!(
                self.num_chunks < MAX_CHUNKS_PER_EVENT,
                "event exceeded the static chunk capacity"
            );
            self.chunks[self.num_chunks] = DeltaChunk::new(self.token);
            self.num_chunks += 1;
            self.used = 0;
        }
        let chunk = &mut self.chunks[self.num_chunks - 1];
        chunk.payload[self.used..self.used + bytes.len()].copy_from_slice(bytes);
        chunk.num_deltas += 1;
        self.used += bytes.len();
    }

    /// Event metadata. Must be the first delta of every event; a second
    /// TickInfo within the same event carries a secondary tick (e.g. the
    /// 'S' after a 'C').
    #[allow(clippy::too_many_arguments)]
    pub fn emit_tick_info(
        &mut self,
        kind: TickKind,
        is_exchange_tick: bool,
        is_ask: bool,
        record_idx: u32,
        price: Price,
        qty: Qty,
        order_id: OrderId,
        order_id2: OrderId,
    ) {
        let mut flags = 0u8;
        if is_exchange_tick {
            flags |= TICK_FLAG_EXCHANGE;
        }
        if is_ask {
            flags |= TICK_FLAG_ASK;
        }

        let mut buf = [0u8; TICK_INFO_WIDTH];
        buf[0] = TAG_TICK_INFO;
        buf[1] = kind.as_byte();
        buf[2] = flags;
        buf[4..8].copy_from_slice(&record_idx.to_ne_bytes());
        buf[8..16].copy_from_slice(&price.to_ne_bytes());
        buf[16..20].copy_from_slice(&qty.to_ne_bytes());
        buf[20..28].copy_from_slice(&order_id.to_ne_bytes());
        buf[28..36].copy_from_slice(&order_id2.to_ne_bytes());
        self.has_tick = true;
        self.append(&buf);
    }

    /// Qty/count adjustment of an existing level.
    pub fn emit_update(&mut self, side: Side, index: usize, qty_delta: i64, count_delta: Count) {
        assert!(self.has_tick, "level delta emitted before tick info");
        if index >= BOOK_DEPTH {
            return;
        }
        debug_assert!(i16::try_from(count_delta).is_ok());

        let mut buf = [0u8; UPDATE_WIDTH];
        buf[0] = TAG_UPDATE;
        buf[1] = pack_side_index(side, index, false);
        buf[2..4].copy_from_slice(&(count_delta as i16).to_ne_bytes());
        buf[4..12].copy_from_slice(&qty_delta.to_ne_bytes());
        self.append(&buf);
    }

    /// New level entering the observable window. `shift` distinguishes a
    /// mid-book insertion (receiver memmoves deeper) from a slot-19 refill
    /// (receiver overwrites in place).
    pub fn emit_insert(
        &mut self,
        side: Side,
        index: usize,
        shift: bool,
        price: Price,
        qty: i64,
        count: Count,
    ) {
        assert!(self.has_tick, "level delta emitted before tick info");
        if index >= BOOK_DEPTH {
            return;
        }

        let mut buf = [0u8; INSERT_WIDTH];
        buf[0] = TAG_INSERT;
        buf[1] = pack_side_index(side, index, shift);
        buf[4..8].copy_from_slice(&count.to_ne_bytes());
        buf[8..16].copy_from_slice(&price.to_ne_bytes());
        buf[16..24].copy_from_slice(&qty.to_ne_bytes());
        self.append(&buf);
    }

    /// One-byte marker: the speculative crossing fully resolved.
    pub fn emit_crossing_complete(&mut self) {
        assert!(self.has_tick, "crossing-complete emitted before tick info");
        let buf = [TAG_CROSSING_COMPLETE; CROSSING_COMPLETE_WIDTH];
        self.append(&buf);
    }
}
