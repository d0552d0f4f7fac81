//! Wire formats: input records, delta chunks, reference output records
//!
//! Three binary contracts, all machine-endian:
//!
//! - `InputRecord` (40 bytes): normalized exchange event from the adapter.
//! - `DeltaChunk` (64 bytes, cache-aligned): the transport unit between the
//!   publisher and any number of reconstructors.
//! - `OutputRecord` (708 bytes): reconstructed 20-level snapshot, matching
//!   the recorded reference format used by the validation harness.
//!
//! The delta payload inside a chunk is a packed sequence of four primitive
//! records, each introduced by a single tag byte. Serialization lives in
//! the publisher's emitter; parsing lives here (`DeltaIter`) so the
//! receiver and the tests share one decoder.

use crate::core::types::{OrderId, Price, Qty, Side, TickKind, Token};
use crate::data::constants::{
    BOOK_DEPTH, CHUNK_PAYLOAD_SIZE, CROSSING_COMPLETE_WIDTH, INSERT_WIDTH, TICK_INFO_WIDTH,
    UPDATE_WIDTH,
};

/// Normalized exchange input event.
///
/// Only N/M/X/T arrive on the wire; the crossing-related tick kinds are
/// engine-emitted and never appear as inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct InputRecord {
    pub record_idx: u32,
    pub token: Token,
    pub order_id: OrderId,
    /// Second order id; only meaningful for 'T' (the ask-side id).
    pub order_id2: OrderId,
    pub price: Price,
    pub qty: Qty,
    /// ASCII tick type: one of N/M/X/T.
    pub tick_type: u8,
    pub is_ask: u8,
    pub _padding: [u8; 2],
}

impl InputRecord {
    pub fn new(
        record_idx: u32,
        token: Token,
        tick_type: TickKind,
        is_ask: bool,
        order_id: OrderId,
        order_id2: OrderId,
        price: Price,
        qty: Qty,
    ) -> Self {
        Self {
            record_idx,
            token,
            order_id,
            order_id2,
            price,
            qty,
            tick_type: tick_type.as_byte(),
            is_ask: is_ask as u8,
            _padding: [0; 2],
        }
    }

    #[inline(always)]
    pub fn kind(&self) -> Option<TickKind> {
        TickKind::from_byte(self.tick_type)
    }

    #[inline(always)]
    pub fn side(&self) -> Side {
        Side::from_is_ask(self.is_ask != 0)
    }

    /// Raw bytes of this record, for writing recorded streams.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        unsafe {
            std::slice::from_raw_parts(
                self as *const Self as *const u8,
                std::mem::size_of::<Self>(),
            )
        }
    }
}

/// Chunk flag bit 0: book is consistent, ready for observation.
pub const CHUNK_FLAG_FINAL: u8 = 0b0000_0001;

/// Fixed 64-byte transport unit.
///
/// `{token, flags, num_deltas}` header followed by a packed delta payload.
/// Exactly one cache line so a chunk write never straddles lines on the
/// shared-memory transport.
#[derive(Debug, Clone, Copy)]
#[repr(C, align(64))]
pub struct DeltaChunk {
    pub token: Token,
    pub flags: u8,
    pub num_deltas: u8,
    pub payload: [u8; CHUNK_PAYLOAD_SIZE],
}

impl DeltaChunk {
    #[inline]
    pub const fn new(token: Token) -> Self {
        Self {
            token,
            flags: 0,
            num_deltas: 0,
            payload: [0; CHUNK_PAYLOAD_SIZE],
        }
    }

    #[inline(always)]
    pub const fn is_final(&self) -> bool {
        self.flags & CHUNK_FLAG_FINAL != 0
    }

    #[inline(always)]
    pub fn set_final(&mut self) {
        self.flags |= CHUNK_FLAG_FINAL;
    }

    /// Byte-exact view for the transport.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; 64] {
        unsafe { &*(self as *const Self as *const [u8; 64]) }
    }
}

// ============================================================================
// Delta primitives
// ============================================================================

pub const TAG_TICK_INFO: u8 = 0;
pub const TAG_UPDATE: u8 = 1;
pub const TAG_INSERT: u8 = 2;
pub const TAG_CROSSING_COMPLETE: u8 = 3;

/// TickInfo flag bit 0: the event mutates the book exactly as the exchange
/// described it (no speculation in play).
pub const TICK_FLAG_EXCHANGE: u8 = 0b0000_0001;
/// TickInfo flag bit 1: the event's side is the ask side.
pub const TICK_FLAG_ASK: u8 = 0b0000_0010;

const IDX_MASK: u8 = 0b0001_1111;
const SIDE_BIT: u8 = 0b0010_0000;
const SHIFT_BIT: u8 = 0b0100_0000;

/// Pack side + level index (+ shift, Insert only) into one byte.
#[inline(always)]
pub fn pack_side_index(side: Side, index: usize, shift: bool) -> u8 {
    debug_assert!(index < BOOK_DEPTH);
    (index as u8 & IDX_MASK)
        | if side.is_ask() { SIDE_BIT } else { 0 }
        | if shift { SHIFT_BIT } else { 0 }
}

#[inline(always)]
pub fn unpack_side_index(b: u8) -> (Side, usize, bool) {
    (
        Side::from_is_ask(b & SIDE_BIT != 0),
        (b & IDX_MASK) as usize,
        b & SHIFT_BIT != 0,
    )
}

/// Event metadata delta. Always the first delta of an event's chunk
/// sequence; a second TickInfo in the same event marks a secondary tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickInfo {
    pub kind: TickKind,
    pub is_exchange_tick: bool,
    pub is_ask: bool,
    pub record_idx: u32,
    pub price: Price,
    pub qty: Qty,
    pub order_id: OrderId,
    pub order_id2: OrderId,
}

impl TickInfo {
    #[inline(always)]
    pub fn side(&self) -> Side {
        Side::from_is_ask(self.is_ask)
    }
}

/// One parsed delta primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delta {
    TickInfo(TickInfo),
    Update {
        side: Side,
        index: usize,
        qty_delta: i64,
        count_delta: i16,
    },
    Insert {
        side: Side,
        index: usize,
        shift: bool,
        count: i32,
        price: Price,
        qty: i64,
    },
    CrossingComplete,
}

/// Iterator over the packed deltas of one chunk's payload.
pub struct DeltaIter<'a> {
    payload: &'a [u8],
    pos: usize,
    remaining: u8,
}

impl<'a> DeltaIter<'a> {
    pub fn new(chunk: &'a DeltaChunk) -> Self {
        Self {
            payload: &chunk.payload,
            pos: 0,
            remaining: chunk.num_deltas,
        }
    }

    #[inline]
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.payload[self.pos..self.pos + N]);
        self.pos += N;
        out
    }
}

impl<'a> Iterator for DeltaIter<'a> {
    type Item = Delta;

    fn next(&mut self) -> Option<Delta> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let tag = self.payload[self.pos];
        match tag {
            TAG_TICK_INFO => {
                debug_assert!(self.pos + TICK_INFO_WIDTH <= self.payload.len());
                self.pos += 1;
                let tick_type = self.payload[self.pos];
                let flags = self.payload[self.pos + 1];
                self.pos += 3; // tick_type, flags, pad
                let record_idx = u32::from_ne_bytes(self.take());
                let price = i64::from_ne_bytes(self.take());
                let qty = i32::from_ne_bytes(self.take());
                let order_id = i64::from_ne_bytes(self.take());
                let order_id2 = i64::from_ne_bytes(self.take());
                let kind = TickKind::from_byte(tick_type)
                    .expect("corrupt chunk: unknown tick type");
                Some(Delta::TickInfo(TickInfo {
                    kind,
                    is_exchange_tick: flags & TICK_FLAG_EXCHANGE != 0,
                    is_ask: flags & TICK_FLAG_ASK != 0,
                    record_idx,
                    price,
                    qty,
                    order_id,
                    order_id2,
                }))
            }
            TAG_UPDATE => {
                debug_assert!(self.pos + UPDATE_WIDTH <= self.payload.len());
                self.pos += 1;
                let (side, index, _) = unpack_side_index(self.payload[self.pos]);
                self.pos += 1;
                let count_delta = i16::from_ne_bytes(self.take());
                let qty_delta = i64::from_ne_bytes(self.take());
                Some(Delta::Update {
                    side,
                    index,
                    qty_delta,
                    count_delta,
                })
            }
            TAG_INSERT => {
                debug_assert!(self.pos + INSERT_WIDTH <= self.payload.len());
                self.pos += 1;
                let (side, index, shift) = unpack_side_index(self.payload[self.pos]);
                self.pos += 3; // packed byte + pad
                let count = i32::from_ne_bytes(self.take());
                let price = i64::from_ne_bytes(self.take());
                let qty = i64::from_ne_bytes(self.take());
                Some(Delta::Insert {
                    side,
                    index,
                    shift,
                    count,
                    price,
                    qty,
                })
            }
            TAG_CROSSING_COMPLETE => {
                self.pos += CROSSING_COMPLETE_WIDTH;
                Some(Delta::CrossingComplete)
            }
            other => panic!("corrupt chunk: unknown delta tag {other}"),
        }
    }
}

// ============================================================================
// Reference output format
// ============================================================================

/// One aggregated price level in the reference output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct BookLevel {
    pub price: Price,
    pub qty: Qty,
    pub num_orders: i32,
}

impl BookLevel {
    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.price == 0
    }

    #[inline]
    pub fn clear(&mut self) {
        *self = BookLevel::default();
    }
}

/// Index value meaning "no level on this side was affected".
pub const LEVEL_UNTOUCHED: i8 = BOOK_DEPTH as i8;

/// Reconstructed 20-level snapshot in the recorded reference layout.
///
/// Packed: the 68-byte header leaves the level arrays 4-byte aligned, so
/// the struct cannot use natural `repr(C)` alignment. Always copy fields
/// out before use; never borrow through a packed place.
#[derive(Clone, Copy)]
#[repr(C, packed)]
pub struct OutputRecord {
    pub record_idx: u32,
    pub token: Token,
    /// The input event this snapshot answers (synthetic for expanded ticks).
    pub event: InputRecord,
    /// Last trade price, carried forward across events.
    pub ltp: Price,
    /// Last trade quantity, carried forward across events.
    pub ltq: Qty,
    /// Shallowest bid level touched by this event, 20 if untouched.
    pub bid_affected_lvl: i8,
    /// Shallowest ask level touched by this event, 20 if untouched.
    pub ask_affected_lvl: i8,
    pub bid_filled_lvls: i8,
    pub ask_filled_lvls: i8,
    pub is_ask: u8,
    pub _padding: [u8; 3],
    pub bids: [BookLevel; BOOK_DEPTH],
    pub asks: [BookLevel; BOOK_DEPTH],
}

impl OutputRecord {
    /// All-zero record; every field type is plain-old-data.
    #[inline]
    pub fn zeroed() -> Self {
        unsafe { std::mem::zeroed() }
    }

    /// Copy out the level array for a side (packed field, no borrows).
    #[inline]
    pub fn levels(&self, side: Side) -> [BookLevel; BOOK_DEPTH] {
        match side {
            Side::Bid => self.bids,
            Side::Ask => self.asks,
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        unsafe {
            std::slice::from_raw_parts(
                self as *const Self as *const u8,
                std::mem::size_of::<Self>(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack_side_index() {
        for side in [Side::Bid, Side::Ask] {
            for idx in 0..BOOK_DEPTH {
                for shift in [false, true] {
                    let b = pack_side_index(side, idx, shift);
                    assert_eq!(unpack_side_index(b), (side, idx, shift));
                }
            }
        }
    }

    #[test]
    fn test_chunk_final_flag() {
        let mut chunk = DeltaChunk::new(7);
        assert!(!chunk.is_final());
        chunk.set_final();
        assert!(chunk.is_final());
        assert_eq!(chunk.token, 7);
    }

    #[test]
    fn test_input_record_accessors() {
        let rec = InputRecord::new(1, 42, TickKind::New, true, 100, 0, 995, 10);
        assert_eq!(rec.kind(), Some(TickKind::New));
        assert_eq!(rec.side(), Side::Ask);
        assert_eq!(rec.as_bytes().len(), 40);
    }

    #[test]
    fn test_output_record_zeroed() {
        let rec = OutputRecord::zeroed();
        let bids = rec.levels(Side::Bid);
        assert!(bids.iter().all(|l| l.is_empty()));
        assert_eq!(rec.as_bytes().len(), 708);
    }
}
