//! Chunk-stream reconstructor
//!
//! Applies delta chunks to dense 20-level books and presents snapshots
//! to an observer. The book is never shown in a transiently crossed
//! state: the final-flagged chunk of an event is the synchronization
//! boundary, and crossing events are expanded receiver-side into the
//! observable sequence the reference implementation produced:
//!
//! - A trade completing a crossing yields the trade snapshot followed
//!   by a synthetic 'N'/'M' for the aggressor's residual (or a
//!   synthetic 'X' for a fully-consumed modify aggressor).
//! - A self-trade cancel ('C' tick) yields the summary snapshot, then
//!   an 'S' snapshot carrying the cancelled order, then — when the
//!   cancelled order was passive — the aggressor's residual snapshot.
//!
//! The receiver mirrors the publisher's level-retention rule: a slot is
//! erased only once both its qty and its count are gone, so count-only
//! reconciliation updates land on the right slot.

use crate::core::types::{OrderId, Price, Qty, Side, TickKind, Token};
use crate::data::constants::BOOK_DEPTH;
use crate::data::wire::{
    BookLevel, Delta, DeltaChunk, DeltaIter, InputRecord, OutputRecord, TickInfo, LEVEL_UNTOUCHED,
};
use ahash::AHashMap;

/// Synchronous snapshot consumer. Returning false aborts processing.
pub trait Observer {
    fn on_book_update(&mut self, record: &OutputRecord) -> bool;
}

impl<F: FnMut(&OutputRecord) -> bool> Observer for F {
    #[inline(always)]
    fn on_book_update(&mut self, record: &OutputRecord) -> bool {
        self(record)
    }
}

/// Receiver mirror of the publisher's pending aggressor.
#[derive(Debug, Clone, Copy)]
struct PendingAggressor {
    id: OrderId,
    is_ask: bool,
    price: Price,
    original_qty: Qty,
    remaining_qty: i64,
    /// 'A' or 'B'.
    origin: TickKind,
    crossing_completed: bool,
}

/// Event-scoped accumulation between a chunk sequence's start and its
/// final flag.
struct EventState {
    /// First tick of the event; drives end-of-event expansion.
    primary: Option<TickInfo>,
    /// Tick the in-build snapshot answers (secondary ticks overwrite).
    current: Option<TickInfo>,
    bid_affected: i8,
    ask_affected: i8,
    /// Snapshots finalized before the main record (trade-first cases).
    extras: Vec<OutputRecord>,
    /// 'S' tick captured during an active crossing for C-expansion.
    captured_s: Option<TickInfo>,
}

impl EventState {
    fn new() -> Self {
        Self {
            primary: None,
            current: None,
            bid_affected: LEVEL_UNTOUCHED,
            ask_affected: LEVEL_UNTOUCHED,
            extras: Vec::with_capacity(4),
            captured_s: None,
        }
    }

    fn reset(&mut self) {
        self.primary = None;
        self.current = None;
        self.bid_affected = LEVEL_UNTOUCHED;
        self.ask_affected = LEVEL_UNTOUCHED;
        self.extras.clear();
        self.captured_s = None;
    }

    fn reset_trackers(&mut self) {
        self.bid_affected = LEVEL_UNTOUCHED;
        self.ask_affected = LEVEL_UNTOUCHED;
    }

    #[inline]
    fn track(&mut self, side: Side, index: usize) {
        let tracker = match side {
            Side::Bid => &mut self.bid_affected,
            Side::Ask => &mut self.ask_affected,
        };
        *tracker = (*tracker).min(index as i8);
    }
}

/// Per-instrument receiver state: dense slots, pending aggressor, last
/// trade, and the in-flight event.
pub struct BookState {
    token: Token,
    bids: [BookLevel; BOOK_DEPTH],
    asks: [BookLevel; BOOK_DEPTH],
    pending: Option<PendingAggressor>,
    ltp: Price,
    ltq: Qty,
    event: EventState,
}

impl BookState {
    fn new(token: Token) -> Self {
        Self {
            token,
            bids: [BookLevel::default(); BOOK_DEPTH],
            asks: [BookLevel::default(); BOOK_DEPTH],
            pending: None,
            ltp: 0,
            ltq: 0,
            event: EventState::new(),
        }
    }

    pub fn bids(&self) -> &[BookLevel; BOOK_DEPTH] {
        &self.bids
    }

    pub fn asks(&self) -> &[BookLevel; BOOK_DEPTH] {
        &self.asks
    }

    pub fn last_trade(&self) -> (Price, Qty) {
        (self.ltp, self.ltq)
    }

    fn on_chunk<O: Observer>(&mut self, chunk: &DeltaChunk, observer: &mut O) -> bool {
        for delta in DeltaIter::new(chunk) {
            match delta {
                Delta::TickInfo(info) => self.on_tick_info(info),
                Delta::Update {
                    side,
                    index,
                    qty_delta,
                    count_delta,
                } => self.on_update(side, index, qty_delta, count_delta),
                Delta::Insert {
                    side,
                    index,
                    shift,
                    count,
                    price,
                    qty,
                } => self.on_insert(side, index, shift, count, price, qty),
                Delta::CrossingComplete => self.on_crossing_complete(),
            }
        }

        if chunk.is_final() {
            let keep_going = self.finish_event(observer);
            self.event.reset();
            keep_going
        } else {
            true
        }
    }

    fn on_tick_info(&mut self, info: TickInfo) {
        // An 'S' during an active crossing is C-expansion material, not
        // a standalone tick.
        if info.kind == TickKind::SelfTradeCancel && self.pending.is_some() {
            self.event.captured_s = Some(info);
            return;
        }

        // A secondary tick closes out the snapshot built so far.
        if let Some(current) = self.event.current.take() {
            let snapshot = self.build_snapshot(&current);
            self.event.extras.push(snapshot);
            self.event.reset_trackers();
        }

        if self.event.primary.is_none() {
            self.event.primary = Some(info);
        }
        self.event.current = Some(info);

        match info.kind {
            TickKind::NewCrossed | TickKind::ModifyCrossed => {
                self.pending = Some(PendingAggressor {
                    id: info.order_id,
                    is_ask: info.is_ask,
                    price: info.price,
                    original_qty: info.qty,
                    remaining_qty: info.qty as i64,
                    origin: info.kind,
                    crossing_completed: false,
                });
            }
            TickKind::Trade | TickKind::IocTrade | TickKind::MarketTrade => {
                self.ltp = info.price;
                self.ltq = info.qty;
                if let Some(pending) = &mut self.pending {
                    pending.remaining_qty -= info.qty as i64;
                }
            }
            _ => {}
        }
    }

    fn side_slots(&mut self, side: Side) -> &mut [BookLevel; BOOK_DEPTH] {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    fn on_update(&mut self, side: Side, index: usize, qty_delta: i64, count_delta: i16) {
        self.event.track(side, index);

        let slots = self.side_slots(side);
        let level = &mut slots[index];
        level.qty += qty_delta as Qty;
        level.num_orders += count_delta as i32;

        if level.qty <= 0 && level.num_orders <= 0 {
            slots.copy_within(index + 1..BOOK_DEPTH, index);
            slots[BOOK_DEPTH - 1].clear();
        }
    }

    fn on_insert(
        &mut self,
        side: Side,
        index: usize,
        shift: bool,
        count: i32,
        price: Price,
        qty: i64,
    ) {
        // Refills (shift=false) overwrite slot 19 in place and do not
        // count as "affected by the event".
        if shift {
            self.event.track(side, index);
        }

        let slots = self.side_slots(side);
        if shift && index < BOOK_DEPTH - 1 {
            slots.copy_within(index..BOOK_DEPTH - 1, index + 1);
        }
        slots[index] = BookLevel {
            price,
            qty: qty as Qty,
            num_orders: count,
        };
    }

    fn on_crossing_complete(&mut self) {
        let in_self_trade = matches!(
            self.event.current,
            Some(TickInfo {
                kind: TickKind::CrossSummary,
                ..
            })
        );
        if in_self_trade {
            if let Some(pending) = &mut self.pending {
                pending.crossing_completed = true;
            }
            return;
        }

        if let Some(current) = self.event.current.take() {
            let snapshot = self.build_snapshot(&current);
            self.event.extras.push(snapshot);
            self.event.reset_trackers();
        }

        let Some(pending) = self.pending.take() else {
            debug_assert!(false, "crossing-complete with no pending aggressor");
            return;
        };
        let record_idx = self.event.primary.map_or(0, |p| p.record_idx);

        // The residual tick the publisher never needs to send: the
        // aggressor's leftover resting on its side, or the retraction of
        // a fully-consumed modify.
        if pending.remaining_qty > 0 {
            let kind = if pending.origin == TickKind::NewCrossed {
                TickKind::New
            } else {
                TickKind::Modify
            };
            self.event.current = Some(TickInfo {
                kind,
                is_exchange_tick: false,
                is_ask: pending.is_ask,
                record_idx,
                price: pending.price,
                qty: pending.remaining_qty as Qty,
                order_id: pending.id,
                order_id2: 0,
            });
        } else if pending.origin == TickKind::ModifyCrossed {
            self.event.current = Some(TickInfo {
                kind: TickKind::Cancel,
                is_exchange_tick: false,
                is_ask: pending.is_ask,
                record_idx,
                price: pending.price,
                qty: pending.original_qty,
                order_id: pending.id,
                order_id2: 0,
            });
        }
    }

    fn finish_event<O: Observer>(&mut self, observer: &mut O) -> bool {
        let Some(primary) = self.event.primary else {
            return true;
        };

        if primary.kind == TickKind::CrossSummary {
            return self.expand_cross_summary(primary, observer);
        }

        // Trade-first multi-tick events build the trade as extras;
        // deliver those before the main record.
        let extras = std::mem::take(&mut self.event.extras);
        for snapshot in &extras {
            if !observer.on_book_update(snapshot) {
                return false;
            }
        }
        self.event.extras = extras;

        if let Some(current) = self.event.current.take() {
            let snapshot = self.build_snapshot(&current);
            if !observer.on_book_update(&snapshot) {
                return false;
            }
        }
        true
    }

    /// Expand a self-trade cancel into its observable sequence: the
    /// summary, the cancelled order, and (passive case) the aggressor's
    /// residual.
    fn expand_cross_summary<O: Observer>(&mut self, primary: TickInfo, observer: &mut O) -> bool {
        let Some(pending) = self.pending else {
            debug_assert!(false, "cross summary with no pending aggressor");
            return true;
        };
        let Some(cancelled) = self.event.captured_s else {
            debug_assert!(false, "cross summary without its self-trade tick");
            return true;
        };

        // The summary snapshot always carries the aggressor's side, with
        // both sides' affected level at 0.
        let mut summary_tick = primary;
        summary_tick.is_ask = pending.is_ask;
        let mut summary = self.build_snapshot(&summary_tick);
        summary.bid_affected_lvl = 0;
        summary.ask_affected_lvl = 0;
        if !observer.on_book_update(&summary) {
            return false;
        }

        // The cancelled order's parameters, book untouched.
        let mut cancelled_snapshot = self.build_snapshot(&cancelled);
        cancelled_snapshot.bid_affected_lvl = LEVEL_UNTOUCHED;
        cancelled_snapshot.ask_affected_lvl = LEVEL_UNTOUCHED;
        if !observer.on_book_update(&cancelled_snapshot) {
            return false;
        }

        if cancelled.order_id == pending.id {
            // The aggressor itself was cancelled: the crossing is over.
            self.pending = None;
            return true;
        }

        // Passive cancel: show the aggressor's remaining interest. Once
        // the crossing completed it reads as a plain resting order.
        let kind = if pending.crossing_completed {
            if pending.origin == TickKind::NewCrossed {
                TickKind::New
            } else {
                TickKind::Modify
            }
        } else {
            pending.origin
        };
        let residual_tick = TickInfo {
            kind,
            is_exchange_tick: false,
            is_ask: pending.is_ask,
            record_idx: primary.record_idx,
            price: pending.price,
            qty: pending.remaining_qty as Qty,
            order_id: pending.id,
            order_id2: 0,
        };
        let mut residual = self.build_snapshot(&residual_tick);
        residual.bid_affected_lvl = LEVEL_UNTOUCHED;
        residual.ask_affected_lvl = LEVEL_UNTOUCHED;
        if !observer.on_book_update(&residual) {
            return false;
        }

        if pending.crossing_completed {
            self.pending = None;
        }
        true
    }

    fn build_snapshot(&self, tick: &TickInfo) -> OutputRecord {
        let mut rec = OutputRecord::zeroed();
        rec.record_idx = tick.record_idx;
        rec.token = self.token;
        rec.event = InputRecord::new(
            tick.record_idx,
            self.token,
            tick.kind,
            tick.is_ask,
            tick.order_id,
            tick.order_id2,
            tick.price,
            tick.qty,
        );
        rec.ltp = self.ltp;
        rec.ltq = self.ltq;
        rec.bid_affected_lvl = self.event.bid_affected;
        rec.ask_affected_lvl = self.event.ask_affected;
        rec.bid_filled_lvls = self.bids.iter().filter(|l| !l.is_empty()).count() as i8;
        rec.ask_filled_lvls = self.asks.iter().filter(|l| !l.is_empty()).count() as i8;
        rec.is_ask = tick.is_ask as u8;
        rec.bids = self.bids;
        rec.asks = self.asks;
        rec
    }
}

/// Chunk-stream consumer for any number of instruments.
pub struct Reconstructor {
    books: AHashMap<Token, BookState>,
}

impl Default for Reconstructor {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconstructor {
    pub fn new() -> Self {
        Self {
            books: AHashMap::new(),
        }
    }

    /// Apply one chunk; snapshots are delivered when a final chunk
    /// lands. Returns false once the observer aborts.
    pub fn on_chunk<O: Observer>(&mut self, chunk: &DeltaChunk, observer: &mut O) -> bool {
        let book = self
            .books
            .entry(chunk.token)
            .or_insert_with(|| BookState::new(chunk.token));
        book.on_chunk(chunk, observer)
    }

    pub fn book(&self, token: Token) -> Option<&BookState> {
        self.books.get(&token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::mbo::Mbo;
    use crate::core::types::TickKind;

    struct Collect {
        records: Vec<OutputRecord>,
    }

    impl Observer for Collect {
        fn on_book_update(&mut self, record: &OutputRecord) -> bool {
            self.records.push(*record);
            true
        }
    }

    fn run(mbo: &mut Mbo, recon: &mut Reconstructor, rec: InputRecord) -> Vec<OutputRecord> {
        let mut observer = Collect {
            records: Vec::new(),
        };
        for chunk in mbo.apply(&rec).to_vec() {
            assert!(recon.on_chunk(&chunk, &mut observer));
        }
        observer.records
    }

    fn new(idx: u32, id: i64, is_ask: bool, price: i64, qty: i32) -> InputRecord {
        InputRecord::new(idx, 1, TickKind::New, is_ask, id, 0, price, qty)
    }

    fn cancel(idx: u32, id: i64) -> InputRecord {
        InputRecord::new(idx, 1, TickKind::Cancel, false, id, 0, 0, 0)
    }

    fn trade(idx: u32, bid_id: i64, ask_id: i64, price: i64, qty: i32) -> InputRecord {
        InputRecord::new(idx, 1, TickKind::Trade, false, bid_id, ask_id, price, qty)
    }

    fn level(price: i64, qty: i32, num_orders: i32) -> BookLevel {
        BookLevel {
            price,
            qty,
            num_orders,
        }
    }

    #[test]
    fn test_single_insert_snapshot() {
        let mut mbo = Mbo::with_crossing(1, true);
        let mut recon = Reconstructor::new();

        let records = run(&mut mbo, &mut recon, new(0, 1, false, 100, 50));
        assert_eq!(records.len(), 1);

        let rec = records[0];
        assert_eq!(rec.event.tick_type, b'N');
        assert_eq!({ rec.bids }[0], level(100, 50, 1));
        assert_eq!(rec.bid_affected_lvl, 0);
        assert_eq!(rec.ask_affected_lvl, LEVEL_UNTOUCHED);
        assert_eq!(rec.bid_filled_lvls, 1);
        assert_eq!(rec.ask_filled_lvls, 0);
    }

    #[test]
    fn test_cancel_consolidates_slots() {
        let mut mbo = Mbo::with_crossing(1, true);
        let mut recon = Reconstructor::new();
        run(&mut mbo, &mut recon, new(0, 1, false, 100, 50));
        run(&mut mbo, &mut recon, new(1, 2, false, 99, 30));
        run(&mut mbo, &mut recon, new(2, 3, false, 98, 20));

        let records = run(&mut mbo, &mut recon, cancel(3, 1));
        assert_eq!(records.len(), 1);

        let rec = records[0];
        assert_eq!({ rec.bids }[0], level(99, 30, 1));
        assert_eq!({ rec.bids }[1], level(98, 20, 1));
        assert_eq!({ rec.bids }[2], level(0, 0, 0));
        assert_eq!(rec.bid_filled_lvls, 2);
    }

    #[test]
    fn test_crossing_trade_expands_to_trade_then_residual() {
        let mut mbo = Mbo::with_crossing(1, true);
        let mut recon = Reconstructor::new();
        run(&mut mbo, &mut recon, new(0, 11, true, 100, 30));
        run(&mut mbo, &mut recon, new(1, 12, true, 101, 20));

        // The aggressive bid: one snapshot, 'A' tick, crossed state
        // never shown with executable opposing liquidity.
        let records = run(&mut mbo, &mut recon, new(2, 7, false, 100, 50));
        assert_eq!(records.len(), 1);
        let rec = records[0];
        assert_eq!(rec.event.tick_type, b'A');
        assert_eq!({ rec.bids }[0], level(100, 20, 1));
        // The consumed ask level sits at qty 0 pending reconciliation.
        assert_eq!({ rec.asks }[0], level(100, 0, 1));
        assert_eq!({ rec.asks }[1], level(101, 20, 1));

        // The confirming trade: trade snapshot first, then the residual
        // synthesized as a plain 'N'.
        let records = run(&mut mbo, &mut recon, trade(3, 7, 11, 100, 30));
        assert_eq!(records.len(), 2);

        let t = records[0];
        assert_eq!(t.event.tick_type, b'T');
        assert_eq!((t.ltp, t.ltq), (100, 30));
        assert_eq!(t.bid_affected_lvl, 0);
        assert_eq!(t.ask_affected_lvl, 0);
        assert_eq!({ t.asks }[0], level(101, 20, 1));
        assert_eq!({ t.bids }[0], level(100, 20, 1));

        let n = records[1];
        assert_eq!(n.event.tick_type, b'N');
        assert_eq!({ n.event.order_id }, 7);
        assert_eq!({ n.event.price }, 100);
        assert_eq!({ n.event.qty }, 20);
        assert_eq!(n.bid_affected_lvl, LEVEL_UNTOUCHED);
        assert_eq!({ n.bids }[0], level(100, 20, 1));
    }

    #[test]
    fn test_aggressor_self_trade_expands_to_c_then_s() {
        let mut mbo = Mbo::with_crossing(1, true);
        let mut recon = Reconstructor::new();
        run(&mut mbo, &mut recon, new(0, 11, true, 100, 30));
        run(&mut mbo, &mut recon, new(1, 12, true, 101, 20));
        run(&mut mbo, &mut recon, new(2, 7, false, 100, 50));

        let records = run(&mut mbo, &mut recon, cancel(3, 7));
        assert_eq!(records.len(), 2);

        let c = records[0];
        assert_eq!(c.event.tick_type, b'C');
        assert_eq!({ c.event.price }, 100); // vwap of the reversed fills
        assert_eq!({ c.event.qty }, 30);
        assert_eq!(c.is_ask, 0); // aggressor side
        assert_eq!(c.bid_affected_lvl, 0);
        assert_eq!(c.ask_affected_lvl, 0);
        // Restored book: asks back in full, aggressor's residual gone.
        assert_eq!({ c.asks }[0], level(100, 30, 1));
        assert_eq!({ c.asks }[1], level(101, 20, 1));
        assert_eq!({ c.bids }[0], level(0, 0, 0));

        let s = records[1];
        assert_eq!(s.event.tick_type, b'S');
        assert_eq!({ s.event.order_id }, 7);
        assert_eq!({ s.event.price }, 100);
        assert_eq!({ s.event.qty }, 50);
        assert_eq!(s.bid_affected_lvl, LEVEL_UNTOUCHED);
        assert_eq!(s.ask_affected_lvl, LEVEL_UNTOUCHED);
    }

    #[test]
    fn test_passive_self_trade_expands_to_c_s_and_aggressor() {
        let mut mbo = Mbo::with_crossing(1, true);
        let mut recon = Reconstructor::new();
        run(&mut mbo, &mut recon, new(0, 21, true, 100, 30));
        run(&mut mbo, &mut recon, new(1, 22, true, 101, 50));
        run(&mut mbo, &mut recon, new(2, 7, false, 101, 40));

        let records = run(&mut mbo, &mut recon, cancel(3, 21));
        assert_eq!(records.len(), 3);

        let c = records[0];
        assert_eq!(c.event.tick_type, b'C');
        assert_eq!(c.is_ask, 0); // forced to the aggressor's side
        assert_eq!(c.bid_affected_lvl, 0);
        assert_eq!(c.ask_affected_lvl, 0);

        let s = records[1];
        assert_eq!(s.event.tick_type, b'S');
        assert_eq!({ s.event.order_id }, 21);
        assert_eq!(({ s.event.price }, { s.event.qty }), (100, 30));
        assert_eq!(s.is_ask, 1); // cancelled order's (passive) side

        // Crossing still open: the aggressor still reads as 'A'.
        let a = records[2];
        assert_eq!(a.event.tick_type, b'A');
        assert_eq!({ a.event.order_id }, 7);
        assert_eq!({ a.event.price }, 101);
        assert_eq!({ a.asks }[0], level(101, 10, 1));

        // The confirming trade completes the crossing: trade snapshot,
        // then the aggressor residual (qty 0 on an 'A' yields nothing).
        let records = run(&mut mbo, &mut recon, trade(4, 7, 22, 101, 40));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event.tick_type, b'T');
        assert_eq!({ records[0].asks }[0], level(101, 10, 1));
        assert_eq!(records[0].bid_filled_lvls, 0);
    }

    #[test]
    fn test_observer_abort_stops_processing() {
        let mut mbo = Mbo::with_crossing(1, true);
        let mut recon = Reconstructor::new();

        let chunks = mbo.apply(&new(0, 1, false, 100, 50)).to_vec();
        let mut aborting = |_: &OutputRecord| false;
        assert!(!recon.on_chunk(&chunks[0], &mut aborting));
    }

    #[test]
    fn test_insert_at_last_slot_is_plain_write() {
        let mut recon = Reconstructor::new();
        let mut mbo = Mbo::with_crossing(1, true);

        // Fill 20 bid levels, then add a 21st beyond the window and
        // cancel the best: the refill promotes it into slot 19.
        for i in 0..20 {
            run(&mut mbo, &mut recon, new(i, i as i64 + 1, false, 100 - i as i64, 10));
        }
        run(&mut mbo, &mut recon, new(20, 99, false, 79, 7));

        let records = run(&mut mbo, &mut recon, cancel(21, 1));
        let rec = records[0];
        assert_eq!({ rec.bids }[0], level(99, 10, 1));
        assert_eq!({ rec.bids }[19], level(79, 7, 1));
        assert_eq!(rec.bid_filled_lvls, 20);
        // The refill is not an affected level; the cancel at 0 is.
        assert_eq!(rec.bid_affected_lvl, 0);
    }

    #[test]
    fn test_ltp_carries_forward() {
        let mut mbo = Mbo::with_crossing(1, false);
        let mut recon = Reconstructor::new();
        run(&mut mbo, &mut recon, new(0, 1, false, 100, 50));
        run(&mut mbo, &mut recon, trade(1, 1, 0, 100, 20));

        let records = run(&mut mbo, &mut recon, new(2, 2, false, 99, 10));
        assert_eq!((records[0].ltp, records[0].ltq), (100, 20));
    }
}
