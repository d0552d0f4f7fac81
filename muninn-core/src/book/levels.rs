//! One side's sorted price levels plus the speculative crossing ledger
//!
//! Levels live in a flat vector sorted best-first by canonical key. Both
//! sides share one comparator: bids negate the price at the storage
//! boundary so ascending canonical order puts the best level at index 0
//! on either side. Every public surface — arguments, returns, emitted
//! deltas — speaks actual prices; canonical keys never leak out.
//!
//! The crossing ledger records speculative consumption while an
//! aggressive order is being matched ahead of the exchange's trade
//! confirmations. Fills are confirmed from the front (trade messages)
//! and rolled back from the rear (self-trade cancels). Counts are
//! deliberately NOT decremented during speculation: an aggressor can
//! match any number of orders at one level, and only the trade stream
//! states which orders actually died. Trade-time reconciliation settles
//! the counts.
//!
//! Consequently a fully-consumed level keeps its slot with qty 0 until
//! the trade (or cancel) that accounts for its orders removes the count.
//! A level is erased only once both its qty and its count are gone.

use crate::book::emitter::DeltaEmitter;
use crate::core::types::{Count, LevelQty, Price, Side};
use crate::data::constants::{BOOK_DEPTH, CROSS_FILLS_RESERVE, LEVELS_RESERVE};

/// One price level: canonical key, aggregate qty, order count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LevelEntry {
    key: i64,
    qty: LevelQty,
    count: Count,
}

/// One speculative consumption: which level, how much, and the level's
/// pre-consumption order count.
#[derive(Debug, Clone, Copy)]
struct CrossFill {
    price: Price,
    qty: LevelQty,
    count: Count,
}

/// Sorted best-first level container for one side of one instrument.
pub struct PriceLevels {
    side: Side,
    levels: Vec<LevelEntry>,
    cross_fills: Vec<CrossFill>,
    pending_fill_qty: LevelQty,
    pending_fill_count: Count,
}

impl PriceLevels {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: Vec::with_capacity(LEVELS_RESERVE),
            cross_fills: Vec::with_capacity(CROSS_FILLS_RESERVE),
            pending_fill_qty: 0,
            pending_fill_count: 0,
        }
    }

    #[inline(always)]
    pub fn side(&self) -> Side {
        self.side
    }

    /// Actual price <-> canonical key. Bids negate so ascending key order
    /// is best-first on both sides.
    #[inline(always)]
    fn canonical(&self, price: Price) -> i64 {
        match self.side {
            Side::Bid => -price,
            Side::Ask => price,
        }
    }

    #[inline(always)]
    fn actual(&self, key: i64) -> Price {
        match self.side {
            Side::Bid => -key,
            Side::Ask => key,
        }
    }

    #[inline]
    fn find(&self, key: i64) -> Result<usize, usize> {
        self.levels.binary_search_by_key(&key, |l| l.key)
    }

    /// Best price on this side, 0 when empty.
    #[inline]
    pub fn best_price(&self) -> Price {
        self.levels.first().map_or(0, |l| self.actual(l.key))
    }

    /// Rank of a price: 0..20, or 20 when absent or beyond the window.
    pub fn get_level_index(&self, price: Price) -> usize {
        match self.find(self.canonical(price)) {
            Ok(idx) => idx.min(BOOK_DEPTH),
            Err(_) => BOOK_DEPTH,
        }
    }

    #[inline(always)]
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// (price, qty, count) at a rank, for tests and debug tooling.
    pub fn level_at(&self, idx: usize) -> Option<(Price, LevelQty, Count)> {
        self.levels
            .get(idx)
            .map(|l| (self.actual(l.key), l.qty, l.count))
    }

    #[inline(always)]
    pub fn pending_fill_qty(&self) -> LevelQty {
        self.pending_fill_qty
    }

    #[inline(always)]
    pub fn pending_fill_count(&self) -> Count {
        self.pending_fill_count
    }

    /// Insert or grow a level. New levels emit a shifting Insert at their
    /// post-insert rank; existing levels emit an Update. Ranks >= 20 are
    /// filtered by the emitter, never here: internal state always updates.
    pub fn add_liquidity(
        &mut self,
        em: &mut DeltaEmitter,
        price: Price,
        qty: LevelQty,
        count_delta: Count,
    ) {
        debug_assert!(qty >= 0);
        if qty == 0 && count_delta == 0 {
            return;
        }

        let key = self.canonical(price);
        match self.find(key) {
            Ok(idx) => {
                let level = &mut self.levels[idx];
                level.qty += qty;
                level.count += count_delta;
                em.emit_update(self.side, idx, qty, count_delta);
            }
            Err(idx) => {
                self.levels.insert(
                    idx,
                    LevelEntry {
                        key,
                        qty,
                        count: count_delta,
                    },
                );
                em.emit_insert(self.side, idx, true, price, qty, count_delta);
            }
        }
    }

    /// Shrink a level; erase it once both its qty and its count are gone.
    ///
    /// A level whose qty was speculatively consumed keeps its slot (with
    /// qty 0) while orders still rest there: the trade stream's count
    /// reconciliation must land on it. Erasing a level inside the
    /// observable window promotes the 21st-best level (when present) via
    /// a non-shifting refill Insert at slot 19.
    ///
    /// Returns whether the level was erased.
    pub fn remove_liquidity(
        &mut self,
        em: &mut DeltaEmitter,
        price: Price,
        qty: LevelQty,
        count_delta: Count,
    ) -> bool {
        if qty == 0 && count_delta == 0 {
            return false;
        }
        let key = self.canonical(price);
        let Ok(idx) = self.find(key) else {
            return false;
        };

        let level = &mut self.levels[idx];
        level.qty -= qty;
        level.count -= count_delta;
        em.emit_update(self.side, idx, -qty, -count_delta);

        if level.qty > 0 || level.count > 0 {
            return false;
        }
        self.levels.remove(idx);

        if idx < BOOK_DEPTH && self.levels.len() >= BOOK_DEPTH {
            let refill = self.levels[BOOK_DEPTH - 1];
            em.emit_insert(
                self.side,
                BOOK_DEPTH - 1,
                false,
                self.actual(refill.key),
                refill.qty,
                refill.count,
            );
        }
        true
    }

    /// Does `price` on this side cross an aggressor at `aggressor_price`
    /// on the opposite side?
    #[inline]
    pub fn crosses(&self, price: Price, aggressor_price: Price) -> bool {
        self.canonical(price) <= self.canonical(aggressor_price)
    }

    /// Speculatively consume levels from the best inward while they cross
    /// the aggressor price. Each consumption is recorded in the ledger;
    /// qty leaves the levels immediately, counts stay until trade-time
    /// reconciliation.
    ///
    /// A fresh crossing (no pending fills) starts a clean ledger; a
    /// re-cross while fills are still pending appends to it.
    ///
    /// Returns the total qty consumed.
    pub fn cross(
        &mut self,
        em: &mut DeltaEmitter,
        aggressor_price: Price,
        aggressor_qty: LevelQty,
    ) -> LevelQty {
        if self.pending_fill_qty == 0 {
            self.cross_fills.clear();
            self.pending_fill_count = 0;
        }

        let limit = self.canonical(aggressor_price);
        let mut remaining = aggressor_qty;
        let mut consumed = 0;

        // Index scan: fully-consumed levels stay in place (qty 0, count
        // intact) so a re-cross walks over them to the next live level.
        let mut idx = 0;
        while remaining > 0 && idx < self.levels.len() {
            let entry = self.levels[idx];
            if entry.key > limit {
                break;
            }

            let take = entry.qty.min(remaining);
            if take > 0 {
                let price = self.actual(entry.key);
                self.cross_fills.push(CrossFill {
                    price,
                    qty: take,
                    count: entry.count,
                });
                self.pending_fill_qty += take;
                self.pending_fill_count += entry.count;

                self.remove_liquidity(em, price, take, 0);
                remaining -= take;
                consumed += take;
            }
            idx += 1;
        }

        consumed
    }

    /// A trade confirmed `fill_qty` of the speculation: advance the
    /// confirmed prefix. The qty already left the levels during `cross`,
    /// so only the ledger moves. Returns the amount reconciled.
    pub fn reconcile_cross_fill(&mut self, fill_qty: LevelQty) -> LevelQty {
        let reconciled = fill_qty.min(self.pending_fill_qty);
        self.pending_fill_qty -= reconciled;
        reconciled
    }

    /// A trade fully consumed one passive order: advance the confirmed
    /// count.
    pub fn reconcile_cross_count(&mut self, count_delta: Count) {
        self.pending_fill_count -= count_delta;
    }

    /// A passive self-trade cancel is taking its qty out of the
    /// speculation: hand it back to the aggressor (which will re-cross)
    /// without restoring any liquidity.
    pub fn unreserve_cross_fill(&mut self, qty: LevelQty) {
        let give_back = qty.min(self.pending_fill_qty);
        self.pending_fill_qty -= give_back;
        self.pending_fill_count -= 1;
    }

    /// Full rollback of the unconfirmed suffix: restore every
    /// still-pending consumption to the book. Levels destroyed by the
    /// speculation come back with their original order count.
    pub fn uncross(&mut self, em: &mut DeltaEmitter) {
        let total: LevelQty = self.cross_fills.iter().map(|f| f.qty).sum();
        let confirmed = total - self.pending_fill_qty;

        let mut fills = std::mem::take(&mut self.cross_fills);
        let mut cum = 0;
        for fill in &fills {
            let skip = fill.qty.min((confirmed - cum).max(0));
            cum += fill.qty;

            let restore = fill.qty - skip;
            if restore > 0 {
                // A level destroyed since the consumption gets its order
                // count back along with the qty.
                let count_delta = if self.find(self.canonical(fill.price)).is_err() {
                    fill.count
                } else {
                    0
                };
                self.add_liquidity(em, fill.price, restore, count_delta);
            }
        }
        fills.clear();
        self.cross_fills = fills;

        self.pending_fill_qty = 0;
        self.pending_fill_count = 0;
    }

    /// VWAP and total qty of the unconfirmed suffix, carried in the 'C'
    /// tick so observers see what the rollback reversed.
    pub fn pending_cross_vwap(&self) -> (Price, LevelQty) {
        if self.pending_fill_qty == 0 {
            return (0, 0);
        }

        let total: LevelQty = self.cross_fills.iter().map(|f| f.qty).sum();
        let confirmed = total - self.pending_fill_qty;

        let mut cum = 0;
        let mut notional: i128 = 0;
        for fill in &self.cross_fills {
            let skip = fill.qty.min((confirmed - cum).max(0));
            cum += fill.qty;

            let unconfirmed = fill.qty - skip;
            notional += fill.price as i128 * unconfirmed as i128;
        }

        let vwap = (notional / self.pending_fill_qty as i128) as Price;
        (vwap, self.pending_fill_qty)
    }

    /// Drop the ledger without touching the levels (normal completion).
    pub fn clear_cross_fills(&mut self) {
        self.cross_fills.clear();
        self.pending_fill_qty = 0;
        self.pending_fill_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TickKind;

    fn emitter() -> DeltaEmitter {
        let mut em = DeltaEmitter::new(1);
        em.emit_tick_info(TickKind::New, true, false, 0, 0, 0, 0, 0);
        em
    }

    fn levels_of(side: Side, entries: &[(Price, LevelQty, Count)]) -> (PriceLevels, DeltaEmitter) {
        let mut em = emitter();
        let mut pl = PriceLevels::new(side);
        for &(price, qty, count) in entries {
            pl.add_liquidity(&mut em, price, qty, count);
        }
        em.reset();
        em.emit_tick_info(TickKind::New, true, false, 0, 0, 0, 0, 0);
        (pl, em)
    }

    #[test]
    fn test_best_first_ordering_bids() {
        let (pl, _) = levels_of(Side::Bid, &[(98, 20, 1), (100, 50, 1), (99, 30, 1)]);
        assert_eq!(pl.best_price(), 100);
        assert_eq!(pl.level_at(0), Some((100, 50, 1)));
        assert_eq!(pl.level_at(1), Some((99, 30, 1)));
        assert_eq!(pl.level_at(2), Some((98, 20, 1)));
    }

    #[test]
    fn test_best_first_ordering_asks() {
        let (pl, _) = levels_of(Side::Ask, &[(101, 20, 1), (100, 30, 1), (102, 10, 1)]);
        assert_eq!(pl.best_price(), 100);
        assert_eq!(pl.level_at(0), Some((100, 30, 1)));
        assert_eq!(pl.level_at(2), Some((102, 10, 1)));
    }

    #[test]
    fn test_negative_prices_order_correctly() {
        // Exchanges may send negative canonical forms; ordering must hold.
        let (pl, _) = levels_of(Side::Bid, &[(-5, 10, 1), (-2, 10, 1), (-9, 10, 1)]);
        assert_eq!(pl.best_price(), -2);
        let (pl, _) = levels_of(Side::Ask, &[(-5, 10, 1), (-2, 10, 1), (-9, 10, 1)]);
        assert_eq!(pl.best_price(), -9);
    }

    #[test]
    fn test_add_merges_existing_level() {
        let (mut pl, mut em) = levels_of(Side::Bid, &[(100, 50, 1)]);
        pl.add_liquidity(&mut em, 100, 25, 1);
        assert_eq!(pl.level_at(0), Some((100, 75, 2)));
        assert_eq!(pl.num_levels(), 1);
    }

    #[test]
    fn test_remove_erases_level_at_zero() {
        let (mut pl, mut em) = levels_of(Side::Bid, &[(100, 50, 1), (99, 30, 1)]);
        let erased = pl.remove_liquidity(&mut em, 100, 50, 1);
        assert!(erased);
        assert_eq!(pl.best_price(), 99);
        assert_eq!(pl.num_levels(), 1);
    }

    #[test]
    fn test_remove_noop_cases() {
        let (mut pl, mut em) = levels_of(Side::Bid, &[(100, 50, 1)]);
        assert!(!pl.remove_liquidity(&mut em, 100, 0, 0));
        assert!(!pl.remove_liquidity(&mut em, 97, 10, 1)); // absent price
        assert_eq!(pl.level_at(0), Some((100, 50, 1)));
    }

    #[test]
    fn test_get_level_index() {
        let (pl, _) = levels_of(Side::Ask, &[(100, 10, 1), (101, 10, 1)]);
        assert_eq!(pl.get_level_index(100), 0);
        assert_eq!(pl.get_level_index(101), 1);
        assert_eq!(pl.get_level_index(99), BOOK_DEPTH);
    }

    #[test]
    fn test_refill_emitted_when_window_level_erased() {
        // 21 bid levels 100..=120; erase the best and expect a refill
        // insert carrying the level that becomes 20th-best.
        let entries: Vec<_> = (100..=120).map(|p| (p as Price, 10, 1)).collect();
        let (mut pl, mut em) = levels_of(Side::Bid, &entries);
        assert_eq!(pl.num_levels(), 21);

        pl.remove_liquidity(&mut em, 120, 10, 1);

        use crate::data::wire::{Delta, DeltaIter};
        let deltas: Vec<_> = em.chunks().iter().flat_map(DeltaIter::new).collect();
        let refill = deltas
            .iter()
            .find_map(|d| match *d {
                Delta::Insert {
                    index: 19,
                    shift: false,
                    price,
                    qty,
                    ..
                } => Some((price, qty)),
                _ => None,
            })
            .expect("refill insert");
        assert_eq!(refill, (100, 10));
        assert_eq!(pl.num_levels(), 20);
    }

    #[test]
    fn test_cross_consumes_best_inward() {
        let (mut pl, mut em) = levels_of(Side::Ask, &[(100, 30, 1), (101, 20, 1), (103, 5, 1)]);

        // Bid aggressor at 101 for 40: eats 30@100 and 10@101. The
        // emptied 100 level keeps its slot pending count reconciliation.
        let consumed = pl.cross(&mut em, 101, 40);
        assert_eq!(consumed, 40);
        assert_eq!(pl.pending_fill_qty(), 40);
        assert_eq!(pl.level_at(0), Some((100, 0, 1)));
        assert_eq!(pl.level_at(1), Some((101, 10, 1)));
    }

    #[test]
    fn test_cross_empty_side_is_noop() {
        let mut em = emitter();
        let mut pl = PriceLevels::new(Side::Ask);
        assert_eq!(pl.cross(&mut em, 100, 50), 0);
        assert_eq!(pl.pending_fill_qty(), 0);
    }

    #[test]
    fn test_cross_respects_price_limit() {
        let (mut pl, mut em) = levels_of(Side::Ask, &[(100, 30, 1), (105, 20, 1)]);
        let consumed = pl.cross(&mut em, 102, 100);
        assert_eq!(consumed, 30);
        assert_eq!(pl.level_at(0), Some((100, 0, 1)));
        assert_eq!(pl.level_at(1), Some((105, 20, 1)));
    }

    #[test]
    fn test_cross_then_uncross_restores_exactly() {
        let entries = [(100, 30, 2), (101, 20, 1), (103, 5, 1)];
        let (mut pl, mut em) = levels_of(Side::Ask, &entries);

        pl.cross(&mut em, 101, 40);
        pl.uncross(&mut em);

        assert_eq!(pl.pending_fill_qty(), 0);
        assert_eq!(pl.pending_fill_count(), 0);
        for (i, &(p, q, c)) in entries.iter().enumerate() {
            assert_eq!(pl.level_at(i), Some((p, q, c)), "level {i}");
        }
    }

    #[test]
    fn test_uncross_skips_confirmed_prefix() {
        let (mut pl, mut em) = levels_of(Side::Ask, &[(100, 30, 1), (101, 20, 1)]);

        pl.cross(&mut em, 101, 40); // 30@100 + 10@101 pending
        assert_eq!(pl.reconcile_cross_fill(30), 30); // 30@100 confirmed
        pl.uncross(&mut em);

        // Only the unconfirmed 10@101 comes back; the consumed 100 level
        // sits at qty 0 awaiting its trade's count reconciliation.
        assert_eq!(pl.level_at(0), Some((100, 0, 1)));
        assert_eq!(pl.level_at(1), Some((101, 20, 1)));
        assert_eq!(pl.pending_fill_qty(), 0);
    }

    #[test]
    fn test_reconcile_caps_at_pending() {
        let (mut pl, mut em) = levels_of(Side::Ask, &[(100, 30, 1)]);
        pl.cross(&mut em, 100, 50);
        assert_eq!(pl.pending_fill_qty(), 30);
        assert_eq!(pl.reconcile_cross_fill(50), 30);
        assert_eq!(pl.pending_fill_qty(), 0);
    }

    #[test]
    fn test_pending_cross_vwap() {
        let (mut pl, mut em) = levels_of(Side::Ask, &[(100, 30, 1), (102, 10, 1)]);
        pl.cross(&mut em, 102, 40);

        // 30@100 + 10@102 -> vwap 100.5 truncated to 100.
        let (vwap, qty) = pl.pending_cross_vwap();
        assert_eq!(qty, 40);
        assert_eq!(vwap, (30 * 100 + 10 * 102) / 40);

        // Confirm the first level; vwap now covers only 10@102.
        pl.reconcile_cross_fill(30);
        let (vwap, qty) = pl.pending_cross_vwap();
        assert_eq!((vwap, qty), (102, 10));
    }

    #[test]
    fn test_vwap_empty_when_nothing_pending() {
        let pl = PriceLevels::new(Side::Bid);
        assert_eq!(pl.pending_cross_vwap(), (0, 0));
    }

    #[test]
    fn test_recross_preserves_ledger() {
        let (mut pl, mut em) = levels_of(Side::Ask, &[(100, 30, 1), (101, 50, 1)]);
        pl.cross(&mut em, 100, 30);
        assert_eq!(pl.pending_fill_qty(), 30);

        // Mid-crossing re-cross appends instead of clearing.
        pl.cross(&mut em, 101, 10);
        assert_eq!(pl.pending_fill_qty(), 40);

        // A fresh crossing after full reconciliation starts clean.
        pl.reconcile_cross_fill(40);
        pl.clear_cross_fills();
        pl.cross(&mut em, 101, 5);
        assert_eq!(pl.pending_fill_qty(), 5);
    }

    #[test]
    fn test_unreserve_gives_back_pending() {
        let (mut pl, mut em) = levels_of(Side::Ask, &[(100, 30, 2)]);
        pl.cross(&mut em, 100, 30);
        assert_eq!(pl.pending_fill_count(), 2);

        pl.unreserve_cross_fill(30);
        assert_eq!(pl.pending_fill_qty(), 0);
        assert_eq!(pl.pending_fill_count(), 1);
    }
}
