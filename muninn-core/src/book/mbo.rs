//! Per-instrument book engine
//!
//! Implements the four exchange operations (N/M/X/T) over the order map
//! and the two level containers, and drives the speculative crossing
//! state machine:
//!
//! - An aggressive new/modify pre-matches opposing liquidity the moment
//!   it arrives ('A'/'B' ticks), before any trade confirmation.
//! - Arriving trades reconcile the speculation from the front of the
//!   ledger; counts settle here, never during speculation.
//! - A self-trade cancel instead of a trade rolls the unconfirmed
//!   speculation back ('C' + 'S' ticks), re-crossing against alternate
//!   liquidity when the cancelled order was passive.
//!
//! The engine never returns errors: given valid input it emits correct
//! deltas, and invariant violations abort. Unknown-order modifies and
//! trades are silent no-ops; unknown-order cancels emit a synthetic 'X'
//! (the exchange sometimes cancels orders we never saw).

use crate::book::emitter::DeltaEmitter;
use crate::book::levels::PriceLevels;
use crate::book::crossing_enabled;
use crate::core::types::{OrderId, OrderInfo, Price, Qty, Side, TickKind, Token};
use crate::data::constants::ORDER_MAP_RESERVE;
use crate::data::wire::DeltaChunk;
use ahash::AHashMap;

/// Where a pending aggressor's residual came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResidualOrigin {
    NewOrder,
    ModifyOrder,
}

/// The one aggressive order whose speculative fills are not yet fully
/// confirmed. Active iff `aggressor_id != 0`; at most one per instrument.
#[derive(Debug, Clone, Copy)]
pub struct PendingCross {
    pub aggressor_id: OrderId,
    pub aggressor_is_ask: bool,
    pub aggressor_price: Price,
    pub residual_origin: ResidualOrigin,
    /// Whether the aggressor's unfilled remainder rests on its own side.
    pub residual_on_level: bool,
}

impl PendingCross {
    const fn inactive() -> Self {
        Self {
            aggressor_id: 0,
            aggressor_is_ask: false,
            aggressor_price: 0,
            residual_origin: ResidualOrigin::NewOrder,
            residual_on_level: false,
        }
    }

    fn begin(id: OrderId, is_ask: bool, price: Price, origin: ResidualOrigin) -> Self {
        Self {
            aggressor_id: id,
            aggressor_is_ask: is_ask,
            aggressor_price: price,
            residual_origin: origin,
            residual_on_level: false,
        }
    }

    #[inline(always)]
    pub fn active(&self) -> bool {
        self.aggressor_id != 0
    }

    #[inline]
    fn clear(&mut self) {
        *self = Self::inactive();
    }
}

/// Per-instrument MBO engine: order map, both sides, pending-cross
/// record, and the event's delta emitter.
pub struct Mbo {
    token: Token,
    orders: AHashMap<OrderId, OrderInfo>,
    bids: PriceLevels,
    asks: PriceLevels,
    pending_cross: PendingCross,
    /// Most recent id seen on a new/modify; aggressor tie-breaker for
    /// trades that cannot identify the aggressor from book presence.
    last_order_id: OrderId,
    crossing: bool,
    emitter: DeltaEmitter,
}

impl Mbo {
    /// Engine for one instrument, sampling the process-wide crossing gate.
    pub fn new(token: Token) -> Self {
        Self::with_crossing(token, crossing_enabled())
    }

    /// Engine with an explicit crossing setting (tests, tooling).
    pub fn with_crossing(token: Token, crossing: bool) -> Self {
        let mut orders = AHashMap::new();
        orders.reserve(ORDER_MAP_RESERVE);
        Self {
            token,
            orders,
            bids: PriceLevels::new(Side::Bid),
            asks: PriceLevels::new(Side::Ask),
            pending_cross: PendingCross::inactive(),
            last_order_id: 0,
            crossing,
            emitter: DeltaEmitter::new(token),
        }
    }

    #[inline(always)]
    pub fn token(&self) -> Token {
        self.token
    }

    pub fn order(&self, id: OrderId) -> Option<OrderInfo> {
        self.orders.get(&id).copied()
    }

    pub fn levels(&self, side: Side) -> &PriceLevels {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    pub fn pending_cross(&self) -> &PendingCross {
        &self.pending_cross
    }

    /// Apply one exchange event and return its finalized chunk sequence.
    /// An empty slice means the event was a silent no-op.
    pub fn apply(&mut self, rec: &crate::data::wire::InputRecord) -> &[DeltaChunk] {
        self.emitter.reset();
        match rec.kind() {
            Some(TickKind::New) => self.new_order(
                rec.record_idx,
                rec.order_id,
                rec.is_ask != 0,
                rec.price,
                rec.qty,
            ),
            Some(TickKind::Modify) => {
                self.modify_order(rec.record_idx, rec.order_id, rec.price, rec.qty)
            }
            Some(TickKind::Cancel) => self.cancel_order(rec.record_idx, rec.order_id),
            Some(TickKind::Trade) => self.trade(
                rec.record_idx,
                rec.order_id,
                rec.order_id2,
                rec.price,
                rec.qty,
            ),
            _ => {}
        }
        if self.emitter.has_deltas() {
            self.emitter.finalize()
        } else {
            &[]
        }
    }

    pub fn new_order(&mut self, record_idx: u32, id: OrderId, is_ask: bool, price: Price, qty: Qty) {
        assert!(
            !self.pending_cross.active(),
            "new order while a crossing is unresolved"
        );
        let crossing = self.crossing;
        let Mbo {
            bids,
            asks,
            emitter: em,
            orders,
            pending_cross,
            last_order_id,
            ..
        } = self;
        let (own, passive) = if is_ask { (asks, bids) } else { (bids, asks) };

        let would_cross = crossing
            && passive.best_price() != 0
            && passive.crosses(passive.best_price(), price);
        let kind = if would_cross {
            TickKind::NewCrossed
        } else {
            TickKind::New
        };
        em.emit_tick_info(kind, !would_cross, is_ask, record_idx, price, qty, id, 0);

        let consumed = if would_cross {
            passive.cross(em, price, qty as i64)
        } else {
            0
        };
        debug_assert_eq!(would_cross, consumed > 0);

        if consumed > 0 {
            *pending_cross = PendingCross::begin(id, is_ask, price, ResidualOrigin::NewOrder);
        }

        orders.insert(id, OrderInfo::new(Side::from_is_ask(is_ask), price, qty));
        *last_order_id = id;

        let residual = qty as i64 - consumed;
        if residual > 0 {
            own.add_liquidity(em, price, residual, 1);
            if pending_cross.active() {
                pending_cross.residual_on_level = true;
            }
        }
    }

    /// Side is assumed preserved across a modify. Unknown id is a no-op.
    pub fn modify_order(&mut self, record_idx: u32, id: OrderId, new_price: Price, new_qty: Qty) {
        let Some(old) = self.orders.get(&id).copied() else {
            return;
        };
        let is_ask = old.side.is_ask();

        if !self.crossing {
            let Mbo {
                bids,
                asks,
                emitter: em,
                orders,
                last_order_id,
                ..
            } = self;
            let own = if is_ask { asks } else { bids };

            em.emit_tick_info(
                TickKind::Modify,
                true,
                is_ask,
                record_idx,
                new_price,
                new_qty,
                id,
                0,
            );
            if new_price != old.price {
                own.remove_liquidity(em, old.price, old.qty as i64, 1);
                own.add_liquidity(em, new_price, new_qty as i64, 1);
            } else if new_qty > old.qty {
                own.add_liquidity(em, new_price, (new_qty - old.qty) as i64, 0);
            } else if new_qty < old.qty {
                own.remove_liquidity(em, old.price, (old.qty - new_qty) as i64, 0);
            }

            orders.insert(id, OrderInfo::new(old.side, new_price, new_qty));
            *last_order_id = id;
            return;
        }

        assert!(
            !self.pending_cross.active(),
            "modify while a crossing is unresolved"
        );
        let Mbo {
            bids,
            asks,
            emitter: em,
            orders,
            pending_cross,
            last_order_id,
            ..
        } = self;
        let (own, passive) = if is_ask { (asks, bids) } else { (bids, asks) };

        let would_cross =
            passive.best_price() != 0 && passive.crosses(passive.best_price(), new_price);
        let kind = if would_cross {
            TickKind::ModifyCrossed
        } else {
            TickKind::Modify
        };
        em.emit_tick_info(
            kind,
            !would_cross,
            is_ask,
            record_idx,
            new_price,
            new_qty,
            id,
            0,
        );

        own.remove_liquidity(em, old.price, old.qty as i64, 1);
        let consumed = if would_cross {
            passive.cross(em, new_price, new_qty as i64)
        } else {
            0
        };
        debug_assert_eq!(would_cross, consumed > 0);

        if consumed > 0 {
            *pending_cross = PendingCross::begin(id, is_ask, new_price, ResidualOrigin::ModifyOrder);
        }

        let residual = new_qty as i64 - consumed;
        if residual > 0 {
            own.add_liquidity(em, new_price, residual, 1);
            if pending_cross.active() {
                pending_cross.residual_on_level = true;
            }
        }

        // Updated after the speculative operations: a later cancel that
        // reverses this modify derives the pre-modify state from here.
        orders.insert(id, OrderInfo::new(old.side, new_price, new_qty));
        *last_order_id = id;
    }

    pub fn cancel_order(&mut self, record_idx: u32, id: OrderId) {
        let Some(info) = self.orders.get(&id).copied() else {
            // The exchange sometimes cancels orders we never saw.
            self.emitter
                .emit_tick_info(TickKind::Cancel, true, false, record_idx, 0, 0, id, 0);
            return;
        };

        if self.pending_cross.active() {
            if id == self.pending_cross.aggressor_id {
                self.cancel_aggressor_self_trade(record_idx, id, info);
                return;
            }

            let passive_victim = info.side.is_ask() != self.pending_cross.aggressor_is_ask
                && self
                    .levels(info.side)
                    .crosses(info.price, self.pending_cross.aggressor_price);
            if passive_victim && self.cancel_passive_self_trade(record_idx, id, info) {
                return;
            }
        }

        self.cancel_regular(record_idx, id, info);
    }

    fn cancel_regular(&mut self, record_idx: u32, id: OrderId, info: OrderInfo) {
        let Mbo {
            bids,
            asks,
            emitter: em,
            orders,
            ..
        } = self;
        let own = if info.side.is_ask() { asks } else { bids };

        em.emit_tick_info(
            TickKind::Cancel,
            false,
            info.side.is_ask(),
            record_idx,
            info.price,
            info.qty,
            id,
            0,
        );
        own.remove_liquidity(em, info.price, info.qty as i64, 1);
        orders.remove(&id);
    }

    /// The exchange cancelled the aggressive order itself (all opposing
    /// liquidity was the same participant's): roll the speculation back.
    fn cancel_aggressor_self_trade(&mut self, record_idx: u32, id: OrderId, info: OrderInfo) {
        let Mbo {
            bids,
            asks,
            emitter: em,
            orders,
            pending_cross,
            ..
        } = self;
        let (own, passive) = if pending_cross.aggressor_is_ask {
            (asks, bids)
        } else {
            (bids, asks)
        };

        let (vwap, vqty) = passive.pending_cross_vwap();
        em.emit_tick_info(
            TickKind::CrossSummary,
            true,
            info.side.is_ask(),
            record_idx,
            vwap,
            vqty as Qty,
            id,
            0,
        );

        let residual_on_level = info.qty as i64 - passive.pending_fill_qty();
        passive.uncross(em);

        if residual_on_level > 0 && pending_cross.residual_on_level {
            own.remove_liquidity(em, info.price, residual_on_level, 1);
        }

        em.emit_tick_info(
            TickKind::SelfTradeCancel,
            false,
            info.side.is_ask(),
            record_idx,
            info.price,
            info.qty,
            id,
            0,
        );
        em.emit_crossing_complete();
        passive.clear_cross_fills();
        pending_cross.clear();
        orders.remove(&id);

        #[cfg(debug_assertions)]
        self.debug_assert_converged();
    }

    /// The exchange retracted a passive order instead of trading it
    /// against the aggressor: hand its speculative consumption back and
    /// let the aggressor find alternate liquidity. Returns false when
    /// nothing of the order was speculatively consumed (plain cancel).
    fn cancel_passive_self_trade(&mut self, record_idx: u32, id: OrderId, info: OrderInfo) -> bool {
        let Mbo {
            bids,
            asks,
            emitter: em,
            orders,
            pending_cross,
            ..
        } = self;
        let (agg_own, passive) = if pending_cross.aggressor_is_ask {
            (asks, bids)
        } else {
            (bids, asks)
        };

        let consumed = (info.qty as i64).min(passive.pending_fill_qty());
        if consumed == 0 {
            return false;
        }

        let (vwap, vqty) = passive.pending_cross_vwap();
        em.emit_tick_info(
            TickKind::CrossSummary,
            true,
            info.side.is_ask(),
            record_idx,
            vwap,
            vqty as Qty,
            id,
            pending_cross.aggressor_id,
        );

        let remaining_visible = info.qty as i64 - consumed;
        passive.remove_liquidity(em, info.price, remaining_visible, 1);
        passive.unreserve_cross_fill(consumed);

        let re_consumed = passive.cross(em, pending_cross.aggressor_price, consumed);
        let re_residual = consumed - re_consumed;
        if re_residual > 0 {
            let count_delta = if pending_cross.residual_on_level { 0 } else { 1 };
            agg_own.add_liquidity(em, pending_cross.aggressor_price, re_residual, count_delta);
            pending_cross.residual_on_level = true;
        }

        em.emit_tick_info(
            TickKind::SelfTradeCancel,
            false,
            info.side.is_ask(),
            record_idx,
            info.price,
            info.qty,
            id,
            pending_cross.aggressor_id,
        );

        if passive.pending_fill_qty() == 0 {
            em.emit_crossing_complete();
            passive.clear_cross_fills();
            pending_cross.clear();
        }
        orders.remove(&id);
        true
    }

    pub fn trade(
        &mut self,
        record_idx: u32,
        bid_id: OrderId,
        ask_id: OrderId,
        price: Price,
        fill_qty: Qty,
    ) {
        let bid_info = self.lookup_trade_side(bid_id, Side::Bid);
        let ask_info = self.lookup_trade_side(ask_id, Side::Ask);
        if bid_info.is_none() && ask_info.is_none() && !self.pending_cross.active() {
            return;
        }

        // The side not resting on the book is the aggressor; when book
        // presence cannot decide, the most recent new/modify id does.
        let aggressor_is_ask = match (bid_info.is_some(), ask_info.is_some()) {
            (true, false) => true,
            (false, true) => false,
            _ => bid_id != self.last_order_id,
        };
        let aggressor_id = if aggressor_is_ask { ask_id } else { bid_id };
        let aggressor_in_book = if aggressor_is_ask {
            ask_info.is_some()
        } else {
            bid_info.is_some()
        };
        let kind = if aggressor_id == 0 {
            TickKind::IocTrade
        } else if !aggressor_in_book {
            TickKind::MarketTrade
        } else {
            TickKind::Trade
        };

        let Mbo {
            bids,
            asks,
            emitter: em,
            orders,
            pending_cross,
            ..
        } = self;
        em.emit_tick_info(
            kind,
            true,
            aggressor_is_ask,
            record_idx,
            price,
            fill_qty,
            bid_id,
            ask_id,
        );

        let pending_active = pending_cross.active();
        let passive_is_ask = if pending_active {
            !pending_cross.aggressor_is_ask
        } else {
            !aggressor_is_ask
        };

        let reconciled = {
            let passive = if passive_is_ask { &mut *asks } else { &mut *bids };
            passive.reconcile_cross_fill(fill_qty as i64)
        };
        let remaining = fill_qty as i64 - reconciled;
        if reconciled > 0 {
            // Zero-delta markers: both sides' affected level is 0 for a
            // reconciled crossing event.
            em.emit_update(Side::Bid, 0, 0, 0);
            em.emit_update(Side::Ask, 0, 0, 0);
        }

        for (id, info, side) in [(bid_id, bid_info, Side::Bid), (ask_id, ask_info, Side::Ask)] {
            let Some(info) = info else { continue };
            assert!(
                fill_qty <= info.qty,
                "trade overfills order {id}: fill {fill_qty} > resting {qty}",
                qty = info.qty
            );

            let fully = fill_qty == info.qty;
            let own = if side.is_ask() { &mut *asks } else { &mut *bids };
            if remaining > 0 {
                own.remove_liquidity(em, info.price, remaining, if fully { 1 } else { 0 });
            } else if fully {
                // Qty already left during speculation; settle the count.
                own.remove_liquidity(em, info.price, 0, 1);
            }

            if fully && pending_active && side.is_ask() == passive_is_ask {
                own.reconcile_cross_count(1);
            }

            if fully {
                orders.remove(&id);
            } else if let Some(resting) = orders.get_mut(&id) {
                resting.qty -= fill_qty;
            }
        }

        if pending_active {
            let passive = if passive_is_ask { &mut *asks } else { &mut *bids };
            if passive.pending_fill_qty() == 0 {
                passive.clear_cross_fills();
                em.emit_crossing_complete();
                pending_cross.clear();

                #[cfg(debug_assertions)]
                self.debug_assert_converged();
            }
        }
    }

    fn lookup_trade_side(&self, id: OrderId, side: Side) -> Option<OrderInfo> {
        if id == 0 {
            return None;
        }
        let info = self.orders.get(&id).copied()?;
        assert_eq!(
            info.side, side,
            "order {id} side disagrees with its trade slot"
        );
        Some(info)
    }

    /// Exchange view (order map) and strategy view (levels) must agree
    /// whenever no speculation is outstanding.
    #[cfg(debug_assertions)]
    fn debug_assert_converged(&self) {
        use std::collections::HashMap;

        let mut by_level: HashMap<(Side, Price), i64> = HashMap::new();
        for info in self.orders.values() {
            *by_level.entry((info.side, info.price)).or_default() += info.qty as i64;
        }
        for side in [Side::Bid, Side::Ask] {
            let levels = self.levels(side);
            for idx in 0..levels.num_levels() {
                let (price, qty, _) = levels.level_at(idx).unwrap();
                let mapped = by_level.remove(&(side, price)).unwrap_or(0);
                debug_assert_eq!(
                    qty, mapped,
                    "{side} level {price} diverged from the order map"
                );
            }
        }
        debug_assert!(
            by_level.is_empty(),
            "orders resting off-book: {by_level:?}"
        );
    }
}
