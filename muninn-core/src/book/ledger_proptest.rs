//! Property tests for the crossing ledger and level container.

use crate::book::emitter::DeltaEmitter;
use crate::book::levels::PriceLevels;
use crate::core::types::{Side, TickKind};
use proptest::prelude::*;

fn emitter() -> DeltaEmitter {
    let mut em = DeltaEmitter::new(1);
    em.emit_tick_info(TickKind::New, true, false, 0, 0, 0, 0, 0);
    em
}

/// Distinct (price, qty, count) level seeds, best-first irrelevant.
fn level_seeds() -> impl Strategy<Value = Vec<(i64, i64, i32)>> {
    proptest::collection::btree_map(1i64..500, (1i64..1_000, 1i32..5), 1..30)
        .prop_map(|m| m.into_iter().map(|(p, (q, c))| (p, q, c)).collect())
}

proptest! {
    /// Levels come out best-first regardless of insertion order.
    #[test]
    fn prop_levels_sorted_best_first(seeds in level_seeds(), is_ask in any::<bool>()) {
        let side = Side::from_is_ask(is_ask);
        let mut em = emitter();
        let mut pl = PriceLevels::new(side);
        for &(p, q, c) in &seeds {
            pl.add_liquidity(&mut em, p, q, c);
        }

        let prices: Vec<i64> = (0..pl.num_levels())
            .map(|i| pl.level_at(i).unwrap().0)
            .collect();
        for w in prices.windows(2) {
            if is_ask {
                prop_assert!(w[0] < w[1]);
            } else {
                prop_assert!(w[0] > w[1]);
            }
        }
        prop_assert_eq!(pl.num_levels(), seeds.len());
    }

    /// cross() then a full uncross() restores the container exactly.
    #[test]
    fn prop_cross_uncross_round_trips(
        seeds in level_seeds(),
        aggressor_price in 1i64..500,
        aggressor_qty in 1i64..5_000,
    ) {
        let mut em = emitter();
        let mut pl = PriceLevels::new(Side::Ask);
        for &(p, q, c) in &seeds {
            pl.add_liquidity(&mut em, p, q, c);
        }
        let before: Vec<_> = (0..pl.num_levels()).map(|i| pl.level_at(i).unwrap()).collect();

        pl.cross(&mut em, aggressor_price, aggressor_qty);
        pl.uncross(&mut em);

        let after: Vec<_> = (0..pl.num_levels()).map(|i| pl.level_at(i).unwrap()).collect();
        prop_assert_eq!(before, after);
        prop_assert_eq!(pl.pending_fill_qty(), 0);
        prop_assert_eq!(pl.pending_fill_count(), 0);
    }

    /// Consumed qty never exceeds demand, and the pending total always
    /// matches what was consumed before any reconciliation.
    #[test]
    fn prop_cross_consumes_at_most_demand(
        seeds in level_seeds(),
        aggressor_price in 1i64..500,
        aggressor_qty in 1i64..5_000,
    ) {
        let mut em = emitter();
        let mut pl = PriceLevels::new(Side::Ask);
        let mut crossable = 0i64;
        for &(p, q, c) in &seeds {
            pl.add_liquidity(&mut em, p, q, c);
            if p <= aggressor_price {
                crossable += q;
            }
        }

        let consumed = pl.cross(&mut em, aggressor_price, aggressor_qty);
        prop_assert!(consumed <= aggressor_qty);
        prop_assert_eq!(consumed, aggressor_qty.min(crossable));
        prop_assert_eq!(pl.pending_fill_qty(), consumed);
    }

    /// Reconciling exactly the pending qty drains the ledger; partial
    /// reconciliation leaves the difference pending.
    #[test]
    fn prop_reconcile_drains_pending(
        seeds in level_seeds(),
        aggressor_qty in 1i64..5_000,
        split in 0u8..=100,
    ) {
        let mut em = emitter();
        let mut pl = PriceLevels::new(Side::Ask);
        for &(p, q, c) in &seeds {
            pl.add_liquidity(&mut em, p, q, c);
        }

        let consumed = pl.cross(&mut em, 500, aggressor_qty);
        let first = consumed * split as i64 / 100;

        prop_assert_eq!(pl.reconcile_cross_fill(first), first);
        prop_assert_eq!(pl.pending_fill_qty(), consumed - first);
        prop_assert_eq!(pl.reconcile_cross_fill(consumed), consumed - first);
        prop_assert_eq!(pl.pending_fill_qty(), 0);
    }
}
