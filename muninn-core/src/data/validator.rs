//! Reconstructed-vs-reference record comparison
//!
//! The harness validates a replay by comparing every snapshot the
//! reconstructor delivers against the recorded reference output. Most
//! fields must match exactly; two tolerances exist:
//!
//! - On modifies the reconstructor tracks the topmost affected level,
//!   which is sometimes more precise (shallower) than the reference.
//! - The publisher's crossed tick kinds ('A'/'B') stand in for the
//!   reference's plain 'N'/'M' when the reconstructor delivers an
//!   unexpanded aggressor tick.

use crate::core::types::{Side, TickKind};
use crate::data::constants::BOOK_DEPTH;
use crate::data::wire::OutputRecord;

/// Comparison rules for a validation run.
#[derive(Debug, Clone, Copy)]
pub struct ValidationConfig {
    /// Require affected levels to match exactly, even on modifies.
    pub strict_affected_levels: bool,
    /// Require tick kinds to match exactly ('A' vs 'N' etc. diverge).
    pub strict_tick_kinds: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            strict_affected_levels: false,
            strict_tick_kinds: false,
        }
    }
}

/// First difference between a reconstructed record and the reference.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Divergence {
    #[error("record {record_idx}: tick type '{actual}' != reference '{expected}'")]
    TickType {
        record_idx: u32,
        expected: char,
        actual: char,
    },

    #[error("record {record_idx}: side flag {actual} != reference {expected}")]
    SideFlag {
        record_idx: u32,
        expected: u8,
        actual: u8,
    },

    #[error("record {record_idx}: ltp {actual} != reference {expected}")]
    Ltp {
        record_idx: u32,
        expected: i64,
        actual: i64,
    },

    #[error("record {record_idx}: ltq {actual} != reference {expected}")]
    Ltq {
        record_idx: u32,
        expected: i32,
        actual: i32,
    },

    #[error("record {record_idx}: {side} affected level {actual} != reference {expected}")]
    AffectedLevel {
        record_idx: u32,
        side: Side,
        expected: i8,
        actual: i8,
    },

    #[error("record {record_idx}: {side} filled levels {actual} != reference {expected}")]
    FilledLevels {
        record_idx: u32,
        side: Side,
        expected: i8,
        actual: i8,
    },

    #[error(
        "record {record_idx}: {side}[{slot}] = {actual_price}x{actual_qty}({actual_count}) \
         != reference {price}x{qty}({count})"
    )]
    Level {
        record_idx: u32,
        side: Side,
        slot: usize,
        price: i64,
        qty: i32,
        count: i32,
        actual_price: i64,
        actual_qty: i32,
        actual_count: i32,
    },
}

/// Tick kinds that are equivalent under the non-strict comparison: the
/// publisher's crossed kinds versus the reference's resting kinds.
fn kinds_equivalent(actual: u8, expected: u8) -> bool {
    matches!(
        (actual, expected),
        (b'A', b'N') | (b'N', b'A') | (b'B', b'M') | (b'M', b'B')
    )
}

/// Compare one reconstructed record against its reference counterpart.
pub fn compare(
    actual: &OutputRecord,
    reference: &OutputRecord,
    config: &ValidationConfig,
) -> Result<(), Divergence> {
    let record_idx = reference.record_idx;

    let actual_kind = actual.event.tick_type;
    let expected_kind = reference.event.tick_type;
    if actual_kind != expected_kind
        && (config.strict_tick_kinds || !kinds_equivalent(actual_kind, expected_kind))
    {
        return Err(Divergence::TickType {
            record_idx,
            expected: expected_kind as char,
            actual: actual_kind as char,
        });
    }

    if actual.is_ask != reference.is_ask {
        return Err(Divergence::SideFlag {
            record_idx,
            expected: reference.is_ask,
            actual: actual.is_ask,
        });
    }

    let (actual_ltp, expected_ltp) = (actual.ltp, reference.ltp);
    if actual_ltp != expected_ltp {
        return Err(Divergence::Ltp {
            record_idx,
            expected: expected_ltp,
            actual: actual_ltp,
        });
    }
    let (actual_ltq, expected_ltq) = (actual.ltq, reference.ltq);
    if actual_ltq != expected_ltq {
        return Err(Divergence::Ltq {
            record_idx,
            expected: expected_ltq,
            actual: actual_ltq,
        });
    }

    // A modify's affected level may legitimately be shallower than the
    // reference reports; everything else matches exactly.
    let is_modify = matches!(
        TickKind::from_byte(expected_kind),
        Some(TickKind::Modify | TickKind::ModifyCrossed)
    );
    let lenient = is_modify && !config.strict_affected_levels;

    for (side, actual_lvl, expected_lvl) in [
        (Side::Bid, actual.bid_affected_lvl, reference.bid_affected_lvl),
        (Side::Ask, actual.ask_affected_lvl, reference.ask_affected_lvl),
    ] {
        let ok = if lenient {
            actual_lvl <= expected_lvl
        } else {
            actual_lvl == expected_lvl
        };
        if !ok {
            return Err(Divergence::AffectedLevel {
                record_idx,
                side,
                expected: expected_lvl,
                actual: actual_lvl,
            });
        }
    }

    for (side, actual_filled, expected_filled) in [
        (Side::Bid, actual.bid_filled_lvls, reference.bid_filled_lvls),
        (Side::Ask, actual.ask_filled_lvls, reference.ask_filled_lvls),
    ] {
        if actual_filled != expected_filled {
            return Err(Divergence::FilledLevels {
                record_idx,
                side,
                expected: expected_filled,
                actual: actual_filled,
            });
        }
    }

    for side in [Side::Bid, Side::Ask] {
        let ours = actual.levels(side);
        let theirs = reference.levels(side);
        for slot in 0..BOOK_DEPTH {
            if ours[slot] != theirs[slot] {
                return Err(Divergence::Level {
                    record_idx,
                    side,
                    slot,
                    price: theirs[slot].price,
                    qty: theirs[slot].qty,
                    count: theirs[slot].num_orders,
                    actual_price: ours[slot].price,
                    actual_qty: ours[slot].qty,
                    actual_count: ours[slot].num_orders,
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::wire::BookLevel;

    fn record_with_level(price: i64, qty: i32, count: i32) -> OutputRecord {
        let mut rec = OutputRecord::zeroed();
        rec.event.tick_type = b'N';
        rec.bids[0] = BookLevel {
            price,
            qty,
            num_orders: count,
        };
        rec.bid_filled_lvls = 1;
        rec.bid_affected_lvl = 0;
        rec.ask_affected_lvl = BOOK_DEPTH as i8;
        rec
    }

    #[test]
    fn test_identical_records_match() {
        let a = record_with_level(100, 50, 1);
        let b = record_with_level(100, 50, 1);
        assert!(compare(&a, &b, &ValidationConfig::default()).is_ok());
    }

    #[test]
    fn test_level_mismatch_reported() {
        let a = record_with_level(100, 50, 1);
        let b = record_with_level(100, 40, 1);
        match compare(&a, &b, &ValidationConfig::default()) {
            Err(Divergence::Level { slot: 0, .. }) => {}
            other => panic!("expected level divergence, got {other:?}"),
        }
    }

    #[test]
    fn test_modify_affected_level_leniency() {
        let mut a = record_with_level(100, 50, 1);
        let mut b = record_with_level(100, 50, 1);
        a.event.tick_type = b'M';
        b.event.tick_type = b'M';
        a.bid_affected_lvl = 0;
        b.bid_affected_lvl = 2; // reference reports deeper

        assert!(compare(&a, &b, &ValidationConfig::default()).is_ok());

        let strict = ValidationConfig {
            strict_affected_levels: true,
            ..Default::default()
        };
        assert!(compare(&a, &b, &strict).is_err());
    }

    #[test]
    fn test_crossed_kind_equivalence() {
        let mut a = record_with_level(100, 50, 1);
        let mut b = record_with_level(100, 50, 1);
        a.event.tick_type = b'A';
        b.event.tick_type = b'N';
        assert!(compare(&a, &b, &ValidationConfig::default()).is_ok());

        let strict = ValidationConfig {
            strict_tick_kinds: true,
            ..Default::default()
        };
        assert!(compare(&a, &b, &strict).is_err());
    }
}
