//! Synthetic input streams for tests, benches, and fixture files
//!
//! Two generators:
//!
//! - `StreamBuilder`: hand-scripted event sequences with automatic
//!   record indexing, for scenario tests.
//! - `RandomWalkGen`: a seeded, statistically plausible N/M/X/T stream
//!   around a drifting mid price. Passive orders always rest on their
//!   own side of the mid and trades never overfill, so the stream is
//!   valid with or without the crossing path enabled.

use crate::core::types::{OrderId, Price, Qty, TickKind, Token};
use crate::data::wire::InputRecord;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Hand-scripted stream with automatic record indices.
pub struct StreamBuilder {
    token: Token,
    records: Vec<InputRecord>,
}

impl StreamBuilder {
    pub fn new(token: Token) -> Self {
        Self {
            token,
            records: Vec::new(),
        }
    }

    fn push(
        &mut self,
        kind: TickKind,
        is_ask: bool,
        id: OrderId,
        id2: OrderId,
        price: Price,
        qty: Qty,
    ) -> &mut Self {
        let idx = self.records.len() as u32;
        self.records
            .push(InputRecord::new(idx, self.token, kind, is_ask, id, id2, price, qty));
        self
    }

    pub fn new_order(&mut self, id: OrderId, is_ask: bool, price: Price, qty: Qty) -> &mut Self {
        self.push(TickKind::New, is_ask, id, 0, price, qty)
    }

    pub fn modify(&mut self, id: OrderId, is_ask: bool, price: Price, qty: Qty) -> &mut Self {
        self.push(TickKind::Modify, is_ask, id, 0, price, qty)
    }

    pub fn cancel(&mut self, id: OrderId) -> &mut Self {
        self.push(TickKind::Cancel, false, id, 0, 0, 0)
    }

    pub fn trade(&mut self, bid_id: OrderId, ask_id: OrderId, price: Price, qty: Qty) -> &mut Self {
        self.push(TickKind::Trade, false, bid_id, ask_id, price, qty)
    }

    pub fn build(&mut self) -> Vec<InputRecord> {
        std::mem::take(&mut self.records)
    }
}

#[derive(Debug, Clone, Copy)]
struct LiveOrder {
    id: OrderId,
    is_ask: bool,
    price: Price,
    qty: Qty,
}

/// Seeded random N/M/X/T stream generator.
pub struct RandomWalkGen {
    rng: StdRng,
    token: Token,
    mid: Price,
    next_id: OrderId,
    next_idx: u32,
    live: Vec<LiveOrder>,
}

impl RandomWalkGen {
    pub fn new(token: Token, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            token,
            mid: 10_000,
            next_id: 1,
            next_idx: 0,
            live: Vec::new(),
        }
    }

    fn record(
        &mut self,
        kind: TickKind,
        is_ask: bool,
        id: OrderId,
        id2: OrderId,
        price: Price,
        qty: Qty,
    ) -> InputRecord {
        let rec = InputRecord::new(self.next_idx, self.token, kind, is_ask, id, id2, price, qty);
        self.next_idx += 1;
        rec
    }

    /// A resting price that can never cross the live book, drift or not.
    fn passive_price(&mut self, is_ask: bool) -> Price {
        let offset = self.rng.gen_range(1..40);
        if is_ask {
            let floor = self
                .live
                .iter()
                .filter(|o| !o.is_ask)
                .map(|o| o.price)
                .max()
                .unwrap_or(i64::MIN);
            (self.mid + offset).max(floor + 1)
        } else {
            let ceiling = self
                .live
                .iter()
                .filter(|o| o.is_ask)
                .map(|o| o.price)
                .min()
                .unwrap_or(i64::MAX);
            (self.mid - offset).min(ceiling - 1)
        }
    }

    /// Next event in the stream.
    pub fn next_record(&mut self) -> InputRecord {
        // Occasional mid drift keeps the book moving through price space.
        if self.rng.gen_ratio(1, 64) {
            self.mid += self.rng.gen_range(-5i64..=5);
        }

        let roll: u32 = self.rng.gen_range(0..100);
        match roll {
            // New passive order.
            0..=49 => {
                let is_ask = self.rng.gen_bool(0.5);
                let price = self.passive_price(is_ask);
                let qty = self.rng.gen_range(1..200);
                let id = self.next_id;
                self.next_id += 1;
                self.live.push(LiveOrder {
                    id,
                    is_ask,
                    price,
                    qty,
                });
                self.record(TickKind::New, is_ask, id, 0, price, qty)
            }
            // Modify a live order (price and/or qty).
            50..=69 if !self.live.is_empty() => {
                let slot = self.rng.gen_range(0..self.live.len());
                let order = self.live[slot];
                let price = self.passive_price(order.is_ask);
                let qty = self.rng.gen_range(1..200);
                self.live[slot].price = price;
                self.live[slot].qty = qty;
                self.record(TickKind::Modify, order.is_ask, order.id, 0, price, qty)
            }
            // Cancel a live order.
            70..=84 if !self.live.is_empty() => {
                let slot = self.rng.gen_range(0..self.live.len());
                let order = self.live.swap_remove(slot);
                self.record(TickKind::Cancel, order.is_ask, order.id, 0, 0, 0)
            }
            // IOC trade against a live order.
            85..=99 if !self.live.is_empty() => {
                let slot = self.rng.gen_range(0..self.live.len());
                let order = self.live[slot];
                let fill = self.rng.gen_range(1..=order.qty);
                if fill == order.qty {
                    self.live.swap_remove(slot);
                } else {
                    self.live[slot].qty -= fill;
                }
                let (bid_id, ask_id) = if order.is_ask { (0, order.id) } else { (order.id, 0) };
                self.record(TickKind::Trade, order.is_ask, bid_id, ask_id, order.price, fill)
            }
            // Book still empty: fall back to a new order.
            _ => {
                let is_ask = self.rng.gen_bool(0.5);
                let price = self.passive_price(is_ask);
                let qty = self.rng.gen_range(1..200);
                let id = self.next_id;
                self.next_id += 1;
                self.live.push(LiveOrder {
                    id,
                    is_ask,
                    price,
                    qty,
                });
                self.record(TickKind::New, is_ask, id, 0, price, qty)
            }
        }
    }

    pub fn take(&mut self, count: usize) -> Vec<InputRecord> {
        (0..count).map(|_| self.next_record()).collect()
    }
}
