//! Zero-overhead core types shared by the publisher and the receiver.

pub mod types;

pub use types::{OrderInfo, Side, TickKind};
