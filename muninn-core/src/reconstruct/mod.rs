//! Receiver side: chunk streams back into observable 20-level books.

pub mod receiver;

pub use receiver::{BookState, Observer, Reconstructor};
