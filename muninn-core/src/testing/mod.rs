//! Programmable input-stream generation for tests and benches.

pub mod gen;

pub use gen::{RandomWalkGen, StreamBuilder};
