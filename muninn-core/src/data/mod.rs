//! Wire formats, recorded-stream access, and reference validation.

pub mod constants;
pub mod feed;
pub mod validator;
pub mod wire;

pub use constants::{BOOK_DEPTH, DELTA_CHUNK_SIZE, INPUT_RECORD_SIZE, OUTPUT_RECORD_SIZE};
pub use feed::{write_input_records, FeedError, InputFeed, ReferenceFeed};
pub use validator::{compare, Divergence, ValidationConfig};
pub use wire::{
    BookLevel, Delta, DeltaChunk, DeltaIter, InputRecord, OutputRecord, TickInfo,
};
