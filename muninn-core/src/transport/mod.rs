//! Chunk transport abstraction
//!
//! The engine produces byte-exact 64-byte chunks; something else moves
//! them. `ChunkSink` is that seam. Two implementations live here:
//!
//! - `VecSink`: in-process capture, used by the single-threaded replay
//!   path and by tests.
//! - `ChunkRing`: a fixed-capacity single-producer single-consumer ring
//!   for the sharded replay mode, one ring per shard. Head and tail
//!   live on their own cache lines to avoid false sharing between the
//!   publisher and reconstructor cores.
//!
//! The transport contract is strict FIFO with no loss; a full ring is
//! back-pressure the producer must spin on (the publisher never blocks
//! on anything else).

use crate::data::wire::DeltaChunk;
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Consumer of an in-order chunk stream.
pub trait ChunkSink {
    fn push(&mut self, chunk: &DeltaChunk);
}

/// Closures work as sinks for inline wiring.
impl<F: FnMut(&DeltaChunk)> ChunkSink for F {
    #[inline(always)]
    fn push(&mut self, chunk: &DeltaChunk) {
        self(chunk)
    }
}

/// In-process capture sink.
#[derive(Default)]
pub struct VecSink {
    pub chunks: Vec<DeltaChunk>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChunkSink for VecSink {
    #[inline]
    fn push(&mut self, chunk: &DeltaChunk) {
        self.chunks.push(*chunk);
    }
}

struct RingShared {
    buf: Box<[UnsafeCell<DeltaChunk>]>,
    mask: usize,
    head: CachePadded<AtomicUsize>,
    tail: CachePadded<AtomicUsize>,
}

// One producer and one consumer, each touching disjoint slots guarded
// by the head/tail indices.
unsafe impl Send for RingShared {}
unsafe impl Sync for RingShared {}

/// Producer half of a SPSC chunk ring.
pub struct RingProducer {
    shared: Arc<RingShared>,
}

/// Consumer half of a SPSC chunk ring.
pub struct RingConsumer {
    shared: Arc<RingShared>,
}

/// Create a SPSC ring holding at least `capacity` chunks (rounded up to
/// a power of two).
pub fn chunk_ring(capacity: usize) -> (RingProducer, RingConsumer) {
    let cap = capacity.next_power_of_two().max(2);
    let buf: Vec<UnsafeCell<DeltaChunk>> = (0..cap)
        .map(|_| UnsafeCell::new(DeltaChunk::new(0)))
        .collect();
    let shared = Arc::new(RingShared {
        buf: buf.into_boxed_slice(),
        mask: cap - 1,
        head: CachePadded::new(AtomicUsize::new(0)),
        tail: CachePadded::new(AtomicUsize::new(0)),
    });
    (
        RingProducer {
            shared: Arc::clone(&shared),
        },
        RingConsumer { shared },
    )
}

impl RingProducer {
    /// Non-blocking push; false means the ring is full.
    #[inline]
    pub fn try_push(&mut self, chunk: &DeltaChunk) -> bool {
        let shared = &*self.shared;
        let head = shared.head.load(Ordering::Relaxed);
        let tail = shared.tail.load(Ordering::Acquire);
        if head - tail > shared.mask {
            return false;
        }
        unsafe {
            *shared.buf[head & shared.mask].get() = *chunk;
        }
        shared.head.store(head + 1, Ordering::Release);
        true
    }

    /// Spin until the consumer makes room. The replay publisher has no
    /// other blocking point; a stalled consumer stalls the replay.
    #[inline]
    pub fn push(&mut self, chunk: &DeltaChunk) {
        while !self.try_push(chunk) {
            std::hint::spin_loop();
        }
    }
}

impl ChunkSink for RingProducer {
    #[inline]
    fn push(&mut self, chunk: &DeltaChunk) {
        RingProducer::push(self, chunk);
    }
}

impl RingConsumer {
    /// Non-blocking pop.
    #[inline]
    pub fn try_pop(&mut self) -> Option<DeltaChunk> {
        let shared = &*self.shared;
        let tail = shared.tail.load(Ordering::Relaxed);
        let head = shared.head.load(Ordering::Acquire);
        if tail == head {
            return None;
        }
        let chunk = unsafe { *shared.buf[tail & shared.mask].get() };
        shared.tail.store(tail + 1, Ordering::Release);
        Some(chunk)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        let shared = &*self.shared;
        shared.tail.load(Ordering::Relaxed) == shared.head.load(Ordering::Acquire)
    }
}
