use criterion::{black_box, criterion_group, criterion_main, Criterion};
use muninn_core::data::wire::OutputRecord;
use muninn_core::engine::Runner;
use muninn_core::reconstruct::Reconstructor;
use muninn_core::testing::RandomWalkGen;
use muninn_core::transport::VecSink;

fn bench_chunk_application(c: &mut Criterion) {
    // Pre-publish a realistic chunk stream, then measure the receiver.
    let records = RandomWalkGen::new(1, 42).take(10_000);
    let mut runner = Runner::new();
    let mut sink = VecSink::new();
    for rec in &records {
        runner.process(rec, &mut sink);
    }
    let chunks = sink.chunks;

    c.bench_function("reconstruct/apply_10k_events", |b| {
        b.iter(|| {
            let mut recon = Reconstructor::new();
            let mut delivered = 0u64;
            let mut observer = |_: &OutputRecord| {
                delivered += 1;
                true
            };
            for chunk in &chunks {
                recon.on_chunk(black_box(chunk), &mut observer);
            }
            black_box(delivered)
        })
    });
}

criterion_group!(benches, bench_chunk_application);
criterion_main!(benches);
