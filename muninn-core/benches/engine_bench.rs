use criterion::{black_box, criterion_group, criterion_main, Criterion};
use muninn_core::engine::Runner;
use muninn_core::testing::RandomWalkGen;
use muninn_core::transport::VecSink;

fn bench_event_processing(c: &mut Criterion) {
    let records = RandomWalkGen::new(1, 42).take(10_000);

    c.bench_function("engine/replay_10k_events", |b| {
        b.iter(|| {
            let mut runner = Runner::new();
            let mut sink = VecSink::new();
            for rec in &records {
                runner.process(black_box(rec), &mut sink);
            }
            black_box(sink.chunks.len())
        })
    });
}

fn bench_single_instrument_churn(c: &mut Criterion) {
    // Steady-state: one engine, warm book, measure per-event cost.
    let warmup = RandomWalkGen::new(1, 7).take(1_000);
    let records = RandomWalkGen::new(1, 7).take(50_000);

    c.bench_function("engine/steady_state_event", |b| {
        let mut runner = Runner::new();
        let mut sink = VecSink::new();
        for rec in &warmup {
            runner.process(rec, &mut sink);
        }

        let mut cursor = 0;
        b.iter(|| {
            sink.chunks.clear();
            let rec = &records[cursor % records.len()];
            cursor += 1;
            runner.process(black_box(rec), &mut sink);
            black_box(sink.chunks.len())
        })
    });
}

criterion_group!(benches, bench_event_processing, bench_single_instrument_churn);
criterion_main!(benches);
