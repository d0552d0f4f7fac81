//! Replay Harness
//!
//! Feeds a recorded input stream through the book engine, pipes the
//! emitted chunks into the reconstructor, and either validates every
//! delivered snapshot against a recorded reference output or reports
//! throughput/latency statistics.
//!
//! ## Usage
//!
//! ```bash
//! # Validate against a reference recording (exit 1 on divergence)
//! muninn-replay input.bin reference.bin --crossing
//!
//! # Throughput run with the hot thread pinned
//! muninn-replay input.bin --crossing --cpu-core 2
//!
//! # Sharded throughput run (one publisher thread per shard)
//! muninn-replay input.bin --shard-threads 4
//!
//! # Dump every reconstructed snapshot
//! muninn-replay input.bin --dump
//! ```

use anyhow::{bail, Result};
use clap::Parser;
use muninn_bins::common::{print_stats, CommonArgs};
use muninn_core::data::validator::{compare, ValidationConfig};
use muninn_core::data::wire::{InputRecord, OutputRecord};
use muninn_core::data::{InputFeed, ReferenceFeed};
use muninn_core::perf::LatencyRecorder;
use muninn_core::reconstruct::Reconstructor;
use muninn_core::transport::{chunk_ring, VecSink};
use muninn_core::{set_crossing_enabled, Runner};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{error, info};

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "muninn-replay")]
#[command(about = "Replay a recorded MBO stream and rebuild the 20-level book")]
struct Args {
    /// Recorded input stream (40-byte records)
    input: std::path::PathBuf,

    /// Reference output recording to validate against (708-byte records)
    reference: Option<std::path::PathBuf>,

    /// Enable the speculative crossing path
    #[arg(long)]
    crossing: bool,

    /// Print every reconstructed snapshot
    #[arg(long)]
    dump: bool,

    /// Require exact affected-level and tick-kind matches
    #[arg(long)]
    strict: bool,

    /// Publisher threads for a sharded throughput run (no validation)
    #[arg(long, default_value = "1")]
    shard_threads: usize,

    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> Result<()> {
    let args = Args::parse();
    args.common.bootstrap()?;
    set_crossing_enabled(args.crossing);

    let input = InputFeed::open(&args.input)?;
    info!(
        "Mapped {} input records from {}",
        input.len(),
        args.input.display()
    );

    let matched = if let Some(reference_path) = &args.reference {
        if args.shard_threads > 1 {
            bail!("validation requires the single-threaded replay path");
        }
        let reference = ReferenceFeed::open(reference_path)?;
        info!(
            "Validating against {} reference records from {}",
            reference.len(),
            reference_path.display()
        );
        validate(input.records(), reference.records(), &args)?
    } else if args.shard_threads > 1 {
        replay_sharded(input.records(), args.shard_threads)?;
        true
    } else {
        replay(input.records(), args.dump)?;
        true
    };

    if !matched {
        std::process::exit(1);
    }
    Ok(())
}

fn dump_record(rec: &OutputRecord) {
    let (bids, asks) = (rec.levels(muninn_core::Side::Bid), rec.levels(muninn_core::Side::Ask));
    let record_idx = rec.record_idx;
    let price = rec.event.price;
    let qty = rec.event.qty;
    let ltp = rec.ltp;
    println!(
        "#{idx} {tick} {side} px={px} qty={qty} ltp={ltp} aff={ba}/{aa} \
         bid0={bp}x{bq}({bc}) ask0={ap}x{aq}({ac})",
        idx = record_idx,
        tick = rec.event.tick_type as char,
        side = if rec.is_ask != 0 { "ASK" } else { "BID" },
        px = price,
        qty = qty,
        ltp = ltp,
        ba = rec.bid_affected_lvl,
        aa = rec.ask_affected_lvl,
        bp = bids[0].price,
        bq = bids[0].qty,
        bc = bids[0].num_orders,
        ap = asks[0].price,
        aq = asks[0].qty,
        ac = asks[0].num_orders,
    );
}

/// Single-threaded replay with latency reporting.
fn replay(records: &[InputRecord], dump: bool) -> Result<()> {
    let mut runner = Runner::new();
    let mut recon = Reconstructor::new();
    let mut sink = VecSink::new();
    let mut latency = LatencyRecorder::with_capacity(records.len());
    let mut delivered = 0u64;

    let started = Instant::now();
    for rec in records {
        let event_start = Instant::now();

        sink.chunks.clear();
        runner.process(rec, &mut sink);
        let mut observer = |snapshot: &OutputRecord| {
            delivered += 1;
            if dump {
                dump_record(snapshot);
            }
            true
        };
        for chunk in &sink.chunks {
            recon.on_chunk(chunk, &mut observer);
        }

        latency.record(event_start.elapsed().as_nanos() as u64);
    }
    let elapsed = started.elapsed();

    print_stats(runner.stats());
    info!("Snapshots delivered: {delivered}");
    info!(
        "Replayed {} events in {:.3}s ({:.0} events/s)",
        records.len(),
        elapsed.as_secs_f64(),
        records.len() as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    info!(
        "Event latency ns: p50={} p99={} p99.9={} max={}",
        latency.percentile(50.0),
        latency.percentile(99.0),
        latency.percentile(99.9),
        latency.max()
    );
    Ok(())
}

/// Sharded throughput replay: instruments are partitioned across
/// publisher threads, each feeding its own SPSC ring; this thread
/// drains all rings into one reconstructor.
fn replay_sharded(records: &[InputRecord], shards: usize) -> Result<()> {
    let done = AtomicUsize::new(0);
    let started = Instant::now();
    let mut delivered = 0u64;

    std::thread::scope(|scope| {
        let mut consumers = Vec::with_capacity(shards);
        for shard in 0..shards {
            let (mut tx, rx) = chunk_ring(4096);
            consumers.push(rx);

            let shard_records: Vec<InputRecord> = records
                .iter()
                .filter(|r| r.token as usize % shards == shard)
                .copied()
                .collect();
            let done = &done;
            scope.spawn(move || {
                let mut runner = Runner::new();
                for rec in &shard_records {
                    runner.process(rec, &mut tx);
                }
                done.fetch_add(1, Ordering::Release);
            });
        }

        let mut recon = Reconstructor::new();
        let mut observer = |_: &OutputRecord| {
            delivered += 1;
            true
        };
        loop {
            let mut idle = true;
            for rx in &mut consumers {
                while let Some(chunk) = rx.try_pop() {
                    recon.on_chunk(&chunk, &mut observer);
                    idle = false;
                }
            }
            if idle && done.load(Ordering::Acquire) == shards {
                let drained = consumers.iter().all(|rx| rx.is_empty());
                if drained {
                    break;
                }
            }
            std::hint::spin_loop();
        }
    });

    let elapsed = started.elapsed();
    info!(
        "Sharded replay: {} events over {} shards in {:.3}s, {} snapshots",
        records.len(),
        shards,
        elapsed.as_secs_f64(),
        delivered
    );
    Ok(())
}

/// Validation replay: every delivered snapshot is compared against the
/// next reference record; the first divergence fails the run.
fn validate(
    records: &[InputRecord],
    reference: &[OutputRecord],
    args: &Args,
) -> Result<bool> {
    let config = ValidationConfig {
        strict_affected_levels: args.strict,
        strict_tick_kinds: args.strict,
    };

    let mut runner = Runner::new();
    let mut recon = Reconstructor::new();
    let mut sink = VecSink::new();

    let mut cursor = 0usize;
    let mut failed = false;

    for rec in records {
        sink.chunks.clear();
        runner.process(rec, &mut sink);

        let mut observer = |snapshot: &OutputRecord| {
            if args.dump {
                dump_record(snapshot);
            }
            let Some(expected) = reference.get(cursor) else {
                error!(
                    "Reconstructed more snapshots than the reference holds ({})",
                    reference.len()
                );
                failed = true;
                return false;
            };
            if let Err(divergence) = compare(snapshot, expected, &config) {
                error!("Divergence at reference record {cursor}: {divergence}");
                failed = true;
                return false;
            }
            cursor += 1;
            true
        };
        for chunk in &sink.chunks {
            if !recon.on_chunk(chunk, &mut observer) {
                break;
            }
        }
        if failed {
            break;
        }
    }

    if !failed && cursor != reference.len() {
        error!(
            "Reference holds {} records but only {} were reconstructed",
            reference.len(),
            cursor
        );
        failed = true;
    }

    if failed {
        Ok(false)
    } else {
        info!("All {cursor} reconstructed snapshots match the reference");
        Ok(true)
    }
}
