//! Fixture Generator
//!
//! Writes a synthetic recorded input stream for replay testing and
//! benchmarking. The stream is seeded and fully deterministic.
//!
//! ## Usage
//!
//! ```bash
//! muninn-gen-input --output input.bin --events 100000 --seed 42
//! muninn-gen-input --output input.bin --events 50000 --tokens 8
//! ```

use anyhow::Result;
use clap::Parser;
use muninn_bins::common::CommonArgs;
use muninn_core::data::write_input_records;
use muninn_core::testing::RandomWalkGen;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "muninn-gen-input")]
#[command(about = "Generate a synthetic recorded MBO input stream")]
struct Args {
    /// Output file path
    #[arg(short, long)]
    output: std::path::PathBuf,

    /// Number of events to generate
    #[arg(short, long, default_value = "100000")]
    events: usize,

    /// Number of instruments to interleave
    #[arg(short, long, default_value = "1")]
    tokens: u32,

    /// RNG seed
    #[arg(short, long, default_value = "42")]
    seed: u64,

    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> Result<()> {
    let args = Args::parse();
    args.common.bootstrap()?;

    let mut gens: Vec<RandomWalkGen> = (0..args.tokens)
        .map(|t| RandomWalkGen::new(t + 1, args.seed.wrapping_add(t as u64)))
        .collect();

    // Round-robin across instruments; record indices are rewritten to
    // be globally sequential.
    let mut records = Vec::with_capacity(args.events);
    for i in 0..args.events {
        let n = gens.len();
        let gen = &mut gens[i % n];
        let mut rec = gen.next_record();
        rec.record_idx = i as u32;
        records.push(rec);
    }

    write_input_records(&args.output, &records)?;
    info!(
        "Wrote {} events for {} instrument(s) to {}",
        records.len(),
        args.tokens,
        args.output.display()
    );
    Ok(())
}
