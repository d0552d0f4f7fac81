//! Book Snapshot Printer
//!
//! Replays a recorded input stream and prints the final reconstructed
//! 20-level book for one instrument. Useful for eyeballing recordings
//! and for CI pipelines.
//!
//! ## Usage
//!
//! ```bash
//! # Pretty-print the top 5 levels
//! print-book input.bin --token 1
//!
//! # Deeper view, machine-readable
//! print-book input.bin --token 1 --levels 10 --format json
//! ```

use anyhow::{bail, Result};
use clap::Parser;
use muninn_core::data::wire::{BookLevel, OutputRecord};
use muninn_core::data::InputFeed;
use muninn_core::reconstruct::Reconstructor;
use muninn_core::transport::VecSink;
use muninn_core::{set_crossing_enabled, Runner};
use serde_json::json;

#[derive(Parser)]
#[command(name = "print-book")]
#[command(about = "Replay a recording and print the final book", long_about = None)]
struct Args {
    /// Recorded input stream
    input: std::path::PathBuf,

    /// Instrument token to display
    #[arg(short, long, default_value = "1")]
    token: u32,

    /// Number of levels to display
    #[arg(short, long, default_value = "5")]
    levels: usize,

    /// Enable the speculative crossing path during replay
    #[arg(long)]
    crossing: bool,

    /// Output format (pretty, compact, json)
    #[arg(short, long, default_value = "pretty")]
    format: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    set_crossing_enabled(args.crossing);

    let feed = InputFeed::open(&args.input)?;
    let mut runner = Runner::new();
    let mut recon = Reconstructor::new();
    let mut sink = VecSink::new();
    let mut observer = |_: &OutputRecord| true;

    for rec in feed.records() {
        sink.chunks.clear();
        runner.process(rec, &mut sink);
        for chunk in &sink.chunks {
            recon.on_chunk(chunk, &mut observer);
        }
    }

    let Some(book) = recon.book(args.token) else {
        bail!("no events for token {} in {}", args.token, args.input.display());
    };
    let bids = *book.bids();
    let asks = *book.asks();
    let (ltp, ltq) = book.last_trade();

    match args.format.as_str() {
        "json" => print_json(args.token, &bids, &asks, ltp, ltq, args.levels),
        "compact" => print_compact(args.token, &bids, &asks, args.levels),
        _ => print_pretty(args.token, &bids, &asks, ltp, ltq, args.levels),
    }

    Ok(())
}

fn filled(levels: &[BookLevel]) -> usize {
    levels.iter().take_while(|l| !l.is_empty()).count()
}

fn print_pretty(token: u32, bids: &[BookLevel], asks: &[BookLevel], ltp: i64, ltq: i32, max: usize) {
    println!();
    println!("=== Book for token {token} ({}x{} levels) ===", filled(bids), filled(asks));
    println!();

    println!("        ASK PRICE        QTY  ORDERS");
    for level in asks.iter().take(max).filter(|l| !l.is_empty()).rev() {
        println!(
            "    {:>13}  {:>9}  {:>6}",
            level.price, level.qty, level.num_orders
        );
    }

    println!("    -----------------------------  last trade {ltq} @ {ltp}");

    println!("        BID PRICE        QTY  ORDERS");
    for level in bids.iter().take(max).filter(|l| !l.is_empty()) {
        println!(
            "    {:>13}  {:>9}  {:>6}",
            level.price, level.qty, level.num_orders
        );
    }
    println!();
}

fn print_compact(token: u32, bids: &[BookLevel], asks: &[BookLevel], max: usize) {
    println!("token={token} depth={}x{}", filled(bids), filled(asks));
    for level in asks.iter().take(max).filter(|l| !l.is_empty()).rev() {
        println!("ASK {:>13} {:>9} {:>5}", level.price, level.qty, level.num_orders);
    }
    for level in bids.iter().take(max).filter(|l| !l.is_empty()) {
        println!("BID {:>13} {:>9} {:>5}", level.price, level.qty, level.num_orders);
    }
}

fn print_json(token: u32, bids: &[BookLevel], asks: &[BookLevel], ltp: i64, ltq: i32, max: usize) {
    let side = |levels: &[BookLevel]| -> Vec<serde_json::Value> {
        levels
            .iter()
            .take(max)
            .filter(|l| !l.is_empty())
            .map(|l| {
                json!({
                    "price": l.price,
                    "qty": l.qty,
                    "orders": l.num_orders,
                })
            })
            .collect()
    };

    let output = json!({
        "token": token,
        "ltp": ltp,
        "ltq": ltq,
        "bids": side(bids),
        "asks": side(asks),
    });

    println!("{}", serde_json::to_string_pretty(&output).expect("valid json"));
}
