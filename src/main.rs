//! Entry point for the `rdt` demo.
//!
//! Runs a complete simulated transfer through the fault-injecting channel
//! and verifies byte-exact in-order delivery.  All protocol work is
//! delegated to library modules; `main.rs` owns only process setup (logging,
//! argument parsing) and the final report.

use anyhow::{bail, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rdt::simulator::{SimConfig, Simulator};

/// Reliable data transfer over a simulated lossy packet channel.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Number of messages to transfer.
    #[arg(short, long, default_value_t = 100)]
    messages: usize,

    /// Maximum message size in bytes (sizes are drawn uniformly from 1..=SIZE).
    #[arg(short, long, default_value_t = 500)]
    size: usize,

    /// Probability that the channel drops a packet.
    #[arg(long, default_value_t = 0.1)]
    loss: f64,

    /// Probability that the channel flips one bit of a packet.
    #[arg(long, default_value_t = 0.1)]
    corrupt: f64,

    /// Probability that the channel duplicates a packet.
    #[arg(long, default_value_t = 0.05)]
    duplicate: f64,

    /// Probability that the channel holds a packet back for reordering.
    #[arg(long, default_value_t = 0.1)]
    reorder: f64,

    /// RNG seed for both the traffic and the channel.
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    let mut sim = Simulator::new(SimConfig {
        loss_rate: cli.loss,
        corrupt_rate: cli.corrupt,
        duplicate_rate: cli.duplicate,
        reorder_rate: cli.reorder,
        seed: cli.seed,
        ..SimConfig::default()
    });

    // Generate the traffic from its own seeded RNG so a run is fully
    // described by its CLI flags.
    let mut rng = StdRng::seed_from_u64(cli.seed);
    let mut submitted = Vec::new();
    for _ in 0..cli.messages {
        let len = rng.random_range(1..=cli.size.max(1));
        let msg: Vec<u8> = (0..len).map(|_| rng.random()).collect();
        submitted.extend_from_slice(&msg);
        sim.offer_message(&msg);
    }

    log::info!(
        "transferring {} messages ({} bytes) — loss={} corrupt={} duplicate={} reorder={}",
        cli.messages,
        submitted.len(),
        cli.loss,
        cli.corrupt,
        cli.duplicate,
        cli.reorder
    );

    let events = sim.run();
    let stats = sim.stats();

    println!("simulated time       {:>10.2} s", sim.now());
    println!("events processed     {events:>10}");
    println!("data frames sent     {:>10}", stats.data_frames);
    println!("control frames sent  {:>10}", stats.control_frames);
    println!("dropped by channel   {:>10}", stats.dropped);
    println!("corrupted by channel {:>10}", stats.corrupted);
    println!("duplicated           {:>10}", stats.duplicated);
    println!("reordered            {:>10}", stats.reordered);
    println!("messages delivered   {:>10}", stats.delivered);

    if sim.delivered_bytes() != submitted {
        bail!(
            "delivery mismatch: submitted {} bytes, delivered {} bytes",
            submitted.len(),
            sim.delivered_bytes().len()
        );
    }
    if !sim.sender_idle() {
        bail!("sender still holds undelivered state after the run");
    }

    println!(
        "verified: {} bytes delivered in order, byte-exact",
        submitted.len()
    );
    Ok(())
}
