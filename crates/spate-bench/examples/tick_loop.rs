//! End-to-end tick loop example.
//!
//! Demonstrates: build config → registry on a worker pool → producers
//! write per lane → rotate → consumers read last tick → shutdown.
//!
//! Set `RUST_LOG=spate_engine=debug` to see rotations.

use spate_arena::BlockSource;
use spate_bench::{stress_profile, TickHarness};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Spate Tick Loop Example ===\n");

    let lanes = 4;
    let mut harness = TickHarness::new(stress_profile(lanes), 3, 2, 2_000).unwrap();

    for tick in 0..20 {
        let report = harness.step().unwrap();
        if tick % 5 == 0 || tick == 19 {
            let m = &report.metrics;
            println!(
                "  tick {:>3}: published={} events={:>6} blocks={:>4} disposed={} join={:>5}μs total={:>5}μs",
                report.tick.0,
                m.streams_published,
                m.events_published,
                m.blocks_published,
                m.streams_disposed,
                m.join_us,
                m.total_us,
            );
        }
        for violation in &report.violations {
            println!("  violation: {violation}");
        }
    }

    println!(
        "\nLive blocks before shutdown: {}",
        harness.registry().block_source().live_blocks()
    );
    let consumed = harness.finish().unwrap();
    println!("Events consumed: {consumed}");
    println!("Done.");
}
