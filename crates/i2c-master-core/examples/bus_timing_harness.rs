//! Timing harness for the I2C master engine model.
//!
//! Runs write/read transactions against a memory slave at several clock
//! divisors and reports bus ticks per transaction and simulated ticks per
//! second of host time.
//!
//! ## Usage
//!
//! ```sh
//! cargo run -p i2c-master-core --example bus_timing_harness
//! ```

#![allow(clippy::pedantic)]

use i2c_master_core::{EngineConfig, MemorySlave, Testbench};
use log as _;
use proptest as _;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;

use std::time::Instant;

const DEVICE: u8 = 0x50;
const PAYLOAD: usize = 16;
const ROUNDS: usize = 20;
const WATCHDOG: u64 = 10_000_000;

struct Sample {
    divisor: u32,
    write_ticks: u64,
    read_ticks: u64,
    ticks_per_second: f64,
}

fn measure(divisor: u32) -> Sample {
    let config = EngineConfig {
        default_divisor: divisor,
        ..EngineConfig::default()
    };
    let mut bench = Testbench::new(config, MemorySlave::new(DEVICE)).expect("valid config");
    let payload: Vec<u8> = (0..PAYLOAD).map(|i| (i * 7) as u8).collect();

    let start_ticks = bench.engine().ticks();
    let started = Instant::now();
    let mut write_ticks = 0;
    let mut read_ticks = 0;

    for _ in 0..ROUNDS {
        let before = bench.engine().ticks();
        let status = bench
            .write_bytes(DEVICE, 0, &payload, WATCHDOG)
            .expect("write finishes");
        assert!(!status.error, "write failed: {status:?}");
        write_ticks = bench.engine().ticks() - before;

        let before = bench.engine().ticks();
        let (status, bytes) = bench
            .read_bytes(DEVICE, 0, PAYLOAD, WATCHDOG)
            .expect("read finishes");
        assert!(!status.error, "read failed: {status:?}");
        assert_eq!(bytes, payload);
        read_ticks = bench.engine().ticks() - before;
    }

    let elapsed = started.elapsed().as_secs_f64();
    let total = bench.engine().ticks() - start_ticks;
    Sample {
        divisor,
        write_ticks,
        read_ticks,
        ticks_per_second: total as f64 / elapsed.max(f64::EPSILON),
    }
}

fn main() {
    println!("{PAYLOAD}-byte transactions, {ROUNDS} rounds per divisor");
    println!(
        "{:>8} {:>12} {:>12} {:>16}",
        "divisor", "write ticks", "read ticks", "ticks/second"
    );
    for divisor in [1, 4, 16, 64, 250] {
        let sample = measure(divisor);
        println!(
            "{:>8} {:>12} {:>12} {:>16.0}",
            sample.divisor, sample.write_ticks, sample.read_ticks, sample.ticks_per_second
        );
    }
}
