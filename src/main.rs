//! Extreme Weather Event Service - Main Daemon
//!
//! Periodically sweeps every city's new measurements for threshold
//! crossings, records extreme weather events and merges duplicates.
//!
//! Usage:
//!   cargo run --release                         # Loop forever using ewe.toml
//!   cargo run --release -- --once               # Run a single round and exit
//!   cargo run --release -- --config other.toml  # Alternate configuration file
//!
//! Environment:
//!   DATABASE_URL - PostgreSQL connection string
//!   RUST_LOG     - log filter (default: info)

use env_logger::Env;
use ewe_service::config::{self, CONFIG_PATH};
use ewe_service::daemon::Daemon;
use ewe_service::db::PgStore;
use ewe_service::model::EweError;
use std::env;

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    println!("🌩️  Extreme Weather Event Service");
    println!("==================================\n");

    let args: Vec<String> = env::args().collect();
    let mut config_path = CONFIG_PATH.to_string();
    let mut once = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                if i + 1 < args.len() {
                    config_path = args[i + 1].clone();
                    i += 2;
                } else {
                    eprintln!("Error: --config requires a file path");
                    std::process::exit(1);
                }
            }
            "--once" => {
                once = true;
                i += 1;
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                eprintln!("Usage: {} [--config PATH] [--once]", args[0]);
                std::process::exit(1);
            }
        }
    }

    println!("📋 Loading configuration from {}...", config_path);
    let config = match config::load_or_default(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("\n❌ Configuration error: {}\n", e);
            std::process::exit(1);
        }
    };

    // Fail fast on database setup problems before the loop starts.
    println!("📊 Validating database...");
    if let Err(e) = PgStore::connect() {
        eprintln!("\n❌ Database validation failed: {}\n", e);
        std::process::exit(1);
    }
    println!("✓ Database ready\n");

    let daemon = Daemon::new(config, || -> Result<PgStore, EweError> { Ok(PgStore::connect()?) });

    if once {
        match daemon.run_round() {
            Ok(summary) => {
                println!("✓ Round complete");
                println!("   Cities swept: {}", summary.reports.len());
                println!("   Events completed: {}", summary.completed_events());
                println!("   Events merged away: {}", summary.merged_away());
                println!("   Skipped (no thresholds): {}", summary.skipped.len());
                for (city_id, e) in &summary.failures {
                    eprintln!("   ✗ city {}: {}", city_id, e);
                }
            }
            Err(e) => {
                eprintln!("\n❌ Round failed: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    println!("🔄 Starting continuous sweep loop...");
    println!("   Press Ctrl+C to stop\n");

    if let Err(e) = daemon.run() {
        eprintln!("\n❌ Daemon error: {}", e);
        std::process::exit(1);
    }
}
