//! Manual Event Sweep
//!
//! Sweeps one city's measurements over an explicit window and stores the
//! detected events. Useful for backfilling a city after importing history.
//!
//! Usage:
//!   cargo run --bin sweep_events -- --city 12 --start 2024-01-01 --end 2024-02-01
//!
//! Options:
//!   --city ID       City to sweep (required)
//!   --start TIME    Window start, RFC 3339 or YYYY-MM-DD (required)
//!   --end TIME      Window end, inclusive (default: now)
//!   --merge         Merge duplicate events overlapping the window afterwards
//!   --json          Print completed events as JSON
//!
//! Environment:
//!   DATABASE_URL - PostgreSQL connection string

use chrono::Utc;
use env_logger::Env;
use ewe_service::config::{self, CONFIG_PATH};
use ewe_service::db::PgStore;
use ewe_service::model::{parse_timestamp, CityId};
use ewe_service::service::EweService;
use std::env;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let arg_value = |flag: &str| {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .cloned()
    };

    let city_id: CityId = match arg_value("--city").and_then(|s| s.parse().ok()) {
        Some(id) => id,
        None => {
            eprintln!("Error: --city ID is required");
            eprintln!("Usage: {} --city ID --start TIME [--end TIME] [--merge] [--json]", args[0]);
            std::process::exit(1);
        }
    };
    let start = match arg_value("--start").as_deref().and_then(parse_timestamp) {
        Some(ts) => ts,
        None => {
            eprintln!("Error: --start TIME is required (RFC 3339 or YYYY-MM-DD)");
            std::process::exit(1);
        }
    };
    let end = match arg_value("--end") {
        Some(raw) => parse_timestamp(&raw).ok_or_else(|| format!("invalid --end value: {}", raw))?,
        None => Utc::now(),
    };
    let merge = args.contains(&"--merge".to_string());
    let json = args.contains(&"--json".to_string());

    if !json {
        println!("🌩️  Event Sweep");
        println!("===============\n");
    }

    let config = config::load_or_default(CONFIG_PATH)?;

    let store = PgStore::connect().unwrap_or_else(|e| {
        eprintln!("\n{}\n", e);
        std::process::exit(1);
    });
    let mut service = EweService::with_config(store, config.derivation);

    let completed = service.sweep(city_id, start, end)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&completed)?);
    } else {
        println!("✓ City {}: {} events completed between {} and {}", city_id, completed.len(), start, end);
        for event in &completed {
            if let Some(date_end) = event.date_end {
                println!("   {:<10} {} → {}", event.category, event.date_start, date_end);
            }
        }
    }

    if merge {
        let summary = service.merge_overlapping(city_id, start, end)?;
        if !json {
            println!("\n✓ Merge: removed {}, inserted {}", summary.removed, summary.inserted);
        }
    }

    Ok(())
}
