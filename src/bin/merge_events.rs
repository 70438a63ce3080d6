//! Duplicate Event Merge
//!
//! Collapses overlapping events of the same category for one city, e.g.
//! after sweeping overlapping windows.
//!
//! Usage:
//!   cargo run --bin merge_events -- --city 12
//!
//! Options:
//!   --city ID            City to merge (required)
//!   --start TIME         Only merge events inside [start, end]
//!   --end TIME           (both bounds required together)
//!   --category A,B       Only merge these categories (e.g. RAINSTORM,HEATWAVE)
//!
//! Environment:
//!   DATABASE_URL - PostgreSQL connection string

use env_logger::Env;
use ewe_service::analysis::merge::MergeScope;
use ewe_service::db::PgStore;
use ewe_service::model::{parse_timestamp, CityId, EventCategory};
use ewe_service::service::EweService;
use std::env;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    println!("🔗 Event Merge");
    println!("==============\n");

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
            eprintln!("Usage: {} --city ID [--start TIME --end TIME] [--category A,B]", args[0]);
            std::process::exit(1);
        }
    };

    let mut scope = match (arg_value("--start"), arg_value("--end")) {
        (Some(start), Some(end)) => {
            let start = parse_timestamp(&start).ok_or_else(|| format!("invalid --start value: {}", start))?;
            let end = parse_timestamp(&end).ok_or_else(|| format!("invalid --end value: {}", end))?;
            MergeScope::between(start, end)
        }
        (None, None) => MergeScope::all(),
        _ => {
            eprintln!("Error: --start and --end must be given together");
            std::process::exit(1);
        }
    };

    if let Some(list) = arg_value("--category") {
        let mut categories = Vec::new();
        for name in list.split(',') {
            match EventCategory::parse(name.trim()) {
                Some(category) => categories.push(category),
                None => {
                    eprintln!("Error: unknown category '{}'", name);
                    std::process::exit(1);
                }
            }
        }
        scope = scope.only(&categories);
    }

    let store = PgStore::connect().unwrap_or_else(|e| {
        eprintln!("\n{}\n", e);
        std::process::exit(1);
    });
    let mut service = EweService::new(store);

    let summary = service.merge_duplicates(city_id, &scope)?;
    println!("✓ City {}: removed {} events, inserted {}", city_id, summary.removed, summary.inserted);

    Ok(())
}
