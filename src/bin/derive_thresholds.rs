//! Threshold Derivation
//!
//! Derives a city's default thresholds from its measurement history using
//! symmetric percentiles, then stores them on the city.
//!
//! Usage:
//!   cargo run --bin derive_thresholds -- --city 12
//!
//! Options:
//!   --city ID          City to derive thresholds for (required)
//!   --percentile X     Percentile in [0, 50] (default: derivation.percentile)
//!   --days N           Days of history ending now (default: derivation.history_days)
//!   --dry-run          Print the thresholds without saving them
//!   --json             Print the thresholds as JSON
//!
//! Environment:
//!   DATABASE_URL - PostgreSQL connection string

use chrono::Utc;
use env_logger::Env;
use ewe_service::analysis::percentiles::MeasurementSample;
use ewe_service::config::{self, CONFIG_PATH};
use ewe_service::db::PgStore;
use ewe_service::model::{CityId, EweThreshold};
use ewe_service::service::EweService;
use ewe_service::store::MeasurementSource;
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
            eprintln!("Usage: {} --city ID [--percentile X] [--days N] [--dry-run] [--json]", args[0]);
            std::process::exit(1);
        }
    };
    let dry_run = args.contains(&"--dry-run".to_string());
    let json = args.contains(&"--json".to_string());

    let mut derivation = config::load_or_default(CONFIG_PATH)?.derivation;
    if let Some(raw) = arg_value("--percentile") {
        derivation.percentile = raw.parse::<f64>().map_err(|_| format!("invalid --percentile value: {}", raw))?;
    }
    if let Some(raw) = arg_value("--days") {
        derivation.history_days = raw.parse::<i64>().map_err(|_| format!("invalid --days value: {}", raw))?;
    }
    let (percentile_x, days) = (derivation.percentile, derivation.history_days);

    if !json {
        println!("📐 Threshold Derivation");
        println!("=======================\n");
        println!("   City: {}", city_id);
        println!("   Percentile: {} / {}", percentile_x, 100.0 - percentile_x);
        println!("   History: {} days\n", days);
    }

    let store = PgStore::connect().unwrap_or_else(|e| {
        eprintln!("\n{}\n", e);
        std::process::exit(1);
    });
    let mut service = EweService::with_config(store, derivation);
    let now = Utc::now();

    let thresholds = if dry_run {
        let (start, end) = service.history_window(now)?;
        let history = service.store_mut().fetch(city_id, start, end)?;
        service.derive_thresholds(&MeasurementSample::from_measurements(&history), percentile_x)?
    } else {
        service.derive_city_thresholds_default(city_id, now)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&thresholds)?);
    } else {
        print_thresholds(&thresholds);
        if dry_run {
            println!("\n(dry run: thresholds not saved)");
        } else {
            println!("\n✓ Thresholds saved for city {}", city_id);
        }
    }

    Ok(())
}

fn print_thresholds(t: &EweThreshold) {
    println!("✓ Derived thresholds:");
    println!("  - Rainfall:        {:.2}", t.rainfall);
    println!("  - Snowfall:        {:.2}", t.snowfall);
    println!("  - Wind speed:      {:.2}", t.wind_speed);
    println!("  - Max temperature: {:.2}", t.max_temperature);
    println!("  - Min temperature: {:.2}", t.min_temperature);
}
