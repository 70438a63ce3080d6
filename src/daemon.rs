/// Periodic sweep scheduler.
///
/// Each round:
/// 1. Lists every city from the store
/// 2. Runs `sweep_since_last_update` for each city on the worker pool
///    (one job per city, each job with its own store connection)
/// 3. Optionally merges duplicate events for that city
/// 4. Logs a round summary and sleeps until the next poll interval
///
/// A city is only ever handled by one job per round and rounds never
/// overlap, so the same city is never swept concurrently.

use chrono::{DateTime, Utc};
use log::{info, warn};
use std::error::Error;
use std::sync::mpsc;
use std::sync::Arc;
use threadpool::ThreadPool;

use crate::analysis::merge::MergeScope;
use crate::config::EweConfig;
use crate::model::{CityId, EweError, MergeSummary};
use crate::service::EweService;
use crate::store::{CityStore, MeasurementSource};

// ---------------------------------------------------------------------------
// Round results
// ---------------------------------------------------------------------------

/// What one job did for one city.
#[derive(Debug, Clone, PartialEq)]
pub struct CityReport {
    pub city_id: CityId,
    pub completed: usize,
    pub merged: MergeSummary,
}

/// Outcome of one full round over all cities.
#[derive(Debug, Default)]
pub struct RoundSummary {
    pub reports: Vec<CityReport>,
    /// Cities without a complete threshold set.
    pub skipped: Vec<CityId>,
    pub failures: Vec<(CityId, EweError)>,
}

impl RoundSummary {
    pub fn completed_events(&self) -> usize {
        self.reports.iter().map(|r| r.completed).sum()
    }

    pub fn merged_away(&self) -> usize {
        self.reports.iter().map(|r| r.merged.removed).sum()
    }
}

// ---------------------------------------------------------------------------
// Daemon
// ---------------------------------------------------------------------------

/// Scheduler over a store factory. `connect` is called once to list the
/// cities and once inside every job.
pub struct Daemon<F> {
    config: EweConfig,
    connect: Arc<F>,
}

impl<F, S> Daemon<F>
where
    F: Fn() -> Result<S, EweError> + Send + Sync + 'static,
    S: CityStore + MeasurementSource,
{
    pub fn new(config: EweConfig, connect: F) -> Self {
        Self {
            config,
            connect: Arc::new(connect),
        }
    }

    pub fn config(&self) -> &EweConfig {
        &self.config
    }

    /// Runs one round with `now` as the sweep end for every city.
    pub fn run_round_at(&self, now: DateTime<Utc>) -> Result<RoundSummary, EweError> {
        let city_ids = (self.connect.as_ref())()?.city_ids()?;
        let mut summary = RoundSummary::default();

        if city_ids.is_empty() {
            return Ok(summary);
        }

        let pool = ThreadPool::new(self.config.daemon.workers.min(city_ids.len()));
        let (tx, rx) = mpsc::channel();

        for city_id in city_ids {
            let connect = Arc::clone(&self.connect);
            let config = self.config.clone();
            let tx = tx.clone();

            pool.execute(move || {
                let result = process_city(connect.as_ref(), &config, city_id, now);
                // Receiver outlives the pool; a send error only means the
                // round was abandoned.
                let _ = tx.send((city_id, result));
            });
        }
        drop(tx);
        pool.join();

        for (city_id, result) in rx.iter() {
            match result {
                Ok(report) => summary.reports.push(report),
                Err(EweError::ThresholdsMissing { missing, .. }) => {
                    warn!("city {}: skipped, missing thresholds ({})", city_id, missing.join(", "));
                    summary.skipped.push(city_id);
                }
                Err(e) => {
                    warn!("city {}: round failed: {}", city_id, e);
                    summary.failures.push((city_id, e));
                }
            }
        }

        summary.reports.sort_by_key(|r| r.city_id);
        summary.skipped.sort_unstable();
        summary.failures.sort_by_key(|(id, _)| *id);
        Ok(summary)
    }

    pub fn run_round(&self) -> Result<RoundSummary, EweError> {
        self.run_round_at(Utc::now())
    }

    /// Main daemon loop (runs indefinitely)
    pub fn run(&self) -> Result<(), Box<dyn Error>> {
        println!("🚀 Starting sweep loop...");
        println!("   Poll interval: {} minutes", self.config.daemon.poll_interval_minutes);
        println!("   Workers: {}", self.config.daemon.workers);
        println!("   Auto-merge: {}", self.config.daemon.auto_merge);

        loop {
            let start = Utc::now();

            match self.run_round_at(start) {
                Ok(summary) => {
                    info!(
                        "round complete: {} cities swept, {} events completed, {} merged away, {} skipped, {} failed",
                        summary.reports.len(),
                        summary.completed_events(),
                        summary.merged_away(),
                        summary.skipped.len(),
                        summary.failures.len()
                    );
                }
                Err(e) => {
                    warn!("round aborted: {}", e);
                }
            }

            let elapsed = (Utc::now() - start).num_seconds();
            let sleep_seconds = (self.config.daemon.poll_interval_minutes * 60) as i64 - elapsed;

            if sleep_seconds > 0 {
                std::thread::sleep(std::time::Duration::from_secs(sleep_seconds as u64));
            }
        }
    }
}

fn process_city<F, S>(connect: &F, config: &EweConfig, city_id: CityId, now: DateTime<Utc>) -> Result<CityReport, EweError>
where
    F: Fn() -> Result<S, EweError>,
    S: CityStore + MeasurementSource,
{
    let mut service = EweService::with_config(connect()?, config.derivation.clone());

    let completed = service.sweep_since_last_update_at(city_id, now)?;
    let merged = if config.daemon.auto_merge {
        service.merge_duplicates(city_id, &MergeScope::all())?
    } else {
        MergeSummary::default()
    };

    Ok(CityReport {
        city_id,
        completed: completed.len(),
        merged,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
