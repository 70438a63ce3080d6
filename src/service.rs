/// Operations exposed to the scheduler and command-line tools.
///
/// `EweService` wires the analysis functions to a store: it loads the city,
/// runs sweep / merge / derivation in memory and saves the city once. A
/// failure anywhere before the save leaves the stored city untouched.
///
/// Callers must not run two operations for the same city at the same time;
/// the version check in `CityStore::save` turns such a race into
/// `EweError::ConcurrentModification` instead of a lost update.

use chrono::{DateTime, Duration, Utc};
use log::info;

use crate::analysis::merge::{self, MergeScope};
use crate::analysis::percentiles::{self, MeasurementSample};
use crate::analysis::sweep::{self, SweepOutcome};
use crate::config::{DerivationConfig, MAX_HISTORY_DAYS};
use crate::model::{
    normalize_timestamp, City, CityId, EweError, EweThreshold, ExtremeWeatherEvent, MergeSummary,
};
use crate::store::{CityStore, MeasurementSource};

pub struct EweService<S> {
    store: S,
    derivation: DerivationConfig,
}

impl<S: CityStore + MeasurementSource> EweService<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, DerivationConfig::default())
    }

    pub fn with_config(store: S, derivation: DerivationConfig) -> Self {
        Self { store, derivation }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    // -----------------------------------------------------------------------
    // Sweep
    // -----------------------------------------------------------------------

    /// Sweeps `[start, end]` for a city and returns the events completed in
    /// that window. Events still active at `end` are stored open.
    pub fn sweep(
        &mut self,
        city_id: CityId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ExtremeWeatherEvent>, EweError> {
        let mut city = self.store.get(city_id)?;
        let thresholds = required_thresholds(&city)?;

        let outcome = self.sweep_loaded(&mut city, &thresholds, start, end)?;
        self.store.save(&city)?;

        Ok(outcome.completed)
    }

    /// Sweeps from the city's last update (or its earliest measurement if
    /// it was never swept) up to `now`, and records `now` as the new last
    /// update in the same save.
    pub fn sweep_since_last_update_at(
        &mut self,
        city_id: CityId,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExtremeWeatherEvent>, EweError> {
        let mut city = self.store.get(city_id)?;
        let thresholds = required_thresholds(&city)?;
        let now = normalize_timestamp(now);

        let start = match city.last_ewe_update {
            Some(last) => last,
            None => match self.store.earliest(city_id)? {
                Some(earliest) => earliest,
                None => {
                    info!("city {}: no measurements yet, nothing to sweep", city_id);
                    return Ok(Vec::new());
                }
            },
        };

        let outcome = self.sweep_loaded(&mut city, &thresholds, start, now)?;
        city.last_ewe_update = Some(now);
        self.store.save(&city)?;

        Ok(outcome.completed)
    }

    /// Convenience wrapper that uses the real current time.
    /// Use `sweep_since_last_update_at` in tests to keep them deterministic.
    pub fn sweep_since_last_update(&mut self, city_id: CityId) -> Result<Vec<ExtremeWeatherEvent>, EweError> {
        self.sweep_since_last_update_at(city_id, Utc::now())
    }

    fn sweep_loaded(
        &mut self,
        city: &mut City,
        thresholds: &EweThreshold,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<SweepOutcome, EweError> {
        let (start, end) = (normalize_timestamp(start), normalize_timestamp(end));
        let measurements = self.store.fetch(city.id, start, end)?;
        let outcome = sweep::sweep_city(city, thresholds, &measurements, start)?;

        info!(
            "city {}: swept {} measurements from {} to {} ({} completed, {} open, {} resumed)",
            city.id,
            outcome.measurements,
            start,
            end,
            outcome.completed.len(),
            outcome.still_open.len(),
            outcome.seeded
        );

        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Merge
    // -----------------------------------------------------------------------

    /// Collapses overlapping events of the same category within `scope`.
    pub fn merge_duplicates(&mut self, city_id: CityId, scope: &MergeScope) -> Result<MergeSummary, EweError> {
        let mut city = self.store.get(city_id)?;
        self.merge_loaded(&mut city, scope)
    }

    /// Merges every event overlapping `[start, end]`, including episodes
    /// that began before `start`. Use after sweeping that window.
    pub fn merge_overlapping(
        &mut self,
        city_id: CityId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<MergeSummary, EweError> {
        let mut city = self.store.get(city_id)?;
        let scope = MergeScope::covering(&city.events, normalize_timestamp(start), normalize_timestamp(end));
        self.merge_loaded(&mut city, &scope)
    }

    fn merge_loaded(&mut self, city: &mut City, scope: &MergeScope) -> Result<MergeSummary, EweError> {
        let summary = merge::merge_city(city, scope);

        if summary != MergeSummary::default() {
            self.store.save(city)?;
        }

        info!(
            "city {}: merge removed {} events, inserted {}",
            city.id, summary.removed, summary.inserted
        );
        Ok(summary)
    }

    // -----------------------------------------------------------------------
    // Threshold derivation
    // -----------------------------------------------------------------------

    /// Derives thresholds from an explicit sample.
    pub fn derive_thresholds(&self, sample: &MeasurementSample, percentile_x: f64) -> Result<EweThreshold, EweError> {
        percentiles::derive_thresholds(sample, percentile_x, &self.derivation.floors())
    }

    /// Derives thresholds from the city's stored measurements in
    /// `[start, end]` and saves them on the city.
    pub fn derive_city_thresholds(
        &mut self,
        city_id: CityId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        percentile_x: f64,
    ) -> Result<EweThreshold, EweError> {
        let mut city = self.store.get(city_id)?;
        let history = self
            .store
            .fetch(city_id, normalize_timestamp(start), normalize_timestamp(end))?;

        let thresholds = self.derive_thresholds(&MeasurementSample::from_measurements(&history), percentile_x)?;
        city.thresholds = thresholds.into();
        self.store.save(&city)?;

        info!(
            "city {}: derived thresholds from {} measurements at percentile {}",
            city_id,
            history.len(),
            percentile_x
        );
        Ok(thresholds)
    }

    /// Derives thresholds from the configured history window ending at
    /// `now`, at the configured percentile.
    pub fn derive_city_thresholds_default(&mut self, city_id: CityId, now: DateTime<Utc>) -> Result<EweThreshold, EweError> {
        let (start, end) = self.history_window(now)?;
        let percentile_x = self.derivation.percentile;
        self.derive_city_thresholds(city_id, start, end, percentile_x)
    }

    /// `[now - history_days, now]`. Fails for a non-positive or oversized
    /// day count instead of overflowing.
    pub fn history_window(&self, now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>), EweError> {
        let days = self.derivation.history_days;
        if !(1..=MAX_HISTORY_DAYS).contains(&days) {
            return Err(EweError::InvalidHistoryWindow(days));
        }

        let start = Duration::try_days(days)
            .and_then(|span| now.checked_sub_signed(span))
            .ok_or(EweError::InvalidHistoryWindow(days))?;
        Ok((start, now))
    }
}

fn required_thresholds(city: &City) -> Result<EweThreshold, EweError> {
    city.thresholds
        .complete()
        .map_err(|missing| EweError::ThresholdsMissing {
            city_id: city.id,
            missing,
        })
}
