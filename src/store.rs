/// Collaborator interfaces consumed by the sweep and merge operations.
///
/// `CityStore` is whole-document storage for a city and its event list;
/// `MeasurementSource` yields time-ordered measurements. `db::PgStore`
/// implements both against PostgreSQL. `MemoryStore` implements both in
/// memory and backs the tests and dry runs.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::model::{normalize_timestamp, City, CityId, EweError, Measurement};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Whole-document city persistence.
pub trait CityStore {
    /// Loads a city with its thresholds, events and version token.
    fn get(&mut self, city_id: CityId) -> Result<City, EweError>;

    /// Replaces the stored city document.
    ///
    /// Fails with `ConcurrentModification` when `city.version` no longer
    /// matches the stored version. On success the stored version is
    /// incremented.
    fn save(&mut self, city: &City) -> Result<(), EweError>;

    /// Identifiers of every known city, ascending.
    fn city_ids(&mut self) -> Result<Vec<CityId>, EweError>;
}

/// Time-ordered measurement retrieval.
pub trait MeasurementSource {
    /// Measurements for `city_id` with `start <= timestamp <= end`,
    /// ascending by timestamp. May be empty.
    fn fetch(
        &mut self,
        city_id: CityId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Measurement>, EweError>;

    /// Timestamp of the earliest stored measurement for the city.
    fn earliest(&mut self, city_id: CityId) -> Result<Option<DateTime<Utc>>, EweError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// In-memory store keyed by city id. Measurements are kept in insertion
/// order and sorted on fetch, so ties survive and are caught by the sweep.
#[derive(Debug, Default)]
pub struct MemoryStore {
    cities: BTreeMap<CityId, City>,
    measurements: BTreeMap<CityId, Vec<Measurement>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a city without a version check.
    pub fn insert_city(&mut self, city: City) {
        self.cities.insert(city.id, city);
    }

    pub fn add_measurements(&mut self, measurements: impl IntoIterator<Item = Measurement>) {
        for mut m in measurements {
            m.timestamp = normalize_timestamp(m.timestamp);
            self.measurements.entry(m.city_id).or_default().push(m);
        }
    }

    /// Read-only view of a stored city.
    pub fn city(&self, city_id: CityId) -> Option<&City> {
        self.cities.get(&city_id)
    }
}

impl CityStore for MemoryStore {
    fn get(&mut self, city_id: CityId) -> Result<City, EweError> {
        self.cities
            .get(&city_id)
            .cloned()
            .ok_or(EweError::CityNotFound(city_id))
    }

    fn save(&mut self, city: &City) -> Result<(), EweError> {
        let stored = self
            .cities
            .get_mut(&city.id)
            .ok_or(EweError::CityNotFound(city.id))?;

        if stored.version != city.version {
            return Err(EweError::ConcurrentModification {
                city_id: city.id,
                expected_version: city.version,
            });
        }

        *stored = city.clone();
        stored.version += 1;
        Ok(())
    }

    fn city_ids(&mut self) -> Result<Vec<CityId>, EweError> {
        Ok(self.cities.keys().copied().collect())
    }
}

impl MeasurementSource for MemoryStore {
    fn fetch(
        &mut self,
        city_id: CityId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Measurement>, EweError> {
        let mut found: Vec<Measurement> = self
            .measurements
            .get(&city_id)
            .map(|all| {
                all.iter()
                    .filter(|m| m.timestamp >= start && m.timestamp <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        found.sort_by_key(|m| m.timestamp);
        Ok(found)
    }

    fn earliest(&mut self, city_id: CityId) -> Result<Option<DateTime<Utc>>, EweError> {
        Ok(self
            .measurements
            .get(&city_id)
            .and_then(|all| all.iter().map(|m| m.timestamp).min()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
