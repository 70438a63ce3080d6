/// Core data types for the extreme weather event service.
///
/// This module defines the shared domain model imported by all other
/// modules: cities and their thresholds, measurements, detected events and
/// the error taxonomy. It contains no I/O.

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};
use uuid::Uuid;

/// Database identifier of a city.
pub type CityId = i64;

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Brings a timestamp onto the single time grid used by sweep and merge.
///
/// Every timestamp that enters the engine (measurement times, window
/// bounds, stored event dates) is truncated to whole milliseconds so that
/// values read back from PostgreSQL (microsecond precision) compare equal
/// to values computed in memory.
pub fn normalize_timestamp(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(3)
}

/// Parses a command-line timestamp: RFC 3339 or a bare `YYYY-MM-DD`
/// (midnight UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(normalize_timestamp(dt.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// Number of event categories. The set is closed.
pub const CATEGORY_COUNT: usize = 5;

/// Extreme weather event category, in fixed evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventCategory {
    Rainstorm,
    Snowstorm,
    Hurricane,
    Heatwave,
    Coldwave,
}

impl EventCategory {
    /// All categories in evaluation order.
    pub const ALL: [EventCategory; CATEGORY_COUNT] = [
        EventCategory::Rainstorm,
        EventCategory::Snowstorm,
        EventCategory::Hurricane,
        EventCategory::Heatwave,
        EventCategory::Coldwave,
    ];

    /// Position of the category in `ALL`.
    pub fn index(self) -> usize {
        match self {
            EventCategory::Rainstorm => 0,
            EventCategory::Snowstorm => 1,
            EventCategory::Hurricane => 2,
            EventCategory::Heatwave => 3,
            EventCategory::Coldwave => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Rainstorm => "RAINSTORM",
            EventCategory::Snowstorm => "SNOWSTORM",
            EventCategory::Hurricane => "HURRICANE",
            EventCategory::Heatwave => "HEATWAVE",
            EventCategory::Coldwave => "COLDWAVE",
        }
    }

    /// Parses the storage name produced by `as_str` (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        EventCategory::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One value per category, addressed by `EventCategory`.
///
/// The sweep compares "found" strengths against "ongoing" state slot by
/// slot, so both sides share this fixed layout instead of a growable list.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PerCategory<T>([T; CATEGORY_COUNT]);

impl<T> PerCategory<T> {
    pub fn from_fn(mut f: impl FnMut(EventCategory) -> T) -> Self {
        PerCategory(EventCategory::ALL.map(&mut f))
    }

    /// Iterates `(category, value)` pairs in evaluation order.
    pub fn iter(&self) -> impl Iterator<Item = (EventCategory, &T)> {
        EventCategory::ALL.into_iter().zip(self.0.iter())
    }
}

impl<T> Index<EventCategory> for PerCategory<T> {
    type Output = T;

    fn index(&self, category: EventCategory) -> &T {
        &self.0[category.index()]
    }
}

impl<T> IndexMut<EventCategory> for PerCategory<T> {
    fn index_mut(&mut self, category: EventCategory) -> &mut T {
        &mut self.0[category.index()]
    }
}

// ---------------------------------------------------------------------------
// Threshold types
// ---------------------------------------------------------------------------

/// Thresholds as stored on a city. Any field may be missing, e.g. for a
/// city created before thresholds were derived.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredThresholds {
    pub rainfall: Option<f64>,
    pub snowfall: Option<f64>,
    pub max_temperature: Option<f64>,
    pub min_temperature: Option<f64>,
    pub wind_speed: Option<f64>,
}

impl StoredThresholds {
    /// Returns the complete threshold set, or the names of the missing
    /// fields.
    pub fn complete(&self) -> Result<EweThreshold, Vec<&'static str>> {
        match (
            self.rainfall,
            self.snowfall,
            self.max_temperature,
            self.min_temperature,
            self.wind_speed,
        ) {
            (Some(rainfall), Some(snowfall), Some(max_temperature), Some(min_temperature), Some(wind_speed)) => {
                Ok(EweThreshold {
                    rainfall,
                    snowfall,
                    max_temperature,
                    min_temperature,
                    wind_speed,
                })
            }
            _ => {
                let mut missing = Vec::new();
                if self.rainfall.is_none() {
                    missing.push("rainfall");
                }
                if self.snowfall.is_none() {
                    missing.push("snowfall");
                }
                if self.max_temperature.is_none() {
                    missing.push("max_temperature");
                }
                if self.min_temperature.is_none() {
                    missing.push("min_temperature");
                }
                if self.wind_speed.is_none() {
                    missing.push("wind_speed");
                }
                Err(missing)
            }
        }
    }
}

/// A fully specified per-city threshold set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EweThreshold {
    pub rainfall: f64,
    pub snowfall: f64,
    pub max_temperature: f64,
    pub min_temperature: f64,
    pub wind_speed: f64,
}

impl From<EweThreshold> for StoredThresholds {
    fn from(t: EweThreshold) -> Self {
        StoredThresholds {
            rainfall: Some(t.rainfall),
            snowfall: Some(t.snowfall),
            max_temperature: Some(t.max_temperature),
            min_temperature: Some(t.min_temperature),
            wind_speed: Some(t.wind_speed),
        }
    }
}

// ---------------------------------------------------------------------------
// Measurements and events
// ---------------------------------------------------------------------------

/// A single weather measurement for a city. Absent fields are sensor gaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub city_id: CityId,
    pub timestamp: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub rainfall: Option<f64>,
    pub snowfall: Option<f64>,
    pub wind_speed: Option<f64>,
}

impl Measurement {
    /// A measurement with every field absent, for building up in tests and
    /// loaders.
    pub fn empty(city_id: CityId, timestamp: DateTime<Utc>) -> Self {
        Measurement {
            city_id,
            timestamp: normalize_timestamp(timestamp),
            temperature: None,
            rainfall: None,
            snowfall: None,
            wind_speed: None,
        }
    }
}

/// A detected extreme weather event. `date_end == None` means the crossing
/// was still active at the end of the last sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtremeWeatherEvent {
    pub id: Uuid,
    pub city_id: CityId,
    pub category: EventCategory,
    pub strength: u32,
    pub date_start: DateTime<Utc>,
    pub date_end: Option<DateTime<Utc>>,
}

impl ExtremeWeatherEvent {
    pub fn is_open(&self) -> bool {
        self.date_end.is_none()
    }
}

/// A city together with its thresholds and owned event list.
///
/// `version` is the optimistic concurrency token: stores reject a save
/// whose version does not match the stored one.
#[derive(Debug, Clone, PartialEq)]
pub struct City {
    pub id: CityId,
    pub name: String,
    pub thresholds: StoredThresholds,
    pub last_ewe_update: Option<DateTime<Utc>>,
    pub events: Vec<ExtremeWeatherEvent>,
    pub version: i64,
}

impl City {
    pub fn new(id: CityId, name: &str) -> Self {
        City {
            id,
            name: name.to_string(),
            thresholds: StoredThresholds::default(),
            last_ewe_update: None,
            events: Vec::new(),
            version: 0,
        }
    }
}

/// Counts reported by a merge pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSummary {
    pub removed: usize,
    pub inserted: usize,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised by sweep, merge and threshold derivation.
#[derive(Debug, thiserror::Error)]
pub enum EweError {
    #[error("City not found: {0}")]
    CityNotFound(CityId),

    #[error("City {city_id} is missing thresholds: {}", .missing.join(", "))]
    ThresholdsMissing {
        city_id: CityId,
        missing: Vec<&'static str>,
    },

    #[error("Invalid percentile {0}: must be within [0, 50]")]
    InvalidPercentile(f64),

    #[error("Invalid history window of {0} days")]
    InvalidHistoryWindow(i64),

    #[error("No {0} values in measurement sample")]
    EmptyMeasurementData(&'static str),

    #[error("City {city_id} was modified concurrently (expected version {expected_version})")]
    ConcurrentModification { city_id: CityId, expected_version: i64 },

    #[error("Measurements for city {city_id} are not strictly ascending at {at}")]
    UnorderedMeasurements { city_id: CityId, at: DateTime<Utc> },

    #[error("Database error: {0}")]
    Database(#[from] postgres::Error),

    #[error("Database unavailable: {0}")]
    Connection(String),

    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
