/// Event sweep engine.
///
/// Walks a city's measurements in time order and runs one state machine
/// per event category:
///
/// ```text
///   INACTIVE --crossed--> ACTIVE   (date_start = measurement time)
///   ACTIVE   --crossed--> ACTIVE   (strength = max(strength, found))
///   ACTIVE   --clear----> INACTIVE (date_end = measurement time, emit event)
///   INACTIVE --clear----> INACTIVE
/// ```
///
/// Events still active when the window ends are kept as open events
/// (`date_end == None`) on the city and become the seed state of the next
/// sweep whose window starts at or after their `date_start`.
///
/// The functions here operate on an in-memory `City`; loading and saving
/// is done by `service::EweService`.

use chrono::{DateTime, Utc};
use log::debug;
use uuid::Uuid;

use crate::analysis::thresholds;
use crate::model::{
    normalize_timestamp, City, CityId, EventCategory, EweError, EweThreshold, ExtremeWeatherEvent,
    Measurement, PerCategory,
};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Ongoing state of one category during a sweep. `strength == 0` means
/// inactive, in which case `date_start` is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OngoingState {
    pub strength: u32,
    pub date_start: Option<DateTime<Utc>>,
}

impl OngoingState {
    pub fn is_active(&self) -> bool {
        self.strength > 0
    }
}

/// Result of sweeping one window.
#[derive(Debug, Clone, Default)]
pub struct SweepOutcome {
    /// Events closed during this window. This is what callers get back.
    pub completed: Vec<ExtremeWeatherEvent>,
    /// Events still active at the end of the window, stored open.
    pub still_open: Vec<ExtremeWeatherEvent>,
    /// Number of open events picked up from a previous sweep.
    pub seeded: usize,
    /// Number of measurements processed.
    pub measurements: usize,
}

// ---------------------------------------------------------------------------
// Seeding
// ---------------------------------------------------------------------------

/// Removes the city's open events that started at or before `start` and
/// turns them into seed state.
///
/// If more than one open event exists for a category (only possible after
/// overlapping manual sweeps), they collapse into one seed with the
/// earliest start and the highest strength. Open events starting after
/// `start` are left in place for the merger to reconcile.
pub fn take_open_seeds(city: &mut City, start: DateTime<Utc>) -> (PerCategory<OngoingState>, usize) {
    let mut seeds: PerCategory<OngoingState> = PerCategory::default();
    let mut seeded = 0;

    city.events.retain(|event| {
        if !event.is_open() || event.date_start > start {
            return true;
        }

        let seed = &mut seeds[event.category];
        seed.strength = seed.strength.max(event.strength).max(1);
        seed.date_start = Some(match seed.date_start {
            Some(existing) => existing.min(event.date_start),
            None => event.date_start,
        });
        seeded += 1;
        false
    });

    (seeds, seeded)
}

// ---------------------------------------------------------------------------
// Sweep
// ---------------------------------------------------------------------------

/// Fails if measurement timestamps are not strictly ascending.
///
/// Two measurements at the same instant have no defined order, so they are
/// rejected rather than silently reordered.
pub fn check_ascending(city_id: CityId, measurements: &[Measurement]) -> Result<(), EweError> {
    for pair in measurements.windows(2) {
        let (prev, next) = (normalize_timestamp(pair[0].timestamp), normalize_timestamp(pair[1].timestamp));
        if next <= prev {
            return Err(EweError::UnorderedMeasurements { city_id, at: next });
        }
    }
    Ok(())
}

/// Runs the category state machines over `measurements`, starting from
/// `seeds`.
///
/// Measurements must already be strictly ascending (see `check_ascending`).
pub fn run_sweep(
    city_id: CityId,
    mut states: PerCategory<OngoingState>,
    measurements: &[Measurement],
    thresholds: &EweThreshold,
) -> SweepOutcome {
    let mut outcome = SweepOutcome {
        measurements: measurements.len(),
        ..SweepOutcome::default()
    };

    for measurement in measurements {
        let at = normalize_timestamp(measurement.timestamp);
        let found = thresholds::evaluate(measurement, thresholds);

        for (category, strength) in found {
            let state = &mut states[category];

            match (state.is_active(), strength > 0) {
                (false, true) => {
                    debug!("city {}: {} started at {}", city_id, category, at);
                    *state = OngoingState {
                        strength,
                        date_start: Some(at),
                    };
                }
                (true, true) => {
                    state.strength = state.strength.max(strength);
                }
                (true, false) => {
                    debug!("city {}: {} ended at {}", city_id, category, at);
                    if let Some(event) = to_event(city_id, category, state, Some(at)) {
                        outcome.completed.push(event);
                    }
                    *state = OngoingState::default();
                }
                (false, false) => {}
            }
        }
    }

    for (category, state) in states.iter() {
        if state.is_active() {
            if let Some(event) = to_event(city_id, category, state, None) {
                outcome.still_open.push(event);
            }
        }
    }

    outcome
}

/// Sweeps one window for an in-memory city.
///
/// Seeds from the city's open events, runs the state machines and appends
/// completed and still-open events to `city.events`. Measurement order is
/// validated before the city is touched.
pub fn sweep_city(
    city: &mut City,
    thresholds: &EweThreshold,
    measurements: &[Measurement],
    start: DateTime<Utc>,
) -> Result<SweepOutcome, EweError> {
    check_ascending(city.id, measurements)?;

    let (seeds, seeded) = take_open_seeds(city, normalize_timestamp(start));
    let mut outcome = run_sweep(city.id, seeds, measurements, thresholds);
    outcome.seeded = seeded;

    city.events.extend(outcome.completed.iter().cloned());
    city.events.extend(outcome.still_open.iter().cloned());

    Ok(outcome)
}

fn to_event(
    city_id: CityId,
    category: EventCategory,
    state: &OngoingState,
    date_end: Option<DateTime<Utc>>,
) -> Option<ExtremeWeatherEvent> {
    Some(ExtremeWeatherEvent {
        id: Uuid::new_v4(),
        city_id,
        category,
        strength: state.strength,
        date_start: state.date_start?,
        date_end,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
