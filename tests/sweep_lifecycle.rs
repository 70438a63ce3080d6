/// Integration tests for the sweep / merge / derivation lifecycle.
///
/// These drive `EweService` over the in-memory store end to end:
/// 1. Threshold crossings become events with the right boundaries
/// 2. Events active at a window end stay open and close in a later sweep
/// 3. Overlapping sweeps plus a merge agree with a single sweep
/// 4. Merging is idempotent
/// 5. Percentile derivation feeds the next sweep
///
/// No database is needed: cargo test --test sweep_lifecycle

use chrono::{DateTime, Duration, TimeZone, Utc};
use ewe_service::analysis::merge::MergeScope;
use ewe_service::analysis::percentiles::MeasurementSample;
use ewe_service::model::{
    City, CityId, EventCategory, EweError, EweThreshold, ExtremeWeatherEvent, Measurement, MergeSummary,
};
use ewe_service::service::EweService;
use ewe_service::store::{CityStore, MemoryStore};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const CITY: CityId = 42;

fn t(hour: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 10, 1, 0, 0, 0).unwrap() + Duration::hours(hour)
}

fn thresholds() -> EweThreshold {
    EweThreshold {
        rainfall: 5.0,
        snowfall: 3.0,
        max_temperature: 38.0,
        min_temperature: -15.0,
        wind_speed: 118.0,
    }
}

fn hourly_rain(values: &[f64]) -> Vec<Measurement> {
    values
        .iter()
        .enumerate()
        .map(|(h, mm)| {
            let mut m = Measurement::empty(CITY, t(h as i64));
            m.rainfall = Some(*mm);
            m.temperature = Some(20.0);
            m.snowfall = Some(0.0);
            m.wind_speed = Some(10.0);
            m
        })
        .collect()
}

fn service(measurements: Vec<Measurement>) -> EweService<MemoryStore> {
    let mut store = MemoryStore::new();
    let mut city = City::new(CITY, "Lakeside");
    city.thresholds = thresholds().into();
    store.insert_city(city);
    store.add_measurements(measurements);
    EweService::new(store)
}

fn stored_events(service: &EweService<MemoryStore>) -> Vec<ExtremeWeatherEvent> {
    let mut events = service.store().city(CITY).unwrap().events.clone();
    events.sort_by_key(|e| (e.category, e.date_start));
    events
}

/// Event boundaries without the generated id.
fn spans(events: &[ExtremeWeatherEvent]) -> Vec<(EventCategory, DateTime<Utc>, Option<DateTime<Utc>>, u32)> {
    events
        .iter()
        .map(|e| (e.category, e.date_start, e.date_end, e.strength))
        .collect()
}

const TWO_STORMS: [f64; 10] = [0.0, 6.0, 7.0, 0.0, 0.0, 0.0, 8.0, 9.0, 0.0, 0.0];

// ---------------------------------------------------------------------------
// 1. Detection
// ---------------------------------------------------------------------------

#[test]
fn test_quiet_weather_produces_no_events() {
    let mut service = service(hourly_rain(&[0.0, 1.0, 4.9, 2.0, 0.0]));

    let completed = service.sweep(CITY, t(0), t(4)).unwrap();

    assert!(completed.is_empty());
    assert!(stored_events(&service).is_empty());
}

#[test]
fn test_single_rainstorm_boundaries() {
    let mut service = service(hourly_rain(&[0.0, 0.0, 6.0, 8.0, 6.0, 0.0, 0.0]));

    let completed = service.sweep(CITY, t(0), t(6)).unwrap();

    assert_eq!(
        spans(&completed),
        vec![(EventCategory::Rainstorm, t(2), Some(t(5)), 1)]
    );
    assert_eq!(completed[0].city_id, CITY);
}

#[test]
fn test_unknown_city_and_missing_thresholds() {
    let mut service = service(vec![]);
    assert!(matches!(
        service.sweep(7, t(0), t(1)),
        Err(EweError::CityNotFound(7))
    ));

    service.store_mut().insert_city(City::new(8, "Nowhere"));
    assert!(matches!(
        service.sweep(8, t(0), t(1)),
        Err(EweError::ThresholdsMissing { city_id: 8, .. })
    ));
    assert!(matches!(
        service.sweep_since_last_update_at(8, t(1)),
        Err(EweError::ThresholdsMissing { .. })
    ));
}

// ---------------------------------------------------------------------------
// 2. Open events across sweeps
// ---------------------------------------------------------------------------

#[test]
fn test_open_event_closes_in_next_sweep_without_duplicate() {
    let mut service = service(hourly_rain(&TWO_STORMS));

    let first = service.sweep(CITY, t(0), t(2)).unwrap();
    assert!(first.is_empty());

    let open = stored_events(&service);
    assert_eq!(open.len(), 1);
    assert!(open[0].is_open());
    assert_eq!(open[0].date_start, t(1));

    let second = service.sweep(CITY, t(2), t(9)).unwrap();
    assert_eq!(
        spans(&second),
        vec![
            (EventCategory::Rainstorm, t(1), Some(t(3)), 1),
            (EventCategory::Rainstorm, t(6), Some(t(8)), 1),
        ]
    );
    assert_eq!(spans(&stored_events(&service)), spans(&second));
}

#[test]
fn test_since_last_update_walks_forward() {
    let mut service = service(hourly_rain(&TWO_STORMS));

    let first = service.sweep_since_last_update_at(CITY, t(2)).unwrap();
    assert!(first.is_empty());
    assert_eq!(service.store().city(CITY).unwrap().last_ewe_update, Some(t(2)));

    let second = service.sweep_since_last_update_at(CITY, t(9)).unwrap();
    assert_eq!(second.len(), 2);
    assert_eq!(service.store().city(CITY).unwrap().last_ewe_update, Some(t(9)));

    let third = service.sweep_since_last_update_at(CITY, t(12)).unwrap();
    assert!(third.is_empty());
    assert_eq!(stored_events(&service).len(), 2);
}

// ---------------------------------------------------------------------------
// 3. Overlapping windows + merge
// ---------------------------------------------------------------------------

#[test]
fn test_split_sweep_matches_single_sweep() {
    let mut single = service(hourly_rain(&TWO_STORMS));
    single.sweep(CITY, t(0), t(9)).unwrap();

    let mut split = service(hourly_rain(&TWO_STORMS));
    split.sweep(CITY, t(0), t(4)).unwrap();
    split.sweep(CITY, t(4), t(9)).unwrap();
    split.merge_duplicates(CITY, &MergeScope::all()).unwrap();

    assert_eq!(spans(&stored_events(&split)), spans(&stored_events(&single)));
}

#[test]
fn test_overlapping_windows_are_reconciled_by_merge() {
    let mut service = service(hourly_rain(&TWO_STORMS));

    service.sweep(CITY, t(0), t(5)).unwrap();
    service.sweep(CITY, t(2), t(9)).unwrap();
    // The second window re-detects the tail of the first storm.
    assert_eq!(stored_events(&service).len(), 3);

    let summary = service.merge_duplicates(CITY, &MergeScope::all()).unwrap();
    assert_eq!(summary, MergeSummary { removed: 2, inserted: 1 });

    assert_eq!(
        spans(&stored_events(&service)),
        vec![
            (EventCategory::Rainstorm, t(1), Some(t(3)), 1),
            (EventCategory::Rainstorm, t(6), Some(t(8)), 1),
        ]
    );
}

#[test]
fn test_sweep_then_window_merge_leaves_no_overlap() {
    let mut service = service(hourly_rain(&TWO_STORMS));

    service.sweep(CITY, t(0), t(5)).unwrap();
    service.sweep(CITY, t(2), t(9)).unwrap();

    // The original storm starts before the second window.
    let summary = service.merge_overlapping(CITY, t(2), t(9)).unwrap();
    assert_eq!(summary, MergeSummary { removed: 2, inserted: 1 });

    let events = stored_events(&service);
    for pair in events.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if a.category == b.category {
            let a_end = a.date_end.expect("merged storms are closed");
            assert!(b.date_start > a_end, "{:?} overlaps {:?}", a, b);
        }
    }
    assert_eq!(
        spans(&events),
        vec![
            (EventCategory::Rainstorm, t(1), Some(t(3)), 1),
            (EventCategory::Rainstorm, t(6), Some(t(8)), 1),
        ]
    );
}

// ---------------------------------------------------------------------------
// 4. Merge
// ---------------------------------------------------------------------------

fn event(category: EventCategory, start: i64, end: Option<i64>, strength: u32) -> ExtremeWeatherEvent {
    ExtremeWeatherEvent {
        id: Uuid::new_v4(),
        city_id: CITY,
        category,
        strength,
        date_start: t(start),
        date_end: end.map(t),
    }
}

#[test]
fn test_merge_unions_overlap_and_is_idempotent() {
    let mut service = service(vec![]);
    let mut city = service.store_mut().get(CITY).unwrap();
    city.events = vec![
        event(EventCategory::Heatwave, 0, Some(3), 1),
        event(EventCategory::Heatwave, 1, Some(4), 2),
        event(EventCategory::Coldwave, 10, Some(12), 1),
    ];
    service.store_mut().save(&city).unwrap();

    let first = service.merge_duplicates(CITY, &MergeScope::all()).unwrap();
    assert_eq!(first, MergeSummary { removed: 2, inserted: 1 });

    let events = stored_events(&service);
    assert_eq!(
        spans(&events),
        vec![
            (EventCategory::Heatwave, t(0), Some(t(4)), 2),
            (EventCategory::Coldwave, t(10), Some(t(12)), 1),
        ]
    );

    let second = service.merge_duplicates(CITY, &MergeScope::all()).unwrap();
    assert_eq!(second, MergeSummary::default());
    assert_eq!(stored_events(&service), events);
}

#[test]
fn test_merge_scope_limits_categories() {
    let mut service = service(vec![]);
    let mut city = service.store_mut().get(CITY).unwrap();
    city.events = vec![
        event(EventCategory::Snowstorm, 0, Some(3), 1),
        event(EventCategory::Snowstorm, 2, Some(5), 1),
        event(EventCategory::Hurricane, 0, Some(3), 1),
        event(EventCategory::Hurricane, 2, Some(5), 1),
    ];
    service.store_mut().save(&city).unwrap();

    let scope = MergeScope::all().only(&[EventCategory::Hurricane]);
    let summary = service.merge_duplicates(CITY, &scope).unwrap();

    assert_eq!(summary, MergeSummary { removed: 2, inserted: 1 });
    let events = stored_events(&service);
    assert_eq!(events.iter().filter(|e| e.category == EventCategory::Snowstorm).count(), 2);
    assert_eq!(events.iter().filter(|e| e.category == EventCategory::Hurricane).count(), 1);
}

#[test]
fn test_merged_strength_survives_later_sweep() {
    let mut service = service(hourly_rain(&[0.0, 9.0, 0.0]));
    let mut city = service.store_mut().get(CITY).unwrap();
    city.events = vec![event(EventCategory::Rainstorm, 0, None, 3)];
    service.store_mut().save(&city).unwrap();

    let completed = service.sweep(CITY, t(1), t(2)).unwrap();

    assert_eq!(
        spans(&completed),
        vec![(EventCategory::Rainstorm, t(0), Some(t(2)), 3)]
    );
    assert_eq!(stored_events(&service).len(), 1);
}

// ---------------------------------------------------------------------------
// 5. Concurrency guard
// ---------------------------------------------------------------------------

#[test]
fn test_stale_save_is_rejected() {
    let mut service = service(hourly_rain(&TWO_STORMS));
    let stale = service.store_mut().get(CITY).unwrap();

    service.sweep(CITY, t(0), t(9)).unwrap();

    let result = service.store_mut().save(&stale);
    assert!(matches!(result, Err(EweError::ConcurrentModification { city_id: CITY, .. })));
    assert_eq!(stored_events(&service).len(), 2);
}

#[test]
fn test_duplicate_timestamps_fail_without_saving() {
    let mut measurements = hourly_rain(&[0.0, 6.0, 0.0]);
    measurements.push(measurements[1].clone());
    let mut service = service(measurements);

    let result = service.sweep(CITY, t(0), t(2));

    assert!(matches!(result, Err(EweError::UnorderedMeasurements { .. })));
    assert_eq!(service.store().city(CITY).unwrap().version, 0);
}

// ---------------------------------------------------------------------------
// 6. Threshold derivation
// ---------------------------------------------------------------------------

#[test]
fn test_percentile_reference_values() {
    let service = service(vec![]);
    let values: Vec<Option<f64>> = (0..100).map(|v| Some(v as f64)).collect();
    let sample = MeasurementSample {
        temperature: values.clone(),
        rainfall: values.clone(),
        snowfall: values.clone(),
        wind_speed: values,
    };

    let derived = service.derive_thresholds(&sample, 10.0).unwrap();

    assert!((derived.min_temperature - 9.9).abs() < 1e-9);
    assert!((derived.max_temperature - 89.1).abs() < 1e-9);
    assert!((derived.rainfall - 89.1).abs() < 1e-9);
    assert!((derived.wind_speed - 89.1).abs() < 1e-9);
}

#[test]
fn test_invalid_percentile_is_rejected() {
    let service = service(vec![]);
    let sample = MeasurementSample::from_measurements(&hourly_rain(&[1.0, 2.0]));
    assert!(matches!(
        service.derive_thresholds(&sample, 50.5),
        Err(EweError::InvalidPercentile(_))
    ));
}

#[test]
fn test_derived_thresholds_drive_next_sweep() {
    let mut rain: Vec<f64> = vec![0.0; 95];
    rain.extend([20.0, 25.0, 22.0, 0.0, 0.0]);
    let mut service = service(hourly_rain(&rain));
    service.store_mut().insert_city(City::new(CITY, "Lakeside"));

    let derived = service.derive_city_thresholds(CITY, t(0), t(99), 5.0).unwrap();
    // The 95th percentile of mostly dry hours is raised to the floor.
    assert_eq!(derived.rainfall, 1.0);

    let completed = service.sweep(CITY, t(0), t(99)).unwrap();
    let storms: Vec<_> = completed
        .into_iter()
        .filter(|e| e.category == EventCategory::Rainstorm)
        .collect();

    assert_eq!(
        spans(&storms),
        vec![(EventCategory::Rainstorm, t(95), Some(t(98)), 1)]
    );
}
