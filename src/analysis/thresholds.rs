//! Threshold crossing evaluation.
//!
//! Compares one measurement against a city's thresholds and reports, for
//! every category, whether the measured field crossed its threshold.
//! Strength is a presence indicator: 1 while crossed, 0 otherwise.

use crate::model::{EventCategory, EweThreshold, Measurement, CATEGORY_COUNT};

/// Strength reported for a crossed threshold.
pub const CROSSED: u32 = 1;

/// Evaluates all categories for a measurement.
///
/// The result is always in `EventCategory::ALL` order. A missing field
/// never crosses.
pub fn evaluate(
    measurement: &Measurement,
    thresholds: &EweThreshold,
) -> [(EventCategory, u32); CATEGORY_COUNT] {
    EventCategory::ALL.map(|category| (category, crossing_strength(category, measurement, thresholds)))
}

/// Crossing strength for a single category.
pub fn crossing_strength(
    category: EventCategory,
    measurement: &Measurement,
    thresholds: &EweThreshold,
) -> u32 {
    let crossed = match category {
        EventCategory::Rainstorm => at_or_above(measurement.rainfall, thresholds.rainfall),
        EventCategory::Snowstorm => at_or_above(measurement.snowfall, thresholds.snowfall),
        EventCategory::Hurricane => at_or_above(measurement.wind_speed, thresholds.wind_speed),
        EventCategory::Heatwave => at_or_above(measurement.temperature, thresholds.max_temperature),
        EventCategory::Coldwave => measurement
            .temperature
            .is_some_and(|t| t <= thresholds.min_temperature),
    };

    if crossed { CROSSED } else { 0 }
}

fn at_or_above(value: Option<f64>, threshold: f64) -> bool {
    value.is_some_and(|v| v >= threshold)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn thresholds() -> EweThreshold {
        EweThreshold {
            rainfall: 5.0,
            snowfall: 3.0,
            max_temperature: 35.0,
            min_temperature: -15.0,
            wind_speed: 30.0,
        }
    }

    fn measurement() -> Measurement {
        Measurement::empty(1, Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap())
    }

    #[test]
    fn test_calm_measurement_crosses_nothing() {
        let mut m = measurement();
        m.temperature = Some(20.0);
        m.rainfall = Some(0.2);
        m.snowfall = Some(0.0);
        m.wind_speed = Some(8.0);

        let found = evaluate(&m, &thresholds());
        assert!(found.iter().all(|(_, strength)| *strength == 0));
    }

    #[test]
    fn test_result_order_is_fixed() {
        let found = evaluate(&measurement(), &thresholds());
        let order: Vec<EventCategory> = found.iter().map(|(c, _)| *c).collect();
        assert_eq!(order, EventCategory::ALL.to_vec());
    }

    #[test]
    fn test_threshold_values_are_inclusive() {
        let mut m = measurement();
        m.rainfall = Some(5.0);
        m.snowfall = Some(3.0);
        m.wind_speed = Some(30.0);
        m.temperature = Some(35.0);

        let found = evaluate(&m, &thresholds());
        assert_eq!(
            found,
            [
                (EventCategory::Rainstorm, 1),
                (EventCategory::Snowstorm, 1),
                (EventCategory::Hurricane, 1),
                (EventCategory::Heatwave, 1),
                (EventCategory::Coldwave, 0),
            ]
        );
    }

    #[test]
    fn test_coldwave_triggers_at_or_below_minimum() {
        let mut m = measurement();
        m.temperature = Some(-15.0);
        assert_eq!(crossing_strength(EventCategory::Coldwave, &m, &thresholds()), 1);

        m.temperature = Some(-14.9);
        assert_eq!(crossing_strength(EventCategory::Coldwave, &m, &thresholds()), 0);
    }

    #[test]
    fn test_strength_is_binary_regardless_of_magnitude() {
        let mut m = measurement();
        m.rainfall = Some(500.0);
        assert_eq!(crossing_strength(EventCategory::Rainstorm, &m, &thresholds()), CROSSED);
    }

    #[test]
    fn test_missing_fields_never_cross() {
        let found = evaluate(&measurement(), &thresholds());
        assert!(found.iter().all(|(_, strength)| *strength == 0));
    }
}
