/// Default threshold derivation from historical measurements.
///
/// For a percentile `x` in `[0, 50]`, each measured field's distribution is
/// cut symmetrically: the upper cut (`100 - x`) becomes the rainfall,
/// snowfall, wind speed and maximum temperature thresholds, the lower cut
/// (`x`) becomes the minimum temperature threshold.
///
/// Percentiles use linear interpolation between order statistics at
/// fractional rank `p / 100 * (n - 1)`.

use crate::model::{EweError, EweThreshold, Measurement};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Historical values per measured field. Absent values are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasurementSample {
    pub temperature: Vec<Option<f64>>,
    pub rainfall: Vec<Option<f64>>,
    pub snowfall: Vec<Option<f64>>,
    pub wind_speed: Vec<Option<f64>>,
}

impl MeasurementSample {
    pub fn from_measurements(measurements: &[Measurement]) -> Self {
        MeasurementSample {
            temperature: measurements.iter().map(|m| m.temperature).collect(),
            rainfall: measurements.iter().map(|m| m.rainfall).collect(),
            snowfall: measurements.iter().map(|m| m.snowfall).collect(),
            wind_speed: measurements.iter().map(|m| m.wind_speed).collect(),
        }
    }
}

/// Minimum absolute value of each derived threshold.
///
/// A dry city would otherwise get a rainfall threshold of 0.0 and report a
/// rainstorm on every measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdFloors {
    pub rainfall: f64,
    pub snowfall: f64,
    pub wind_speed: f64,
    /// Applies to both temperature thresholds.
    pub temperature: f64,
}

impl ThresholdFloors {
    /// No flooring at all.
    pub fn none() -> Self {
        ThresholdFloors {
            rainfall: 0.0,
            snowfall: 0.0,
            wind_speed: 0.0,
            temperature: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// Derives a complete threshold set from a historical sample.
pub fn derive_thresholds(
    sample: &MeasurementSample,
    percentile_x: f64,
    floors: &ThresholdFloors,
) -> Result<EweThreshold, EweError> {
    if !(0.0..=50.0).contains(&percentile_x) {
        return Err(EweError::InvalidPercentile(percentile_x));
    }

    let temperature = sorted_values(&sample.temperature, "temperature")?;
    let rainfall = sorted_values(&sample.rainfall, "rainfall")?;
    let snowfall = sorted_values(&sample.snowfall, "snowfall")?;
    let wind_speed = sorted_values(&sample.wind_speed, "wind_speed")?;

    let low = percentile_x;
    let high = 100.0 - percentile_x;

    Ok(EweThreshold {
        rainfall: floor_magnitude(interpolated(&rainfall, high), floors.rainfall),
        snowfall: floor_magnitude(interpolated(&snowfall, high), floors.snowfall),
        wind_speed: floor_magnitude(interpolated(&wind_speed, high), floors.wind_speed),
        max_temperature: floor_magnitude(interpolated(&temperature, high), floors.temperature),
        min_temperature: floor_magnitude(interpolated(&temperature, low), floors.temperature),
    })
}

/// Interpolated percentile `p` (0–100) of an ascending slice.
///
/// Returns `None` for an empty slice.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }

    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let k = rank.floor() as usize;
    let weight = rank - k as f64;

    match sorted.get(k + 1) {
        Some(next) if weight > 0.0 => Some(sorted[k] * (1.0 - weight) + next * weight),
        _ => Some(sorted[k.min(sorted.len() - 1)]),
    }
}

/// Raises `value` to at least `minimum` in absolute terms, keeping its
/// sign. Zero counts as positive.
pub fn floor_magnitude(value: f64, minimum: f64) -> f64 {
    let sign = if value < 0.0 { -1.0 } else { 1.0 };
    sign * value.abs().max(minimum.abs())
}

fn sorted_values(values: &[Option<f64>], field: &'static str) -> Result<Vec<f64>, EweError> {
    let mut present: Vec<f64> = values.iter().flatten().copied().filter(|v| v.is_finite()).collect();
    if present.is_empty() {
        return Err(EweError::EmptyMeasurementData(field));
    }
    present.sort_by(f64::total_cmp);
    Ok(present)
}

fn interpolated(sorted: &[f64], p: f64) -> f64 {
    // sorted_values guarantees a non-empty slice
    percentile(sorted, p).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
