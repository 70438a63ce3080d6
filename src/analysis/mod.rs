/// Event detection for the extreme weather event service.
///
/// Submodules:
/// - `thresholds`  - per-measurement threshold crossing evaluation.
/// - `sweep`       - per-category state machines over a measurement window.
/// - `merge`       - collapses overlapping events left by repeated sweeps.
/// - `percentiles` - default thresholds from historical measurements.

pub mod merge;
pub mod percentiles;
pub mod sweep;
pub mod thresholds;
