/// ewe_service: extreme weather event detection per city.
///
/// # Module structure
///
/// ```text
/// ewe_service
/// ├── model       - shared data types (City, Measurement, ExtremeWeatherEvent, EweError, ...)
/// ├── config      - ewe.toml loader (daemon schedule, derivation settings)
/// ├── store       - CityStore / MeasurementSource traits + in-memory store
/// ├── db          - PostgreSQL connection validation and PgStore
/// ├── service     - EweService: sweep, merge, threshold derivation over a store
/// ├── daemon      - periodic sweep rounds over all cities on a worker pool
/// └── analysis
///     ├── thresholds  - per-measurement crossing evaluation
///     ├── sweep       - per-category state machines over a window
///     ├── merge       - collapses overlapping events
///     └── percentiles - default thresholds from history
/// ```

pub mod analysis;
pub mod config;
pub mod daemon;
pub mod db;
pub mod model;
pub mod service;
pub mod store;
