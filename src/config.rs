/// Service configuration loader - parses ewe.toml
///
/// Keeps scheduling and threshold derivation settings out of the code so
/// they can be tuned without recompiling. Database settings are not here;
/// they come from `DATABASE_URL` (see `db`).

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::analysis::percentiles::ThresholdFloors;

/// Default configuration file, relative to the working directory.
pub const CONFIG_PATH: &str = "ewe.toml";

/// Longest history window accepted for threshold derivation (100 years).
pub const MAX_HISTORY_DAYS: i64 = 36_525;

// ---------------------------------------------------------------------------
// Configuration structures
// ---------------------------------------------------------------------------

/// Root configuration structure for TOML parsing.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct EweConfig {
    pub daemon: DaemonConfig,
    pub derivation: DerivationConfig,
}

/// Scheduler settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Minutes between sweep rounds.
    pub poll_interval_minutes: u64,
    /// Worker threads; each city is handled by exactly one worker per round.
    pub workers: usize,
    /// Run a full merge pass after every successful sweep.
    pub auto_merge: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_minutes: 60,
            workers: 4,
            auto_merge: true,
        }
    }
}

/// Threshold derivation settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DerivationConfig {
    /// Symmetric percentile, 0–50.
    pub percentile: f64,
    /// Days of history used when deriving a city's thresholds.
    pub history_days: i64,
    pub min_rainfall: f64,
    pub min_snowfall: f64,
    pub min_wind_speed: f64,
    pub min_temperature: f64,
}

impl Default for DerivationConfig {
    fn default() -> Self {
        Self {
            percentile: 5.0,
            history_days: 365,
            min_rainfall: 1.0,
            min_snowfall: 1.0,
            min_wind_speed: 5.0,
            min_temperature: 1.0,
        }
    }
}

impl DerivationConfig {
    pub fn floors(&self) -> ThresholdFloors {
        ThresholdFloors {
            rainfall: self.min_rainfall,
            snowfall: self.min_snowfall,
            wind_speed: self.min_wind_speed,
            temperature: self.min_temperature,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("Invalid value in {path}: {message}")]
    Invalid { path: String, message: String },
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Loads and validates configuration from a TOML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EweConfig, ConfigError> {
    let path_str = path.as_ref().display().to_string();

    let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path_str.clone(),
        source,
    })?;

    parse_config(&contents, &path_str)
}

/// Loads `path` if it exists, otherwise returns the defaults. A file that
/// exists but is malformed is still an error.
pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<EweConfig, ConfigError> {
    if path.as_ref().exists() {
        load_config(path)
    } else {
        log::info!("{} not found, using default configuration", path.as_ref().display());
        Ok(EweConfig::default())
    }
}

fn parse_config(contents: &str, path: &str) -> Result<EweConfig, ConfigError> {
    let config: EweConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
        path: path.to_string(),
        source,
    })?;

    let invalid = |message: String| ConfigError::Invalid {
        path: path.to_string(),
        message,
    };

    if !(0.0..=50.0).contains(&config.derivation.percentile) {
        return Err(invalid(format!(
            "derivation.percentile must be within [0, 50], got {}",
            config.derivation.percentile
        )));
    }
    if !(1..=MAX_HISTORY_DAYS).contains(&config.derivation.history_days) {
        return Err(invalid(format!(
            "derivation.history_days must be within [1, {}], got {}",
            MAX_HISTORY_DAYS, config.derivation.history_days
        )));
    }
    if config.daemon.workers == 0 {
        return Err(invalid("daemon.workers must be at least 1".to_string()));
    }
    if config.daemon.poll_interval_minutes == 0 {
        return Err(invalid("daemon.poll_interval_minutes must be at least 1".to_string()));
    }

    Ok(config)
}
