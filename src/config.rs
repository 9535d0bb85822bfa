//! Configuration loader for the `plant-sensorflow` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). The resulting `Config` is built once at startup
//! and handed to the components that need it; nothing below this module reads
//! the environment.
use std::env;
use std::ops::RangeInclusive;

use anyhow::{anyhow, Result};

use crate::alerts::HealthThresholds;
use crate::archive::{ArchiveSettings, DEFAULT_KEY_PATTERN};
use crate::pipeline::{CleaningRules, PipelineSettings};
use crate::storage::S3Settings;

/// Parse an optional environment variable of type `$ty` with a default value.
macro_rules! parse_env {
    ($var_name:expr, $ty:ty, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Read an optional string environment variable; empty counts as unset.
fn optional_env(var_name: &str) -> Option<String> {
    env::var(var_name).ok().filter(|v| !v.trim().is_empty())
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Create the star schema on startup if missing.
    pub create_schema: bool,

    /// Plant API base URL; plant ids are appended as the last path segment.
    pub api_url: String,

    /// First plant id to fetch.
    pub plant_id_start: u32,

    /// Last plant id to fetch (inclusive).
    pub plant_id_end: u32,

    /// Cold-storage bucket for archive objects.
    pub archive_bucket: String,

    /// Archive object key with `{year}`, `{month}`, `{day}` placeholders.
    pub archive_key_pattern: String,

    /// Seconds between scheduled archiver runs; 0 disables the scheduler.
    pub archive_interval_secs: u64,

    pub aws_region: Option<String>,
    pub s3_endpoint: Option<String>,
    pub s3_force_path_style: bool,

    /// Accepted soil moisture range (percent); rows outside are dropped.
    pub soil_moisture_range: RangeInclusive<f64>,

    /// Accepted temperature range (°C); rows outside are dropped.
    pub temperature_range: RangeInclusive<f64>,

    /// Soil moisture above this raises a health alert.
    pub alert_soil_moisture_max: f64,

    /// Temperature below this raises a health alert.
    pub alert_temperature_min: f64,

    /// HTTP listen port.
    pub listen_port: u16,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string
/// - `PLANTS_API_URL` – plant API base URL
/// - `ARCHIVE_BUCKET` – cold-storage bucket name
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `CREATE_SCHEMA` – create tables on startup (default: true)
/// - `PLANT_ID_START` / `PLANT_ID_END` – plant id range to fetch (default: 1..=50)
/// - `ARCHIVE_KEY_PATTERN` – object key pattern (default: `{year}-{month}/{day}_plants_data.csv`)
/// - `ARCHIVE_INTERVAL_SECS` – scheduled archive cadence (default: 0, disabled)
/// - `AWS_REGION`, `S3_ENDPOINT`, `S3_FORCE_PATH_STYLE` – object store overrides
/// - `SOIL_MOISTURE_MIN` / `SOIL_MOISTURE_MAX` – accepted range (default: 0..=100)
/// - `TEMPERATURE_MIN` / `TEMPERATURE_MAX` – accepted range (default: -10..=50)
/// - `ALERT_SOIL_MOISTURE_MAX` (default: 50), `ALERT_TEMPERATURE_MIN` (default: 15)
/// - `LISTEN_PORT` – HTTP port (default: 8080)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = require_env!("DATABASE_URL");
    let api_url = require_env!("PLANTS_API_URL");
    let archive_bucket = require_env!("ARCHIVE_BUCKET");

    let defaults = CleaningRules::default();
    let soil_moisture_range = cleaning_range(
        "SOIL_MOISTURE",
        parse_env!("SOIL_MOISTURE_MIN", f64, *defaults.soil_moisture.start()),
        parse_env!("SOIL_MOISTURE_MAX", f64, *defaults.soil_moisture.end()),
        &defaults.soil_moisture,
    )?;
    let temperature_range = cleaning_range(
        "TEMPERATURE",
        parse_env!("TEMPERATURE_MIN", f64, *defaults.temperature.start()),
        parse_env!("TEMPERATURE_MAX", f64, *defaults.temperature.end()),
        &defaults.temperature,
    )?;

    let cfg = Config {
        db_url,
        db_pool_max: parse_env!("DB_POOL_MAX", u32, 5),
        create_schema: parse_env!("CREATE_SCHEMA", bool, true),
        api_url,
        plant_id_start: parse_env!("PLANT_ID_START", u32, 1),
        plant_id_end: parse_env!("PLANT_ID_END", u32, 50),
        archive_bucket,
        archive_key_pattern: optional_env("ARCHIVE_KEY_PATTERN")
            .unwrap_or_else(|| DEFAULT_KEY_PATTERN.to_string()),
        archive_interval_secs: parse_env!("ARCHIVE_INTERVAL_SECS", u64, 0),
        aws_region: optional_env("AWS_REGION"),
        s3_endpoint: optional_env("S3_ENDPOINT"),
        s3_force_path_style: parse_env!("S3_FORCE_PATH_STYLE", bool, false),
        soil_moisture_range,
        temperature_range,
        alert_soil_moisture_max: parse_env!("ALERT_SOIL_MOISTURE_MAX", f64, 50.0),
        alert_temperature_min: parse_env!("ALERT_TEMPERATURE_MIN", f64, 15.0),
        listen_port: parse_env!("LISTEN_PORT", u16, 8080),
    };

    if cfg.plant_id_start > cfg.plant_id_end {
        return Err(anyhow!(
            "PLANT_ID_START ({}) must not exceed PLANT_ID_END ({})",
            cfg.plant_id_start,
            cfg.plant_id_end
        ));
    }
    Ok(cfg)
}

/// Validate a configured cleaning range. It may narrow `bounds` but not widen
/// them: the `sensor_data` CHECK constraints reject anything outside.
fn cleaning_range(
    prefix: &str,
    min: f64,
    max: f64,
    bounds: &RangeInclusive<f64>,
) -> Result<RangeInclusive<f64>> {
    // ---
    if min > max {
        return Err(anyhow!("{prefix}_MIN ({min}) must not exceed {prefix}_MAX ({max})"));
    }
    if !bounds.contains(&min) || !bounds.contains(&max) {
        return Err(anyhow!(
            "{prefix} range {min}..={max} must lie within {}..={}",
            bounds.start(),
            bounds.end()
        ));
    }
    Ok(min..=max)
}

impl Config {
    // ---
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            cleaning: CleaningRules {
                soil_moisture: self.soil_moisture_range.clone(),
                temperature: self.temperature_range.clone(),
                ..CleaningRules::default()
            },
            health: HealthThresholds {
                max_soil_moisture: self.alert_soil_moisture_max,
                min_temperature: self.alert_temperature_min,
            },
        }
    }

    pub fn archive_settings(&self) -> ArchiveSettings {
        ArchiveSettings {
            key_pattern: self.archive_key_pattern.clone(),
        }
    }

    pub fn s3_settings(&self) -> S3Settings {
        S3Settings {
            bucket: self.archive_bucket.clone(),
            region: self.aws_region.clone(),
            endpoint: self.s3_endpoint.clone(),
            force_path_style: self.s3_force_path_style,
        }
    }

    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information like database passwords while showing
    /// all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL          : {}", mask_db_url(&self.db_url));
        tracing::info!("  DB_POOL_MAX           : {}", self.db_pool_max);
        tracing::info!("  CREATE_SCHEMA         : {}", self.create_schema);
        tracing::info!("  PLANTS_API_URL        : {}", self.api_url);
        tracing::info!(
            "  PLANT_ID range        : {}..={}",
            self.plant_id_start,
            self.plant_id_end
        );
        tracing::info!("  ARCHIVE_BUCKET        : {}", self.archive_bucket);
        tracing::info!("  ARCHIVE_KEY_PATTERN   : {}", self.archive_key_pattern);
        tracing::info!("  ARCHIVE_INTERVAL_SECS : {}", self.archive_interval_secs);
        tracing::info!("  AWS_REGION            : {:?}", self.aws_region);
        tracing::info!("  S3_ENDPOINT           : {:?}", self.s3_endpoint);
        tracing::info!("  S3_FORCE_PATH_STYLE   : {}", self.s3_force_path_style);
        tracing::info!("  SOIL_MOISTURE range   : {:?}", self.soil_moisture_range);
        tracing::info!("  TEMPERATURE range     : {:?}", self.temperature_range);
        tracing::info!("  ALERT_SOIL_MOISTURE_MAX: {}", self.alert_soil_moisture_max);
        tracing::info!("  ALERT_TEMPERATURE_MIN : {}", self.alert_temperature_min);
        tracing::info!("  LISTEN_PORT           : {}", self.listen_port);
    }
}

/// Replace the password in a connection URL with `****`.
pub fn mask_db_url(db_url: &str) -> String {
    // ---
    if let Some(at_pos) = db_url.rfind('@') {
        if let Some(colon_pos) = db_url[..at_pos].rfind(':') {
            // `postgres://host@...` has no password; the only colon is the scheme's.
            if !db_url[colon_pos..].starts_with("://") {
                return format!("{}:****{}", &db_url[..colon_pos], &db_url[at_pos..]);
            }
        }
    }
    db_url.to_string()
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn sample_config() -> Config {
        // ---
        Config {
            db_url: "postgres://plants:s3cret@db:5432/plants".to_string(),
            db_pool_max: 5,
            create_schema: true,
            api_url: "http://plants.local/api/plants".to_string(),
            plant_id_start: 1,
            plant_id_end: 50,
            archive_bucket: "plant-archive".to_string(),
            archive_key_pattern: DEFAULT_KEY_PATTERN.to_string(),
            archive_interval_secs: 0,
            aws_region: None,
            s3_endpoint: None,
            s3_force_path_style: false,
            soil_moisture_range: 10.0..=90.0,
            temperature_range: 0.0..=40.0,
            alert_soil_moisture_max: 50.0,
            alert_temperature_min: 15.0,
            listen_port: 8080,
        }
    }

    #[test]
    fn test_configured_ranges_reach_cleaning_rules() {
        // ---
        let settings = sample_config().pipeline_settings();

        assert_eq!(settings.cleaning.soil_moisture, 10.0..=90.0);
        assert_eq!(settings.cleaning.temperature, 0.0..=40.0);
        assert_eq!(
            settings.cleaning.mandatory_fields,
            CleaningRules::default().mandatory_fields
        );
    }

    #[test]
    fn test_cleaning_range_may_only_narrow() {
        // ---
        let bounds = 0.0..=100.0;

        assert_eq!(cleaning_range("SOIL_MOISTURE", 5.0, 95.0, &bounds).unwrap(), 5.0..=95.0);
        assert!(cleaning_range("SOIL_MOISTURE", 60.0, 40.0, &bounds).is_err());
        assert!(cleaning_range("SOIL_MOISTURE", -1.0, 100.0, &bounds).is_err());
        assert!(cleaning_range("SOIL_MOISTURE", 0.0, f64::NAN, &bounds).is_err());
    }

    #[test]
    fn test_password_is_masked() {
        // ---
        assert_eq!(
            mask_db_url("postgres://plants:s3cret@db:5432/plants"),
            "postgres://plants:****@db:5432/plants"
        );
    }

    #[test]
    fn test_url_without_password_is_unchanged() {
        // ---
        assert_eq!(mask_db_url("postgres://db:5432/plants"), "postgres://db:5432/plants");
        assert_eq!(mask_db_url("postgres://plants@db/plants"), "postgres://plants@db/plants");
    }
}
