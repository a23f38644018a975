//! Runtime configuration, read from `PARKIT_*` environment variables.

use anyhow::{ensure, Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_DB_PATH: &str = "parking.db";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_RECURRING_THRESHOLD: u32 = 1;
const DEFAULT_CAR_SPOTS: u32 = 3;
const DEFAULT_BIKE_SPOTS: u32 = 2;

#[derive(Debug, Clone)]
pub struct ParkingConfig {
    /// SQLite database file (`:memory:` for a throwaway database)
    pub db_path: PathBuf,
    /// Listen address of the REST server
    pub bind_addr: SocketAddr,
    /// Completed visits needed before the loyalty discount applies
    pub recurring_threshold: u32,
    /// Car spots created when the database has no spots yet
    pub seed_car_spots: u32,
    /// Bike spots created when the database has no spots yet
    pub seed_bike_spots: u32,
    pub logging: LoggingConfig,
}

impl Default for ParkingConfig {
    fn default() -> Self {
        ParkingConfig {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            bind_addr: DEFAULT_BIND_ADDR
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 3000))),
            recurring_threshold: DEFAULT_RECURRING_THRESHOLD,
            seed_car_spots: DEFAULT_CAR_SPOTS,
            seed_bike_spots: DEFAULT_BIKE_SPOTS,
            logging: LoggingConfig::default(),
        }
    }
}

impl ParkingConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup, falling back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = lookup("PARKIT_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        if let Some(addr) = lookup("PARKIT_BIND_ADDR") {
            config.bind_addr = addr
                .parse()
                .with_context(|| format!("PARKIT_BIND_ADDR is not a socket address: {}", addr))?;
        }

        if let Some(value) = lookup("PARKIT_RECURRING_THRESHOLD") {
            config.recurring_threshold = parse_u32("PARKIT_RECURRING_THRESHOLD", &value)?;
        }

        if let Some(value) = lookup("PARKIT_SEED_CAR_SPOTS") {
            config.seed_car_spots = parse_u32("PARKIT_SEED_CAR_SPOTS", &value)?;
        }

        if let Some(value) = lookup("PARKIT_SEED_BIKE_SPOTS") {
            config.seed_bike_spots = parse_u32("PARKIT_SEED_BIKE_SPOTS", &value)?;
        }

        if let Some(level) = lookup("PARKIT_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Some(format) = lookup("PARKIT_LOG_FORMAT") {
            config.logging.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                _ => config.logging.format,
            };
        }

        Ok(config)
    }

    /// Fail fast on settings that would make the lot unusable
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.recurring_threshold > 0,
            "PARKIT_RECURRING_THRESHOLD must be at least 1"
        );
        ensure!(
            self.seed_car_spots + self.seed_bike_spots > 0,
            "the default spot layout must contain at least one spot"
        );
        Ok(())
    }
}

fn parse_u32(key: &str, value: &str) -> Result<u32> {
    value
        .trim()
        .parse()
        .with_context(|| format!("{} must be a non-negative integer, got '{}'", key, value))
}

// ============================================================================
// LOGGING CONFIG
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` wins when set
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
