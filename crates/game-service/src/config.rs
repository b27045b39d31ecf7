//! Game service configuration.
//!
//! Configuration is loaded from environment variables. The database URL is
//! redacted in Debug output.

use crate::game::room::{
    RoomSettings, DEFAULT_CLIENT_EVENT_BUFFER, DEFAULT_ROOM_MSG_BUFFER,
};
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default host id recorded on rooms created by this process.
pub const DEFAULT_HOST_ID: u32 = 1;

/// Default number of room id draws before creation gives up.
pub const DEFAULT_RETRY_COUNT: u32 = 5;

/// Default upper bound for random room numbers.
pub const DEFAULT_MAX_ROOM_NUMBER: i32 = 999;

/// Default client inactivity deadline in seconds.
pub const DEFAULT_CLIENT_DEADLINE_SECONDS: u64 = 30;

/// Default database pool size.
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

/// Default Prometheus scrape address.
pub const DEFAULT_METRICS_BIND_ADDRESS: &str = "0.0.0.0:9090";

/// Settings shared by every application's repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameConfig {
    /// Host id written into each room record.
    pub host_id: u32,

    /// Room id draws per creation before failing.
    pub retry_count: u32,

    /// Room numbers are drawn from `[1, max_room_number]`.
    pub max_room_number: i32,

    /// Room queue, event buffer and default deadline.
    pub room: RoomSettings,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            host_id: DEFAULT_HOST_ID,
            retry_count: DEFAULT_RETRY_COUNT,
            max_room_number: DEFAULT_MAX_ROOM_NUMBER,
            room: RoomSettings::default(),
        }
    }
}

/// Game service configuration.
#[derive(Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    /// Protected by `SecretString` to prevent accidental logging.
    pub database_url: SecretString,

    /// Maximum connections in the database pool (default: 10).
    pub db_max_connections: u32,

    /// Prometheus scrape listener (default: "0.0.0.0:9090").
    pub metrics_bind_address: String,

    pub game: GameConfig,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("db_max_connections", &self.db_max_connections)
            .field("metrics_bind_address", &self.metrics_bind_address)
            .field("game", &self.game)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = SecretString::from(
            vars.get("DATABASE_URL")
                .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?
                .clone(),
        );

        let metrics_bind_address = vars
            .get("GAME_METRICS_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_METRICS_BIND_ADDRESS.to_string());

        let host_id = parse_var(vars, "GAME_HOST_ID", DEFAULT_HOST_ID)?;
        let retry_count = parse_var(vars, "GAME_RETRY_COUNT", DEFAULT_RETRY_COUNT)?;
        let db_max_connections =
            parse_var(vars, "GAME_DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?;

        let max_room_number = parse_var(vars, "GAME_MAX_ROOM_NUMBER", DEFAULT_MAX_ROOM_NUMBER)?;
        if max_room_number < 1 {
            return Err(ConfigError::InvalidValue(format!(
                "GAME_MAX_ROOM_NUMBER must be at least 1, got {max_room_number}"
            )));
        }

        let deadline_secs = parse_var(
            vars,
            "GAME_DEFAULT_CLIENT_DEADLINE_SECONDS",
            DEFAULT_CLIENT_DEADLINE_SECONDS,
        )?;
        let msg_buffer = parse_nonzero(vars, "GAME_ROOM_MSG_BUFFER", DEFAULT_ROOM_MSG_BUFFER)?;
        let event_buffer =
            parse_nonzero(vars, "GAME_CLIENT_EVENT_BUFFER", DEFAULT_CLIENT_EVENT_BUFFER)?;

        Ok(Config {
            database_url,
            db_max_connections,
            metrics_bind_address,
            game: GameConfig {
                host_id,
                retry_count,
                max_room_number,
                room: RoomSettings {
                    default_client_deadline: Duration::from_secs(deadline_secs),
                    msg_buffer,
                    event_buffer,
                },
            },
        })
    }
}

fn parse_var<T: FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{name}={raw}"))),
        None => Ok(default),
    }
}

fn parse_nonzero(
    vars: &HashMap<String, String>,
    name: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    let value = parse_var(vars, name, default)?;
    if value == 0 {
        return Err(ConfigError::InvalidValue(format!("{name} must be non-zero")));
    }
    Ok(value)
}
