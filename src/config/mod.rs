//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::game::GameConfig;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Simulation timing and seed
    pub game: GameConfig,

    /// Local snapshot file
    pub snapshot_path: PathBuf,
    /// Optional remote snapshot ledger
    pub ledger: Option<LedgerConfig>,
}

/// REST ledger connection settings
#[derive(Clone, Debug)]
pub struct LedgerConfig {
    pub url: String,
    pub api_key: String,
    pub table: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; every value is optional
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        };

        let defaults = GameConfig::default();
        let secs = |key: &'static str, default_ms: u64| -> Result<u64, ConfigError> {
            parse_or(&lookup, key, default_ms / 1_000)?
                .checked_mul(1_000)
                .ok_or(ConfigError::Invalid(key))
        };

        let game = GameConfig {
            tick_interval_ms: parse_or(&lookup, "TICK_INTERVAL_MS", defaults.tick_interval_ms)?,
            status_interval_ms: parse_or(&lookup, "STATUS_INTERVAL_MS", defaults.status_interval_ms)?,
            match_duration_ms: secs("MATCH_DURATION_SECS", defaults.match_duration_ms)?,
            intermission_duration_ms: secs(
                "INTERMISSION_DURATION_SECS",
                defaults.intermission_duration_ms,
            )?,
            seed: lookup("RNG_SEED")
                .map(|raw| raw.trim().parse().map_err(|_| ConfigError::Invalid("RNG_SEED")))
                .transpose()?,
        };
        if game.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("TICK_INTERVAL_MS"));
        }
        if game.status_interval_ms == 0 {
            return Err(ConfigError::Invalid("STATUS_INTERVAL_MS"));
        }

        let ledger = match (lookup("LEDGER_URL"), lookup("LEDGER_API_KEY")) {
            (Some(url), Some(api_key)) => Some(LedgerConfig {
                url,
                api_key,
                table: lookup("LEDGER_TABLE").unwrap_or_else(|| "game_snapshots".to_string()),
            }),
            (Some(_), None) => return Err(ConfigError::Missing("LEDGER_API_KEY")),
            _ => None,
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),

            game,

            snapshot_path: lookup("SNAPSHOT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("gamestate.json")),
            ledger,
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
