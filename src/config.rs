//! Service configuration.
//!
//! Consolidates the recognized options with validated defaults. Environment
//! parsing is provided as a convenience for binaries; flag wiring stays with
//! the surrounding transport layer.

use std::path::PathBuf;
use std::time::Duration;

use crate::game::entities::Chips;

/// Log verbosity for the service.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum DebugLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

impl DebugLevel {
    pub fn parse(s: &str) -> Option<DebugLevel> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Some(DebugLevel::Off),
            "error" => Some(DebugLevel::Error),
            "warn" => Some(DebugLevel::Warn),
            "info" => Some(DebugLevel::Info),
            "debug" => Some(DebugLevel::Debug),
            _ => None,
        }
    }

    /// The matching `log` filter.
    pub fn level_filter(&self) -> log::LevelFilter {
        match self {
            DebugLevel::Off => log::LevelFilter::Off,
            DebugLevel::Error => log::LevelFilter::Error,
            DebugLevel::Warn => log::LevelFilter::Warn,
            DebugLevel::Info => log::LevelFilter::Info,
            DebugLevel::Debug => log::LevelFilter::Debug,
        }
    }
}

/// Complete service configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// SQLite database file path.
    pub db_path: PathBuf,
    /// host:port the transport layer binds to.
    pub listen_address: String,
    pub debug_level: DebugLevel,
    /// Per-turn wall-clock budget before the engine auto-acts.
    pub default_time_bank: Duration,
    /// Chips handed to each player when a game starts.
    pub default_starting_chips: Chips,
    /// Event queue capacity; publishes drop when it is full.
    pub event_queue_size: usize,
    /// Number of event pipeline workers.
    pub event_worker_count: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("poker.db"),
            listen_address: "127.0.0.1:7777".to_string(),
            debug_level: DebugLevel::default(),
            default_time_bank: Duration::from_secs(30),
            default_starting_chips: 1000,
            event_queue_size: 1000,
            event_worker_count: 3,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            db_path: std::env::var("POKER_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            listen_address: std::env::var("POKER_LISTEN_ADDRESS")
                .unwrap_or(defaults.listen_address),
            debug_level: std::env::var("POKER_DEBUG_LEVEL")
                .ok()
                .and_then(|v| DebugLevel::parse(&v))
                .unwrap_or(defaults.debug_level),
            default_time_bank: Duration::from_secs(parse_env_or(
                "POKER_TIME_BANK_SECS",
                defaults.default_time_bank.as_secs(),
            )),
            default_starting_chips: parse_env_or(
                "POKER_STARTING_CHIPS",
                defaults.default_starting_chips,
            ),
            event_queue_size: parse_env_or("POKER_EVENT_QUEUE_SIZE", defaults.event_queue_size),
            event_worker_count: parse_env_or(
                "POKER_EVENT_WORKERS",
                defaults.event_worker_count,
            ),
        }
    }

    /// Validate the configuration after loading.
    pub fn validate(&self) -> Result<(), String> {
        if self.default_starting_chips <= 0 {
            return Err("starting chips must be positive".to_string());
        }
        if self.event_queue_size == 0 {
            return Err("event queue size must be at least 1".to_string());
        }
        if self.event_worker_count == 0 {
            return Err("event worker count must be at least 1".to_string());
        }
        if self.default_time_bank.is_zero() {
            return Err("time bank must be non-zero".to_string());
        }
        Ok(())
    }
}

/// Helper to parse an environment variable with a default fallback.
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_time_bank, Duration::from_secs(30));
        assert_eq!(config.default_starting_chips, 1000);
        assert_eq!(config.event_queue_size, 1000);
        assert_eq!(config.event_worker_count, 3);
    }

    #[test]
    fn test_debug_level_parse() {
        assert_eq!(DebugLevel::parse("off"), Some(DebugLevel::Off));
        assert_eq!(DebugLevel::parse("DEBUG"), Some(DebugLevel::Debug));
        assert_eq!(DebugLevel::parse("verbose"), None);
    }

    #[test]
    fn test_debug_level_filter_mapping() {
        assert_eq!(DebugLevel::Off.level_filter(), log::LevelFilter::Off);
        assert_eq!(DebugLevel::Debug.level_filter(), log::LevelFilter::Debug);
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = ServerConfig {
            event_worker_count: 0,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_positive_chips() {
        let config = ServerConfig {
            default_starting_chips: 0,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
