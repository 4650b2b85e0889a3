use std::env;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use crate::cluster::SquareCheck;
use crate::coverage::ActivityFilter;
use crate::error::{ExplorerError, Result};

/// Runtime settings. Read from the environment (`.env` supported), then
/// individual values may be overridden from the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    pub track_dir: PathBuf,
    pub bind: SocketAddr,
    pub cache_capacity: NonZeroUsize,
    pub square_check: SquareCheck,
    pub activities: ActivityFilter,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("tiles.db"),
            track_dir: PathBuf::from("gpx"),
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            cache_capacity: NonZeroUsize::new(16).unwrap_or(NonZeroUsize::MIN),
            square_check: SquareCheck::Boundary,
            activities: ActivityFilter::all(),
        }
    }
}

impl Config {
    /// Load `.env` if present and read `EXPLORER_*` variables.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unset or empty variables keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Config::default();

        if let Some(path) = get("EXPLORER_DB") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(dir) = get("EXPLORER_TRACK_DIR") {
            config.track_dir = PathBuf::from(dir);
        }
        if let Some(bind) = get("EXPLORER_BIND") {
            config.bind = parse_bind(&bind)?;
        }
        if let Some(capacity) = get("EXPLORER_CACHE_CAPACITY") {
            config.cache_capacity = parse_capacity(&capacity)?;
        }
        if let Some(check) = get("EXPLORER_SQUARE_CHECK") {
            config.square_check = check.parse()?;
        }
        if let Some(list) = get("EXPLORER_ACTIVITIES") {
            config.activities = ActivityFilter::parse(&list);
        }

        Ok(config)
    }
}

pub fn parse_bind(value: &str) -> Result<SocketAddr> {
    value
        .trim()
        .parse()
        .map_err(|e| ExplorerError::Config(format!("invalid bind address '{}': {}", value, e)))
}

pub fn parse_capacity(value: &str) -> Result<NonZeroUsize> {
    value
        .trim()
        .parse::<NonZeroUsize>()
        .map_err(|e| ExplorerError::Config(format!("invalid cache capacity '{}': {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::ActivityType;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.cache_capacity.get(), 16);
        assert_eq!(config.bind.port(), 8080);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("EXPLORER_DB", "/tmp/explorer.db"),
            ("EXPLORER_TRACK_DIR", "exports"),
            ("EXPLORER_BIND", "0.0.0.0:9000"),
            ("EXPLORER_CACHE_CAPACITY", "4"),
            ("EXPLORER_SQUARE_CHECK", "filled"),
            ("EXPLORER_ACTIVITIES", "Run,Hike"),
            ("EXPLORER_UNUSED", "x"),
        ]))
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/explorer.db"));
        assert_eq!(config.track_dir, PathBuf::from("exports"));
        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.cache_capacity.get(), 4);
        assert_eq!(config.square_check, SquareCheck::Filled);
        assert!(config.activities.accepts(&ActivityType::Hike));
        assert!(!config.activities.accepts(&ActivityType::Ride));
    }

    #[test]
    fn test_empty_values_keep_defaults() {
        let config = Config::from_lookup(lookup(&[("EXPLORER_DB", "  ")])).unwrap();
        assert_eq!(config.db_path, PathBuf::from("tiles.db"));
    }

    #[test]
    fn test_invalid_values() {
        for (key, value) in [
            ("EXPLORER_CACHE_CAPACITY", "0"),
            ("EXPLORER_CACHE_CAPACITY", "many"),
            ("EXPLORER_BIND", "localhost"),
            ("EXPLORER_SQUARE_CHECK", "exact"),
        ] {
            let err = Config::from_lookup(lookup(&[(key, value)])).unwrap_err();
            assert!(matches!(err, ExplorerError::Config(_)), "{}={}", key, value);
        }
    }
}
