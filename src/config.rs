//! Environment-only configuration. No flags, no prompts.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Root directory holding hot/, warm/ and cold/.
    pub data_root: PathBuf,
    /// Warm rotations per reduce.
    pub reduce_threshold: i64,
    /// Reduces between session bloom clears.
    pub bloom_reset_interval: u64,
    /// Capacity of the remote-push queue.
    pub push_queue_size: usize,
    /// Max wait for the pusher to drain on shutdown.
    pub shutdown_deadline: Duration,
    /// Completed matches per hot file before internal rotation.
    pub rotate_match_limit: u32,
    /// Wall-clock age of the hot file before internal rotation.
    pub rotate_interval: Duration,
    /// SQLite aggregate store path.
    pub stats_db_path: PathBuf,
}

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|raw| raw.parse::<T>().ok())
        .unwrap_or(default)
}

impl CollectorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_root = env::var("DATA_ROOT")
            .map(PathBuf::from)
            .map_err(|_| ConfigError::MissingVariable("DATA_ROOT".to_string()))?;

        let reduce_threshold = env_parsed("REDUCE_THRESHOLD", 10i64);
        if reduce_threshold < 1 {
            return Err(ConfigError::InvalidValue(
                "REDUCE_THRESHOLD must be at least 1".to_string(),
            ));
        }

        let stats_db_path = env::var("STATS_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_root.join("stats.db"));

        Ok(Self {
            reduce_threshold,
            bloom_reset_interval: env_parsed("BLOOM_RESET_INTERVAL", 5u64).max(1),
            push_queue_size: env_parsed("PUSH_QUEUE_SIZE", 10usize).max(1),
            shutdown_deadline: Duration::from_secs(env_parsed("SHUTDOWN_DEADLINE", 30u64)),
            rotate_match_limit: env_parsed("ROTATE_MATCH_LIMIT", 25u32).max(1),
            rotate_interval: Duration::from_secs(env_parsed("ROTATE_INTERVAL_SECS", 300u64)),
            stats_db_path,
            data_root,
        })
    }

    pub fn hot_dir(&self) -> PathBuf {
        self.data_root.join("hot")
    }

    pub fn warm_dir(&self) -> PathBuf {
        self.data_root.join("warm")
    }

    pub fn cold_dir(&self) -> PathBuf {
        self.data_root.join("cold")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment access is process-global; keep every assertion in one test
    #[test]
    fn test_from_env_defaults_and_overrides() {
        env::remove_var("DATA_ROOT");
        assert!(matches!(
            CollectorConfig::from_env(),
            Err(ConfigError::MissingVariable(_))
        ));

        env::set_var("DATA_ROOT", "/tmp/matchflow-test");
        env::set_var("REDUCE_THRESHOLD", "3");
        env::remove_var("PUSH_QUEUE_SIZE");
        env::remove_var("STATS_DB_PATH");

        let config = CollectorConfig::from_env().unwrap();
        assert_eq!(config.reduce_threshold, 3);
        assert_eq!(config.push_queue_size, 10);
        assert_eq!(config.warm_dir(), PathBuf::from("/tmp/matchflow-test/warm"));
        assert_eq!(config.stats_db_path, PathBuf::from("/tmp/matchflow-test/stats.db"));

        env::set_var("REDUCE_THRESHOLD", "0");
        assert!(matches!(
            CollectorConfig::from_env(),
            Err(ConfigError::InvalidValue(_))
        ));

        env::remove_var("DATA_ROOT");
        env::remove_var("REDUCE_THRESHOLD");
    }
}
