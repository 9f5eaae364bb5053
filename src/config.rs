//! Configuration module for uptrail.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Runtime-tunable settings (schedule interval, scheduler width) live in the
//! store's `settings` table instead.

use regex::Regex;
use std::env;
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Number of history rows kept across all targets.
pub const DEFAULT_HISTORY_LIMIT: i64 = 1_000_000;

/// Interval used to seed the settings table on first start.
pub const DEFAULT_SCHEDULE: &str = "@every 1m";

/// Longest accepted tick interval (365 days).
pub const MAX_SCHEDULE_PERIOD: Duration = Duration::from_secs(365 * 24 * 3600);

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path to the SQLite database file (default: "uptrail.db")
    pub db_path: String,
    /// Maximum number of probe history rows retained (default: 1,000,000)
    pub history_limit: i64,
    /// Schedule interval written to the store when none is stored yet
    pub default_schedule: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: "uptrail.db".to_string(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            default_schedule: DEFAULT_SCHEDULE.to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `UPTRAIL_DB_PATH`: Database file path (default: "uptrail.db")
    /// - `UPTRAIL_HISTORY_LIMIT`: History rows to retain (default: 1000000)
    /// - `UPTRAIL_SCHEDULE`: Initial schedule interval (default: "@every 1m")
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(db_path) = lookup("UPTRAIL_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Some(limit_str) = lookup("UPTRAIL_HISTORY_LIMIT") {
            match limit_str.parse::<i64>() {
                Ok(limit) if limit >= 1 => cfg.history_limit = limit,
                _ => tracing::warn!(
                    "Ignoring invalid UPTRAIL_HISTORY_LIMIT {:?}, using {}",
                    limit_str,
                    cfg.history_limit
                ),
            }
        }

        if let Some(schedule) = lookup("UPTRAIL_SCHEDULE") {
            cfg.default_schedule = schedule;
        }

        cfg
    }
}

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid schedule interval {0:?}, expected \"@every <n>(s|m|h)\"")]
    InvalidInterval(String),
}

/// A tick interval in `@every <n><unit>` form, e.g. `@every 30s`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleInterval {
    raw: String,
    period: Duration,
}

impl ScheduleInterval {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| {
            Regex::new(r"^@every\s+(?P<n>[0-9]+)(?P<unit>[smh])$").expect("valid interval regex")
        });

        let raw = raw.trim();
        let caps = re
            .captures(raw)
            .ok_or_else(|| ConfigError::InvalidInterval(raw.to_string()))?;

        let n: u64 = caps["n"]
            .parse()
            .map_err(|_| ConfigError::InvalidInterval(raw.to_string()))?;
        if n == 0 {
            return Err(ConfigError::InvalidInterval(raw.to_string()));
        }

        let secs = match &caps["unit"] {
            "s" => Some(n),
            "m" => n.checked_mul(60),
            _ => n.checked_mul(3600),
        }
        .filter(|secs| *secs <= MAX_SCHEDULE_PERIOD.as_secs())
        .ok_or_else(|| ConfigError::InvalidInterval(raw.to_string()))?;

        Ok(Self {
            raw: raw.to_string(),
            period: Duration::from_secs(secs),
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for ScheduleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.db_path, "uptrail.db");
        assert_eq!(cfg.history_limit, 1_000_000);
        assert_eq!(cfg.default_schedule, "@every 1m");
    }

    #[test]
    fn test_overrides_from_environment() {
        let vars: HashMap<&str, &str> = [
            ("UPTRAIL_DB_PATH", "/tmp/probe.db"),
            ("UPTRAIL_HISTORY_LIMIT", "500"),
            ("UPTRAIL_SCHEDULE", "@every 30s"),
        ]
        .into_iter()
        .collect();

        let cfg = ServerConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.db_path, "/tmp/probe.db");
        assert_eq!(cfg.history_limit, 500);
        assert_eq!(cfg.default_schedule, "@every 30s");
    }

    #[test]
    fn test_invalid_history_limit_keeps_default() {
        for bad in ["0", "-3", "lots"] {
            let cfg = ServerConfig::from_lookup(|k| {
                (k == "UPTRAIL_HISTORY_LIMIT").then(|| bad.to_string())
            });
            assert_eq!(cfg.history_limit, DEFAULT_HISTORY_LIMIT);
        }
    }

    #[test]
    fn test_schedule_interval_parse() {
        let interval = ScheduleInterval::parse("@every 30s").unwrap();
        assert_eq!(interval.period(), Duration::from_secs(30));
        assert_eq!(interval.to_string(), "@every 30s");

        assert_eq!(ScheduleInterval::parse("@every 5m").unwrap().period(), Duration::from_secs(300));
        assert_eq!(ScheduleInterval::parse(" @every 2h ").unwrap().period(), Duration::from_secs(7200));
    }

    #[test]
    fn test_schedule_interval_rejects() {
        for bad in ["", "1m", "@every", "@every 0s", "@every 10d", "*/5 * * * *", "@every -1m"] {
            assert!(ScheduleInterval::parse(bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_schedule_interval_upper_bound() {
        assert_eq!(ScheduleInterval::parse("@every 8760h").unwrap().period(), MAX_SCHEDULE_PERIOD);
        for bad in ["@every 8761h", "@every 31536001s", "@every 10000000000000000000s", "@every 99999999999999999999h"] {
            assert!(
                matches!(ScheduleInterval::parse(bad), Err(ConfigError::InvalidInterval(_))),
                "accepted {:?}",
                bad
            );
        }
    }
}
