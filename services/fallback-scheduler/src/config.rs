//! Environment-driven configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use fallback_reconcile::{
    DEFAULT_LEDGER_TTL, DEFAULT_MAX_RETRIES, DEFAULT_RECONCILE_INTERVAL, DEFAULT_RETRY_DELAY,
    DEFAULT_STUCK_THRESHOLD_MINUTES, DEFAULT_TRIGGER_DELAY,
};
use thiserror::Error;

use crate::compute::Credential;

/// Rule file name inside the data directory.
pub const RULES_FILE_NAME: &str = "cluster-fallback-configs.json";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub scheduler: SchedulerConfig,
    pub compute: ComputeConfig,
    pub rules_path: PathBuf,
}

/// Settings read once at startup by the reconciliation scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval: Duration,
    pub stuck_threshold_minutes: u64,
    pub trigger_max_retries: u32,
    pub trigger_retry_delay: Duration,
    pub trigger_delay: Duration,
    pub ledger_ttl: Duration,

    /// Platform credential. Cycles do not run without it.
    pub credential: Option<Credential>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: DEFAULT_RECONCILE_INTERVAL,
            stuck_threshold_minutes: DEFAULT_STUCK_THRESHOLD_MINUTES,
            trigger_max_retries: DEFAULT_MAX_RETRIES,
            trigger_retry_delay: DEFAULT_RETRY_DELAY,
            trigger_delay: DEFAULT_TRIGGER_DELAY,
            ledger_ttl: DEFAULT_LEDGER_TTL,
            credential: None,
        }
    }
}

/// Compute platform connection settings.
#[derive(Debug, Clone)]
pub struct ComputeConfig {
    pub api_url: String,

    /// Per-call timeout.
    pub timeout: Duration,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8080".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = SchedulerConfig::default();

        let enabled = lookup("JOB_FALLBACK_ENABLED")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let stuck_threshold_minutes = parse_or(
            &lookup,
            "JOB_FALLBACK_STUCK_THRESHOLD_MINUTES",
            defaults.stuck_threshold_minutes,
        )?;
        let trigger_max_retries = parse_or(
            &lookup,
            "JOB_FALLBACK_TRIGGER_MAX_RETRIES",
            defaults.trigger_max_retries,
        )?;
        let trigger_retry_delay = millis_or(
            &lookup,
            "JOB_FALLBACK_TRIGGER_RETRY_DELAY_MS",
            defaults.trigger_retry_delay,
        )?;
        let trigger_delay = millis_or(
            &lookup,
            "JOB_FALLBACK_TRIGGER_DELAY_MS",
            defaults.trigger_delay,
        )?;
        let interval = Duration::from_secs(parse_or(
            &lookup,
            "JOB_FALLBACK_INTERVAL_SECS",
            defaults.interval.as_secs(),
        )?);
        let ledger_ttl = minutes_or(
            &lookup,
            "JOB_FALLBACK_LEDGER_TTL_MINUTES",
            defaults.ledger_ttl,
        )?;

        if interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "JOB_FALLBACK_INTERVAL_SECS",
                value: "0".to_string(),
                reason: "interval must be positive".to_string(),
            });
        }

        let credential = lookup("SERVICE_API_TOKEN")
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .map(Credential::new);

        let compute_defaults = ComputeConfig::default();
        let api_url = lookup("COMPUTE_API_URL").unwrap_or(compute_defaults.api_url);
        let timeout = Duration::from_secs(parse_or(
            &lookup,
            "COMPUTE_API_TIMEOUT_SECS",
            compute_defaults.timeout.as_secs(),
        )?);

        let rules_path = match lookup("FALLBACK_RULES_FILE") {
            Some(path) => PathBuf::from(path),
            None => {
                let data_dir = lookup("FALLBACK_DATA_DIR").unwrap_or_else(|| "./data".to_string());
                PathBuf::from(data_dir).join(RULES_FILE_NAME)
            }
        };

        let log_level = lookup("FALLBACK_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            log_level,
            scheduler: SchedulerConfig {
                enabled,
                interval,
                stuck_threshold_minutes,
                trigger_max_retries,
                trigger_retry_delay,
                trigger_delay,
                ledger_ttl,
                credential,
            },
            compute: ComputeConfig { api_url, timeout },
            rules_path,
        })
    }
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::Invalid {
                var,
                reason: e.to_string(),
                value,
            }),
    }
}

fn millis_or<F>(lookup: &F, var: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parse_or(lookup, var, default_ms).map(Duration::from_millis)
}

fn minutes_or<F>(lookup: &F, var: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let minutes: u64 = parse_or(lookup, var, default.as_secs() / 60)?;
    minutes
        .checked_mul(60)
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::Invalid {
            var,
            value: minutes.to_string(),
            reason: "number of minutes too large".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert!(!config.scheduler.enabled);
        assert_eq!(config.scheduler.stuck_threshold_minutes, 60);
        assert_eq!(config.scheduler.trigger_max_retries, 3);
        assert_eq!(config.scheduler.trigger_retry_delay, Duration::from_millis(3000));
        assert_eq!(config.scheduler.trigger_delay, Duration::from_millis(5000));
        assert_eq!(config.scheduler.interval, Duration::from_secs(300));
        assert_eq!(config.scheduler.ledger_ttl, Duration::from_secs(3600));
        assert!(config.scheduler.credential.is_none());
        assert_eq!(config.compute.timeout, Duration::from_secs(30));
        assert_eq!(
            config.rules_path,
            PathBuf::from("./data").join(RULES_FILE_NAME)
        );
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("JOB_FALLBACK_ENABLED", "TRUE"),
            ("JOB_FALLBACK_STUCK_THRESHOLD_MINUTES", "15"),
            ("JOB_FALLBACK_TRIGGER_MAX_RETRIES", "5"),
            ("JOB_FALLBACK_TRIGGER_RETRY_DELAY_MS", "250"),
            ("JOB_FALLBACK_TRIGGER_DELAY_MS", "1000"),
            ("JOB_FALLBACK_INTERVAL_SECS", "60"),
            ("SERVICE_API_TOKEN", " secret "),
            ("COMPUTE_API_URL", "https://platform.example.com"),
            ("FALLBACK_DATA_DIR", "/var/lib/fallback"),
        ])
        .unwrap();

        assert!(config.scheduler.enabled);
        assert_eq!(config.scheduler.stuck_threshold_minutes, 15);
        assert_eq!(config.scheduler.trigger_max_retries, 5);
        assert_eq!(config.scheduler.trigger_retry_delay, Duration::from_millis(250));
        assert_eq!(config.scheduler.trigger_delay, Duration::from_secs(1));
        assert_eq!(config.scheduler.interval, Duration::from_secs(60));
        assert_eq!(
            config.scheduler.credential.as_ref().map(Credential::bearer),
            Some("Bearer secret".to_string())
        );
        assert_eq!(config.compute.api_url, "https://platform.example.com");
        assert_eq!(
            config.rules_path,
            PathBuf::from("/var/lib/fallback/cluster-fallback-configs.json")
        );
    }

    #[test]
    fn test_rules_file_overrides_data_dir() {
        let config = config_from(&[
            ("FALLBACK_DATA_DIR", "/var/lib/fallback"),
            ("FALLBACK_RULES_FILE", "/etc/fallback/rules.json"),
        ])
        .unwrap();
        assert_eq!(config.rules_path, PathBuf::from("/etc/fallback/rules.json"));
    }

    #[test]
    fn test_blank_token_is_missing() {
        let config = config_from(&[("SERVICE_API_TOKEN", "   ")]).unwrap();
        assert!(config.scheduler.credential.is_none());
    }

    #[test]
    fn test_invalid_number() {
        let err = config_from(&[("JOB_FALLBACK_STUCK_THRESHOLD_MINUTES", "an hour")]).unwrap_err();
        assert!(err.to_string().contains("JOB_FALLBACK_STUCK_THRESHOLD_MINUTES"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(config_from(&[("JOB_FALLBACK_INTERVAL_SECS", "0")]).is_err());
    }

    #[test]
    fn test_oversized_ledger_ttl_rejected() {
        let err = config_from(&[("JOB_FALLBACK_LEDGER_TTL_MINUTES", "400000000000000000")])
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                var: "JOB_FALLBACK_LEDGER_TTL_MINUTES",
                ..
            }
        ));

        let config = config_from(&[("JOB_FALLBACK_LEDGER_TTL_MINUTES", "90")]).unwrap();
        assert_eq!(config.scheduler.ledger_ttl, Duration::from_secs(90 * 60));
    }
}
