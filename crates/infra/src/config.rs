//! Runtime configuration, read from the environment.

use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use pharmastock_core::UserId;

use crate::alerts::AlertScannerConfig;

pub const DATABASE_URL: &str = "DATABASE_URL";
pub const DB_MAX_CONNECTIONS: &str = "PHARMASTOCK_DB_MAX_CONNECTIONS";
pub const LOCK_WAIT_MS: &str = "PHARMASTOCK_LOCK_WAIT_MS";
pub const DEFAULT_LOW_STOCK_THRESHOLD: &str = "PHARMASTOCK_DEFAULT_LOW_STOCK_THRESHOLD";
pub const EXPIRY_WARNING_DAYS: &str = "PHARMASTOCK_EXPIRY_WARNING_DAYS";
pub const ALERT_SUPPRESSION_MINUTES: &str = "PHARMASTOCK_ALERT_SUPPRESSION_MINUTES";
pub const ALERT_RECIPIENTS: &str = "PHARMASTOCK_ALERT_RECIPIENTS";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockConfig {
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    /// Bound on waiting for a batch row lock.
    pub lock_wait: Duration,
    pub default_low_stock_threshold: i64,
    pub expiry_warning_days: u32,
    pub alert_suppression: Option<Duration>,
    pub alert_recipients: Vec<UserId>,
}

impl Default for StockConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            db_max_connections: 5,
            lock_wait: Duration::from_millis(3000),
            default_low_stock_threshold: 10,
            expiry_warning_days: 30,
            alert_suppression: None,
            alert_recipients: Vec::new(),
        }
    }
}

impl StockConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset or blank keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &'static str| {
            let value = lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
            if value.is_none() {
                debug!(key, "not set; using default");
            }
            value
        };
        let defaults = Self::default();

        let db_max_connections = match get(DB_MAX_CONNECTIONS) {
            Some(raw) => {
                let n: u32 = parse(DB_MAX_CONNECTIONS, &raw)?;
                if n == 0 {
                    return Err(invalid(DB_MAX_CONNECTIONS, "must be at least 1"));
                }
                n
            }
            None => defaults.db_max_connections,
        };

        let lock_wait = match get(LOCK_WAIT_MS) {
            Some(raw) => {
                // Postgres reads a zero lock_timeout as "wait forever".
                let ms: u64 = parse(LOCK_WAIT_MS, &raw)?;
                if ms == 0 {
                    return Err(invalid(LOCK_WAIT_MS, "must be at least 1"));
                }
                Duration::from_millis(ms)
            }
            None => defaults.lock_wait,
        };

        let default_low_stock_threshold = match get(DEFAULT_LOW_STOCK_THRESHOLD) {
            Some(raw) => {
                let n: i64 = parse(DEFAULT_LOW_STOCK_THRESHOLD, &raw)?;
                if n < 0 {
                    return Err(invalid(DEFAULT_LOW_STOCK_THRESHOLD, "must not be negative"));
                }
                n
            }
            None => defaults.default_low_stock_threshold,
        };

        let expiry_warning_days = match get(EXPIRY_WARNING_DAYS) {
            Some(raw) => parse(EXPIRY_WARNING_DAYS, &raw)?,
            None => defaults.expiry_warning_days,
        };

        let alert_suppression = match get(ALERT_SUPPRESSION_MINUTES) {
            Some(raw) => {
                let minutes: u64 = parse(ALERT_SUPPRESSION_MINUTES, &raw)?;
                (minutes > 0).then(|| Duration::from_secs(minutes.saturating_mul(60)))
            }
            None => None,
        };

        let alert_recipients = match get(ALERT_RECIPIENTS) {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<UserId>()
                        .map_err(|e| invalid(ALERT_RECIPIENTS, format!("'{s}': {e}")))
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        Ok(Self {
            database_url: get(DATABASE_URL),
            db_max_connections,
            lock_wait,
            default_low_stock_threshold,
            expiry_warning_days,
            alert_suppression,
            alert_recipients,
        })
    }

    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url.as_deref().ok_or(ConfigError::Missing(DATABASE_URL))
    }

    pub fn scanner_config(&self) -> AlertScannerConfig {
        let mut config = AlertScannerConfig::default()
            .with_default_low_stock_threshold(self.default_low_stock_threshold)
            .with_expiry_warning_days(self.expiry_warning_days);
        if let Some(window) = self.alert_suppression.and_then(|d| chrono::Duration::from_std(d).ok()) {
            config = config.with_suppression_window(window);
        }
        config
    }
}

fn parse<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: core::fmt::Display,
{
    raw.parse::<T>().map_err(|e| invalid(var, format!("'{raw}': {e}")))
}

fn invalid(var: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        reason: reason.into(),
    }
}
