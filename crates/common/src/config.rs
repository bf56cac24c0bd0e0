use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::models::Mode;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime settings, read from the environment (and `.env` via dotenvy).
#[derive(Debug, Clone)]
pub struct Settings {
    pub stream_url: String,
    pub client_name: String,
    pub broker_base_url: String,
    pub broker_api_key: String,
    pub broker_api_secret: String,
    pub default_mode: Mode,
    pub confidence_threshold: f64,
    pub default_quantity: u32,
    pub max_retries: u32,
    pub heartbeat_interval: Duration,
    pub broker_timeout: Duration,
    pub status_interval: Duration,
    pub shutdown_grace: Duration,
    pub ledger_path: String,
    pub control_addr: SocketAddr,
    pub log_level: String,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &'static str, default: &str| -> String {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let required = |key: &'static str| -> Result<String, ConfigError> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let confidence_threshold: f64 = parse(&lookup, "CONFIDENCE_THRESHOLD", 0.70)?;
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(invalid(
                "CONFIDENCE_THRESHOLD",
                confidence_threshold,
                "must be within [0, 1]",
            ));
        }

        let default_quantity: u32 = parse(&lookup, "DEFAULT_QUANTITY", 1)?;
        if default_quantity == 0 {
            return Err(invalid("DEFAULT_QUANTITY", 0, "must be positive"));
        }

        Ok(Self {
            stream_url: text("WEBSOCKET_URL", "ws://websocket_signal_server:8004"),
            client_name: text("CLIENT_NAME", "auto-trader"),
            broker_base_url: text("ALPACA_BASE_URL", "https://paper-api.alpaca.markets"),
            broker_api_key: required("ALPACA_API_KEY")?,
            broker_api_secret: required("ALPACA_API_SECRET")?,
            default_mode: parse(&lookup, "TRADE_MODE", Mode::Manual)?,
            confidence_threshold,
            default_quantity,
            max_retries: parse(&lookup, "MAX_RETRIES", 3)?,
            heartbeat_interval: positive_secs(&lookup, "HEARTBEAT_INTERVAL", 30)?,
            broker_timeout: positive_secs(&lookup, "BROKER_TIMEOUT_SECS", 10)?,
            status_interval: positive_secs(&lookup, "STATUS_INTERVAL_SECS", 300)?,
            shutdown_grace: Duration::from_secs(parse(&lookup, "SHUTDOWN_GRACE_SECS", 10)?),
            ledger_path: text("TRADE_LEDGER_PATH", "data/trade_history.db"),
            control_addr: parse(&lookup, "CONTROL_ADDR", SocketAddr::from(([0, 0, 0, 0], 8000)))?,
            log_level: text("LOG_LEVEL", "info"),
        })
    }
}

fn parse<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            value: raw,
            reason: e.to_string(),
        }),
    }
}

/// Seconds that must be non-zero; timers and timeouts cannot run on zero.
fn positive_secs<F>(lookup: &F, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse(lookup, key, default)? {
        0 => Err(invalid(key, 0, "must be positive")),
        secs => Ok(Duration::from_secs(secs)),
    }
}

fn invalid(key: &'static str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
