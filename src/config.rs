use std::env;
use std::time::Duration;

use crate::error::EngineError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub match_expiry_hours: i64,
    pub sweep_interval_secs: u64,
    pub notification_queue_size: usize,
    pub event_buffer_size: usize,
    pub operation_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            match_expiry_hours: 48,
            sweep_interval_secs: 300,
            notification_queue_size: 1024,
            event_buffer_size: 1024,
            operation_timeout_ms: 5_000,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, EngineError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            match_expiry_hours: parse_or_default("MATCH_EXPIRY_HOURS", defaults.match_expiry_hours)?,
            sweep_interval_secs: parse_or_default(
                "SWEEP_INTERVAL_SECS",
                defaults.sweep_interval_secs,
            )?,
            notification_queue_size: parse_or_default(
                "NOTIFICATION_QUEUE_SIZE",
                defaults.notification_queue_size,
            )?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            operation_timeout_ms: parse_or_default(
                "OPERATION_TIMEOUT_MS",
                defaults.operation_timeout_ms,
            )?,
        };

        if config.match_expiry_hours <= 0 {
            return Err(EngineError::Internal(
                "MATCH_EXPIRY_HOURS must be > 0".to_string(),
            ));
        }
        if config.notification_queue_size == 0 || config.event_buffer_size == 0 {
            return Err(EngineError::Internal(
                "queue and buffer sizes must be > 0".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, EngineError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| EngineError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
