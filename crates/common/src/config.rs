use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::AppError;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// HMAC secret used to verify bearer tokens
    pub jwt_secret: String,

    /// HTTP/WebSocket listening port (default: 8001)
    pub http_port: u16,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Upper bound on a single live push or replay push, in milliseconds (default: 2000)
    pub delivery_send_timeout_ms: u64,

    /// Depth of each session's outbound message queue (default: 64)
    pub session_outbound_buffer: usize,

    /// How far back pending replay looks, in days (default: 30)
    pub replay_window_days: i64,

    /// Maximum notifications replayed per connection (default: 50)
    pub replay_limit: i64,

    /// Whether the responsible party is part of the ingestion dedup key (default: false)
    pub dedup_includes_responsible: bool,
}

/// Upper bound for `REPLAY_WINDOW_DAYS`.
pub const MAX_REPLAY_WINDOW_DAYS: i64 = 3650;

/// Upper bound for `REPLAY_LIMIT`.
pub const MAX_REPLAY_LIMIT: i64 = 1000;

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: required_var("DATABASE_URL")?,
            jwt_secret: required_var("JWT_SECRET")?,
            http_port: parse_var("HTTP_PORT", "8001")?,
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", "20")?,
            delivery_send_timeout_ms: parse_var("DELIVERY_SEND_TIMEOUT_MS", "2000")?,
            session_outbound_buffer: parse_var("SESSION_OUTBOUND_BUFFER", "64")?,
            replay_window_days: in_range(
                "REPLAY_WINDOW_DAYS",
                parse_var("REPLAY_WINDOW_DAYS", "30")?,
                1..=MAX_REPLAY_WINDOW_DAYS,
            )?,
            replay_limit: in_range(
                "REPLAY_LIMIT",
                parse_var("REPLAY_LIMIT", "50")?,
                1..=MAX_REPLAY_LIMIT,
            )?,
            dedup_includes_responsible: parse_var("DEDUP_INCLUDES_RESPONSIBLE", "false")?,
        })
    }

    pub fn delivery_send_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.delivery_send_timeout_ms)
    }
}

fn required_var(name: &str) -> Result<String, AppError> {
    std::env::var(name)
        .map_err(|_| AppError::Config(format!("{name} environment variable is required")))
}

/// Read `name` from the environment (falling back to `default`) and parse it.
fn parse_var<T: FromStr>(name: &str, default: &str) -> Result<T, AppError> {
    parse_value(name, std::env::var(name).ok().as_deref().unwrap_or(default))
}

fn parse_value<T: FromStr>(name: &str, raw: &str) -> Result<T, AppError> {
    raw.trim().parse().map_err(|_| {
        AppError::Config(format!(
            "{} must be a valid {}",
            name,
            std::any::type_name::<T>()
        ))
    })
}

fn in_range(name: &str, value: i64, range: RangeInclusive<i64>) -> Result<i64, AppError> {
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(AppError::Config(format!(
            "{} must be between {} and {}, got {}",
            name,
            range.start(),
            range.end(),
            value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value::<u16>("HTTP_PORT", " 8001 ").unwrap(), 8001);
        assert!(parse_value::<bool>("DEDUP_INCLUDES_RESPONSIBLE", "true").unwrap());

        let err = parse_value::<u16>("HTTP_PORT", "eighty").unwrap_err();
        assert!(matches!(err, AppError::Config(msg) if msg.contains("HTTP_PORT")));
    }

    #[test]
    fn test_replay_settings_bounded() {
        assert_eq!(in_range("REPLAY_LIMIT", 50, 1..=MAX_REPLAY_LIMIT).unwrap(), 50);

        for bad in [0, -5, MAX_REPLAY_LIMIT + 1] {
            let err = in_range("REPLAY_LIMIT", bad, 1..=MAX_REPLAY_LIMIT).unwrap_err();
            assert!(matches!(err, AppError::Config(_)), "accepted {bad}");
        }

        let err = in_range("REPLAY_WINDOW_DAYS", 100_000_000, 1..=MAX_REPLAY_WINDOW_DAYS)
            .unwrap_err();
        assert!(err.to_string().contains("REPLAY_WINDOW_DAYS"));
    }
}
