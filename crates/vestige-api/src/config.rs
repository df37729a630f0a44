//! Server configuration from environment variables.

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;
use vestige_core::defaults;

/// Everything the server binary reads from its environment.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `DATABASE_URL` | `postgres://localhost/vestige` | PostgreSQL connection string |
/// | `HOST` | `0.0.0.0` | Listen address |
/// | `PORT` | `3000` | Listen port |
/// | `REDIS_ENABLED` | `false` | Relay job events through Redis |
/// | `REDIS_URL` | `redis://localhost:6379` | Redis connection string |
/// | `STREAM_KEEPALIVE_SECS` | `30` | Keepalive interval on idle job streams |
/// | `EVENT_BUFFER_CAPACITY` | `100` | Per-subscriber event buffer |
/// | `ALLOWED_ORIGINS` | `http://localhost:3000` | Comma-separated CORS origins |
///
/// Job retention, sweep interval, and pool sizing are read by
/// `TrackerConfig`, `SweeperConfig`, and `PoolConfig` respectively.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub redis_enabled: bool,
    pub redis_url: String,
    pub stream_keepalive: Duration,
    pub event_buffer_capacity: usize,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: defaults::DATABASE_URL.to_string(),
            host: defaults::SERVER_HOST.to_string(),
            port: defaults::SERVER_PORT,
            redis_enabled: false,
            redis_url: defaults::REDIS_URL.to_string(),
            stream_keepalive: Duration::from_secs(defaults::STREAM_KEEPALIVE_SECS),
            event_buffer_capacity: defaults::EVENT_BUFFER_CAPACITY,
            allowed_origins: parse_origins(defaults::ALLOWED_ORIGINS),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            database_url: std::env::var("DATABASE_URL").unwrap_or(base.database_url),
            host: std::env::var("HOST").unwrap_or(base.host),
            port: env_or("PORT", base.port),
            redis_enabled: std::env::var("REDIS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(base.redis_enabled),
            redis_url: std::env::var("REDIS_URL").unwrap_or(base.redis_url),
            stream_keepalive: Duration::from_secs(
                env_or("STREAM_KEEPALIVE_SECS", defaults::STREAM_KEEPALIVE_SECS).max(1),
            ),
            event_buffer_capacity: env_or("EVENT_BUFFER_CAPACITY", base.event_buffer_capacity)
                .max(1),
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| parse_origins(&v))
                .filter(|origins| !origins.is_empty())
                .unwrap_or(base.allowed_origins),
        }
    }

    /// Socket address string for the listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse `name` from the environment, falling back to `default` when unset
/// or unparseable.
fn env_or<T>(name: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(
                subsystem = "api",
                component = "config",
                variable = name,
                value = %raw,
                "Invalid value, using default"
            );
            default
        }),
        Err(_) => default,
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
