//! Server configuration from environment variables.

use std::str::FromStr;

use axum::http::HeaderValue;
use tracing::warn;

use lovejournal_core::defaults::{
    API_PORT, AUDIT_PRUNE_SCHEDULE, REAPER_SCHEDULE, STATS_SCHEDULE,
};
use lovejournal_core::{Environment, Error, Result};
use lovejournal_jobs::Schedule;

/// Which document store backs the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    /// Process-local store; data is lost on restart.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(StoreBackend::Postgres),
            "memory" | "in-memory" => Ok(StoreBackend::Memory),
            other => Err(Error::Config(format!("unknown STORE_BACKEND: {other}"))),
        }
    }
}

/// Job schedules, each overridable from the environment.
#[derive(Debug, Clone)]
pub struct JobSchedules {
    pub reaper: Schedule,
    pub audit_prune: Schedule,
    pub stats: Schedule,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub store_backend: StoreBackend,
    pub database_url: String,
    pub allowed_origins: Vec<HeaderValue>,
    /// Uids allowed to read job run history.
    pub admin_uids: Vec<String>,
    pub schedules: JobSchedules,
}

impl AppConfig {
    /// Read configuration from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `HOST` | `0.0.0.0` | Bind address |
    /// | `PORT` | `3000` | Bind port |
    /// | `APP_ENV` | `production` | `development` selects the `dev_` collections |
    /// | `STORE_BACKEND` | `postgres` | `postgres` or `memory` |
    /// | `DATABASE_URL` | `postgres://localhost/lovejournal` | PostgreSQL URL |
    /// | `CORS_ALLOWED_ORIGINS` | localhost dev origins | Comma-separated origins |
    /// | `ADMIN_UIDS` | (none) | Comma-separated uids allowed to read job history |
    /// | `REAPER_SCHEDULE` | `every day 02:00` | Account reaper schedule |
    /// | `AUDIT_PRUNE_SCHEDULE` | `every day 03:00` | Audit pruning schedule |
    /// | `STATS_SCHEDULE` | `every 6 hours` | Stats refresh schedule |
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = match std::env::var("PORT") {
            Ok(v) => v
                .parse()
                .map_err(|_| Error::Config(format!("invalid PORT: {v}")))?,
            Err(_) => API_PORT,
        };
        let store_backend = std::env::var("STORE_BACKEND")
            .map(|v| v.parse::<StoreBackend>())
            .unwrap_or(Ok(StoreBackend::Postgres))?;
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/lovejournal".to_string());

        Ok(Self {
            host,
            port,
            environment: Environment::from_env(),
            store_backend,
            database_url,
            allowed_origins: parse_allowed_origins(
                std::env::var("CORS_ALLOWED_ORIGINS").ok().as_deref(),
            ),
            admin_uids: parse_admin_uids(std::env::var("ADMIN_UIDS").ok().as_deref()),
            schedules: JobSchedules {
                reaper: schedule_from_env("REAPER_SCHEDULE", REAPER_SCHEDULE)?,
                audit_prune: schedule_from_env("AUDIT_PRUNE_SCHEDULE", AUDIT_PRUNE_SCHEDULE)?,
                stats: schedule_from_env("STATS_SCHEDULE", STATS_SCHEDULE)?,
            },
        })
    }

    /// `host:port` for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn schedule_from_env(var: &str, default: &str) -> Result<Schedule> {
    let raw = std::env::var(var).unwrap_or_else(|_| default.to_string());
    raw.parse::<Schedule>()
        .map_err(|e| Error::Config(format!("{var}: {e}")))
}

/// Parse a comma-separated uid list. Unset means nobody is an admin.
pub fn parse_admin_uids(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Parse a comma-separated origin list, skipping invalid entries.
///
/// Unset or empty falls back to the local development origins.
pub fn parse_allowed_origins(raw: Option<&str>) -> Vec<HeaderValue> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty());
    let Some(raw) = raw else {
        return ["http://localhost:3000", "http://localhost:5173"]
            .into_iter()
            .map(HeaderValue::from_static)
            .collect();
    };

    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_backend_parse() {
        assert_eq!("postgres".parse::<StoreBackend>().unwrap(), StoreBackend::Postgres);
        assert_eq!(" Memory ".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert!("redis".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_admin_uids() {
        assert!(parse_admin_uids(None).is_empty());
        assert!(parse_admin_uids(Some(" , ")).is_empty());
        assert_eq!(parse_admin_uids(Some("ops-1, ops-2,")), vec!["ops-1", "ops-2"]);
    }

    #[test]
    fn test_allowed_origins_default() {
        let origins = parse_allowed_origins(None);
        assert_eq!(origins.len(), 2);
        assert_eq!(origins[0], "http://localhost:3000");
        assert_eq!(parse_allowed_origins(Some("  ")).len(), 2);
    }

    #[test]
    fn test_allowed_origins_list() {
        let origins =
            parse_allowed_origins(Some("https://lovejournal.app, https://www.lovejournal.app,"));
        assert_eq!(origins.len(), 2);
        assert_eq!(origins[1], "https://www.lovejournal.app");
    }

    #[test]
    fn test_allowed_origins_skips_invalid() {
        let origins = parse_allowed_origins(Some("https://ok.example,bad\norigin"));
        assert_eq!(origins.len(), 1);
    }
}
