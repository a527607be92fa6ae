//! Configuration loading from environment.

use std::env;
use std::net::{IpAddr, SocketAddr};

use chrono_tz::Tz;

use crate::error::{Result, StatsError};

pub const DEFAULT_DATABASE_PATH: &str = "appstat.db";
pub const DEFAULT_WEB_PORT: u16 = 5001;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Main configuration for the statistics service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite database file.
    pub database_path: String,
    /// Host the HTTP server binds to.
    pub web_host: IpAddr,
    /// Port the HTTP server binds to.
    pub web_port: u16,
    /// Timezone used for accounts that have none set.
    pub default_timezone: Tz,
    /// Apply pending schema migrations before serving.
    pub migrate_on_start: bool,
    /// Connection pool size.
    pub max_connections: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: DEFAULT_DATABASE_PATH.to_string(),
            web_host: IpAddr::from([0, 0, 0, 0]),
            web_port: DEFAULT_WEB_PORT,
            default_timezone: Tz::UTC,
            migrate_on_start: true,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional environment variables:
    /// - `DATABASE_PATH`: SQLite file (default: appstat.db)
    /// - `WEB_HOST`: bind address (default: 0.0.0.0)
    /// - `WEB_PORT`: bind port (default: 5001)
    /// - `DEFAULT_TIMEZONE`: IANA name for accounts without a timezone (default: UTC)
    /// - `MIGRATE_ON_START`: run schema upgrade before serving (default: true)
    /// - `DB_MAX_CONNECTIONS`: pool size (default: 5)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let database_path = lookup("DATABASE_PATH")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.database_path);

        let web_host = match lookup("WEB_HOST") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| StatsError::Config(format!("WEB_HOST is not an IP address: {}", raw)))?,
            None => defaults.web_host,
        };

        let web_port = match lookup("WEB_PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| StatsError::Config(format!("WEB_PORT is not a valid port: {}", raw)))?,
            None => defaults.web_port,
        };

        let default_timezone = match lookup("DEFAULT_TIMEZONE") {
            Some(raw) => raw.trim().parse::<Tz>().map_err(|_| {
                StatsError::Config(format!("DEFAULT_TIMEZONE is not a known timezone: {}", raw))
            })?,
            None => defaults.default_timezone,
        };

        let migrate_on_start = match lookup("MIGRATE_ON_START") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| {
                StatsError::Config(format!("MIGRATE_ON_START is not a boolean: {}", raw))
            })?,
            None => defaults.migrate_on_start,
        };

        let max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(StatsError::Config(format!(
                        "DB_MAX_CONNECTIONS must be a positive integer: {}",
                        raw
                    )))
                }
            },
            None => defaults.max_connections,
        };

        Ok(Self {
            database_path,
            web_host,
            web_port,
            default_timezone,
            migrate_on_start,
            max_connections,
        })
    }

    /// Socket address the HTTP server binds to.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.web_host, self.web_port)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
