//! Runtime configuration read from the environment
//!
//! Values come from process environment variables, optionally seeded from a
//! `.env` file by the entry point.
//!
//! - `PORT` - Server port number (default: 8080)
//! - `DATABASE_URL` - Path to database file (default: "data.db")
//! - `PUBLIC_URL` - Base of shareable card links (default: "http://localhost:{PORT}")
//! - `SESSION_TTL_HOURS` - Session lifetime (default: 168, one week)
//! - `ADMIN_USERNAME` / `ADMIN_EMAIL` / `ADMIN_PASSWORD` - Bootstrap admin account,
//!   created only when `ADMIN_PASSWORD` is set

use std::env;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub public_url: String,
    pub session_ttl_hours: i64,
    pub admin: Option<AdminSeed>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            database_url: "data.db".to_string(),
            public_url: "http://localhost:8080".to_string(),
            session_ttl_hours: 168,
            admin: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let port = parse_var("PORT", defaults.port)?;
        let database_url = env::var("DATABASE_URL").unwrap_or(defaults.database_url);
        let public_url = env::var("PUBLIC_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| format!("http://localhost:{}", port));
        let session_ttl_hours = parse_var("SESSION_TTL_HOURS", defaults.session_ttl_hours)?;
        if session_ttl_hours <= 0 {
            return Err(ConfigError::Invalid {
                key: "SESSION_TTL_HOURS",
                value: session_ttl_hours.to_string(),
            });
        }

        let admin = env::var("ADMIN_PASSWORD")
            .ok()
            .filter(|password| !password.is_empty())
            .map(|password| AdminSeed {
                username: env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string()),
                email: env::var("ADMIN_EMAIL")
                    .unwrap_or_else(|_| "admin@cardfolio.local".to_string()),
                password,
            });

        Ok(Self {
            port,
            database_url,
            public_url,
            session_ttl_hours,
            admin,
        })
    }

    /// Shareable address of a public card
    pub fn card_url(&self, slug: &str) -> String {
        format!("{}/card/{}", self.public_url, slug)
    }
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}
