use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::HeaderName;

use matchline_api::state::Settings;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub identity_header: HeaderName,
    pub recent_ttl: Duration,
    pub socket_write_timeout: Duration,
    /// Single allowed origin. Unset means permissive CORS.
    pub cors_origin: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port = var("MATCHLINE_PORT", "3000");
        let header = var("MATCHLINE_IDENTITY_HEADER", "x-authenticated-user");
        let ttl = var("MATCHLINE_RECENT_TTL_SECS", "900");
        let write_timeout = var("MATCHLINE_SOCKET_WRITE_TIMEOUT_MS", "5000");

        Ok(Self {
            host: var("MATCHLINE_HOST", "0.0.0.0"),
            port: port
                .parse()
                .with_context(|| format!("MATCHLINE_PORT must be a port number, got '{}'", port))?,
            db_path: var("MATCHLINE_DB_PATH", "matchline.db").into(),
            identity_header: HeaderName::try_from(header.to_lowercase())
                .with_context(|| format!("MATCHLINE_IDENTITY_HEADER is not a valid header name: '{}'", header))?,
            recent_ttl: Duration::from_secs(
                ttl.parse()
                    .with_context(|| format!("MATCHLINE_RECENT_TTL_SECS must be whole seconds, got '{}'", ttl))?,
            ),
            socket_write_timeout: Duration::from_millis(write_timeout.parse().with_context(|| {
                format!(
                    "MATCHLINE_SOCKET_WRITE_TIMEOUT_MS must be whole milliseconds, got '{}'",
                    write_timeout
                )
            })?),
            cors_origin: lookup("MATCHLINE_CORS_ORIGIN").filter(|v| !v.trim().is_empty()),
        })
    }

    pub fn settings(&self) -> Settings {
        Settings {
            identity_header: self.identity_header.clone(),
            recent_ttl: self.recent_ttl,
            socket_write_timeout: self.socket_write_timeout,
        }
    }
}
