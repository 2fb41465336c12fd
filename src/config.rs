use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    /// Endpoint receiving reset-code payloads; when unset, payloads are only logged.
    pub url: Option<String>,
    pub source: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub db_timeout: Duration,
    pub jwt: JwtConfig,
    pub notify: NotifyConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "keyward.local".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "keyward.local".into()),
        };
        let notify = NotifyConfig {
            url: std::env::var("NOTIFY_URL").ok().filter(|v| !v.is_empty()),
            source: std::env::var("NOTIFY_SOURCE")
                .unwrap_or_else(|_| "no-reply@keyward.local".into()),
        };
        Ok(Self {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "dev".into()),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("APP_PORT")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(8000),
            database_url,
            db_timeout: Duration::from_secs(
                std::env::var("DB_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(3),
            ),
            jwt,
            notify,
        })
    }
}
