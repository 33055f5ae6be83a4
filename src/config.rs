use anyhow::Context;
use axum::http::HeaderValue;

use crate::AppResult;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_ORIGINS: &str = "http://localhost:5173";
pub const DEFAULT_LOG: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<HeaderValue>),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub allowed_origins: AllowedOrigins,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let host = lookup("RELAY_HOST").unwrap_or_else(|| DEFAULT_HOST.to_owned());
        let port = match lookup("RELAY_PORT") {
            Some(port) => port.trim().parse().with_context(|| format!("invalid RELAY_PORT {port:?}"))?,
            None => DEFAULT_PORT,
        };
        let origins = lookup("RELAY_ALLOWED_ORIGINS").unwrap_or_else(|| DEFAULT_ORIGINS.to_owned());
        let log_level = lookup("RELAY_LOG").unwrap_or_else(|| DEFAULT_LOG.to_owned());

        Ok(Self {
            host,
            port,
            allowed_origins: parse_origins(&origins)?,
            log_level,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            allowed_origins: AllowedOrigins::List(vec![HeaderValue::from_static(DEFAULT_ORIGINS)]),
            log_level: DEFAULT_LOG.to_owned(),
        }
    }
}

fn parse_origins(raw: &str) -> AppResult<AllowedOrigins> {
    let origins: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .collect();

    if origins.is_empty() || origins.contains(&"*") {
        return Ok(AllowedOrigins::Any);
    }

    let origins = origins
        .into_iter()
        .map(|origin| HeaderValue::from_str(origin).with_context(|| format!("invalid origin {origin:?}")))
        .collect::<Result<_, _>>()?;
    Ok(AllowedOrigins::List(origins))
}
