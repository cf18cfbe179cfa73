use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// Runtime settings, read from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    /// Where uploaded bot credentials are written.
    pub upload_dir: PathBuf,
    /// Static landing page, served for every non-API path.
    pub public_dir: PathBuf,
    pub delivery_delay: Duration,
    pub max_upload_bytes: usize,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

fn parse_var<T>(name: &str, default: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var_or(name, default)
        .parse()
        .with_context(|| format!("{} is not a valid value", name))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port = match std::env::var("BOTDECK_PORT").or_else(|_| std::env::var("PORT")) {
            Ok(v) => v.parse().context("BOTDECK_PORT is not a valid port")?,
            Err(_) => 3000,
        };

        Ok(Self {
            host: var_or("BOTDECK_HOST", "0.0.0.0"),
            port,
            db_path: var_or("BOTDECK_DB_PATH", "botdeck.db").into(),
            upload_dir: var_or("BOTDECK_UPLOAD_DIR", "./uploads").into(),
            public_dir: var_or("BOTDECK_PUBLIC_DIR", "./public").into(),
            delivery_delay: Duration::from_millis(parse_var("BOTDECK_DELIVERY_DELAY_MS", "2000")?),
            max_upload_bytes: parse_var("BOTDECK_MAX_UPLOAD_BYTES", "1048576")?,
        })
    }
}
