use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;

/// Placeholder secret used when none is configured
pub const DEFAULT_SECRET_KEY: &str = "change-me";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthConfig {
    pub secret_key: String,
    pub access_token_expire_minutes: i64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Settings {
    /// Defaults, then `whose-round.toml` (optional), then `WHOSE_ROUND__*` env vars
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::load_from(File::with_name("whose-round").required(false))
    }

    fn load_from(file: File<config::FileSourceFile, config::FileFormat>) -> Result<Self> {
        let settings: Settings = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("database.path", "whose-round.db")?
            .set_default("auth.secret_key", DEFAULT_SECRET_KEY)?
            .set_default("auth.access_token_expire_minutes", 30)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .add_source(file)
            .add_source(Environment::with_prefix("WHOSE_ROUND").separator("__"))
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }

    pub fn uses_default_secret(&self) -> bool {
        self.auth.secret_key == DEFAULT_SECRET_KEY
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
