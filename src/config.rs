//! Service configuration.
//!
//! Values are layered: built-in defaults, then an optional YAML file, then
//! `DASHBOARD_*` environment variables, then command-line flags.

use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "DASHBOARD_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_path: PathBuf,
    /// JSON logs are written here when set; otherwise logs go to stdout.
    pub log_dir: Option<PathBuf>,
    pub log_format: LogFormat,
    pub log_level: String,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8787".to_string(),
            database_path: PathBuf::from("data/dashboard.sqlite"),
            log_dir: None,
            log_format: LogFormat::Pretty,
            log_level: "info".to_string(),
            default_page_size: 100,
            max_page_size: 500,
        }
    }
}

/// Flag values that win over every other source.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub bind_addr: Option<String>,
    pub database_path: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub log_format: Option<LogFormat>,
    pub log_level: Option<String>,
}

impl AppConfig {
    pub fn load(config_file: Option<&Path>, overrides: ConfigOverrides) -> AppResult<Self> {
        let mut config = match config_file {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|error| AppError::Io(format!("failed to read config {}: {}", path.display(), error)))?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> AppResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Applies `DASHBOARD_*` variables looked up through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|value| !value.trim().is_empty());

        if let Some(value) = var("BIND_ADDR") {
            self.bind_addr = value;
        }
        if let Some(value) = var("DATABASE_PATH") {
            self.database_path = PathBuf::from(value);
        }
        if let Some(value) = var("LOG_DIR") {
            self.log_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = var("LOG_FORMAT") {
            self.log_format = value.parse().map_err(AppError::Validation)?;
        }
        if let Some(value) = var("LOG_LEVEL") {
            self.log_level = value;
        }
        if let Some(value) = var("DEFAULT_PAGE_SIZE") {
            self.default_page_size = parse_page_size(&value, "DEFAULT_PAGE_SIZE")?;
        }
        if let Some(value) = var("MAX_PAGE_SIZE") {
            self.max_page_size = parse_page_size(&value, "MAX_PAGE_SIZE")?;
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(bind_addr) = overrides.bind_addr {
            self.bind_addr = bind_addr;
        }
        if let Some(database_path) = overrides.database_path {
            self.database_path = database_path;
        }
        if let Some(log_dir) = overrides.log_dir {
            self.log_dir = Some(log_dir);
        }
        if let Some(log_format) = overrides.log_format {
            self.log_format = log_format;
        }
        if let Some(log_level) = overrides.log_level {
            self.log_level = log_level;
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(AppError::Validation("databasePath cannot be empty".to_string()));
        }
        if self.default_page_size == 0 || self.max_page_size == 0 {
            return Err(AppError::Validation("page sizes must be positive".to_string()));
        }
        if self.default_page_size > self.max_page_size {
            return Err(AppError::Validation(format!(
                "defaultPageSize ({}) cannot exceed maxPageSize ({})",
                self.default_page_size, self.max_page_size
            )));
        }
        self.socket_addr()?;
        Ok(())
    }

    pub fn socket_addr(&self) -> AppResult<SocketAddr> {
        self.bind_addr
            .parse::<SocketAddr>()
            .map_err(|error| AppError::Validation(format!("invalid bindAddr '{}': {}", self.bind_addr, error)))
    }

    /// Resolves a requested page size against the configured bounds.
    pub fn page_size(&self, requested: Option<u32>) -> u32 {
        match requested {
            Some(0) | None => self.default_page_size,
            Some(value) => value.min(self.max_page_size),
        }
    }
}

fn parse_page_size(raw: &str, name: &str) -> AppResult<u32> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| AppError::Validation(format!("{}{} must be a positive integer", ENV_PREFIX, name)))
}
