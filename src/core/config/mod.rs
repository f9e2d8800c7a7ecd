//! core::config
//!
//! Configuration schema and loading.
//!
//! # Overview
//!
//! A single TOML document describes the deployment repository, the service
//! catalog and logging. Unlike most tools, there are no built-in defaults for
//! the catalog, so a missing file is an error.
//!
//! # Locations
//!
//! Searched in order, first hit wins:
//! 1. An explicit path (the `--config` flag)
//! 2. `$RELEASEGATE_CONFIG` if set
//! 3. `$XDG_CONFIG_HOME/releasegate/config.toml`
//! 4. `~/.releasegate/config.toml`
//! 5. `./releasegate.toml`
//!
//! An explicit path or `$RELEASEGATE_CONFIG` that does not exist is reported
//! as a read error rather than silently skipped.
//!
//! # Example
//!
//! ```no_run
//! use releasegate::core::config::Config;
//!
//! let config = Config::load(None).unwrap();
//! for service in &config.settings.services {
//!     println!("{}", service.name);
//! }
//! println!("loaded from {}", config.loaded_from().display());
//! ```

pub mod schema;

pub use schema::{EngineConfig, Environment, GitHubSettings, LoggingSettings, Service};

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "RELEASEGATE_CONFIG";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("no config file found (searched: {})", display_paths(.searched))]
    NotFound { searched: Vec<PathBuf> },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Loaded, validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Parsed settings
    pub settings: EngineConfig,
    /// File the settings were read from
    path: PathBuf,
}

impl Config {
    /// Load configuration from the first location that exists.
    ///
    /// # Errors
    ///
    /// Returns an error if no file is found, or if the file cannot be read,
    /// parsed or validated.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        // Explicit sources must exist
        if let Some(path) = explicit {
            return Self::load_file(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            if !path.is_empty() {
                return Self::load_file(Path::new(&path));
            }
        }

        let candidates = Self::search_paths();
        match candidates.iter().find(|p| p.is_file()) {
            Some(path) => Self::load_file(path),
            None => Err(ConfigError::NotFound {
                searched: candidates,
            }),
        }
    }

    /// Implicit search locations, in order.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            if !xdg_home.is_empty() {
                paths.push(PathBuf::from(xdg_home).join("releasegate/config.toml"));
            }
        }
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".releasegate/config.toml"));
        }
        paths.push(PathBuf::from("releasegate.toml"));
        paths
    }

    /// Read, parse and validate one config file.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&contents, path)
    }

    /// Parse and validate config text; `path` is used for error messages.
    pub fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let settings: EngineConfig =
            toml::from_str(contents).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        settings.validate()?;

        Ok(Self {
            settings,
            path: path.to_path_buf(),
        })
    }

    /// Path to the loaded config file.
    pub fn loaded_from(&self) -> &Path {
        &self.path
    }

    /// Log filter directive.
    pub fn log_filter(&self) -> &str {
        self.settings.logging.filter()
    }
}
