//! Configuration for the tracing layer.
//!
//! Configuration is an immutable value: load it (from TOML, or build it in
//! code), apply environment overrides, and hand it to [`crate::Apixt::init`].
//!
//! Config discovery searches for `.apixt/config.toml` starting from a
//! directory and walking up to its parents.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ApixtError, Result};

/// The apixt data directory name.
pub const APIXT_DIR: &str = ".apixt";
/// The config file name within the apixt directory.
pub const CONFIG_FILE: &str = "config.toml";
/// Prefix of the environment variables that override config values.
pub const ENV_PREFIX: &str = "APIXT_";

/// Tracing layer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Identifier of the traced API, shown by the viewer.
    pub api_id: String,
    /// Public base URL of the traced API.
    pub base_url: String,
    /// Path the viewer is served under.
    pub dump_path: String,
    /// Whether the viewer keeps its login across browser sessions.
    pub permanent: bool,
    /// Request header that turns tracing on for a request.
    pub dump_header: String,
    /// Request header carrying the breakpoint token.
    pub halt_header: String,
    /// Key prefix the viewer uses for browser storage.
    pub store_prefix: String,
    /// Master switch (env `APIXT_ENABLED`).
    pub enabled: bool,
    /// Largest response body captured into a trace.
    pub max_body_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_id: String::new(),
            base_url: String::new(),
            dump_path: String::new(),
            permanent: true,
            dump_header: "Tls-Apixt-Dump".to_string(),
            halt_header: "Tls-Apixt-Halt".to_string(),
            store_prefix: "tls.apixt.".to_string(),
            enabled: true,
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Config with the required fields set and everything else defaulted.
    pub fn new(
        api_id: impl Into<String>,
        base_url: impl Into<String>,
        dump_path: impl Into<String>,
    ) -> Self {
        Self {
            api_id: api_id.into(),
            base_url: base_url.into(),
            dump_path: dump_path.into(),
            ..Self::default()
        }
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ApixtError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content).map_err(|e| {
            ApixtError::Config(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Find and load configuration starting from a specific directory.
    ///
    /// Looks for `.apixt/config.toml` in the directory and its parents and
    /// returns the config together with the `.apixt` directory it came from.
    pub fn find_and_load_from(start: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = start.to_path_buf();

        loop {
            let apixt_dir = dir.join(APIXT_DIR);
            let config_path = apixt_dir.join(CONFIG_FILE);
            if config_path.exists() {
                let config = Self::from_file(&config_path)?;
                return Ok(Some((config, apixt_dir)));
            }

            if !dir.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(self) -> Self {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides using `lookup` to read variables.
    pub fn apply_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(value) = lookup(&format!("{ENV_PREFIX}ENABLED")) {
            if !value.is_empty() {
                self.enabled = parse_bool(&value);
            }
        }
        self
    }

    /// Validate the configuration.
    ///
    /// Returns a list of validation errors if any are found.
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        for (field, value) in [
            ("api_id", &self.api_id),
            ("base_url", &self.base_url),
            ("dump_path", &self.dump_path),
        ] {
            if value.trim().is_empty() {
                errors.push(ConfigValidationError {
                    field: field.to_string(),
                    message: "Missing required value".to_string(),
                });
            }
        }

        if !self.dump_path.is_empty() && !self.dump_path.starts_with('/') {
            errors.push(ConfigValidationError {
                field: "dump_path".to_string(),
                message: format!("Expected an absolute path, got '{}'", self.dump_path),
            });
        }

        for (field, value) in [
            ("dump_header", &self.dump_header),
            ("halt_header", &self.halt_header),
        ] {
            if axum::http::HeaderName::from_bytes(value.as_bytes()).is_err() {
                errors.push(ConfigValidationError {
                    field: field.to_string(),
                    message: format!("Invalid header name '{value}'"),
                });
            }
        }

        if self.max_body_bytes == 0 {
            errors.push(ConfigValidationError {
                field: "max_body_bytes".to_string(),
                message: "Must be greater than zero".to_string(),
            });
        }

        errors
    }

    /// Validate and turn any problems into a single error.
    pub fn validated(self) -> Result<Self> {
        let errors = self.validate();
        if errors.is_empty() {
            return Ok(self);
        }
        let message = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Err(ApixtError::Config(message))
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on")
}

/// Configuration validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigValidationError {}
