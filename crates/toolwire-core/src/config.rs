//! Configuration system for Toolwire.
//!
//! Settings are layered: built-in defaults, the user config file, the project
//! config file, then `TOOLWIRE_`-prefixed environment variables. Nested keys
//! are separated by `__` in the environment, e.g.
//! `TOOLWIRE_MCP__REQUEST_TIMEOUT_SECS=30`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Error;

/// Main configuration struct for Toolwire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// MCP client settings
    pub mcp: McpSettings,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// Settings for talking to MCP servers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McpSettings {
    /// Explicit path to the server list; overrides the `mcp.json` lookup
    pub config_path: Option<String>,
    /// Wall-clock deadline for a single request, in seconds
    pub request_timeout_secs: u64,
    /// Lines read while waiting for a matching response before giving up
    pub max_read_attempts: usize,
    /// Name sent as `clientInfo.name` during initialization
    pub client_name: String,
    /// Version sent as `clientInfo.version` during initialization
    pub client_version: String,
}

impl Default for McpSettings {
    fn default() -> Self {
        Self {
            config_path: None,
            request_timeout_secs: 60,
            max_read_attempts: 50,
            client_name: "toolwire".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Validation result with multiple issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation issues
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Create a new empty validation result.
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }

    /// Check if validation passed (no errors).
    pub fn is_ok(&self) -> bool {
        !self.issues.iter().any(|i| i.severity == IssueSeverity::Error)
    }

    /// Get only error-level issues.
    pub fn errors(&self) -> Vec<&ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == IssueSeverity::Error).collect()
    }

    /// Get only warning-level issues.
    pub fn warnings(&self) -> Vec<&ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == IssueSeverity::Warning).collect()
    }

    /// Add an error.
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: IssueSeverity::Error,
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning.
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: IssueSeverity::Warning,
            field: field.into(),
            message: message.into(),
        });
    }
}

/// A single validation issue.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Severity of the issue
    pub severity: IssueSeverity,
    /// Field path (e.g., "mcp.request_timeout_secs")
    pub field: String,
    /// Human-readable message
    pub message: String,
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    /// Warnings don't prevent loading
    Warning,
    /// Errors prevent loading
    Error,
}

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    /// The layered provider chain used by [`Config::load`].
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(Self::config_dir().join("config.toml")))
            .merge(Toml::file(".toolwire/config.toml"))
            .merge(Env::prefixed("TOOLWIRE_").split("__"))
    }

    /// Load and validate configuration.
    pub fn load_validated() -> Result<Self, Error> {
        let config = Self::load().map_err(|e| Error::Config(e.to_string()))?;
        let result = config.validate();

        if !result.is_ok() {
            let errors: Vec<String> = result
                .errors()
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect();
            return Err(Error::Config(format!(
                "Configuration validation failed:\n  {}",
                errors.join("\n  ")
            )));
        }

        for warning in result.warnings() {
            tracing::warn!("Config warning - {}: {}", warning.field, warning.message);
        }

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        if self.mcp.request_timeout_secs == 0 {
            result.add_error("mcp.request_timeout_secs", "request_timeout_secs must be greater than 0");
        } else if self.mcp.request_timeout_secs > 3600 {
            result.add_warning(
                "mcp.request_timeout_secs",
                "request_timeout_secs is over an hour, unresponsive servers will stall callers",
            );
        }

        if self.mcp.max_read_attempts == 0 {
            result.add_error("mcp.max_read_attempts", "max_read_attempts must be greater than 0");
        }

        if self.mcp.client_name.trim().is_empty() {
            result.add_error("mcp.client_name", "client_name cannot be empty");
        }

        if let Some(ref path) = self.mcp.config_path {
            if path.trim().is_empty() {
                result.add_warning("mcp.config_path", "config_path is empty, falling back to the default lookup");
            }
        }

        if !VALID_LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            result.add_error(
                "logging.level",
                format!("Invalid log level '{}'. Valid values: {:?}", self.logging.level, VALID_LOG_LEVELS),
            );
        }

        result
    }

    /// Get the configuration directory.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("toolwire"))
            .unwrap_or_else(|| PathBuf::from("~/.config/toolwire"))
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, Error> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}
