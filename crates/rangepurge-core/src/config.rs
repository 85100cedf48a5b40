//! Configuration system for Rangepurge.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::Error;

/// Longest span, in days, that bulk deletion accepts.
pub const MAX_WINDOW_DAYS: i64 = 14;

/// Largest number of messages one bulk delete call accepts.
pub const MAX_BULK_LIMIT: u32 = 100;

/// Main configuration struct for Rangepurge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Range and batch limits
    pub limits: LimitsConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum age of a marker, and maximum span between markers, in days
    pub max_age_days: i64,
    /// Upper bound accepted for a session's bulk limit
    pub max_bulk_limit: u32,
    /// Bulk limit used when a session never configured one
    pub default_bulk_limit: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_age_days: MAX_WINDOW_DAYS,
            max_bulk_limit: MAX_BULK_LIMIT,
            default_bulk_limit: MAX_BULK_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (overridden by RUST_LOG)
    pub level: String,
    /// Colored output
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
        }
    }
}

/// Outcome of [`Config::validate`]: every problem found, fatal or not.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// True unless an issue has [`IssueSeverity::Error`].
    pub fn is_ok(&self) -> bool {
        self.errors().next().is_none()
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.with_severity(IssueSeverity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.with_severity(IssueSeverity::Warning)
    }

    fn with_severity(&self, severity: IssueSeverity) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.severity == severity)
    }

    fn push(&mut self, severity: IssueSeverity, field: &'static str, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity,
            field,
            message: message.into(),
        });
    }
}

/// One finding, keyed by its dotted config path (`limits.max_age_days`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    /// Reported, loading continues
    Warning,
    /// Loading fails
    Error,
}

impl Config {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    /// The layered provider stack, lowest priority first.
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(Self::config_dir().join("config.toml")))
            .merge(Toml::file(".rangepurge/config.toml"))
            // Project local config (gitignored)
            .merge(Toml::file(".rangepurge/config.local.toml"))
            .merge(Env::prefixed("RANGEPURGE_").split("__"))
    }

    /// Load and validate configuration.
    pub fn load_validated() -> Result<Self, Error> {
        let config = Self::load().map_err(|e| Error::Config(e.to_string()))?;
        config.into_validated()
    }

    /// Validate an already loaded configuration, logging warnings.
    pub fn into_validated(self) -> Result<Self, Error> {
        let result = self.validate();

        if !result.is_ok() {
            let errors: Vec<String> = result.errors().map(ToString::to_string).collect();
            return Err(Error::Config(format!(
                "Configuration validation failed:\n  {}",
                errors.join("\n  ")
            )));
        }

        for warning in result.warnings() {
            tracing::warn!(field = warning.field, "Config warning: {}", warning.message);
        }

        Ok(self)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        let limits = &self.limits;

        if limits.max_age_days <= 0 {
            result.push(
                IssueSeverity::Error,
                "limits.max_age_days",
                "max_age_days must be greater than 0",
            );
        } else if limits.max_age_days > MAX_WINDOW_DAYS {
            result.push(
                IssueSeverity::Error,
                "limits.max_age_days",
                format!("bulk deletion rejects messages older than {MAX_WINDOW_DAYS} days"),
            );
        } else if limits.max_age_days < 2 {
            result.push(
                IssueSeverity::Warning,
                "limits.max_age_days",
                "a window below 2 days leaves little to purge",
            );
        }

        if limits.max_bulk_limit < 2 || limits.max_bulk_limit > MAX_BULK_LIMIT {
            result.push(
                IssueSeverity::Error,
                "limits.max_bulk_limit",
                format!("max_bulk_limit must be between 2 and {MAX_BULK_LIMIT}"),
            );
        }

        if limits.default_bulk_limit < 2 || limits.default_bulk_limit > limits.max_bulk_limit {
            result.push(
                IssueSeverity::Error,
                "limits.default_bulk_limit",
                format!(
                    "default_bulk_limit must be between 2 and max_bulk_limit ({})",
                    limits.max_bulk_limit
                ),
            );
        }

        if self.logging.level.trim().is_empty() {
            result.push(IssueSeverity::Error, "logging.level", "level cannot be empty");
        }

        result
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String, Error> {
        toml::to_string_pretty(self).map_err(|e| Error::Internal(e.to_string()))
    }

    /// Get the configuration directory.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("rangepurge"))
            .unwrap_or_else(|| PathBuf::from("~/.config/rangepurge"))
    }
}
