//! Logging configuration

use crate::{Error, Result};
use directories::ProjectDirs;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Global enable/disable toggle
    pub enabled: bool,

    pub level: LogLevel,

    pub format: LogFormat,

    /// Console output goes to stderr so it never mixes with replies on stdout
    pub console_enabled: bool,

    /// Enable daily-rolling file logs
    pub file_enabled: bool,

    pub log_dir: PathBuf,

    /// Base filename; the appender adds the date suffix
    pub log_file_name: String,

    /// Include source location in logs
    pub include_location: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            _ => Err(Error::Config {
                message: format!("Unknown log level: {}", s),
            }),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Structured JSON format
    Json,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    Compact,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(Error::Config {
                message: format!("Unknown log format: {}", s),
            }),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: LogLevel::Warn,
            format: LogFormat::Compact,
            console_enabled: true,
            file_enabled: false,
            log_dir: Self::default_log_dir().unwrap_or_else(|_| PathBuf::from("./logs")),
            log_file_name: "asiat".to_string(),
            include_location: false,
        }
    }
}

impl TelemetryConfig {
    /// Build from the textual settings of the application config.
    pub fn from_settings(
        level: &str,
        format: &str,
        file_enabled: bool,
        log_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let mut config = Self {
            level: level.parse()?,
            format: format.parse()?,
            file_enabled,
            ..Self::default()
        };
        if let Some(dir) = log_dir {
            config.log_dir = dir;
        }
        Ok(config)
    }

    /// Apply `ASIAT_LOG_*` environment overrides. Unparseable values are ignored.
    pub fn load_env_overrides(&mut self) {
        if let Ok(enabled) = std::env::var("ASIAT_TELEMETRY_ENABLED") {
            self.enabled = enabled.parse().unwrap_or(self.enabled);
        }

        if let Ok(level) = std::env::var("ASIAT_LOG_LEVEL") {
            self.level = level.parse().unwrap_or(self.level);
        }

        if let Ok(format) = std::env::var("ASIAT_LOG_FORMAT") {
            self.format = format.parse().unwrap_or(self.format);
        }

        if let Ok(enabled) = std::env::var("ASIAT_FILE_LOGGING") {
            self.file_enabled = enabled.parse().unwrap_or(self.file_enabled);
        }

        if let Ok(dir) = std::env::var("ASIAT_LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
    }

    fn default_log_dir() -> Result<PathBuf> {
        let project_dirs =
            ProjectDirs::from("dev", "asiat", "asiat").ok_or_else(|| Error::Config {
                message: "Could not determine log directory".to_string(),
            })?;

        Ok(project_dirs.data_dir().join("logs"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.file_enabled {
            if !self.log_dir.exists() {
                std::fs::create_dir_all(&self.log_dir)?;
            }

            // Test write permissions
            let probe = self.log_dir.join(".asiat_write_test");
            std::fs::write(&probe, "test")?;
            std::fs::remove_file(&probe)?;
        }

        if self.log_file_name.trim().is_empty() {
            return Err(Error::Config {
                message: "log_file_name must not be empty".to_string(),
            });
        }

        Ok(())
    }
}
