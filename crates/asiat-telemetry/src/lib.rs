//! # ASIAT Telemetry
//!
//! Installs the global `tracing` subscriber: an `EnvFilter`, a console layer
//! on stderr in pretty, compact or JSON form, and an optional daily-rolling
//! log file.
//!
//! ```rust,no_run
//! use asiat_telemetry::{TelemetryConfig, TelemetrySystem};
//!
//! let _guard = TelemetrySystem::init(&TelemetryConfig::default()).unwrap();
//! tracing::info!("Application started");
//! ```

pub mod config;
pub mod system;

pub use config::{LogFormat, LogLevel, TelemetryConfig};
pub use system::{TelemetryGuard, TelemetrySystem};

/// Result type for telemetry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Telemetry-specific errors
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Telemetry system error: {message}")]
    System { message: String },
}
