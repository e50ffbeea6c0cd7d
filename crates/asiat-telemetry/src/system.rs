//! Global subscriber installation

use crate::{
    config::{LogFormat, TelemetryConfig},
    Error, Result,
};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

pub struct TelemetrySystem;

/// Keeps the non-blocking file writer alive. Dropping it flushes pending lines.
pub struct TelemetryGuard {
    _file_guard: Option<WorkerGuard>,
}

impl TelemetrySystem {
    /// Install the global subscriber. Fails if one is already set.
    pub fn init(config: &TelemetryConfig) -> Result<TelemetryGuard> {
        config.validate()?;

        let mut layers: Vec<BoxedLayer> = Vec::new();
        if let Some(console) = Self::build_console_layer(config) {
            layers.push(console);
        }
        let file_guard = match Self::build_file_layer(config) {
            Some((layer, guard)) => {
                layers.push(layer);
                Some(guard)
            }
            None => None,
        };

        tracing_subscriber::registry()
            .with(layers)
            .with(Self::build_env_filter(config)?)
            .try_init()
            .map_err(|e| Error::System {
                message: format!("Failed to initialize tracing subscriber: {}", e),
            })?;

        tracing::debug!(
            level = ?config.level,
            format = ?config.format,
            file = config.file_enabled,
            "Telemetry initialized"
        );

        Ok(TelemetryGuard {
            _file_guard: file_guard,
        })
    }

    /// `RUST_LOG` wins over the configured level.
    pub fn build_env_filter(config: &TelemetryConfig) -> Result<EnvFilter> {
        if !config.enabled {
            return Ok(EnvFilter::new("off"));
        }

        if let Ok(directives) = std::env::var("RUST_LOG") {
            if !directives.trim().is_empty() {
                return Ok(EnvFilter::new(directives));
            }
        }

        let level: Level = config.level.into();
        let mut filter = EnvFilter::new(level.to_string().to_lowercase());
        for directive in ["hyper=warn", "reqwest=warn", "h2=warn"] {
            filter = filter.add_directive(directive.parse().map_err(|e| Error::Config {
                message: format!("Invalid filter directive {}: {}", directive, e),
            })?);
        }

        Ok(filter)
    }

    fn build_console_layer(config: &TelemetryConfig) -> Option<BoxedLayer> {
        if !config.enabled || !config.console_enabled {
            return None;
        }

        let layer = match config.format {
            LogFormat::Json => fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .with_span_list(false)
                .with_target(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .boxed(),
            LogFormat::Pretty => fmt::layer()
                .pretty()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .boxed(),
            LogFormat::Compact => fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .boxed(),
        };

        Some(layer)
    }

    fn build_file_layer(config: &TelemetryConfig) -> Option<(BoxedLayer, WorkerGuard)> {
        if !config.enabled || !config.file_enabled {
            return None;
        }

        let appender = tracing_appender::rolling::daily(
            &config.log_dir,
            format!("{}.log", config.log_file_name),
        );
        let (writer, guard) = tracing_appender::non_blocking(appender);

        let layer = match config.format {
            LogFormat::Json => fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .with_current_span(true)
                .with_span_list(false)
                .with_target(true)
                .boxed(),
            LogFormat::Pretty | LogFormat::Compact => fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .boxed(),
        };

        Some((layer, guard))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_disabled_filter_is_off() {
        std::env::remove_var("RUST_LOG");
        let config = TelemetryConfig {
            enabled: false,
            ..TelemetryConfig::default()
        };
        let filter = TelemetrySystem::build_env_filter(&config).unwrap();
        assert_eq!(filter.to_string(), "off");
    }

    #[test]
    #[serial]
    fn test_rust_log_overrides_level() {
        std::env::set_var("RUST_LOG", "asiat_orchestration=trace");
        let filter = TelemetrySystem::build_env_filter(&TelemetryConfig::default()).unwrap();
        assert_eq!(filter.to_string(), "asiat_orchestration=trace");
        std::env::remove_var("RUST_LOG");

        let filter = TelemetrySystem::build_env_filter(&TelemetryConfig::default()).unwrap();
        assert!(filter.to_string().contains("warn"));
    }

    #[test]
    fn test_layers_follow_toggles() {
        let temp_dir = TempDir::new().unwrap();
        let config = TelemetryConfig {
            console_enabled: false,
            file_enabled: true,
            log_dir: temp_dir.path().to_path_buf(),
            ..TelemetryConfig::default()
        };

        assert!(TelemetrySystem::build_console_layer(&config).is_none());
        assert!(TelemetrySystem::build_file_layer(&config).is_some());

        let console_only = TelemetryConfig::default();
        assert!(TelemetrySystem::build_console_layer(&console_only).is_some());
        assert!(TelemetrySystem::build_file_layer(&console_only).is_none());
    }

    #[test]
    #[serial]
    fn test_init_writes_file_logs() {
        std::env::remove_var("RUST_LOG");
        let temp_dir = TempDir::new().unwrap();
        let config = TelemetryConfig {
            level: crate::LogLevel::Info,
            console_enabled: false,
            file_enabled: true,
            log_dir: temp_dir.path().to_path_buf(),
            ..TelemetryConfig::default()
        };

        let guard = TelemetrySystem::init(&config).unwrap();
        tracing::info!("written to the rolling file");
        drop(guard);

        let written = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .any(|entry| entry.file_name().to_string_lossy().starts_with("asiat.log"));
        assert!(written);

        // A second global subscriber is refused.
        assert!(TelemetrySystem::init(&TelemetryConfig::default()).is_err());
    }
}
