use anyhow::{Context, Result};
use asiat_core::config::Config;
use asiat_orchestration::RuntimeContext;
use asiat_telemetry::{TelemetryConfig, TelemetrySystem};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

mod repl;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(
    after_help = "APPROVAL:\n  File changes, shell commands and patches are staged first.\n  Reply \"yes\"/\"no\" to a staged action and \"apply patch\"/\"discard patch\" to a proposed patch."
)]
struct Cli {
    /// Project directory to operate in
    #[arg(short = 'C', long = "project", help = "Project root to index and operate on")]
    project: Option<PathBuf>,

    #[arg(long, help = "Where to persist the code index")]
    index_path: Option<PathBuf>,

    #[arg(long, help = "Model provider (openai, anthropic, gemini, groq, kimi, ollama)")]
    llm_provider: Option<String>,

    #[arg(long, help = "Model name passed to the provider")]
    llm_model: Option<String>,

    #[arg(long, help = "Override the provider base URL")]
    llm_base_url: Option<String>,

    /// Configuration file path
    #[arg(long, help = "Path to configuration file")]
    config: Option<PathBuf>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(long, help = "Set log level")]
    log_level: Option<String>,

    /// Set log format (json, pretty, compact)
    #[arg(long, help = "Set log output format")]
    log_format: Option<String>,

    #[arg(long, help = "Enable logging to daily-rolling files")]
    file_logging: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Handle a single message and exit
    Ask {
        /// The message to send
        message: String,
    },
}

impl Cli {
    /// Flags win over the config file and environment.
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(project) = &self.project {
            config.project_root = project.clone();
        }
        if let Some(index_path) = &self.index_path {
            config.index.index_path = index_path.clone();
        }
        if let Some(provider) = &self.llm_provider {
            config.provider.provider = provider.clone();
        }
        if let Some(model) = &self.llm_model {
            config.provider.model = Some(model.clone());
        }
        if let Some(base_url) = &self.llm_base_url {
            config.provider.base_url = Some(base_url.clone());
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.logging.format = format.clone();
        }
        if self.file_logging {
            config.logging.file_enabled = true;
        }
    }
}

fn telemetry_config(config: &Config) -> Result<TelemetryConfig> {
    let mut telemetry = TelemetryConfig::from_settings(
        &config.logging.level,
        &config.logging.format,
        config.logging.file_enabled,
        config.logging.log_dir.clone(),
    )
    .context("Invalid logging configuration")?;
    telemetry.load_env_overrides();
    Ok(telemetry)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables before parsing configuration
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())
        .await
        .context("Failed to load configuration")?;
    cli.apply_overrides(&mut config);

    let _telemetry_guard = TelemetrySystem::init(&telemetry_config(&config)?)
        .context("Telemetry initialization failed")?;

    info!(
        provider = %config.provider.provider,
        root = %config.project_root.display(),
        "Starting ASIAT"
    );

    let mut runtime = RuntimeContext::new(config)
        .await
        .context("Failed to initialize runtime")?;

    let outcome = match &cli.command {
        Some(Command::Ask { message }) => {
            println!("{}", runtime.assistant.handle_message(message).await);
            Ok(())
        }
        None => repl::run(&mut runtime).await,
    };

    match &outcome {
        Ok(()) => info!("ASIAT exited successfully"),
        Err(e) => error!(error = %e, "ASIAT encountered an error"),
    }
    outcome
}
