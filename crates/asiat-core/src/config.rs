use crate::{AsiatError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Where the code index is persisted; relative paths resolve against the project root
    pub index_path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from(".asiat/index.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Which provider to use: "openai", "anthropic", "gemini", "groq", "kimi", "ollama"
    #[serde(default = "default_provider")]
    pub provider: String,
    pub api_key: Option<String>,
    /// Falls back to the provider's default model when unset
    pub model: Option<String>,
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_timeout_seconds() -> u64 {
    60
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            model: None,
            base_url: None,
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    pub default_timeout_ms: u64,
    /// Program used to run package scripts, e.g. `npm` or `pnpm`
    pub script_runner: String,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 60_000,
            script_runner: "npm".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// One of "pretty", "compact", "json"
    pub format: String,
    pub file_enabled: bool,
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "compact".to_string(),
            file_enabled: false,
            log_dir: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_root: default_project_root(),
            index: IndexConfig::default(),
            provider: ProviderConfig::default(),
            commands: CommandsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub async fn load(config_path: Option<&Path>) -> Result<Self> {
        let config_file = match config_path {
            Some(path) => path.to_path_buf(),
            None => Self::default_config_path()?,
        };

        let mut config = if config_file.exists() {
            info!("Loading config from: {}", config_file.display());
            let content = tokio::fs::read_to_string(&config_file).await?;
            toml::from_str(&content).map_err(|e| AsiatError::ConfigLoadFailed {
                path: config_file.display().to_string(),
                source: Box::new(e),
            })?
        } else {
            info!("No config file found, using defaults");
            Self::default()
        };

        config.load_env_overrides();
        Ok(config)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let project_dirs =
            ProjectDirs::from("dev", "asiat", "asiat").ok_or_else(|| AsiatError::Config {
                message: "Could not determine config directory".to_string(),
            })?;

        Ok(project_dirs.config_dir().join("config.toml"))
    }

    fn load_env_overrides(&mut self) {
        if let Ok(provider) = std::env::var("ASIAT_LLM_PROVIDER") {
            self.provider.provider = provider;
        }
        if let Ok(api_key) = std::env::var("ASIAT_LLM_API_KEY") {
            self.provider.api_key = Some(api_key);
        }
        if let Ok(model) = std::env::var("ASIAT_LLM_MODEL") {
            self.provider.model = Some(model);
        }
        if let Ok(base_url) = std::env::var("ASIAT_LLM_BASE_URL") {
            self.provider.base_url = Some(base_url);
        }
        if let Ok(root) = std::env::var("ASIAT_PROJECT_ROOT") {
            self.project_root = PathBuf::from(root);
        }
    }

    /// The index path, resolved against the project root when relative.
    pub fn resolved_index_path(&self) -> PathBuf {
        if self.index.index_path.is_absolute() {
            self.index.index_path.clone()
        } else {
            self.project_root.join(&self.index.index_path)
        }
    }
}
