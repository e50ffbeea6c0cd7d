use crate::anthropic::{AnthropicClient, AnthropicConfig};
use crate::error::{ProviderError, Result};
use crate::fallback::FallbackProviderClient;
use crate::gemini::{GeminiClient, GeminiConfig};
use crate::http::HttpSettings;
use crate::ollama::{OllamaClient, OllamaConfig};
use crate::openai::{OpenAIClient, OpenAIConfig};
use asiat_core::config::ProviderConfig;
use asiat_core::provider::ProviderClient;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Supported model backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAI,
    Gemini,
    Anthropic,
    Kimi,
    Groq,
    Ollama,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 6] = [
        ProviderKind::OpenAI,
        ProviderKind::Gemini,
        ProviderKind::Anthropic,
        ProviderKind::Kimi,
        ProviderKind::Groq,
        ProviderKind::Ollama,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Kimi => "kimi",
            ProviderKind::Groq => "groq",
            ProviderKind::Ollama => "ollama",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "gpt-4o-mini",
            ProviderKind::Gemini => "gemini-1.5-flash",
            ProviderKind::Anthropic => "claude-3-5-sonnet-latest",
            ProviderKind::Kimi => "kimi-2",
            ProviderKind::Groq => "llama-3.1-8b-instant",
            ProviderKind::Ollama => "llama3",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "https://api.openai.com/v1",
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com",
            ProviderKind::Anthropic => "https://api.anthropic.com",
            ProviderKind::Kimi => "https://api.moonshot.cn/v1",
            ProviderKind::Groq => "https://api.groq.com/openai/v1",
            ProviderKind::Ollama => "http://127.0.0.1:11434",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, ProviderKind::Ollama)
    }

    /// Environment variables checked, in order, when no key is configured.
    pub fn api_key_env_vars(&self) -> &'static [&'static str] {
        match self {
            ProviderKind::OpenAI => &["ASIAT_LLM_API_KEY", "OPENAI_API_KEY"],
            ProviderKind::Gemini => &["ASIAT_LLM_API_KEY", "GEMINI_API_KEY", "GOOGLE_API_KEY"],
            ProviderKind::Anthropic => &["ASIAT_LLM_API_KEY", "ANTHROPIC_API_KEY"],
            ProviderKind::Kimi => &["ASIAT_LLM_API_KEY", "KIMI_API_KEY", "MOONSHOT_API_KEY"],
            ProviderKind::Groq => &["ASIAT_LLM_API_KEY", "GROQ_API_KEY"],
            ProviderKind::Ollama => &[],
        }
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_lowercase();
        let name = match name.as_str() {
            "llama" => "ollama",
            other => other,
        };

        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| ProviderError::UnsupportedProvider {
                name: s.to_string(),
            })
    }
}

fn resolve_api_key(kind: ProviderKind, explicit: Option<&str>) -> Option<String> {
    explicit
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .or_else(|| {
            kind.api_key_env_vars()
                .iter()
                .filter_map(|var| std::env::var(var).ok())
                .find(|value| !value.is_empty())
        })
}

/// Factory for creating provider clients
pub struct ProviderClientFactory;

impl ProviderClientFactory {
    /// Create a provider client based on configuration.
    ///
    /// A keyed provider without a resolvable key yields [`FallbackProviderClient`].
    pub fn create_client(config: &ProviderConfig) -> Result<Arc<dyn ProviderClient>> {
        Self::validate_config(config)?;
        let kind: ProviderKind = config.provider.parse()?;

        let api_key = resolve_api_key(kind, config.api_key.as_deref());
        if kind.requires_api_key() && api_key.is_none() {
            warn!(
                provider = kind.as_str(),
                "No API key found; using fallback provider client"
            );
            return Ok(Arc::new(FallbackProviderClient));
        }

        let api_key = api_key.unwrap_or_default();
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| kind.default_base_url().to_string());
        let default_model = config
            .model
            .clone()
            .unwrap_or_else(|| kind.default_model().to_string());
        let http = HttpSettings::with_timeout(Duration::from_secs(config.timeout_seconds));

        info!(provider = kind.as_str(), model = %default_model, "Creating provider client");

        let client: Arc<dyn ProviderClient> = match kind {
            ProviderKind::OpenAI | ProviderKind::Groq | ProviderKind::Kimi => {
                Arc::new(OpenAIClient::new(OpenAIConfig {
                    provider: kind.as_str().to_string(),
                    api_key,
                    base_url,
                    default_model,
                    http,
                })?)
            }
            ProviderKind::Anthropic => Arc::new(AnthropicClient::new(AnthropicConfig {
                api_key,
                base_url,
                default_model,
                http,
            })?),
            ProviderKind::Gemini => Arc::new(GeminiClient::new(GeminiConfig {
                api_key,
                base_url,
                default_model,
                http,
            })?),
            ProviderKind::Ollama => Arc::new(OllamaClient::new(OllamaConfig {
                base_url,
                default_model,
                http,
            })?),
        };

        Ok(client)
    }

    /// Validate provider configuration
    pub fn validate_config(config: &ProviderConfig) -> Result<()> {
        if config.timeout_seconds == 0 {
            warn!("Timeout is set to 0, this may cause issues");
        }

        if let Some(base_url) = &config.base_url {
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                return Err(ProviderError::Configuration {
                    message: "Base URL must start with http:// or https://".to_string(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asiat_core::provider::{ProviderMessage, ProviderRequest};
    use serial_test::serial;

    const KEY_VARS: &[&str] = &[
        "ASIAT_LLM_API_KEY",
        "OPENAI_API_KEY",
        "GEMINI_API_KEY",
        "GOOGLE_API_KEY",
        "ANTHROPIC_API_KEY",
        "KIMI_API_KEY",
        "MOONSHOT_API_KEY",
        "GROQ_API_KEY",
    ];

    fn clear_key_vars() {
        for var in KEY_VARS {
            std::env::remove_var(var);
        }
    }

    fn config(provider: &str, api_key: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            provider: provider.to_string(),
            api_key: api_key.map(str::to_string),
            ..ProviderConfig::default()
        }
    }

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("openai".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAI);
        assert_eq!("Groq".parse::<ProviderKind>().unwrap(), ProviderKind::Groq);
        assert_eq!("llama".parse::<ProviderKind>().unwrap(), ProviderKind::Ollama);

        let err = "bard".parse::<ProviderKind>().unwrap_err();
        assert_eq!(err.to_string(), "Unsupported AI provider: bard");
    }

    #[test]
    #[serial]
    fn test_selects_client_by_provider() {
        clear_key_vars();
        for (provider, expected) in [
            ("openai", "openai"),
            ("groq", "groq"),
            ("kimi", "kimi"),
            ("anthropic", "anthropic"),
            ("gemini", "gemini"),
        ] {
            let client = ProviderClientFactory::create_client(&config(provider, Some("k"))).unwrap();
            assert_eq!(client.name(), expected);
        }

        let ollama = ProviderClientFactory::create_client(&config("llama", None)).unwrap();
        assert_eq!(ollama.name(), "ollama");
        assert_eq!(ollama.default_model(), "llama3");
    }

    #[test]
    #[serial]
    fn test_configured_model_overrides_default() {
        clear_key_vars();
        let mut cfg = config("groq", Some("k"));
        assert_eq!(
            ProviderClientFactory::create_client(&cfg)
                .unwrap()
                .default_model(),
            "llama-3.1-8b-instant"
        );

        cfg.model = Some("mixtral".to_string());
        assert_eq!(
            ProviderClientFactory::create_client(&cfg)
                .unwrap()
                .default_model(),
            "mixtral"
        );
    }

    #[tokio::test]
    #[serial]
    async fn test_missing_key_falls_back() {
        clear_key_vars();
        let client = ProviderClientFactory::create_client(&config("anthropic", None)).unwrap();
        assert_eq!(client.name(), "fallback");

        let response = client
            .complete(ProviderRequest::new(vec![ProviderMessage::user("ping")], ""))
            .await
            .unwrap();
        assert!(response.content.contains("Last prompt was:\nping"));
    }

    #[test]
    #[serial]
    fn test_env_keys_are_consulted() {
        clear_key_vars();
        std::env::set_var("GOOGLE_API_KEY", "from-env");
        assert_eq!(
            resolve_api_key(ProviderKind::Gemini, None).as_deref(),
            Some("from-env")
        );
        assert_eq!(
            resolve_api_key(ProviderKind::Gemini, Some("explicit")).as_deref(),
            Some("explicit")
        );
        assert_eq!(resolve_api_key(ProviderKind::Groq, None), None);
        clear_key_vars();
    }

    #[test]
    fn test_unknown_provider_and_bad_base_url() {
        let err = match ProviderClientFactory::create_client(&config("bard", Some("k"))) {
            Err(err) => err,
            Ok(_) => panic!("expected an error"),
        };
        assert_eq!(err.to_string(), "Unsupported AI provider: bard");

        let mut cfg = config("openai", Some("k"));
        cfg.base_url = Some("ftp://example.com".to_string());
        assert!(ProviderClientFactory::validate_config(&cfg).is_err());
    }
}
