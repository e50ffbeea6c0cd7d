use asiat_core::provider::{ProviderClient, ProviderRequest, ProviderResponse};
use asiat_core::Result;
use async_trait::async_trait;

const NOT_CONFIGURED: &str = "LLM provider is not configured. Set ASIAT_LLM_API_KEY (or the provider's own key variable), or switch to the ollama provider for a local model. Last prompt was:\n";

/// Stand-in used when a keyed provider has no API key.
/// Echoes the last prompt so the session stays usable offline.
#[derive(Debug, Default)]
pub struct FallbackProviderClient;

#[async_trait]
impl ProviderClient for FallbackProviderClient {
    fn name(&self) -> &str {
        "fallback"
    }

    fn default_model(&self) -> &str {
        "fallback"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse> {
        let last = request
            .messages
            .last()
            .map(|message| message.content.as_str())
            .unwrap_or_default();

        Ok(ProviderResponse {
            id: request.id,
            content: format!("{}{}", NOT_CONFIGURED, last),
            model: "fallback".to_string(),
            usage: None,
        })
    }
}
