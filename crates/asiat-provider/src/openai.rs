use crate::error::Result;
use crate::http::{build_client, header_value, post_json, strip_trailing_slash, HttpSettings};
use crate::models::{ChatCompletionRequest, ChatCompletionResponse};
use asiat_core::provider::{ProviderClient, ProviderRequest, ProviderResponse};
use reqwest::{header, Client};
use tracing::{info, instrument};

/// Connection settings for an OpenAI-compatible endpoint
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// Reported by [`ProviderClient::name`], e.g. `groq`
    pub provider: String,
    pub api_key: String,
    pub base_url: String,
    pub default_model: String,
    pub http: HttpSettings,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            default_model: "gpt-4o-mini".to_string(),
            http: HttpSettings::default(),
        }
    }
}

/// Client for OpenAI and the services that mirror its chat API (Groq, Kimi).
pub struct OpenAIClient {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIClient {
    pub fn new(mut config: OpenAIConfig) -> Result<Self> {
        config.base_url = strip_trailing_slash(&config.base_url);

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header_value("authorization", &format!("Bearer {}", config.api_key))?,
        );
        let client = build_client(&config.http, headers)?;

        Ok(Self { client, config })
    }

    pub async fn chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse> {
        let url = format!("{}/chat/completions", self.config.base_url);
        post_json(&self.client, &self.config.http, &url, request).await
    }
}

#[async_trait::async_trait]
impl ProviderClient for OpenAIClient {
    fn name(&self) -> &str {
        &self.config.provider
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    #[instrument(skip(self, request), fields(provider = %self.config.provider, model = %request.model))]
    async fn complete(&self, request: ProviderRequest) -> asiat_core::Result<ProviderResponse> {
        let model = if request.model.is_empty() {
            self.config.default_model.clone()
        } else {
            request.model.clone()
        };
        info!("Processing completion request for model: {}", model);

        let chat_request = ChatCompletionRequest {
            model: model.clone(),
            messages: request.messages.into_iter().map(Into::into).collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: Some(false),
        };

        let response = self.chat_completion(&chat_request).await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        Ok(ProviderResponse {
            id: request.id,
            content,
            model: response.model.unwrap_or(model),
            usage: response.usage.map(Into::into),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asiat_core::provider::ProviderMessage;
    use mockito::Matcher;
    use serde_json::json;

    fn client_for(server: &mockito::Server, provider: &str) -> OpenAIClient {
        OpenAIClient::new(OpenAIConfig {
            provider: provider.to_string(),
            api_key: "sk-test".to_string(),
            base_url: format!("{}/v1/", server.url()),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_complete_sends_bearer_and_reads_first_choice() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::PartialJson(json!({
                "model": "gpt-4o-mini",
                "messages": [
                    { "role": "system", "content": "be brief" },
                    { "role": "user", "content": "hi" }
                ]
            })))
            .with_status(200)
            .with_body(
                json!({
                    "model": "gpt-4o-mini-2024",
                    "choices": [{ "message": { "role": "assistant", "content": "hello" } }],
                    "usage": { "prompt_tokens": 5, "completion_tokens": 1, "total_tokens": 6 }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = client_for(&server, "openai");
        let request = ProviderRequest::new(
            vec![ProviderMessage::system("be brief"), ProviderMessage::user("hi")],
            "",
        );
        let response = client.complete(request).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.content, "hello");
        assert_eq!(response.model, "gpt-4o-mini-2024");
        assert_eq!(response.usage.unwrap().total_tokens, 6);
    }

    #[tokio::test]
    async fn test_empty_choices_yield_empty_content() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(r#"{ "choices": [] }"#)
            .create_async()
            .await;

        let client = client_for(&server, "groq");
        assert_eq!(client.name(), "groq");
        let response = client
            .complete(ProviderRequest::new(vec![ProviderMessage::user("hi")], "m"))
            .await
            .unwrap();
        assert_eq!(response.content, "");
        assert_eq!(response.model, "m");
    }
}
