use crate::error::Result;
use crate::http::{build_client, header_value, post_json, strip_trailing_slash, HttpSettings};
use asiat_core::memory::MessageRole;
use asiat_core::provider::{ProviderClient, ProviderRequest, ProviderResponse, Usage};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub base_url: String,
    pub default_model: String,
    pub http: HttpSettings,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.anthropic.com".to_string(),
            default_model: "claude-3-5-sonnet-latest".to_string(),
            http: HttpSettings::default(),
        }
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: Vec<TextBlock>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TextBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<TextBlock>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

/// Claude via the Messages API. System messages are lifted into the `system` field.
pub struct AnthropicClient {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicClient {
    pub fn new(mut config: AnthropicConfig) -> Result<Self> {
        config.base_url = strip_trailing_slash(&config.base_url);

        let mut headers = header::HeaderMap::new();
        headers.insert("x-api-key", header_value("x-api-key", &config.api_key)?);
        headers.insert(
            "anthropic-version",
            header::HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        let client = build_client(&config.http, headers)?;

        Ok(Self { client, config })
    }

    fn build_request(&self, request: &ProviderRequest, model: String) -> MessagesRequest {
        let system = request
            .messages
            .iter()
            .filter(|message| message.role == MessageRole::System)
            .map(|message| message.content.trim())
            .filter(|content| !content.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");

        let messages = request
            .messages
            .iter()
            .filter(|message| message.role != MessageRole::System)
            .map(|message| AnthropicMessage {
                role: match message.role {
                    MessageRole::Assistant => "assistant",
                    _ => "user",
                },
                content: vec![TextBlock {
                    kind: "text".to_string(),
                    text: Some(message.content.clone()),
                }],
            })
            .collect();

        MessagesRequest {
            model,
            system: (!system.is_empty()).then_some(system),
            messages,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: request.temperature,
        }
    }
}

#[async_trait::async_trait]
impl ProviderClient for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: ProviderRequest) -> asiat_core::Result<ProviderResponse> {
        let model = if request.model.is_empty() {
            self.config.default_model.clone()
        } else {
            request.model.clone()
        };
        info!("Processing Anthropic request for model: {}", model);

        let body = self.build_request(&request, model.clone());
        let url = format!("{}/v1/messages", self.config.base_url);
        let response: MessagesResponse =
            post_json(&self.client, &self.config.http, &url, &body).await?;

        let content = response
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<String>();

        Ok(ProviderResponse {
            id: request.id,
            content,
            model,
            usage: response.usage.map(|usage| Usage {
                prompt_tokens: usage.input_tokens,
                completion_tokens: usage.output_tokens,
                total_tokens: usage.input_tokens + usage.output_tokens,
            }),
        })
    }
}
