use crate::error::Result;
use crate::http::{build_client, post_json, strip_trailing_slash, HttpSettings};
use asiat_core::provider::{ProviderClient, ProviderRequest, ProviderResponse, Usage};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub default_model: String,
    pub http: HttpSettings,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            default_model: "llama3".to_string(),
            http: HttpSettings::default(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ReplyMessage>,
    /// Older servers answer with a bare `response` string
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Local models served by Ollama. No API key.
pub struct OllamaClient {
    client: Client,
    config: OllamaConfig,
}

impl OllamaClient {
    pub fn new(mut config: OllamaConfig) -> Result<Self> {
        config.base_url = strip_trailing_slash(&config.base_url);
        let client = build_client(&config.http, header::HeaderMap::new())?;
        Ok(Self { client, config })
    }
}

#[async_trait::async_trait]
impl ProviderClient for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: ProviderRequest) -> asiat_core::Result<ProviderResponse> {
        let model = if request.model.is_empty() {
            self.config.default_model.as_str()
        } else {
            request.model.as_str()
        };
        info!("Processing Ollama request for model: {}", model);

        let body = ChatRequest {
            model,
            messages: request
                .messages
                .iter()
                .map(|message| OllamaMessage {
                    role: message.role.as_str(),
                    content: &message.content,
                })
                .collect(),
            stream: false,
            options: request
                .temperature
                .map(|temperature| ChatOptions { temperature }),
        };
        let url = format!("{}/api/chat", self.config.base_url);
        let response: ChatResponse =
            post_json(&self.client, &self.config.http, &url, &body).await?;

        let content = response
            .message
            .and_then(|message| message.content)
            .or(response.response)
            .unwrap_or_default();
        let usage = match (response.prompt_eval_count, response.eval_count) {
            (None, None) => None,
            (prompt, completion) => {
                let prompt = prompt.unwrap_or(0);
                let completion = completion.unwrap_or(0);
                Some(Usage {
                    prompt_tokens: prompt,
                    completion_tokens: completion,
                    total_tokens: prompt + completion,
                })
            }
        };

        Ok(ProviderResponse {
            id: request.id,
            content,
            model: model.to_string(),
            usage,
        })
    }
}
