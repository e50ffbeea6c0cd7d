//! Request plumbing shared by every HTTP-backed provider.

use crate::error::{ProviderError, Result};
use reqwest::{header, Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_retry_delay: Duration,
    pub max_retry_delay: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_retries: 2,
            initial_retry_delay: Duration::from_millis(500),
            max_retry_delay: Duration::from_secs(10),
        }
    }
}

impl HttpSettings {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }
}

pub fn strip_trailing_slash(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

pub fn header_value(name: &str, value: &str) -> Result<header::HeaderValue> {
    header::HeaderValue::from_str(value).map_err(|e| ProviderError::Configuration {
        message: format!("Invalid {} header: {}", name, e),
    })
}

/// Build a JSON client carrying the provider's auth headers.
pub fn build_client(settings: &HttpSettings, mut headers: header::HeaderMap) -> Result<Client> {
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    headers.insert(
        header::USER_AGENT,
        header::HeaderValue::from_static(concat!("asiat/", env!("CARGO_PKG_VERSION"))),
    );

    Client::builder()
        .timeout(settings.timeout)
        .default_headers(headers)
        .build()
        .map_err(|e| ProviderError::Configuration {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

/// POST a JSON body and decode the JSON reply, retrying transient failures.
pub async fn post_json<B, T>(
    client: &Client,
    settings: &HttpSettings,
    url: &str,
    body: &B,
) -> Result<T>
where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
{
    debug!("POST {}", url);
    retry_with_backoff(settings, || async move {
        let response = timeout(settings.timeout, client.post(url).json(body).send())
            .await
            .map_err(|_| ProviderError::Timeout {
                message: format!("no response from {} after {:?}", url, settings.timeout),
            })??;

        handle_response(response).await
    })
    .await
}

async fn handle_response<T>(response: Response) -> Result<T>
where
    T: DeserializeOwned,
{
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        return Err(ProviderError::ServerError {
            status_code: status.as_u16(),
            message: text,
        });
    }

    serde_json::from_str(&text).map_err(|e| {
        error!("Failed to parse response: {}, text: {}", e, text);
        ProviderError::Json(e)
    })
}

async fn retry_with_backoff<F, Fut, T>(settings: &HttpSettings, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    let mut delay = settings.initial_retry_delay;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) if attempt >= settings.max_retries || !err.is_retryable() => {
                return Err(err);
            }
            Err(err) => {
                attempt += 1;
                warn!(
                    "Request failed (attempt {}/{}): {}",
                    attempt, settings.max_retries, err
                );
                info!("Retrying in {:?}", delay);
                sleep(delay).await;
                delay = std::cmp::min(delay * 2, settings.max_retry_delay);
            }
        }
    }
}
