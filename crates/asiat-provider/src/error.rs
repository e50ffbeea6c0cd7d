use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProviderError>;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Server error: {status_code}, message: {message}")]
    ServerError { status_code: u16, message: String },

    #[error("Network timeout: {message}")]
    Timeout { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Unsupported AI provider: {name}")]
    UnsupportedProvider { name: String },
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::ServerError { status_code, .. } => {
                *status_code == 429 || *status_code >= 500
            }
            ProviderError::Timeout { .. } => true,
            ProviderError::Http(err) => err.is_timeout() || err.is_connect(),
            _ => false,
        }
    }
}

impl From<ProviderError> for asiat_core::AsiatError {
    fn from(err: ProviderError) -> Self {
        asiat_core::AsiatError::Provider {
            message: err.to_string(),
        }
    }
}
