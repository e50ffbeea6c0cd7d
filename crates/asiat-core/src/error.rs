use thiserror::Error;

pub type Result<T> = std::result::Result<T, AsiatError>;

#[derive(Error, Debug)]
pub enum AsiatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Failed to load configuration from {path}: {source}")]
    ConfigLoadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Provider error: {message}")]
    Provider { message: String },

    #[error("Tool error: {message}")]
    Tool { message: String },

    #[error("{message}")]
    Patch { message: String },

    #[error("Index error: {message}")]
    Index { message: String },

    #[error("Git command failed: {message}")]
    Git { message: String },

    #[error("Execution error: {message}")]
    Execution { message: String },

    #[error("Unknown error: {message}")]
    Unknown { message: String },
}

impl AsiatError {
    pub fn tool(message: impl Into<String>) -> Self {
        Self::Tool {
            message: message.into(),
        }
    }

    pub fn patch(message: impl Into<String>) -> Self {
        Self::Patch {
            message: message.into(),
        }
    }

    pub fn index(message: impl Into<String>) -> Self {
        Self::Index {
            message: message.into(),
        }
    }

    pub fn git(message: impl Into<String>) -> Self {
        Self::Git {
            message: message.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
        }
    }
}
