use thiserror::Error;

/// Errors that can occur when using the llm-relay library.
#[derive(Error, Debug)]
pub enum Error {
    /// No registered provider or proxy resolves the requested model.
    #[error("no provider found for model: {0}")]
    ProviderNotFound(String),

    /// A backend answered with a non-2xx status.
    #[error("upstream error (status {status}): {body}")]
    Upstream {
        status: u16,
        body: serde_json::Value,
    },

    /// A backend payload could not be mapped onto the canonical schema.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Network failure before any HTTP status was obtained.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("streaming error: {0}")]
    Streaming(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol(message.into())
    }

    pub fn streaming(message: impl Into<String>) -> Self {
        Error::Streaming(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub fn upstream(status: u16, body: serde_json::Value) -> Self {
        Error::Upstream { status, body }
    }
}
