//! Canonical-passthrough proxy adapter.
//!
//! A proxy endpoint already speaks the canonical schema, so no format
//! translation happens here: requests are forwarded as-is (after the
//! resolver's optional model substitution) and stream chunks are re-emitted
//! verbatim.

use std::sync::Arc;

use futures_util::StreamExt;

use crate::provider::{ChatProvider, ChunkStream};
use crate::sse::SseJsonStreamExt;
use crate::transport::HttpTransport;
use crate::types::{ChatCompletion, ChatCompletionChunk, CompletionRequest};
use crate::Error;

/// Forwarding target for a set of model identifiers.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub name: String,
    pub url: String,
    /// Extra headers forwarded with every request.
    pub headers: Vec<(String, String)>,
    /// Model identifiers this proxy claims; `"*"` claims everything.
    pub models: Vec<String>,
    /// Outgoing model-name override.
    pub proxy_model: Option<String>,
}

impl ProxyConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            headers: Vec::new(),
            models: Vec::new(),
            proxy_model: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn models(mut self, models: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.models.extend(models.into_iter().map(Into::into));
        self
    }

    pub fn proxy_model(mut self, model: impl Into<String>) -> Self {
        self.proxy_model = Some(model.into());
        self
    }
}

pub struct ProxyProvider {
    transport: Arc<HttpTransport>,
    config: ProxyConfig,
}

impl ProxyProvider {
    pub fn new(transport: Arc<HttpTransport>, config: ProxyConfig) -> Self {
        Self { transport, config }
    }

    /// Whether this proxy claims the given model.
    pub fn matches(&self, model_name: &str, raw_identifier: &str) -> bool {
        self.config
            .models
            .iter()
            .any(|m| m == "*" || m == model_name || m == raw_identifier)
    }

    /// Outgoing model-name override, if configured.
    pub fn proxy_model(&self) -> Option<&str> {
        self.config.proxy_model.as_deref()
    }
}

#[async_trait::async_trait]
impl ChatProvider for ProxyProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn completion(&self, request: &CompletionRequest) -> Result<ChatCompletion, Error> {
        let body = serde_json::to_value(request)?;
        let value = self
            .transport
            .post_json(&self.config.url, &self.config.headers, &body)
            .await?;
        serde_json::from_value(value)
            .map_err(|e| Error::protocol(format!("proxy response is not a chat completion: {e}")))
    }

    async fn stream_completion(&self, request: &CompletionRequest) -> Result<ChunkStream, Error> {
        let mut body = serde_json::to_value(request)?;
        body["stream"] = serde_json::Value::Bool(true);
        let bytes = self
            .transport
            .post_stream(&self.config.url, &self.config.headers, &body)
            .await?;

        let chunks = bytes.sse_json().map(|item| {
            item.and_then(|value| {
                serde_json::from_value::<ChatCompletionChunk>(value).map_err(|e| {
                    Error::protocol(format!("proxy chunk is not a chat completion chunk: {e}"))
                })
            })
        });
        Ok(Box::pin(chunks))
    }
}
