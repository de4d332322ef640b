use std::sync::Arc;

use serde_json::{Map, Value};

use crate::provider::{ChatProvider, ChunkStream};
use crate::providers::{AnthropicProvider, OpenAiProvider, ProxyConfig, ProxyProvider};
use crate::registry::{ProviderType, Registry};
use crate::transport::HttpTransport;
use crate::types::{ChatCompletion, CompletionRequest};
use crate::Error;

/// Configuration for registering a vendor backend.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider_type: ProviderType,
    pub api_key: String,
    pub base_url: Option<String>,
    pub default_params: Map<String, Value>,
}

impl ProviderConfig {
    /// Create configuration for the OpenAI provider.
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            provider_type: ProviderType::OpenAi,
            api_key: api_key.into(),
            base_url: None,
            default_params: Map::new(),
        }
    }

    /// Create configuration for the Anthropic provider.
    pub fn anthropic(api_key: impl Into<String>) -> Self {
        Self {
            provider_type: ProviderType::Anthropic,
            api_key: api_key.into(),
            base_url: None,
            default_params: Map::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Parameter merged into every outgoing request unless the request
    /// already sets it.
    pub fn with_default_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.default_params.insert(key.into(), value);
        self
    }
}

/// The public entry point: routes canonical requests to registered
/// providers and proxies.
///
/// Registration is expected to complete before traffic starts; after that
/// the client can be shared freely across tasks.
pub struct LlmClient {
    registry: Registry,
    transport: Arc<HttpTransport>,
}

impl LlmClient {
    pub fn new() -> Result<Self, Error> {
        Ok(Self {
            registry: Registry::new(),
            transport: Arc::new(HttpTransport::new()?),
        })
    }

    /// Register a vendor backend.
    pub fn register_provider(&mut self, config: ProviderConfig) {
        let provider: Arc<dyn ChatProvider> = match config.provider_type {
            ProviderType::OpenAi => {
                let mut provider =
                    OpenAiProvider::new(Arc::clone(&self.transport), config.api_key)
                        .with_default_params(config.default_params);
                if let Some(base_url) = config.base_url {
                    provider = provider.with_base_url(base_url);
                }
                Arc::new(provider)
            }
            ProviderType::Anthropic => {
                let mut provider =
                    AnthropicProvider::new(Arc::clone(&self.transport), config.api_key)
                        .with_default_params(config.default_params);
                if let Some(base_url) = config.base_url {
                    provider = provider.with_base_url(base_url);
                }
                Arc::new(provider)
            }
        };
        self.registry.register(config.provider_type, provider);
    }

    /// Register a forwarding proxy. Proxies are checked before providers,
    /// in registration order.
    pub fn create_proxy(&mut self, config: ProxyConfig) {
        let proxy = ProxyProvider::new(Arc::clone(&self.transport), config);
        self.registry.register_proxy(Arc::new(proxy));
    }

    /// The underlying registry, for resolution inspection.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Run a buffered chat completion against whichever backend resolves.
    pub async fn completion(&self, request: &CompletionRequest) -> Result<ChatCompletion, Error> {
        let (provider, outgoing) = self.route(request)?;
        provider.completion(&outgoing).await
    }

    /// Run a streaming chat completion against whichever backend resolves.
    /// The returned stream is lazy; this layer adds no buffering.
    pub async fn stream_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<ChunkStream, Error> {
        let (provider, outgoing) = self.route(request)?;
        provider.stream_completion(&outgoing).await
    }

    fn route(
        &self,
        request: &CompletionRequest,
    ) -> Result<(Arc<dyn ChatProvider>, CompletionRequest), Error> {
        if request.model.is_empty() {
            return Err(Error::config("request model must not be empty"));
        }
        if request.messages.is_empty() {
            return Err(Error::config("request messages must not be empty"));
        }
        let resolution = self
            .registry
            .resolve(&request.model)
            .ok_or_else(|| Error::ProviderNotFound(request.model.clone()))?;
        let outgoing = request.with_model(&resolution.model);
        Ok((resolution.provider, outgoing))
    }
}
