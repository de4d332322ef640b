//! Model identifier parsing and provider/proxy resolution.

use std::sync::Arc;

use crate::provider::ChatProvider;
use crate::providers::ProxyProvider;

/// Known provider backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    OpenAi,
    Anthropic,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::OpenAi => "openai",
            ProviderType::Anthropic => "anthropic",
        }
    }

    /// Map an identifier prefix segment to a provider type, if recognized.
    pub fn parse(raw: &str) -> Option<ProviderType> {
        match raw {
            "openai" => Some(ProviderType::OpenAi),
            "anthropic" => Some(ProviderType::Anthropic),
            _ => None,
        }
    }
}

/// Model-name prefixes with a strong provider association, checked in fixed
/// order so that ambiguous prefixes resolve deterministically.
const PREFIX_TABLE: &[(&str, ProviderType)] = &[
    ("gpt-", ProviderType::OpenAi),
    ("chatgpt-", ProviderType::OpenAi),
    ("o1", ProviderType::OpenAi),
    ("o3", ProviderType::OpenAi),
    ("text-", ProviderType::OpenAi),
    ("claude", ProviderType::Anthropic),
];

/// Split a model identifier into an optional explicit provider type and the
/// model name.
///
/// Exactly two non-empty segments around a single `/` make an explicit
/// identifier; anything else is treated as a bare model name. An
/// unrecognized first segment yields no provider type. Pure, never fails.
pub fn parse_model(identifier: &str) -> (Option<ProviderType>, &str) {
    let segments: Vec<&str> = identifier.split('/').collect();
    if segments.len() == 2 && !segments[0].is_empty() && !segments[1].is_empty() {
        (ProviderType::parse(segments[0]), segments[1])
    } else {
        (None, identifier)
    }
}

/// The outcome of resolving a model identifier.
pub struct Resolution {
    pub provider: Arc<dyn ChatProvider>,
    /// The model name to send downstream.
    pub model: String,
}

/// Holds registered providers and proxies for the process lifetime.
///
/// Explicitly constructed and owned by the call site; registration is
/// append-only and expected to complete before traffic starts, after which
/// the registry is shared read-only.
#[derive(Default)]
pub struct Registry {
    providers: Vec<(ProviderType, Arc<dyn ChatProvider>)>,
    proxies: Vec<Arc<ProxyProvider>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider_type: ProviderType, provider: Arc<dyn ChatProvider>) {
        self.providers.push((provider_type, provider));
    }

    pub fn register_proxy(&mut self, proxy: Arc<ProxyProvider>) {
        self.proxies.push(proxy);
    }

    fn provider(&self, provider_type: ProviderType) -> Option<Arc<dyn ChatProvider>> {
        self.providers
            .iter()
            .find(|(registered, _)| *registered == provider_type)
            .map(|(_, provider)| Arc::clone(provider))
    }

    /// Resolve a model identifier to an adapter and the outgoing model name.
    ///
    /// Proxies take precedence over direct providers so operators can
    /// intercept any model without touching provider registrations; the
    /// prefix table and the per-provider predicate let bare model names
    /// resolve without an explicit provider prefix.
    pub fn resolve(&self, identifier: &str) -> Option<Resolution> {
        let (explicit, model_name) = parse_model(identifier);

        // 1. Proxies, in registration order.
        for proxy in &self.proxies {
            if proxy.matches(model_name, identifier) {
                let model = proxy.proxy_model().unwrap_or(model_name);
                tracing::debug!(proxy = proxy.name(), model, "resolved model to proxy");
                return Some(Resolution {
                    provider: Arc::clone(proxy) as Arc<dyn ChatProvider>,
                    model: model.to_string(),
                });
            }
        }

        // 2. Explicit provider prefix.
        if let Some(provider_type) = explicit {
            if let Some(provider) = self.provider(provider_type) {
                return Some(Resolution {
                    provider,
                    model: model_name.to_string(),
                });
            }
        }

        // 3. Static prefix table, first registered match.
        for (prefix, provider_type) in PREFIX_TABLE {
            if model_name.starts_with(prefix) {
                if let Some(provider) = self.provider(*provider_type) {
                    return Some(Resolution {
                        provider,
                        model: model_name.to_string(),
                    });
                }
            }
        }

        // 4. Provider self-declaration, in registration order.
        for (_, provider) in &self.providers {
            if provider.supports_model(model_name) {
                return Some(Resolution {
                    provider: Arc::clone(provider),
                    model: model_name.to_string(),
                });
            }
        }

        tracing::debug!(identifier, "no provider resolved");
        None
    }
}
