//! A unified routing and normalization layer over multiple LLM providers.
//!
//! One canonical request/response schema (the OpenAI chat-completion shape),
//! routed by model identifier to a registered provider adapter or a
//! user-defined proxy, with bidirectional translation of each backend's
//! native wire format including SSE streaming.

pub mod accumulator;
pub mod client;
pub mod error;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod sse;
pub mod transport;
pub mod types;

// Re-export core types for easy usage
pub use accumulator::{collect_stream, ChunkAccumulator};
pub use client::{LlmClient, ProviderConfig};
pub use error::Error;
pub use provider::{ChatProvider, ChunkStream};
pub use providers::{AnthropicProvider, OpenAiProvider, ProxyConfig, ProxyProvider};
pub use registry::{parse_model, ProviderType, Registry, Resolution};
pub use types::*;
