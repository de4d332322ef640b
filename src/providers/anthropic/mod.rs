//! Anthropic messages-API adapter.

mod client;
mod types;

pub use client::AnthropicProvider;
