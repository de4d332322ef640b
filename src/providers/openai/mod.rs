//! OpenAI chat-completions adapter.

mod client;
mod types;

pub use client::OpenAiProvider;
