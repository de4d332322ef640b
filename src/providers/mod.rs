//! Provider adapters for the supported backends.

pub mod anthropic;
pub mod openai;
pub mod proxy;

// Re-export commonly used adapter types
pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;
pub use proxy::{ProxyConfig, ProxyProvider};

use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock seconds since the Unix epoch, for translation-time stamps.
pub(crate) fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Synthetic response/chunk identifier for vendors that omit one.
pub(crate) fn synthetic_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

/// Merge extra parameters into a request body, without overriding fields the
/// translation already set.
pub(crate) fn merge_params(body: &mut Value, params: &Map<String, Value>) {
    if let Value::Object(map) = body {
        for (key, value) in params {
            map.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
}
