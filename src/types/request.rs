use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::message::{FunctionDef, Message};

/// A canonical chat-completion request.
///
/// `model` may carry an explicit provider prefix (`"openai/gpt-4"`) or be a
/// bare model name resolved through the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub functions: Option<Vec<FunctionDef>>,
    /// Extra vendor parameters merged verbatim into the outgoing body.
    #[serde(default, flatten)]
    pub additional_params: Map<String, Value>,
}

impl CompletionRequest {
    /// Create a request for the given model with no messages yet.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            temperature: None,
            max_tokens: None,
            stream: None,
            functions: None,
            additional_params: Map::new(),
        }
    }

    /// Append a message.
    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Append multiple messages.
    pub fn messages(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.messages.extend(messages);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Declare callable functions.
    pub fn functions(mut self, functions: Vec<FunctionDef>) -> Self {
        self.functions = Some(functions);
        self
    }

    /// Attach an extra vendor parameter.
    pub fn param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.additional_params.insert(key.into(), value);
        self
    }

    /// Copy of this request with the outgoing model name substituted.
    pub(crate) fn with_model(&self, model: &str) -> Self {
        let mut request = self.clone();
        request.model = model.to_string();
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_preserves_message_order() {
        let request = CompletionRequest::new("gpt-4")
            .message(Message::system("You are a helpful assistant"))
            .message(Message::user("Hello"))
            .temperature(0.7)
            .max_tokens(100);

        assert_eq!(request.model, "gpt-4");
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, crate::types::Role::System);
        assert_eq!(request.messages[1].role, crate::types::Role::User);
        assert_eq!(request.temperature, Some(0.7));
    }

    #[test]
    fn test_with_model_substitution() {
        let request = CompletionRequest::new("gpt-4-proxy").message(Message::user("Hi"));
        let substituted = request.with_model("deepseek-chat");
        assert_eq!(substituted.model, "deepseek-chat");
        assert_eq!(substituted.messages, request.messages);
    }

    #[test]
    fn test_additional_params_flatten() {
        let request = CompletionRequest::new("gpt-4")
            .message(Message::user("Hi"))
            .param("top_p", serde_json::json!(0.9));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["top_p"], serde_json::json!(0.9));
    }
}
