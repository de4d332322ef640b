use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::{Map, Value};

use super::types::*;
use crate::provider::{ChatProvider, ChunkStream};
use crate::providers::{merge_params, unix_timestamp};
use crate::sse::SseJsonStreamExt;
use crate::transport::HttpTransport;
use crate::types::{
    ChatCompletion, ChatCompletionChunk, Choice, ChunkChoice, CompletionRequest, Delta,
    DeltaFunctionCall, FinishReason, FunctionDef, Message, ResponseMessage, Role,
};
use crate::Error;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI chat-completions adapter.
///
/// The canonical schema is the OpenAI wire shape, so translation here is
/// mostly a matter of normalizing the envelope and the function-result
/// message representation.
pub struct OpenAiProvider {
    transport: Arc<HttpTransport>,
    api_key: String,
    base_url: String,
    default_params: Map<String, Value>,
}

impl OpenAiProvider {
    pub fn new(transport: Arc<HttpTransport>, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            default_params: Map::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_default_params(mut self, params: Map<String, Value>) -> Self {
        self.default_params = params;
        self
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn headers(&self) -> Vec<(String, String)> {
        vec![(
            "Authorization".to_string(),
            format!("Bearer {}", self.api_key),
        )]
    }

    fn build_body(&self, request: &CompletionRequest, stream: bool) -> Result<Value, Error> {
        let wire = OpenAiRequest {
            model: request.model.clone(),
            messages: request.messages.iter().map(convert_message).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            functions: request
                .functions
                .as_ref()
                .map(|functions| functions.iter().map(convert_function).collect()),
            stream: stream.then_some(true),
        };
        let mut body = serde_json::to_value(&wire)?;
        merge_params(&mut body, &request.additional_params);
        merge_params(&mut body, &self.default_params);
        Ok(body)
    }

    fn convert_response(&self, value: Value) -> Result<ChatCompletion, Error> {
        let wire: OpenAiResponse = serde_json::from_value(value)
            .map_err(|e| Error::protocol(format!("unexpected OpenAI response shape: {e}")))?;
        let choice = wire
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::protocol("OpenAI response contained no choices"))?;

        let function_call = choice.message.function_call;
        let message = ResponseMessage {
            role: "assistant".to_string(),
            // A tool invocation always yields a null content.
            content: if function_call.is_some() {
                None
            } else {
                choice.message.content
            },
            function_call,
        };

        Ok(ChatCompletion {
            id: wire.id,
            object: "chat.completion".to_string(),
            created: if wire.created != 0 {
                wire.created
            } else {
                unix_timestamp()
            },
            model: wire.model,
            choices: vec![Choice {
                index: 0,
                message,
                finish_reason: map_finish_reason(choice.finish_reason.as_deref()),
            }],
            usage: wire.usage.map(Into::into).unwrap_or_default(),
        })
    }
}

fn convert_message(message: &Message) -> OpenAiMessage {
    if let Some(result) = &message.function_call_result {
        return OpenAiMessage {
            role: "function".to_string(),
            content: Some(result.content.clone()),
            name: Some(result.name.clone()),
            function_call: None,
        };
    }

    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "function",
    };
    OpenAiMessage {
        role: role.to_string(),
        content: message.content.clone(),
        name: None,
        function_call: message.function_call.clone(),
    }
}

fn convert_function(function: &FunctionDef) -> OpenAiFunctionDef {
    OpenAiFunctionDef {
        name: function.name.clone(),
        description: function.description.clone(),
        parameters: function.parameters.clone(),
    }
}

fn map_finish_reason(reason: Option<&str>) -> Option<FinishReason> {
    match reason {
        Some("stop") => Some(FinishReason::Stop),
        Some("length") => Some(FinishReason::Length),
        Some("function_call") | Some("tool_calls") => Some(FinishReason::FunctionCall),
        Some(other) => {
            tracing::debug!(reason = other, "unknown OpenAI finish reason");
            None
        }
        None => None,
    }
}

fn convert_stream_chunk(wire: OpenAiStreamChunk) -> ChatCompletionChunk {
    let choice = wire.choices.into_iter().next();
    let (delta, finish_reason) = match choice {
        Some(choice) => (
            Delta {
                role: choice.delta.role,
                content: choice.delta.content,
                function_call: choice.delta.function_call.map(|fc| DeltaFunctionCall {
                    name: fc.name,
                    arguments: fc.arguments,
                }),
            },
            map_finish_reason(choice.finish_reason.as_deref()),
        ),
        None => (Delta::default(), None),
    };

    ChatCompletionChunk {
        id: wire.id,
        object: "chat.completion.chunk".to_string(),
        created: if wire.created != 0 {
            wire.created
        } else {
            unix_timestamp()
        },
        model: wire.model,
        choices: vec![ChunkChoice {
            index: 0,
            delta,
            finish_reason,
        }],
        usage: wire.usage.map(Into::into),
    }
}

#[async_trait::async_trait]
impl ChatProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn completion(&self, request: &CompletionRequest) -> Result<ChatCompletion, Error> {
        let body = self.build_body(request, false)?;
        let value = self
            .transport
            .post_json(&self.url(), &self.headers(), &body)
            .await?;
        self.convert_response(value)
    }

    async fn stream_completion(&self, request: &CompletionRequest) -> Result<ChunkStream, Error> {
        let body = self.build_body(request, true)?;
        let bytes = self
            .transport
            .post_stream(&self.url(), &self.headers(), &body)
            .await?;

        let chunks = bytes.sse_json().map(|item| {
            item.and_then(|value| {
                let wire: OpenAiStreamChunk = serde_json::from_value(value)
                    .map_err(|e| Error::protocol(format!("unexpected OpenAI stream event: {e}")))?;
                Ok(convert_stream_chunk(wire))
            })
        });
        Ok(Box::pin(chunks))
    }

    fn supports_model(&self, model: &str) -> bool {
        ["gpt-", "chatgpt-", "o1", "o3", "text-"]
            .iter()
            .any(|prefix| model.starts_with(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> OpenAiProvider {
        let transport = Arc::new(HttpTransport::new().unwrap());
        OpenAiProvider::new(transport, "test-key")
    }

    #[test]
    fn test_function_result_becomes_function_role() {
        let message = Message::function_call_result("get_weather", "22C, sunny");
        let wire = convert_message(&message);
        assert_eq!(wire.role, "function");
        assert_eq!(wire.name.as_deref(), Some("get_weather"));
        assert_eq!(wire.content.as_deref(), Some("22C, sunny"));
    }

    #[test]
    fn test_body_merges_defaults_without_overriding() {
        let mut defaults = Map::new();
        defaults.insert("temperature".to_string(), json!(0.0));
        defaults.insert("user".to_string(), json!("relay"));
        let provider = provider().with_default_params(defaults);

        let request = CompletionRequest::new("gpt-4")
            .message(Message::user("Hi"))
            .temperature(0.7);
        let body = provider.build_body(&request, false).unwrap();

        assert_eq!(body["temperature"], json!(0.7));
        assert_eq!(body["user"], json!("relay"));
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn test_tool_invocation_response_nulls_content() {
        let value = json!({
            "id": "chatcmpl-123",
            "created": 1700000000,
            "model": "gpt-4",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "ignored by the wire rules",
                    "function_call": {"name": "get_weather", "arguments": "{\"location\":\"Paris\"}"}
                },
                "finish_reason": "function_call"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        });

        let completion = provider().convert_response(value).unwrap();
        let choice = &completion.choices[0];
        assert_eq!(choice.message.content, None);
        assert_eq!(
            choice.message.function_call.as_ref().unwrap().name,
            "get_weather"
        );
        assert_eq!(choice.finish_reason, Some(FinishReason::FunctionCall));
        assert_eq!(completion.usage.total_tokens, 15);
    }

    #[test]
    fn test_stream_chunk_translation() {
        let wire: OpenAiStreamChunk = serde_json::from_value(json!({
            "id": "chatcmpl-123",
            "created": 1700000000,
            "model": "gpt-4",
            "choices": [{"delta": {"content": "Hel"}, "finish_reason": null}]
        }))
        .unwrap();

        let chunk = convert_stream_chunk(wire);
        assert_eq!(chunk.object, "chat.completion.chunk");
        assert_eq!(chunk.content(), Some("Hel"));
        assert_eq!(chunk.choices[0].finish_reason, None);
    }

    #[test]
    fn test_supports_model_prefixes() {
        let provider = provider();
        assert!(provider.supports_model("gpt-3.5-turbo"));
        assert!(provider.supports_model("o1-mini"));
        assert!(!provider.supports_model("claude-3-opus"));
    }
}
