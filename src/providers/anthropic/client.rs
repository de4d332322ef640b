use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::{Map, Value};

use super::types::*;
use crate::provider::{ChatProvider, ChunkStream};
use crate::providers::{merge_params, synthetic_id, unix_timestamp};
use crate::sse::SseJsonStreamExt;
use crate::transport::HttpTransport;
use crate::types::{
    ChatCompletion, ChatCompletionChunk, Choice, ChunkChoice, CompletionRequest, Delta,
    DeltaFunctionCall, FinishReason, FunctionCall, ResponseMessage, Role, Usage,
};
use crate::Error;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

/// Required by the vendor; applied when the caller leaves `max_tokens` unset.
const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Anthropic messages-API adapter.
pub struct AnthropicProvider {
    transport: Arc<HttpTransport>,
    api_key: String,
    base_url: String,
    default_params: Map<String, Value>,
}

impl AnthropicProvider {
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
        format!("{}/messages", self.base_url)
    }

    fn headers(&self) -> Vec<(String, String)> {
        vec![
            ("x-api-key".to_string(), self.api_key.clone()),
            ("anthropic-version".to_string(), API_VERSION.to_string()),
        ]
    }

    fn build_body(&self, request: &CompletionRequest, stream: bool) -> Result<Value, Error> {
        let mut messages: Vec<AnthropicMessage> = Vec::new();
        let mut system_parts: Vec<String> = Vec::new();

        for message in &request.messages {
            if message.role == Role::System {
                // No inline system messages for this vendor; they merge into
                // the request-level system field.
                if let Some(content) = &message.content {
                    system_parts.push(content.clone());
                }
                continue;
            }

            if let Some(call) = &message.function_call {
                push_tool_use(&mut messages, message.content.as_deref(), call)?;
                continue;
            }

            if let Some(result) = &message.function_call_result {
                messages.push(AnthropicMessage {
                    role: "user".to_string(),
                    content: AnthropicContent::Blocks(vec![AnthropicContentBlock::ToolResult {
                        tool_use_id: result.name.clone(),
                        content: result.content.clone(),
                    }]),
                });
                continue;
            }

            let role = match message.role {
                Role::Assistant => "assistant",
                _ => "user",
            };
            messages.push(AnthropicMessage {
                role: role.to_string(),
                content: AnthropicContent::Text(message.content.clone().unwrap_or_default()),
            });
        }

        let wire = AnthropicRequest {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: if system_parts.is_empty() {
                None
            } else {
                Some(system_parts.join("\n\n"))
            },
            temperature: request.temperature,
            tools: request.functions.as_ref().map(|functions| {
                functions
                    .iter()
                    .map(|f| AnthropicTool {
                        name: f.name.clone(),
                        description: f.description.clone(),
                        input_schema: f.parameters.clone(),
                    })
                    .collect()
            }),
            stream: stream.then_some(true),
        };

        let mut body = serde_json::to_value(&wire)?;
        merge_params(&mut body, &request.additional_params);
        merge_params(&mut body, &self.default_params);
        Ok(body)
    }

    fn convert_response(&self, value: Value, model: &str) -> Result<ChatCompletion, Error> {
        let wire: AnthropicResponse = serde_json::from_value(value)
            .map_err(|e| Error::protocol(format!("unexpected Anthropic response shape: {e}")))?;

        // First text block is the message content; the last tool_use block
        // becomes the canonical function call.
        let mut content: Option<String> = None;
        let mut function_call: Option<FunctionCall> = None;
        for block in wire.content {
            match block {
                AnthropicContentBlock::Text { text } => {
                    if content.is_none() {
                        content = Some(text);
                    }
                }
                AnthropicContentBlock::ToolUse { name, input, .. } => {
                    function_call = Some(FunctionCall {
                        name,
                        arguments: serde_json::to_string(&input)?,
                    });
                }
                _ => {}
            }
        }

        Ok(ChatCompletion {
            id: wire.id,
            object: "chat.completion".to_string(),
            created: unix_timestamp(),
            model: if wire.model.is_empty() {
                model.to_string()
            } else {
                wire.model
            },
            choices: vec![Choice {
                index: 0,
                message: ResponseMessage {
                    role: "assistant".to_string(),
                    content,
                    function_call,
                },
                finish_reason: map_stop_reason(wire.stop_reason.as_deref()),
            }],
            usage: wire.usage.map(Usage::from).unwrap_or_default(),
        })
    }
}

/// Fold a canonical tool invocation into the message list: an inline
/// `tool_use` block on the current assistant turn, or a new assistant turn.
fn push_tool_use(
    messages: &mut Vec<AnthropicMessage>,
    content: Option<&str>,
    call: &FunctionCall,
) -> Result<(), Error> {
    let input: Value = serde_json::from_str(&call.arguments)
        .map_err(|e| Error::protocol(format!("invalid function arguments: {e}")))?;
    // The function name doubles as the correlation id; the matching
    // tool_result references it.
    let tool_use = AnthropicContentBlock::ToolUse {
        id: call.name.clone(),
        name: call.name.clone(),
        input,
    };

    let mut blocks = Vec::new();
    if let Some(text) = content {
        blocks.push(AnthropicContentBlock::Text {
            text: text.to_string(),
        });
    }

    match messages.last_mut() {
        Some(last) if last.role == "assistant" => match &mut last.content {
            AnthropicContent::Text(text) => {
                let mut merged = vec![AnthropicContentBlock::Text { text: text.clone() }];
                merged.extend(blocks);
                merged.push(tool_use);
                last.content = AnthropicContent::Blocks(merged);
            }
            AnthropicContent::Blocks(existing) => {
                existing.extend(blocks);
                existing.push(tool_use);
            }
        },
        _ => {
            blocks.push(tool_use);
            messages.push(AnthropicMessage {
                role: "assistant".to_string(),
                content: AnthropicContent::Blocks(blocks),
            });
        }
    }
    Ok(())
}

fn map_stop_reason(reason: Option<&str>) -> Option<FinishReason> {
    match reason {
        Some("end_turn") | Some("stop_sequence") => Some(FinishReason::Stop),
        Some("max_tokens") => Some(FinishReason::Length),
        Some("tool_use") => Some(FinishReason::FunctionCall),
        Some(other) => {
            tracing::debug!(reason = other, "unknown Anthropic stop reason");
            None
        }
        None => None,
    }
}

/// Per-request envelope for translated stream chunks.
struct StreamEnvelope {
    id: String,
    created: u64,
    model: String,
}

impl StreamEnvelope {
    fn chunk(
        &self,
        delta: Delta,
        finish_reason: Option<FinishReason>,
        usage: Option<Usage>,
    ) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
            usage,
        }
    }

    /// Translate one vendor event into zero or one canonical chunk.
    fn convert(&self, event: AnthropicStreamEvent) -> Option<ChatCompletionChunk> {
        match event {
            // Structural events carrying no message data.
            AnthropicStreamEvent::MessageStart | AnthropicStreamEvent::Ping => None,
            AnthropicStreamEvent::ContentBlockStart { content_block } => match content_block {
                AnthropicContentBlock::ToolUse { name, .. } => Some(self.chunk(
                    Delta {
                        role: None,
                        content: None,
                        function_call: Some(DeltaFunctionCall {
                            name: Some(name),
                            arguments: Some(String::new()),
                        }),
                    },
                    None,
                    None,
                )),
                AnthropicContentBlock::Text { text } if !text.is_empty() => Some(self.chunk(
                    Delta {
                        role: None,
                        content: Some(text),
                        function_call: None,
                    },
                    None,
                    None,
                )),
                _ => None,
            },
            AnthropicStreamEvent::ContentBlockDelta { delta } => match delta {
                AnthropicContentDelta::TextDelta { text } => Some(self.chunk(
                    Delta {
                        role: None,
                        content: Some(text),
                        function_call: None,
                    },
                    None,
                    None,
                )),
                AnthropicContentDelta::InputJsonDelta { partial_json } => Some(self.chunk(
                    Delta {
                        role: None,
                        content: None,
                        function_call: Some(DeltaFunctionCall {
                            name: None,
                            arguments: Some(partial_json),
                        }),
                    },
                    None,
                    None,
                )),
                AnthropicContentDelta::Unknown => Some(self.chunk(Delta::default(), None, None)),
            },
            AnthropicStreamEvent::ContentBlockStop => Some(self.chunk(Delta::default(), None, None)),
            AnthropicStreamEvent::MessageDelta { delta, usage } => Some(self.chunk(
                Delta::default(),
                map_stop_reason(delta.stop_reason.as_deref()),
                usage.map(Usage::from),
            )),
            // Handled by the caller: terminates the stream.
            AnthropicStreamEvent::MessageStop => None,
            // Unrecognized events become empty deltas rather than being
            // dropped.
            AnthropicStreamEvent::Unknown => Some(self.chunk(Delta::default(), None, None)),
        }
    }
}

#[async_trait::async_trait]
impl ChatProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn completion(&self, request: &CompletionRequest) -> Result<ChatCompletion, Error> {
        let body = self.build_body(request, false)?;
        let value = self
            .transport
            .post_json(&self.url(), &self.headers(), &body)
            .await?;
        self.convert_response(value, &request.model)
    }

    async fn stream_completion(&self, request: &CompletionRequest) -> Result<ChunkStream, Error> {
        let body = self.build_body(request, true)?;
        let bytes = self
            .transport
            .post_stream(&self.url(), &self.headers(), &body)
            .await?;

        let envelope = StreamEnvelope {
            id: synthetic_id(),
            created: unix_timestamp(),
            model: request.model.clone(),
        };

        let chunks = bytes
            .sse_json()
            .scan(envelope, |envelope, item| {
                let step: Option<Option<Result<ChatCompletionChunk, Error>>> = match item {
                    Err(e) => Some(Some(Err(e))),
                    Ok(value) => match serde_json::from_value::<AnthropicStreamEvent>(value) {
                        Err(e) => Some(Some(Err(Error::protocol(format!(
                            "unexpected Anthropic stream event: {e}"
                        ))))),
                        // The vendor's end-of-stream signal.
                        Ok(AnthropicStreamEvent::MessageStop) => None,
                        Ok(event) => Some(envelope.convert(event).map(Ok)),
                    },
                };
                std::future::ready(step)
            })
            .filter_map(std::future::ready);
        Ok(Box::pin(chunks))
    }

    fn supports_model(&self, model: &str) -> bool {
        model.starts_with("claude")
    }
}
