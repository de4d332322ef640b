//! Folding a chunk stream back into a buffered completion.

use futures_util::StreamExt;

use crate::provider::ChunkStream;
use crate::types::{
    ChatCompletion, ChatCompletionChunk, Choice, FinishReason, FunctionCall, ResponseMessage,
    Usage,
};
use crate::Error;

/// Accumulates streamed deltas into a complete chat completion.
#[derive(Debug, Default)]
pub struct ChunkAccumulator {
    id: String,
    created: u64,
    model: String,
    content: Option<String>,
    function_name: Option<String>,
    function_arguments: String,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
}

impl ChunkAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one chunk into the accumulated state.
    pub fn push(&mut self, chunk: &ChatCompletionChunk) {
        if self.id.is_empty() {
            self.id = chunk.id.clone();
            self.created = chunk.created;
            self.model = chunk.model.clone();
        }
        if let Some(usage) = &chunk.usage {
            self.usage = Some(usage.clone());
        }

        let Some(choice) = chunk.choices.first() else {
            return;
        };
        if let Some(reason) = choice.finish_reason {
            self.finish_reason = Some(reason);
        }
        if let Some(fragment) = &choice.delta.content {
            self.content.get_or_insert_with(String::new).push_str(fragment);
        }
        if let Some(call) = &choice.delta.function_call {
            if let Some(name) = &call.name {
                self.function_name = Some(name.clone());
            }
            if let Some(fragment) = &call.arguments {
                self.function_arguments.push_str(fragment);
            }
        }
    }

    /// Finalize into a canonical completion.
    pub fn finish(self) -> ChatCompletion {
        let function_call = self.function_name.map(|name| FunctionCall {
            name,
            arguments: self.function_arguments,
        });
        ChatCompletion {
            id: self.id,
            object: "chat.completion".to_string(),
            created: self.created,
            model: self.model,
            choices: vec![Choice {
                index: 0,
                message: ResponseMessage {
                    role: "assistant".to_string(),
                    content: if function_call.is_some() {
                        self.content.filter(|c| !c.is_empty())
                    } else {
                        self.content
                    },
                    function_call,
                },
                finish_reason: self.finish_reason,
            }],
            usage: self.usage.unwrap_or_default(),
        }
    }
}

/// Drain a chunk stream into a buffered completion.
pub async fn collect_stream(mut stream: ChunkStream) -> Result<ChatCompletion, Error> {
    let mut accumulator = ChunkAccumulator::new();
    while let Some(chunk) = stream.next().await {
        accumulator.push(&chunk?);
    }
    Ok(accumulator.finish())
}
