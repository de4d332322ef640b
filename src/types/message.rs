use serde::{Deserialize, Serialize};

/// Role of a message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single conversation turn in the canonical schema.
///
/// Ordering within a request is meaningful and preserved through every
/// vendor translation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Option<String>,
    /// A tool invocation emitted by the assistant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    /// The result of a previously emitted tool invocation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call_result: Option<FunctionCallResult>,
}

impl Message {
    /// Create a new message with role and text content.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Message {
            role,
            content: Some(content.into()),
            function_call: None,
            function_call_result: None,
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Message::new(Role::System, content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Message::new(Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Message::new(Role::Assistant, content)
    }

    /// Create an assistant turn invoking a tool. `arguments` is JSON text.
    pub fn function_call(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Message {
            role: Role::Assistant,
            content: None,
            function_call: Some(FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            }),
            function_call_result: None,
        }
    }

    /// Create a tool turn carrying the output of a tool invocation.
    pub fn function_call_result(name: impl Into<String>, content: impl Into<String>) -> Self {
        Message {
            role: Role::Tool,
            content: None,
            function_call: None,
            function_call_result: Some(FunctionCallResult {
                name: name.into(),
                content: content.into(),
            }),
        }
    }
}

/// A tool invocation: function name plus JSON-encoded arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON text; may be re-serialized by adapters but must parse back to an
    /// equal structure.
    pub arguments: String,
}

/// The output of a tool invocation, keyed by function name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallResult {
    pub name: String,
    pub content: String,
}

/// A callable function declared to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    /// JSON Schema for the function parameters, carried through to vendors
    /// unchanged.
    pub parameters: serde_json::Value,
}
