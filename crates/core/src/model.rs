//! ModelProvider trait: the abstraction over LLM backends.
//!
//! A model provider knows how to send a conversation plus tool definitions to
//! an LLM and get one complete response back. The agent loop calls
//! `complete()` without knowing which backend is behind it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::capability::ToolDescriptor;
use crate::error::ProviderError;
use crate::message::Message;

/// One request to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    /// The model to use (e.g., "claude-sonnet-4-5-20250929")
    pub model: String,

    /// System prompt, sent separately from the conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

fn default_temperature() -> f32 {
    0.7
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the tool's parameters
    pub input_schema: serde_json::Value,
}

impl From<&ToolDescriptor> for ToolDefinition {
    fn from(descriptor: &ToolDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            description: descriptor.description.clone(),
            input_schema: descriptor.input_schema(),
        }
    }
}

/// A complete response from the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    /// The generated assistant message (text and/or tool calls)
    pub message: Message,

    /// Token usage statistics
    #[serde(default)]
    pub usage: Usage,

    /// Which model actually responded
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Every LLM backend implements this trait.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// A human-readable name for this provider (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::ParamKind;

    #[test]
    fn tool_definition_from_descriptor() {
        let descriptor = ToolDescriptor::new("search_notes", "Search notes")
            .required("query", ParamKind::String, "Search text");
        let def = ToolDefinition::from(&descriptor);
        assert_eq!(def.name, "search_notes");
        assert_eq!(def.input_schema["required"][0], "query");
    }

    #[test]
    fn request_serialization_skips_empty_fields() {
        let req = ModelRequest {
            model: "claude".into(),
            system: None,
            messages: vec![Message::user("hi")],
            temperature: default_temperature(),
            max_tokens: 256,
            tools: vec![],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("system").is_none());
        assert!(json.get("tools").is_none());
        assert_eq!(json["max_tokens"], 256);
    }
}
