//! Agent-level streaming events.
//!
//! `AgentEvent` is what a streamed run reports to the gateway, which forwards
//! each one as a server-sent event named after [`AgentEvent::event_type`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::metadata::ActionMetadata;
use crate::profiling::ProfilingSummary;

/// Events emitted by the agent during a streamed run.
///
/// A run emits any number of `thinking`, `tool_call`, `tool_result` and
/// `response` events, and ends with exactly one `done` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A model call is about to start.
    Thinking { iteration: u32 },

    /// The agent is calling a tool.
    ToolCall { tool: String, args: Value },

    /// Tool execution completed.
    ToolResult {
        tool: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// The final answer text.
    Response { text: String },

    /// The run finished.
    Done {
        metadata: ActionMetadata,
        profiling: ProfilingSummary,
    },

    /// The run failed.
    Error { message: String },
}

impl AgentEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Thinking { .. } => "thinking",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Response { .. } => "response",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}
