//! Plugin-level errors.

use pico_core::error::CapabilityError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("{0}")]
    Invalid(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl PluginError {
    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Map to the error reported for a tool call.
    pub fn into_capability(self, tool: &str) -> CapabilityError {
        match self {
            Self::Invalid(reason) => CapabilityError::InvalidArguments {
                tool: tool.to_string(),
                reason,
            },
            other => CapabilityError::ExecutionFailed {
                tool: tool.to_string(),
                reason: other.to_string(),
            },
        }
    }
}
