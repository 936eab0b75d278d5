//! Error types for the Pico domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] aggregates them.

use thiserror::Error;

/// The top-level error type for Pico operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Run error: {0}")]
    Run(#[from] RunError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures talking to the language model.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failures raised by a single tool call or resource read.
///
/// These never end a run: the registry turns them into
/// [`ToolOutcome::Failure`](crate::capability::ToolOutcome) so the model can
/// react to them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    #[error("Tool execution failed: {tool}: {reason}")]
    ExecutionFailed { tool: String, reason: String },

    #[error("timeout: {tool} did not finish within {timeout_ms}ms")]
    Timeout { tool: String, timeout_ms: u64 },
}

/// Misconfiguration detected while registering capability providers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Duplicate tool name '{name}': declared by '{existing}' and '{incoming}'")]
    DuplicateToolName {
        name: String,
        existing: String,
        incoming: String,
    },

    #[error("Duplicate resource uri '{uri}': declared by '{existing}' and '{incoming}'")]
    DuplicateResourceUri {
        uri: String,
        existing: String,
        incoming: String,
    },
}

/// Errors that terminate an agent run.
#[derive(Debug, Clone, Error)]
pub enum RunError {
    #[error("Model call failed: {0}")]
    ModelTransport(#[from] ProviderError),

    #[error("Iteration limit exceeded: the model was called {max} times without a final answer")]
    IterationLimitExceeded { max: u32 },

    #[error("Run cancelled")]
    Cancelled,
}
