//! # Pico Core
//!
//! Domain types, traits, and error definitions for the Pico assistant.
//! This crate has **no framework dependencies**: it defines the conversation
//! model, the language-model provider trait and the capability contract that
//! every other crate implements against.
//!
//! ## Layout
//!
//! - [`capability`]: tool and resource descriptors, tool outcomes and the
//!   [`CapabilityProvider`] trait implemented by notes, todos and preferences
//! - [`registry`]: the [`CapabilityRegistry`] that aggregates providers into
//!   one discovery and dispatch surface
//! - [`model`]: the [`ModelProvider`] trait over LLM backends
//! - [`message`]: conversation messages and tool-call payloads

pub mod capability;
pub mod error;
pub mod message;
pub mod model;
pub mod registry;

// Re-export key types at crate root for ergonomics
pub use capability::{
    CapabilityProvider, ParamKind, ResourceDescriptor, ToolDescriptor, ToolInvocation,
    ToolOutcome, ToolParam,
};
pub use error::{CapabilityError, Error, ProviderError, RegistryError, Result, RunError};
pub use message::{Message, MessageToolCall, Role};
pub use model::{ModelProvider, ModelRequest, ModelResponse, ToolDefinition, Usage};
pub use registry::{CapabilityRegistry, DiscoveredResource, DiscoveredTool};
