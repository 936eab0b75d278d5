//! The conversation agent: the heart of Pico.
//!
//! The agent follows a **call → act → observe** cycle:
//!
//! 1. **Receive** the conversation history (from the HTTP API or the CLI)
//! 2. **Build context** (system prompt + today's date + notes, todos and preferences)
//! 3. **Send to the model** via the configured [`ModelProvider`](pico_core::ModelProvider)
//! 4. **If tool calls**: dispatch them through the capability registry, append results, loop
//! 5. **If text**: that is the answer
//!
//! The loop ends when the model answers with text or the iteration limit is hit.

pub mod loop_runner;
pub mod metadata;
pub mod profiling;
pub mod prompt;
pub mod stream_event;

#[cfg(test)]
mod test_helpers;

pub use loop_runner::{Agent, AgentSettings, RunOptions, RunOutcome};
pub use metadata::ActionMetadata;
pub use profiling::{Profiler, ProfilingEntry, ProfilingSummary};
pub use stream_event::AgentEvent;
pub use tokio_util::sync::CancellationToken;
