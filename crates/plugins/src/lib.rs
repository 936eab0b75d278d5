//! Capability providers for Pico: notes, todos and preferences.
//!
//! Each provider owns one JSON file under the data directory and serialises
//! its own writes. [`PluginSet`] opens all three and registers them with a
//! [`CapabilityRegistry`].

pub mod error;
pub mod notes;
pub mod preferences;
pub mod store;
pub mod todos;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use pico_core::error::RegistryError;
use pico_core::registry::CapabilityRegistry;
use serde_json::Value;

pub use error::PluginError;
pub use notes::{NewNote, Note, NotePatch, NotesProvider};
pub use preferences::{Preferences, PreferencesProvider};
pub use todos::{NewTodo, Priority, Todo, TodoPatch, TodosProvider};

/// The three providers, shared between the registry and the HTTP CRUD routes.
#[derive(Clone)]
pub struct PluginSet {
    pub preferences: Arc<PreferencesProvider>,
    pub notes: Arc<NotesProvider>,
    pub todos: Arc<TodosProvider>,
}

impl PluginSet {
    /// Open every provider's file under `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self, PluginError> {
        tracing::info!(data_dir = %data_dir.display(), "Opening plugin data");
        Ok(Self {
            preferences: Arc::new(PreferencesProvider::open(data_dir)?),
            notes: Arc::new(NotesProvider::open(data_dir)?),
            todos: Arc::new(TodosProvider::open(data_dir)?),
        })
    }

    /// Providers that keep everything in memory.
    pub fn in_memory() -> Self {
        Self {
            preferences: Arc::new(PreferencesProvider::in_memory()),
            notes: Arc::new(NotesProvider::in_memory()),
            todos: Arc::new(TodosProvider::in_memory()),
        }
    }

    /// Register preferences, notes and todos, in that order.
    pub fn registry(&self, tool_timeout: Duration) -> Result<CapabilityRegistry, RegistryError> {
        CapabilityRegistry::new()
            .with_tool_timeout(tool_timeout)
            .register(self.preferences.clone())?
            .register(self.notes.clone())?
            .register(self.todos.clone())
    }
}

/// A required string argument. Presence is already checked by schema validation.
pub(crate) fn req_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, PluginError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| PluginError::Invalid(format!("missing required field '{key}'")))
}

pub(crate) fn opt_str(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(Value::as_str).map(str::to_string)
}
