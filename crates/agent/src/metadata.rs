//! Action metadata: which items a run created, updated, completed or deleted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ids touched by successful tool calls, keyed like `created_todos`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionMetadata(BTreeMap<String, Vec<String>>);

impl ActionMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful tool result.
    ///
    /// Only payloads that are objects with a string `id` count. The key is
    /// derived from the tool name: `complete_todo` → `completed_todos`.
    pub fn record(&mut self, tool_name: &str, payload: &Value) {
        let Some(id) = payload.get("id").and_then(Value::as_str) else {
            return;
        };
        let Some(key) = action_key(tool_name) else {
            return;
        };
        tracing::debug!(key = %key, id, "Tracked action");
        self.0.entry(key).or_default().push(id.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.0.get(key).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn action_key(tool_name: &str) -> Option<String> {
    let (verb, resource) = tool_name.split_once('_')?;
    if verb.is_empty() || resource.is_empty() {
        return None;
    }
    Some(format!("{verb}d_{resource}s"))
}
