//! Preferences provider: learned facts about the user, grouped by section.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use pico_core::capability::{
    CapabilityProvider, ParamKind, ResourceDescriptor, ToolDescriptor, find_tool,
};
use pico_core::error::CapabilityError;
use serde_json::{Value, json};
use tracing::info;

use crate::error::PluginError;
use crate::opt_str;
use crate::store::JsonStore;

pub const PREFERENCES_URI: &str = "preferences://all";

/// Section name to preference strings.
pub type Preferences = BTreeMap<String, Vec<String>>;

pub fn default_preferences() -> Preferences {
    BTreeMap::from([
        (
            "general".to_string(),
            vec![
                "User prefers concise and helpful responses".to_string(),
                "User likes proactive suggestions".to_string(),
            ],
        ),
        ("notes_plugin".to_string(), Vec::new()),
        ("todos_plugin".to_string(), Vec::new()),
    ])
}

/// Display title for a section key: `todos_plugin` becomes `Todos`.
fn section_title(section: &str) -> String {
    section
        .replace("_plugin", "")
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decode `updates` sent as a JSON string into the object it holds.
fn decode_string_updates(arguments: &mut Value) -> Result<(), PluginError> {
    if let Some(raw) = arguments.get("updates").and_then(Value::as_str) {
        let parsed = serde_json::from_str::<Value>(raw)
            .map_err(|e| PluginError::Invalid(format!("Invalid JSON in updates: {e}")))?;
        arguments["updates"] = parsed;
    }
    Ok(())
}

/// Flatten the `updates` object into section -> preference strings.
fn parse_updates(value: &Value) -> Result<BTreeMap<String, Vec<String>>, PluginError> {
    let sections = value
        .as_object()
        .ok_or_else(|| PluginError::Invalid("updates must be a JSON object".into()))?;

    let mut updates = BTreeMap::new();
    for (section, prefs) in sections {
        let values: Vec<&Value> = match prefs {
            Value::Object(map) => map.values().collect(),
            Value::Array(items) => items.iter().collect(),
            Value::String(_) => vec![prefs],
            _ => {
                return Err(PluginError::Invalid(format!(
                    "section '{section}' must map keys to preference strings"
                )));
            }
        };
        let strings = values
            .into_iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    PluginError::Invalid(format!("preferences in '{section}' must be strings"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        updates.insert(section.clone(), strings);
    }
    Ok(updates)
}

pub struct PreferencesProvider {
    store: JsonStore<Preferences>,
}

impl PreferencesProvider {
    /// Open `preferences.json` under `data_dir`, seeded with the defaults.
    pub fn open(data_dir: &Path) -> Result<Self, PluginError> {
        Ok(Self {
            store: JsonStore::open(data_dir.join("preferences.json"), default_preferences())?,
        })
    }

    pub fn in_memory() -> Self {
        Self {
            store: JsonStore::in_memory(default_preferences()),
        }
    }

    pub async fn all(&self) -> Preferences {
        self.store.read(|prefs| prefs.clone()).await
    }

    /// The requested sections; unknown sections come back empty.
    pub async fn sections(&self, names: &[String]) -> Preferences {
        if names.is_empty() {
            return self.all().await;
        }
        self.store
            .read(|prefs| {
                names
                    .iter()
                    .map(|n| (n.clone(), prefs.get(n).cloned().unwrap_or_default()))
                    .collect()
            })
            .await
    }

    /// Append new preferences, skipping ones already present. Returns the full map.
    pub async fn merge(
        &self,
        updates: BTreeMap<String, Vec<String>>,
    ) -> Result<Preferences, PluginError> {
        let merged = self
            .store
            .update(|prefs| {
                for (section, new_prefs) in updates {
                    let existing = prefs.entry(section).or_default();
                    for pref in new_prefs {
                        if !existing.contains(&pref) {
                            existing.push(pref);
                        }
                    }
                }
                Ok(prefs.clone())
            })
            .await?;
        info!(sections = merged.len(), "Preferences updated");
        Ok(merged)
    }

    /// Non-empty sections rendered as Markdown.
    pub async fn render_all(&self) -> String {
        let prefs = self.all().await;
        let mut content = String::from("# User Preferences\n\n");
        for (section, items) in prefs.iter().filter(|(_, items)| !items.is_empty()) {
            content.push_str(&format!("## {}\n", section_title(section)));
            for pref in items {
                content.push_str(&format!("- {pref}\n"));
            }
            content.push('\n');
        }
        content
    }

    async fn run_tool(&self, name: &str, args: &Value) -> Result<Value, PluginError> {
        match name {
            "get_preferences" => {
                let sections: Vec<String> = opt_str(args, "sections")
                    .unwrap_or_default()
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                Ok(json!(self.sections(&sections).await))
            }
            "update_preferences" => {
                let updates = parse_updates(args.get("updates").unwrap_or(&Value::Null))?;
                Ok(json!(self.merge(updates).await?))
            }
            other => Err(PluginError::Invalid(format!("Unknown tool: {other}"))),
        }
    }
}

#[async_trait]
impl CapabilityProvider for PreferencesProvider {
    fn name(&self) -> &str {
        "Preferences"
    }

    fn description(&self) -> &str {
        "Manages user preferences and learns user behavior to provide personalized assistance"
    }

    fn list_tools(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor::new(
                "get_preferences",
                "Get user preferences from specified sections or all sections",
            )
            .optional(
                "sections",
                ParamKind::String,
                "Comma-separated sections to retrieve (e.g., 'general,todos_plugin'). Leave empty for all.",
            ),
            ToolDescriptor::new(
                "update_preferences",
                "Merge new preferences into the existing ones. Use this when learning new patterns about the user.",
            )
            .required(
                "updates",
                ParamKind::Object,
                r#"Updates as {"section": {"key": "preference description"}}, e.g. {"general": {"name": "User name is Tony"}}"#,
            ),
        ]
    }

    async fn call_tool(&self, name: &str, mut arguments: Value) -> Result<Value, CapabilityError> {
        // Models often send the updates object as a JSON string
        if name == "update_preferences" {
            decode_string_updates(&mut arguments).map_err(|e| e.into_capability(name))?;
        }
        find_tool(&self.list_tools(), name, &arguments)?;
        self.run_tool(name, &arguments)
            .await
            .map_err(|e| e.into_capability(name))
    }

    fn list_resources(&self) -> Vec<ResourceDescriptor> {
        vec![ResourceDescriptor::text(
            PREFERENCES_URI,
            "User Preferences",
            "Complete user preferences including general settings and plugin-specific preferences",
        )]
    }

    async fn read_resource(&self, uri: &str) -> Result<String, CapabilityError> {
        match uri {
            PREFERENCES_URI => Ok(self.render_all().await),
            other => Err(CapabilityError::UnknownResource(other.to_string())),
        }
    }
}
