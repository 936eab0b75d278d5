//! Notes provider: free-form notes with title and content.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pico_core::capability::{
    CapabilityProvider, ParamKind, ResourceDescriptor, ToolDescriptor, find_tool,
};
use pico_core::error::CapabilityError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

use crate::error::PluginError;
use crate::store::JsonStore;
use crate::{opt_str, req_str};

pub const NOTES_URI: &str = "notes://all";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields accepted when creating a note over HTTP.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewNote {
    pub title: Option<String>,
    pub content: Option<String>,
}

/// Fields accepted when updating a note; absent fields are kept.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
}

pub struct NotesProvider {
    store: JsonStore<BTreeMap<String, Note>>,
}

impl NotesProvider {
    /// Open `notes.json` under `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self, PluginError> {
        Ok(Self {
            store: JsonStore::open(data_dir.join("notes.json"), BTreeMap::new())?,
        })
    }

    pub fn in_memory() -> Self {
        Self {
            store: JsonStore::in_memory(BTreeMap::new()),
        }
    }

    /// All notes, most recently updated first.
    pub async fn list(&self) -> Vec<Note> {
        self.store
            .read(|notes| {
                let mut all: Vec<Note> = notes.values().cloned().collect();
                all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
                all
            })
            .await
    }

    pub async fn get(&self, id: &str) -> Option<Note> {
        self.store.read(|notes| notes.get(id).cloned()).await
    }

    /// Notes whose title or content contains the query or any word of it.
    pub async fn search(&self, query: &str) -> Vec<Note> {
        let query = query.to_lowercase();
        let words: Vec<&str> = query.split_whitespace().collect();
        self.list()
            .await
            .into_iter()
            .filter(|note| {
                let title = note.title.to_lowercase();
                let content = note.content.to_lowercase();
                let hit = |needle: &str| title.contains(needle) || content.contains(needle);
                (!query.is_empty() && hit(&query)) || words.iter().copied().any(hit)
            })
            .collect()
    }

    pub async fn create(&self, new: NewNote) -> Result<Note, PluginError> {
        let now = Utc::now();
        let note = Note {
            id: format!("note-{}", Uuid::new_v4()),
            title: new.title.unwrap_or_else(|| "Untitled Note".into()),
            content: new.content.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };
        let created = note.clone();
        self.store
            .update(move |notes| {
                notes.insert(note.id.clone(), note);
                Ok(())
            })
            .await?;
        info!(id = %created.id, "Note created");
        Ok(created)
    }

    pub async fn update(&self, id: &str, patch: NotePatch) -> Result<Note, PluginError> {
        self.store
            .update(|notes| {
                let note = notes
                    .get_mut(id)
                    .ok_or_else(|| PluginError::not_found("Note", id))?;
                if let Some(title) = patch.title {
                    note.title = title;
                }
                if let Some(content) = patch.content {
                    note.content = content;
                }
                note.updated_at = Utc::now();
                Ok(note.clone())
            })
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<(), PluginError> {
        self.store
            .update(|notes| {
                notes
                    .remove(id)
                    .map(|_| ())
                    .ok_or_else(|| PluginError::not_found("Note", id))
            })
            .await
    }

    /// Every note rendered for the model's context.
    pub async fn render_all(&self) -> String {
        let notes = self.list().await;
        if notes.is_empty() {
            return "No notes available.".into();
        }
        notes
            .iter()
            .map(|n| format!("# {}\n{}", n.title, n.content))
            .collect::<Vec<_>>()
            .join("\n---\n")
    }

    async fn run_tool(&self, name: &str, args: &Value) -> Result<Value, PluginError> {
        match name {
            "search_notes" => Ok(json!(self.search(req_str(args, "query")?).await)),
            "create_note" => {
                let new = NewNote {
                    title: Some(req_str(args, "title")?.to_string()),
                    content: opt_str(args, "content"),
                };
                Ok(json!(self.create(new).await?))
            }
            "update_note" => {
                let patch = NotePatch {
                    title: opt_str(args, "title"),
                    content: opt_str(args, "content"),
                };
                Ok(json!(self.update(req_str(args, "note_id")?, patch).await?))
            }
            "delete_note" => {
                let id = req_str(args, "note_id")?;
                self.delete(id).await?;
                Ok(json!({"id": id, "deleted": true}))
            }
            other => Err(PluginError::Invalid(format!("Unknown tool: {other}"))),
        }
    }
}

#[async_trait]
impl CapabilityProvider for NotesProvider {
    fn name(&self) -> &str {
        "Notes"
    }

    fn description(&self) -> &str {
        "Manages user notes with create, read, update, delete, and search capabilities"
    }

    fn list_tools(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor::new(
                "search_notes",
                "Search through all notes by title or content",
            )
            .required("query", ParamKind::String, "Search query string"),
            ToolDescriptor::new("create_note", "Create a new note")
                .required("title", ParamKind::String, "Note title")
                .optional("content", ParamKind::String, "Note content"),
            ToolDescriptor::new("update_note", "Update an existing note")
                .required("note_id", ParamKind::String, "ID of the note to update")
                .optional("title", ParamKind::String, "New title (optional)")
                .optional("content", ParamKind::String, "New content (optional)"),
            ToolDescriptor::new("delete_note", "Delete a note permanently")
                .required("note_id", ParamKind::String, "ID of the note to delete"),
        ]
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, CapabilityError> {
        find_tool(&self.list_tools(), name, &arguments)?;
        self.run_tool(name, &arguments)
            .await
            .map_err(|e| e.into_capability(name))
    }

    fn list_resources(&self) -> Vec<ResourceDescriptor> {
        vec![ResourceDescriptor::text(
            NOTES_URI,
            "All Notes",
            "Complete collection of all user notes",
        )]
    }

    async fn read_resource(&self, uri: &str) -> Result<String, CapabilityError> {
        match uri {
            NOTES_URI => Ok(self.render_all().await),
            other => Err(CapabilityError::UnknownResource(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_note(title: &str, content: &str) -> NewNote {
        NewNote {
            title: Some(title.into()),
            content: Some(content.into()),
        }
    }

    #[tokio::test]
    async fn create_then_get() {
        let notes = NotesProvider::in_memory();
        let note = notes.create(new_note("Groceries", "milk, eggs")).await.unwrap();
        assert!(note.id.starts_with("note-"));
        assert_eq!(notes.get(&note.id).await.unwrap().title, "Groceries");
    }

    #[tokio::test]
    async fn create_defaults_title() {
        let notes = NotesProvider::in_memory();
        let note = notes.create(NewNote::default()).await.unwrap();
        assert_eq!(note.title, "Untitled Note");
        assert_eq!(note.content, "");
    }

    #[tokio::test]
    async fn list_is_newest_updated_first() {
        let notes = NotesProvider::in_memory();
        let first = notes.create(new_note("First", "")).await.unwrap();
        let second = notes.create(new_note("Second", "")).await.unwrap();
        notes
            .update(
                &first.id,
                NotePatch {
                    content: Some("edited".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let ids: Vec<_> = notes.list().await.into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn search_matches_phrase_or_any_word() {
        let notes = NotesProvider::in_memory();
        notes.create(new_note("Rust ideas", "ownership")).await.unwrap();
        notes.create(new_note("Shopping", "Buy MILK")).await.unwrap();
        notes.create(new_note("Travel", "Lisbon")).await.unwrap();

        assert_eq!(notes.search("milk").await.len(), 1);
        assert_eq!(notes.search("rust milk").await.len(), 2);
        assert!(notes.search("python").await.is_empty());
    }

    #[tokio::test]
    async fn update_and_delete_missing_note() {
        let notes = NotesProvider::in_memory();
        let err = notes.update("nope", NotePatch::default()).await.unwrap_err();
        assert_eq!(err, PluginError::not_found("Note", "nope"));
        assert!(notes.delete("nope").await.is_err());
    }

    #[tokio::test]
    async fn resource_rendering() {
        let notes = NotesProvider::in_memory();
        assert_eq!(notes.read_resource(NOTES_URI).await.unwrap(), "No notes available.");

        notes.create(new_note("A", "alpha")).await.unwrap();
        let rendered = notes.read_resource(NOTES_URI).await.unwrap();
        assert_eq!(rendered, "# A\nalpha");

        notes.create(new_note("B", "beta")).await.unwrap();
        let rendered = notes.read_resource(NOTES_URI).await.unwrap();
        assert!(rendered.contains("\n---\n"));
    }

    #[tokio::test]
    async fn unknown_resource() {
        let notes = NotesProvider::in_memory();
        assert!(matches!(
            notes.read_resource("notes://one").await,
            Err(CapabilityError::UnknownResource(_))
        ));
    }

    #[tokio::test]
    async fn tools_roundtrip() {
        let notes = NotesProvider::in_memory();
        let created = notes
            .call_tool("create_note", json!({"title": "Meeting", "content": "Monday 10am"}))
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap().to_string();

        let found = notes.call_tool("search_notes", json!({"query": "monday"})).await.unwrap();
        assert_eq!(found.as_array().unwrap().len(), 1);

        let updated = notes
            .call_tool("update_note", json!({"note_id": id, "title": "Standup"}))
            .await
            .unwrap();
        assert_eq!(updated["title"], "Standup");
        assert_eq!(updated["content"], "Monday 10am");

        let deleted = notes.call_tool("delete_note", json!({"note_id": id})).await.unwrap();
        assert_eq!(deleted["deleted"], true);
        assert!(notes.list().await.is_empty());
    }

    #[tokio::test]
    async fn search_without_query_is_invalid_arguments() {
        let notes = NotesProvider::in_memory();
        let err = notes.call_tool("search_notes", json!({})).await.unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn unknown_tool() {
        let notes = NotesProvider::in_memory();
        let err = notes.call_tool("create_todo", json!({"text": "x"})).await.unwrap_err();
        assert_eq!(err, CapabilityError::UnknownTool("create_todo".into()));
    }

    #[test]
    fn list_tools_is_stable() {
        let notes = NotesProvider::in_memory();
        assert_eq!(notes.list_tools(), notes.list_tools());
        assert_eq!(notes.list_tools().len(), 4);
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let notes = NotesProvider::open(dir.path()).unwrap();
        let note = notes.create(new_note("Kept", "on disk")).await.unwrap();
        drop(notes);

        let reopened = NotesProvider::open(dir.path()).unwrap();
        assert_eq!(reopened.get(&note.id).await.unwrap().content, "on disk");
    }
}
