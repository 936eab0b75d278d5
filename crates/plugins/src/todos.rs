//! Todos provider: an ordered todo list with priorities, due dates and tags.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Days, Local, NaiveDate, Utc, Weekday};
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

pub const TODOS_URI: &str = "todos://all";

const HIGH_PRIORITY_WORDS: &[&str] = &["urgent", "important", "critical", "asap", "high priority"];
const LOW_PRIORITY_WORDS: &[&str] = &["low priority", "minor", "someday", "maybe"];
/// Words that introduce an explicit date: "by Friday", "on Oct 15".
const DATE_TRIGGERS: &[&str] = &["by", "on", "before", "due"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Guess a priority from keywords in the todo text.
    pub fn detect(text: &str) -> Self {
        let text = text.to_lowercase();
        if HIGH_PRIORITY_WORDS.iter().any(|w| text.contains(w)) {
            Self::High
        } else if LOW_PRIORITY_WORDS.iter().any(|w| text.contains(w)) {
            Self::Low
        } else {
            Self::Medium
        }
    }
}

impl FromStr for Priority {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(PluginError::Invalid(format!(
                "priority must be 'high', 'medium' or 'low', got '{other}'"
            ))),
        }
    }
}

/// Due date mentioned in the text, resolved against `today`.
///
/// Relative keywords win; otherwise the words after `by`, `on`, `before`
/// or `due` are read as a weekday (next occurrence, today included), an
/// ISO date, `month/day` or `Month day` in the current year.
pub fn detect_due_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let lower = text.to_lowercase();
    if lower.contains("today") {
        return Some(today);
    } else if lower.contains("tomorrow") {
        return today.checked_add_days(Days::new(1));
    } else if lower.contains("next week") {
        return today.checked_add_days(Days::new(7));
    } else if lower.contains("next month") {
        return today.checked_add_days(Days::new(30));
    }

    let words: Vec<&str> = lower
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '/' && c != '-'))
        .filter(|w| !w.is_empty())
        .collect();
    words.iter().enumerate().find_map(|(i, word)| {
        if !DATE_TRIGGERS.contains(word) {
            return None;
        }
        parse_explicit_date(&words[i + 1..], today)
    })
}

fn parse_explicit_date(words: &[&str], today: NaiveDate) -> Option<NaiveDate> {
    let first = *words.first()?;

    if let Ok(weekday) = first.parse::<Weekday>() {
        let ahead = (7 + weekday.num_days_from_monday() - today.weekday().num_days_from_monday()) % 7;
        return today.checked_add_days(Days::new(u64::from(ahead)));
    }
    if let Ok(date) = NaiveDate::parse_from_str(first, "%Y-%m-%d") {
        return Some(date);
    }
    if let Some((month, day)) = first.split_once('/') {
        let (month, day) = (month.parse().ok()?, day.parse().ok()?);
        return NaiveDate::from_ymd_opt(today.year(), month, day);
    }

    let day = words.get(1)?.trim_end_matches(|c: char| c.is_alphabetic());
    NaiveDate::parse_from_str(&format!("{} {first} {day}", today.year()), "%Y %B %d").ok()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    pub priority: Priority,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields for a new todo. Missing priority and due date are detected from the text.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTodo {
    pub text: String,
    pub priority: Option<String>,
    pub due_date: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A partial update. `due_date: Some(None)` clears the due date.
#[derive(Debug, Clone, Default)]
pub struct TodoPatch {
    pub text: Option<String>,
    pub completed: Option<bool>,
    pub priority: Option<Priority>,
    pub due_date: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
}

impl TodoPatch {
    /// Build a patch from a JSON object, telling absent keys from explicit nulls.
    pub fn from_json(args: &Value) -> Result<Self, PluginError> {
        let obj = args
            .as_object()
            .ok_or_else(|| PluginError::Invalid("update must be a JSON object".into()))?;

        let priority = match obj.get("priority") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.parse()?),
            Some(_) => return Err(PluginError::Invalid("priority must be a string".into())),
        };
        let due_date = match obj.get("due_date") {
            None => None,
            Some(Value::Null) => Some(None),
            Some(Value::String(s)) => Some(Some(s.clone())),
            Some(_) => return Err(PluginError::Invalid("due_date must be a string or null".into())),
        };
        let tags = match obj.get("tags") {
            None | Some(Value::Null) => None,
            Some(v) => Some(string_list(v)?),
        };

        Ok(Self {
            text: opt_str(args, "text"),
            completed: obj.get("completed").and_then(Value::as_bool),
            priority,
            due_date,
            tags,
        })
    }
}

fn string_list(value: &Value) -> Result<Vec<String>, PluginError> {
    value
        .as_array()
        .ok_or_else(|| PluginError::Invalid("tags must be an array of strings".into()))?
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| PluginError::Invalid("tags must be an array of strings".into()))
        })
        .collect()
}

pub struct TodosProvider {
    store: JsonStore<Vec<Todo>>,
}

impl TodosProvider {
    /// Open `todos.json` under `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self, PluginError> {
        Ok(Self {
            store: JsonStore::open(data_dir.join("todos.json"), Vec::new())?,
        })
    }

    pub fn in_memory() -> Self {
        Self {
            store: JsonStore::in_memory(Vec::new()),
        }
    }

    /// All todos in list order.
    pub async fn list(&self) -> Vec<Todo> {
        self.store.read(|todos| todos.clone()).await
    }

    pub async fn get(&self, id: &str) -> Option<Todo> {
        self.store
            .read(|todos| todos.iter().find(|t| t.id == id).cloned())
            .await
    }

    /// Case-insensitive match against text, tags and due date.
    pub async fn search(&self, query: &str) -> Vec<Todo> {
        let query = query.trim().to_lowercase();
        self.store
            .read(|todos| {
                todos
                    .iter()
                    .filter(|t| {
                        t.text.to_lowercase().contains(&query)
                            || t.tags.iter().any(|tag| tag.to_lowercase().contains(&query))
                            || t.due_date.as_deref().is_some_and(|d| d.contains(&query))
                    })
                    .cloned()
                    .collect()
            })
            .await
    }

    pub async fn create(&self, new: NewTodo) -> Result<Todo, PluginError> {
        let priority = match new.priority.as_deref().filter(|p| !p.trim().is_empty()) {
            Some(p) => p.parse()?,
            None => Priority::detect(&new.text),
        };
        let due_date = new.due_date.filter(|d| !d.trim().is_empty()).or_else(|| {
            detect_due_date(&new.text, Local::now().date_naive()).map(|d| d.to_string())
        });

        let todo = Todo {
            id: format!("todo-{}", Uuid::new_v4()),
            text: new.text,
            completed: false,
            priority,
            due_date,
            tags: new.tags,
            created_at: Utc::now(),
        };
        let created = todo.clone();
        self.store
            .update(move |todos| {
                todos.push(todo);
                Ok(())
            })
            .await?;
        info!(id = %created.id, priority = ?created.priority, "Todo created");
        Ok(created)
    }

    pub async fn update(&self, id: &str, patch: TodoPatch) -> Result<Todo, PluginError> {
        self.store
            .update(|todos| {
                let todo = todos
                    .iter_mut()
                    .find(|t| t.id == id)
                    .ok_or_else(|| PluginError::not_found("Todo", id))?;
                if let Some(text) = patch.text {
                    todo.text = text;
                }
                if let Some(completed) = patch.completed {
                    todo.completed = completed;
                }
                if let Some(priority) = patch.priority {
                    todo.priority = priority;
                }
                if let Some(due_date) = patch.due_date {
                    todo.due_date = due_date;
                }
                if let Some(tags) = patch.tags {
                    todo.tags = tags;
                }
                Ok(todo.clone())
            })
            .await
    }

    pub async fn complete(&self, id: &str) -> Result<Todo, PluginError> {
        let patch = TodoPatch {
            completed: Some(true),
            ..Default::default()
        };
        self.update(id, patch).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), PluginError> {
        self.store
            .update(|todos| {
                let before = todos.len();
                todos.retain(|t| t.id != id);
                if todos.len() == before {
                    return Err(PluginError::not_found("Todo", id));
                }
                Ok(())
            })
            .await
    }

    /// Put the listed ids first, in the given order. Unknown ids are ignored
    /// and unlisted todos keep their relative order at the end.
    pub async fn reorder(&self, ids: &[String]) -> Result<Vec<Todo>, PluginError> {
        self.store
            .update(|todos| {
                let mut remaining = std::mem::take(todos);
                for id in ids {
                    if let Some(pos) = remaining.iter().position(|t| &t.id == id) {
                        todos.push(remaining.remove(pos));
                    }
                }
                todos.append(&mut remaining);
                Ok(todos.clone())
            })
            .await
    }

    /// The list rendered for the model's context.
    pub async fn render_all(&self) -> String {
        let todos = self.list().await;
        if todos.is_empty() {
            return "No todos available.".into();
        }

        let (done, active): (Vec<&Todo>, Vec<&Todo>) = todos.iter().partition(|t| t.completed);
        let mut lines = Vec::new();
        if !active.is_empty() {
            lines.push("## Active Todos:".to_string());
            lines.extend(active.iter().map(|t| format!("- [ ] {}", t.text)));
        }
        if !done.is_empty() {
            if !lines.is_empty() {
                lines.push(String::new());
            }
            lines.push("## Completed Todos:".to_string());
            lines.extend(done.iter().map(|t| format!("- [x] {}", t.text)));
        }
        lines.join("\n")
    }

    async fn run_tool(&self, name: &str, args: &Value) -> Result<Value, PluginError> {
        match name {
            "create_todo" => {
                let tags = match args.get("tags") {
                    None | Some(Value::Null) => Vec::new(),
                    Some(v) => string_list(v)?,
                };
                let new = NewTodo {
                    text: req_str(args, "text")?.to_string(),
                    priority: opt_str(args, "priority"),
                    due_date: opt_str(args, "due_date"),
                    tags,
                };
                Ok(json!(self.create(new).await?))
            }
            "update_todo" => {
                let id = req_str(args, "todo_id")?;
                let mut patch = TodoPatch::from_json(args)?;
                // Completion goes through complete_todo
                patch.completed = None;
                Ok(json!(self.update(id, patch).await?))
            }
            "complete_todo" => Ok(json!(self.complete(req_str(args, "todo_id")?).await?)),
            "delete_todo" => {
                let id = req_str(args, "todo_id")?;
                self.delete(id).await?;
                Ok(json!({"id": id, "deleted": true}))
            }
            "search_todos" => Ok(json!(self.search(req_str(args, "query")?).await)),
            "reorder_todos" => {
                let ids: Vec<String> = req_str(args, "todo_ids")?
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                Ok(json!(self.reorder(&ids).await?))
            }
            other => Err(PluginError::Invalid(format!("Unknown tool: {other}"))),
        }
    }
}

#[async_trait]
impl CapabilityProvider for TodosProvider {
    fn name(&self) -> &str {
        "Todos"
    }

    fn description(&self) -> &str {
        "Manages todo list with create, update, complete, and delete capabilities"
    }

    fn list_tools(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor::new(
                "create_todo",
                "Create a new todo item. Priority and due date are auto-detected from the text when not given.",
            )
            .required("text", ParamKind::String, "Todo text/description, without the due date")
            .optional(
                "priority",
                ParamKind::String,
                "Priority level: 'high', 'medium', or 'low'",
            )
            .optional(
                "due_date",
                ParamKind::String,
                "Due date in ISO format (YYYY-MM-DD)",
            )
            .optional(
                "tags",
                ParamKind::Array,
                "Optional list of tags to categorize the todo (e.g., ['work', 'meeting'])",
            ),
            ToolDescriptor::new(
                "update_todo",
                "Update an existing todo's text, priority, due date or tags",
            )
            .required("todo_id", ParamKind::String, "ID of the todo to update")
            .optional("text", ParamKind::String, "New todo text/description")
            .optional(
                "priority",
                ParamKind::String,
                "New priority level: 'high', 'medium', or 'low'",
            )
            .optional(
                "due_date",
                ParamKind::String,
                "New due date in ISO format (YYYY-MM-DD), or null to remove the due date",
            )
            .optional("tags", ParamKind::Array, "Replacement list of tags"),
            ToolDescriptor::new("complete_todo", "Mark a todo as completed")
                .required("todo_id", ParamKind::String, "ID of the todo to complete"),
            ToolDescriptor::new("delete_todo", "Delete a todo permanently")
                .required("todo_id", ParamKind::String, "ID of the todo to delete"),
            ToolDescriptor::new(
                "search_todos",
                "Search todos by text, tags, or due date. Returns matching todos including their IDs.",
            )
            .required(
                "query",
                ParamKind::String,
                "Keywords from the todo text, a tag name, or a date",
            ),
            ToolDescriptor::new(
                "reorder_todos",
                "Reorder todos by giving the desired order of todo IDs",
            )
            .required(
                "todo_ids",
                ParamKind::String,
                "Comma-separated todo IDs in the desired order. Todos not listed are appended at the end.",
            ),
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
            TODOS_URI,
            "Todo List",
            "Complete todo list with active and completed items",
        )]
    }

    async fn read_resource(&self, uri: &str) -> Result<String, CapabilityError> {
        match uri {
            TODOS_URI => Ok(self.render_all().await),
            other => Err(CapabilityError::UnknownResource(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_todo(text: &str) -> NewTodo {
        NewTodo {
            text: text.into(),
            ..Default::default()
        }
    }

    #[test]
    fn priority_detection() {
        assert_eq!(Priority::detect("URGENT: call bank"), Priority::High);
        assert_eq!(Priority::detect("fix it asap"), Priority::High);
        assert_eq!(Priority::detect("maybe learn piano"), Priority::Low);
        assert_eq!(Priority::detect("low priority cleanup"), Priority::Low);
        assert_eq!(Priority::detect("buy milk"), Priority::Medium);
    }

    #[test]
    fn due_date_detection() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
        assert_eq!(detect_due_date("call mom today", today), Some(today));
        assert_eq!(
            detect_due_date("dentist tomorrow", today),
            NaiveDate::from_ymd_opt(2026, 2, 1)
        );
        assert_eq!(
            detect_due_date("report next week", today),
            NaiveDate::from_ymd_opt(2026, 2, 7)
        );
        assert_eq!(
            detect_due_date("taxes next month", today),
            NaiveDate::from_ymd_opt(2026, 3, 2)
        );
        assert_eq!(detect_due_date("buy milk", today), None);
    }

    #[test]
    fn explicit_due_dates() {
        // A Tuesday.
        let today = NaiveDate::from_ymd_opt(2025, 10, 14).unwrap();
        assert_eq!(
            detect_due_date("Submit report by Friday", today),
            NaiveDate::from_ymd_opt(2025, 10, 17)
        );
        assert_eq!(
            detect_due_date("Team sync on Tuesday", today),
            Some(today)
        );
        assert_eq!(
            detect_due_date("Dentist on 2025-10-15", today),
            NaiveDate::from_ymd_opt(2025, 10, 15)
        );
        assert_eq!(
            detect_due_date("Pay rent before Oct 31.", today),
            NaiveDate::from_ymd_opt(2025, 10, 31)
        );
        assert_eq!(
            detect_due_date("Renew passport due 12/1", today),
            NaiveDate::from_ymd_opt(2025, 12, 1)
        );
        assert_eq!(
            detect_due_date("Send invites by November 3rd", today),
            NaiveDate::from_ymd_opt(2025, 11, 3)
        );
    }

    #[test]
    fn trigger_words_without_a_date_are_ignored() {
        let today = NaiveDate::from_ymd_opt(2025, 10, 14).unwrap();
        assert_eq!(detect_due_date("work on the report", today), None);
        assert_eq!(detect_due_date("stop by", today), None);
        assert_eq!(detect_due_date("on 13/45", today), None);
    }

    #[test]
    fn priority_parsing() {
        assert_eq!("High".parse::<Priority>().unwrap(), Priority::High);
        assert!("whenever".parse::<Priority>().is_err());
    }

    #[tokio::test]
    async fn create_with_explicit_priority() {
        let todos = TodosProvider::in_memory();
        let todo = todos
            .create(NewTodo {
                text: "Buy milk".into(),
                priority: Some("low".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(todo.id.starts_with("todo-"));
        assert_eq!(todo.priority, Priority::Low);
        assert!(!todo.completed);
        assert_eq!(todos.list().await.len(), 1);
    }

    #[tokio::test]
    async fn create_detects_priority_and_due_date() {
        let todos = TodosProvider::in_memory();
        let todo = todos.create(new_todo("Urgent: pay rent today")).await.unwrap();
        assert_eq!(todo.priority, Priority::High);
        assert_eq!(todo.due_date, Some(Local::now().date_naive().to_string()));
    }

    #[tokio::test]
    async fn create_rejects_bad_priority() {
        let todos = TodosProvider::in_memory();
        let err = todos
            .call_tool("create_todo", json!({"text": "x", "priority": "extreme"}))
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidArguments { .. }));
        assert!(todos.list().await.is_empty());
    }

    #[tokio::test]
    async fn update_clears_due_date_with_null() {
        let todos = TodosProvider::in_memory();
        let todo = todos
            .create(NewTodo {
                text: "Dentist".into(),
                due_date: Some("2026-03-01".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        let kept = todos
            .call_tool("update_todo", json!({"todo_id": todo.id, "text": "Dentist appt"}))
            .await
            .unwrap();
        assert_eq!(kept["due_date"], "2026-03-01");

        let cleared = todos
            .call_tool("update_todo", json!({"todo_id": todo.id, "due_date": null}))
            .await
            .unwrap();
        assert!(cleared["due_date"].is_null());
        assert_eq!(cleared["text"], "Dentist appt");
    }

    #[tokio::test]
    async fn complete_and_delete() {
        let todos = TodosProvider::in_memory();
        let todo = todos.create(new_todo("Water plants")).await.unwrap();
        let done = todos.call_tool("complete_todo", json!({"todo_id": todo.id})).await.unwrap();
        assert_eq!(done["completed"], true);

        todos.delete(&todo.id).await.unwrap();
        assert!(todos.get(&todo.id).await.is_none());
        assert_eq!(
            todos.delete(&todo.id).await.unwrap_err(),
            PluginError::not_found("Todo", todo.id.as_str())
        );
    }

    #[tokio::test]
    async fn search_matches_text_tags_and_dates() {
        let todos = TodosProvider::in_memory();
        todos
            .create(NewTodo {
                text: "Quarterly report".into(),
                tags: vec!["Work".into()],
                due_date: Some("2026-10-17".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        todos.create(new_todo("Buy milk")).await.unwrap();

        assert_eq!(todos.search("REPORT").await.len(), 1);
        assert_eq!(todos.search("work").await.len(), 1);
        assert_eq!(todos.search("10-17").await.len(), 1);
        assert!(todos.search("gym").await.is_empty());
    }

    #[tokio::test]
    async fn reorder_moves_listed_first() {
        let todos = TodosProvider::in_memory();
        let a = todos.create(new_todo("a")).await.unwrap();
        let b = todos.create(new_todo("b")).await.unwrap();
        let c = todos.create(new_todo("c")).await.unwrap();

        let reordered = todos
            .call_tool(
                "reorder_todos",
                json!({"todo_ids": format!("{}, unknown-id ,{}", c.id, a.id)}),
            )
            .await
            .unwrap();
        let ids: Vec<&str> = reordered
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec![c.id.as_str(), a.id.as_str(), b.id.as_str()]);
    }

    #[tokio::test]
    async fn resource_rendering() {
        let todos = TodosProvider::in_memory();
        assert_eq!(todos.render_all().await, "No todos available.");

        let a = todos.create(new_todo("Buy milk")).await.unwrap();
        todos.create(new_todo("Call mom")).await.unwrap();
        todos.complete(&a.id).await.unwrap();

        let rendered = todos.read_resource(TODOS_URI).await.unwrap();
        assert_eq!(
            rendered,
            "## Active Todos:\n- [ ] Call mom\n\n## Completed Todos:\n- [x] Buy milk"
        );
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let todos = TodosProvider::open(dir.path()).unwrap();
        todos.create(new_todo("Persist me")).await.unwrap();
        drop(todos);

        let reopened = TodosProvider::open(dir.path()).unwrap();
        assert_eq!(reopened.list().await[0].text, "Persist me");
    }

    #[test]
    fn patch_from_json_distinguishes_null_and_absent() {
        let absent = TodoPatch::from_json(&json!({"text": "x"})).unwrap();
        assert!(absent.due_date.is_none());
        let null = TodoPatch::from_json(&json!({"due_date": null})).unwrap();
        assert_eq!(null.due_date, Some(None));
        let bad = TodoPatch::from_json(&json!({"tags": "work"}));
        assert!(bad.is_err());
    }
}
