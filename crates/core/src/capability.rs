//! Capability contract: what a domain module must expose to be usable by the agent.
//!
//! A capability provider owns one slice of application state (notes, todos,
//! preferences) and advertises two kinds of capabilities:
//!
//! - **Tools**: named, schema-described operations the model may request.
//! - **Resources**: named pieces of context that can be read verbatim.
//!
//! Providers never see the model or the agent. They are registered into a
//! [`CapabilityRegistry`](crate::registry::CapabilityRegistry), which is the
//! only thing the agent talks to.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CapabilityError;

/// JSON type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamKind {
    /// The JSON Schema `type` keyword for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    /// Whether `value` has this JSON type.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

/// One named parameter of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParam {
    pub name: String,
    pub kind: ParamKind,
    pub description: String,
    pub required: bool,
}

/// A named, schema-described operation a model may request.
///
/// Immutable once built. Parameters keep their declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub params: Vec<ToolParam>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
        }
    }

    /// Add a required parameter.
    pub fn required(mut self, name: &str, kind: ParamKind, description: &str) -> Self {
        self.params.push(ToolParam {
            name: name.into(),
            kind,
            description: description.into(),
            required: true,
        });
        self
    }

    /// Add an optional parameter.
    pub fn optional(mut self, name: &str, kind: ParamKind, description: &str) -> Self {
        self.params.push(ToolParam {
            name: name.into(),
            kind,
            description: description.into(),
            required: false,
        });
        self
    }

    /// JSON Schema of the tool's input, in the shape LLM tool APIs expect.
    pub fn input_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        for param in &self.params {
            properties.insert(
                param.name.clone(),
                serde_json::json!({
                    "type": param.kind.as_str(),
                    "description": param.description,
                }),
            );
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        let mut schema = serde_json::json!({
            "type": "object",
            "properties": properties,
        });
        if !required.is_empty() {
            schema["required"] = serde_json::json!(required);
        }
        schema
    }

    /// Check `arguments` against this descriptor.
    ///
    /// Required parameters must be present and non-null; present non-null
    /// parameters must match their declared kind. Extra keys are ignored.
    pub fn validate(&self, arguments: &Value) -> Result<(), CapabilityError> {
        let invalid = |reason: String| CapabilityError::InvalidArguments {
            tool: self.name.clone(),
            reason,
        };

        let Some(args) = arguments.as_object() else {
            return Err(invalid("arguments must be a JSON object".into()));
        };

        for param in &self.params {
            match args.get(&param.name) {
                None | Some(Value::Null) if param.required => {
                    return Err(invalid(format!(
                        "missing required field '{}'",
                        param.name
                    )));
                }
                None | Some(Value::Null) => {}
                Some(value) if !param.kind.accepts(value) => {
                    return Err(invalid(format!(
                        "field '{}' must be of type {}",
                        param.name,
                        param.kind.as_str()
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// A readable unit of context a provider can supply without being invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub uri: String,
    pub name: String,
    pub description: String,
    pub mime_type: String,
}

impl ResourceDescriptor {
    /// A `text/plain` resource.
    pub fn text(uri: &str, name: &str, description: &str) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            description: description.into(),
            mime_type: "text/plain".into(),
        }
    }
}

/// A single request to run a tool, as issued by the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// The model's id for this call
    pub id: String,
    pub name: String,
    pub arguments: Value,
    pub issued_at: DateTime<Utc>,
}

impl ToolInvocation {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            issued_at: Utc::now(),
        }
    }
}

/// The result of dispatching a tool: always exactly one of two shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { payload: Value },
    Failure { error: String },
}

impl ToolOutcome {
    pub fn success(payload: Value) -> Self {
        Self::Success { payload }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The text fed back to the model for this outcome.
    pub fn to_content(&self) -> String {
        match self {
            Self::Success { payload } => payload.to_string(),
            Self::Failure { error } => format!("Error: {error}"),
        }
    }
}

impl From<Result<Value, CapabilityError>> for ToolOutcome {
    fn from(result: Result<Value, CapabilityError>) -> Self {
        match result {
            Ok(payload) => Self::Success { payload },
            Err(e) => Self::Failure {
                error: e.to_string(),
            },
        }
    }
}

/// The contract every domain module implements to expose its capabilities.
///
/// `list_tools` and `list_resources` must be pure and return the same
/// descriptors in the same order on every call. `call_tool` returns owned
/// JSON, never a handle into provider state, and only touches the
/// provider's own state.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// Short provider name used in discovery and logs (e.g. "Todos").
    fn name(&self) -> &str;

    /// What this provider manages.
    fn description(&self) -> &str;

    /// The tools this provider declares.
    fn list_tools(&self) -> Vec<ToolDescriptor>;

    /// Run one of this provider's tools.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, CapabilityError>;

    /// The resources this provider declares.
    fn list_resources(&self) -> Vec<ResourceDescriptor>;

    /// Read one of this provider's resources.
    async fn read_resource(&self, uri: &str) -> Result<String, CapabilityError>;
}

/// Look up `name` in `tools` and validate `arguments` against it.
pub fn find_tool<'a>(
    tools: &'a [ToolDescriptor],
    name: &str,
    arguments: &Value,
) -> Result<&'a ToolDescriptor, CapabilityError> {
    let tool = tools
        .iter()
        .find(|t| t.name == name)
        .ok_or_else(|| CapabilityError::UnknownTool(name.to_string()))?;
    tool.validate(arguments)?;
    Ok(tool)
}
