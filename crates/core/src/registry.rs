//! The capability registry: one discovery and dispatch surface over every
//! registered [`CapabilityProvider`].
//!
//! The agent only ever talks to the registry. It asks for the tool schema
//! list once, dispatches tool calls by name, and gathers resource context
//! for the system prompt.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::capability::{CapabilityProvider, ResourceDescriptor, ToolDescriptor, ToolOutcome};
use crate::error::{CapabilityError, RegistryError};
use crate::model::ToolDefinition;

/// Default bound on a single dispatched tool call.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// A tool together with the provider that owns it.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredTool {
    #[serde(flatten)]
    pub descriptor: ToolDescriptor,
    pub provider: String,
}

/// A resource together with the provider that owns it.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredResource {
    #[serde(flatten)]
    pub descriptor: ResourceDescriptor,
    pub provider: String,
}

/// Aggregates capability providers in registration order.
///
/// Built once at startup by chaining [`register`](Self::register) calls and
/// then shared read-only (usually behind an `Arc`).
pub struct CapabilityRegistry {
    providers: Vec<Arc<dyn CapabilityProvider>>,
    tool_owners: HashMap<String, usize>,
    resource_owners: HashMap<String, usize>,
    tool_timeout: Duration,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            tool_owners: HashMap::new(),
            resource_owners: HashMap::new(),
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    /// Bound every dispatched tool call by `timeout`.
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Add a provider.
    ///
    /// Fails if any of its tool names is already owned (or declared twice by
    /// the provider itself), or if any of its resource uris is already
    /// owned. The registry is consumed either way, so a failed registration
    /// leaves nothing to dispatch against.
    pub fn register(
        mut self,
        provider: Arc<dyn CapabilityProvider>,
    ) -> Result<Self, RegistryError> {
        let index = self.providers.len();
        let incoming = provider.name().to_string();

        let mut new_tools: HashMap<String, usize> = HashMap::new();
        for tool in provider.list_tools() {
            if let Some(&owner) = self.tool_owners.get(&tool.name) {
                return Err(RegistryError::DuplicateToolName {
                    name: tool.name,
                    existing: self.providers[owner].name().to_string(),
                    incoming,
                });
            }
            if new_tools.insert(tool.name.clone(), index).is_some() {
                return Err(RegistryError::DuplicateToolName {
                    name: tool.name,
                    existing: incoming.clone(),
                    incoming,
                });
            }
        }

        let mut new_resources: HashMap<String, usize> = HashMap::new();
        for resource in provider.list_resources() {
            if let Some(&owner) = self.resource_owners.get(&resource.uri) {
                return Err(RegistryError::DuplicateResourceUri {
                    uri: resource.uri,
                    existing: self.providers[owner].name().to_string(),
                    incoming,
                });
            }
            if new_resources.insert(resource.uri.clone(), index).is_some() {
                return Err(RegistryError::DuplicateResourceUri {
                    uri: resource.uri,
                    existing: incoming.clone(),
                    incoming,
                });
            }
        }

        tracing::info!(
            provider = %incoming,
            tools = new_tools.len(),
            resources = new_resources.len(),
            "Registered capability provider"
        );

        self.tool_owners.extend(new_tools);
        self.resource_owners.extend(new_resources);
        self.providers.push(provider);
        Ok(self)
    }

    /// Every tool, in registration order then declaration order.
    pub fn discover_tools(&self) -> Vec<DiscoveredTool> {
        self.providers
            .iter()
            .flat_map(|p| {
                let owner = p.name().to_string();
                p.list_tools().into_iter().map(move |descriptor| DiscoveredTool {
                    descriptor,
                    provider: owner.clone(),
                })
            })
            .collect()
    }

    /// Every resource, in registration order then declaration order.
    pub fn discover_resources(&self) -> Vec<DiscoveredResource> {
        self.providers
            .iter()
            .flat_map(|p| {
                let owner = p.name().to_string();
                p.list_resources()
                    .into_iter()
                    .map(move |descriptor| DiscoveredResource {
                        descriptor,
                        provider: owner.clone(),
                    })
            })
            .collect()
    }

    /// The schema list sent to the model.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.discover_tools()
            .iter()
            .map(|t| ToolDefinition::from(&t.descriptor))
            .collect()
    }

    /// Route a tool call to its provider and normalise the result.
    ///
    /// The provider runs in its own task. Errors, panics and timeouts all
    /// come back as [`ToolOutcome::Failure`]; this never fails itself. On
    /// timeout the provider task is detached and left to finish.
    pub async fn dispatch(&self, name: &str, arguments: Value) -> ToolOutcome {
        let Some(&owner) = self.tool_owners.get(name) else {
            tracing::warn!(tool = name, "Dispatch to unknown tool");
            return Err::<Value, _>(CapabilityError::UnknownTool(name.to_string())).into();
        };

        let provider = Arc::clone(&self.providers[owner]);
        let tool = name.to_string();
        let task = tokio::spawn(async move { provider.call_tool(&tool, arguments).await });

        let result = match tokio::time::timeout(self.tool_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                let reason = if join_error.is_panic() {
                    format!("provider panicked: {}", panic_message(join_error.into_panic()))
                } else {
                    "provider task was cancelled".to_string()
                };
                Err(CapabilityError::ExecutionFailed {
                    tool: name.to_string(),
                    reason,
                })
            }
            Err(_) => Err(CapabilityError::Timeout {
                tool: name.to_string(),
                timeout_ms: self.tool_timeout.as_millis() as u64,
            }),
        };

        if let Err(e) = &result {
            tracing::warn!(tool = name, error = %e, "Tool call failed");
        }
        result.into()
    }

    /// Read one resource by uri.
    pub async fn read_resource(&self, uri: &str) -> Result<String, CapabilityError> {
        let owner = self
            .resource_owners
            .get(uri)
            .ok_or_else(|| CapabilityError::UnknownResource(uri.to_string()))?;
        self.providers[*owner].read_resource(uri).await
    }

    /// Read every resource. Failing resources are logged and left out.
    pub async fn gather_context(&self) -> BTreeMap<String, String> {
        let mut context = BTreeMap::new();
        for resource in self.discover_resources() {
            let uri = resource.descriptor.uri;
            match self.read_resource(&uri).await {
                Ok(content) => {
                    context.insert(uri, content);
                }
                Err(e) => tracing::warn!(uri = %uri, error = %e, "Skipping unreadable resource"),
            }
        }
        context
    }

    /// Gathered context as Markdown sections, in registration order.
    pub async fn context_block(&self) -> String {
        let context = self.gather_context().await;
        self.discover_resources()
            .into_iter()
            .filter_map(|r| {
                context
                    .get(&r.descriptor.uri)
                    .map(|content| format!("## {}\n{}", r.descriptor.name, content))
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Provider names in registration order.
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
