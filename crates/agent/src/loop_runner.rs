//! The agent reasoning loop implementation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pico_config::AppConfig;
use pico_core::capability::{ToolInvocation, ToolOutcome};
use pico_core::error::{ProviderError, RunError};
use pico_core::message::{Message, MessageToolCall, Role};
use pico_core::model::{ModelProvider, ModelRequest, ToolDefinition};
use pico_core::registry::CapabilityRegistry;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::metadata::ActionMetadata;
use crate::profiling::{Profiler, ProfilingSummary};
use crate::prompt::{BASE_PROMPT, build_system_prompt};
use crate::stream_event::AgentEvent;

/// Buffered events per streamed run before the agent waits on the client.
const EVENT_BUFFER: usize = 32;

/// Knobs for one [`Agent`].
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Maximum model calls per run
    pub max_iterations: u32,
    pub model_timeout: Duration,
    /// Inject the resource context block into the system prompt
    pub include_context: bool,
    pub system_prompt: Option<String>,
}

impl AgentSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.model.name.clone(),
            max_tokens: config.model.max_tokens,
            temperature: config.model.temperature,
            max_iterations: config.agent.max_iterations,
            model_timeout: Duration::from_secs(config.agent.model_timeout_secs),
            include_context: config.agent.include_context,
            system_prompt: config.agent.system_prompt_override.clone(),
        }
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Per-run options.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub cancel: CancellationToken,
    /// Overrides [`AgentSettings::include_context`] when set
    pub include_context: Option<bool>,
}

impl RunOptions {
    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            include_context: None,
        }
    }
}

/// The result of a successful run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The final answer text
    pub response: String,
    pub metadata: ActionMetadata,
    pub profiling: ProfilingSummary,
    /// The full history including everything appended during the run
    pub messages: Vec<Message>,
    /// Model calls made
    pub iterations: u32,
}

/// Where a run is between model calls.
#[derive(Debug)]
enum RunState {
    AwaitingModel,
    ToolsRequested(Vec<MessageToolCall>),
    Answered(String),
}

/// Mutable state of one run. Never shared between runs.
struct AgentRun {
    messages: Vec<Message>,
    iteration: u32,
    tool_sequence: u32,
    profiler: Profiler,
    metadata: ActionMetadata,
}

impl AgentRun {
    fn new(history: Vec<Message>) -> Self {
        Self {
            messages: sanitize_history(history),
            iteration: 0,
            tool_sequence: 0,
            profiler: Profiler::new(),
            metadata: ActionMetadata::new(),
        }
    }

    fn finish(self, response: String) -> RunOutcome {
        RunOutcome {
            response,
            metadata: self.metadata,
            profiling: self.profiler.summary(),
            messages: self.messages,
            iterations: self.iteration,
        }
    }
}

/// Event delivery for a run. A closed receiver cancels the run.
#[derive(Clone)]
struct EventSink {
    tx: Option<mpsc::Sender<AgentEvent>>,
    cancel: CancellationToken,
}

impl EventSink {
    fn silent(cancel: CancellationToken) -> Self {
        Self { tx: None, cancel }
    }

    async fn emit(&self, event: AgentEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(event).await.is_err() && !self.cancel.is_cancelled() {
            debug!("Event receiver dropped, cancelling run");
            self.cancel.cancel();
        }
    }
}

/// Drive model calls and tool calls until the model answers.
///
/// An `Agent` is immutable after construction and can serve any number of
/// concurrent runs.
pub struct Agent {
    model: Arc<dyn ModelProvider>,
    registry: Arc<CapabilityRegistry>,
    settings: AgentSettings,
    tool_definitions: Vec<ToolDefinition>,
}

impl Agent {
    /// Create an agent. Tool definitions are discovered once, here.
    pub fn new(
        model: Arc<dyn ModelProvider>,
        registry: Arc<CapabilityRegistry>,
        settings: AgentSettings,
    ) -> Self {
        let tool_definitions = registry.tool_definitions();
        info!(
            provider = model.name(),
            model = %settings.model,
            tools = tool_definitions.len(),
            "Agent ready"
        );
        Self {
            model,
            registry,
            settings,
            tool_definitions,
        }
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn tool_definitions(&self) -> &[ToolDefinition] {
        &self.tool_definitions
    }

    /// Run to completion with default options.
    pub async fn run(&self, history: Vec<Message>) -> Result<RunOutcome, RunError> {
        self.run_with_options(history, RunOptions::default()).await
    }

    /// Run to completion, stopping early when `cancel` fires.
    pub async fn run_with_cancel(
        &self,
        history: Vec<Message>,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, RunError> {
        self.run_with_options(history, RunOptions::with_cancel(cancel))
            .await
    }

    pub async fn run_with_options(
        &self,
        history: Vec<Message>,
        options: RunOptions,
    ) -> Result<RunOutcome, RunError> {
        let sink = EventSink::silent(options.cancel.clone());
        self.execute(history, &options, &sink).await
    }

    /// Spawn a run and return its event stream.
    ///
    /// The last event is always `done` or `error`. Dropping the receiver
    /// cancels the run at the next step boundary.
    pub fn run_stream(
        self: &Arc<Self>,
        history: Vec<Message>,
        options: RunOptions,
    ) -> mpsc::Receiver<AgentEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let agent = Arc::clone(self);
        tokio::spawn(async move {
            let sink = EventSink {
                tx: Some(tx),
                cancel: options.cancel.clone(),
            };
            let last = match agent.execute(history, &options, &sink).await {
                Ok(outcome) => AgentEvent::Done {
                    metadata: outcome.metadata,
                    profiling: outcome.profiling,
                },
                Err(e) => AgentEvent::Error {
                    message: e.to_string(),
                },
            };
            sink.emit(last).await;
        });
        rx
    }

    async fn system_prompt(&self, include_context: bool) -> String {
        let base = self.settings.system_prompt.as_deref().unwrap_or(BASE_PROMPT);
        let context = if include_context {
            Some(self.registry.context_block().await)
        } else {
            None
        };
        build_system_prompt(base, chrono::Local::now().date_naive(), context.as_deref())
    }

    async fn execute(
        &self,
        history: Vec<Message>,
        options: &RunOptions,
        sink: &EventSink,
    ) -> Result<RunOutcome, RunError> {
        let started = Instant::now();
        let include_context = options.include_context.unwrap_or(self.settings.include_context);
        let system = self.system_prompt(include_context).await;
        let mut run = AgentRun::new(history);

        info!(
            messages = run.messages.len(),
            include_context,
            "Processing conversation"
        );

        let result = self.drive(&mut run, system, &options.cancel, sink).await;
        match result {
            Ok(text) => {
                info!(
                    iterations = run.iteration,
                    tool_calls = run.tool_sequence,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Run finished"
                );
                sink.emit(AgentEvent::Response { text: text.clone() }).await;
                Ok(run.finish(text))
            }
            Err(e) => {
                error!(iterations = run.iteration, error = %e, "Run failed");
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        run: &mut AgentRun,
        system: String,
        cancel: &CancellationToken,
        sink: &EventSink,
    ) -> Result<String, RunError> {
        let mut state = RunState::AwaitingModel;
        loop {
            state = match state {
                RunState::AwaitingModel => {
                    if cancel.is_cancelled() {
                        return Err(RunError::Cancelled);
                    }
                    if run.iteration >= self.settings.max_iterations {
                        warn!(max = self.settings.max_iterations, "Max iterations reached");
                        return Err(RunError::IterationLimitExceeded {
                            max: self.settings.max_iterations,
                        });
                    }
                    run.iteration += 1;
                    self.call_model(run, &system, cancel, sink).await?
                }
                RunState::ToolsRequested(calls) => {
                    debug!(tool_count = calls.len(), "Executing tool calls");
                    for call in calls {
                        if cancel.is_cancelled() {
                            return Err(RunError::Cancelled);
                        }
                        self.run_tool(run, call, sink).await;
                    }
                    RunState::AwaitingModel
                }
                RunState::Answered(text) => return Ok(text),
            };
        }
    }

    async fn call_model(
        &self,
        run: &mut AgentRun,
        system: &str,
        cancel: &CancellationToken,
        sink: &EventSink,
    ) -> Result<RunState, RunError> {
        debug!(iteration = run.iteration, "Agent loop iteration");
        sink.emit(AgentEvent::Thinking {
            iteration: run.iteration,
        })
        .await;

        let request = ModelRequest {
            model: self.settings.model.clone(),
            system: Some(system.to_string()),
            messages: run.messages.clone(),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            tools: self.tool_definitions.clone(),
        };

        let start = Instant::now();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RunError::Cancelled),
            result = tokio::time::timeout(self.settings.model_timeout, self.model.complete(request)) => {
                match result {
                    Ok(response) => response?,
                    Err(_) => {
                        return Err(ProviderError::Timeout(format!(
                            "model did not respond within {}s",
                            self.settings.model_timeout.as_secs()
                        ))
                        .into());
                    }
                }
            }
        };
        run.profiler
            .record_llm_call(run.iteration, start.elapsed(), response.usage);

        let message = response.message;
        if !message.tool_calls.is_empty() {
            let calls = message.tool_calls.clone();
            run.messages.push(message);
            Ok(RunState::ToolsRequested(calls))
        } else if message.content.trim().is_empty() {
            warn!(iteration = run.iteration, "Model returned an empty response");
            Ok(RunState::AwaitingModel)
        } else {
            let text = message.content.clone();
            run.messages.push(message);
            Ok(RunState::Answered(text))
        }
    }

    async fn run_tool(&self, run: &mut AgentRun, call: MessageToolCall, sink: &EventSink) {
        run.tool_sequence += 1;
        let arguments = parse_arguments(&call.arguments);
        sink.emit(AgentEvent::ToolCall {
            tool: call.name.clone(),
            args: arguments
                .as_ref()
                .cloned()
                .unwrap_or_else(|_| Value::String(call.arguments.clone())),
        })
        .await;

        let start = Instant::now();
        let outcome = match arguments {
            Ok(arguments) => {
                let invocation = ToolInvocation::new(&call.id, &call.name, arguments);
                debug!(tool = %invocation.name, id = %invocation.id, "Dispatching tool");
                self.registry
                    .dispatch(&invocation.name, invocation.arguments)
                    .await
            }
            Err(reason) => ToolOutcome::failure(format!(
                "Invalid arguments for {}: {reason}",
                call.name
            )),
        };
        run.profiler.record_tool_call(
            run.tool_sequence,
            &call.name,
            start.elapsed(),
            outcome.is_success(),
        );

        let event = match &outcome {
            ToolOutcome::Success { payload } => {
                run.metadata.record(&call.name, payload);
                AgentEvent::ToolResult {
                    tool: call.name.clone(),
                    success: true,
                    result: Some(payload.clone()),
                    error: None,
                }
            }
            ToolOutcome::Failure { error } => {
                warn!(tool = %call.name, error = %error, "Tool call failed");
                AgentEvent::ToolResult {
                    tool: call.name.clone(),
                    success: false,
                    result: None,
                    error: Some(error.clone()),
                }
            }
        };
        sink.emit(event).await;
        run.messages.push(Message::tool_result(call.id, outcome));
    }
}

/// Decode the model's argument string. An empty string means no arguments.
fn parse_arguments(raw: &str) -> Result<Value, String> {
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(raw).map_err(|e| format!("malformed JSON: {e}"))
}

/// Drop turns the model must never see: empty messages, and tool results
/// that do not answer a tool call of the assistant turn directly before them.
fn sanitize_history(history: Vec<Message>) -> Vec<Message> {
    let mut open: HashSet<String> = HashSet::new();
    let mut kept = Vec::with_capacity(history.len());
    for message in history {
        if message.role != Role::Tool && message.is_empty() {
            warn!(role = ?message.role, "Dropping empty message from history");
            continue;
        }
        match message.role {
            Role::Tool => {
                let answers_open_call = message
                    .tool_call_id
                    .as_ref()
                    .is_some_and(|id| open.remove(id));
                if !answers_open_call {
                    warn!(tool_call_id = ?message.tool_call_id, "Dropping orphan tool result");
                    continue;
                }
            }
            Role::Assistant => {
                open = message.tool_calls.iter().map(|c| c.id.clone()).collect();
            }
            Role::User | Role::System => open.clear(),
        }
        kept.push(message);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use async_trait::async_trait;
    use pico_core::capability::{CapabilityProvider, ResourceDescriptor, ToolDescriptor};
    use pico_core::error::CapabilityError;
    use pico_core::model::ModelResponse;
    use pico_plugins::PluginSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry(plugins: &PluginSet) -> Arc<CapabilityRegistry> {
        Arc::new(plugins.registry(Duration::from_secs(5)).unwrap())
    }

    fn agent_with(
        model: Arc<dyn ModelProvider>,
        registry: Arc<CapabilityRegistry>,
        settings: AgentSettings,
    ) -> Agent {
        Agent::new(model, registry, settings)
    }

    fn last_tool_message(request: &ModelRequest) -> &Message {
        request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Tool)
            .expect("tool message in request")
    }

    async fn collect(mut rx: mpsc::Receiver<AgentEvent>) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn simple_text_response() {
        let plugins = PluginSet::in_memory();
        let model = Arc::new(SequentialMockModel::single_text("Hello! How can I help?"));
        let agent = agent_with(model.clone(), registry(&plugins), AgentSettings::default());

        let outcome = agent.run(vec![Message::user("Hi")]).await.unwrap();
        assert_eq!(outcome.response, "Hello! How can I help?");
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.messages.len(), 2);
        assert!(outcome.metadata.is_empty());
        assert_eq!(outcome.profiling.llm_calls, 1);

        let requests = model.requests();
        assert_eq!(requests[0].tools.len(), 12);
        let system = requests[0].system.as_deref().unwrap();
        assert!(system.starts_with("You are Pico"));
        assert!(system.contains("Today's date is "));
        assert!(system.contains("## Todo List\nNo todos available."));
    }

    #[tokio::test]
    async fn context_can_be_disabled_per_run() {
        let plugins = PluginSet::in_memory();
        let model = Arc::new(SequentialMockModel::single_text("ok"));
        let settings = AgentSettings {
            system_prompt: Some("Custom prompt.".into()),
            ..AgentSettings::default()
        };
        let agent = agent_with(model.clone(), registry(&plugins), settings);

        let options = RunOptions {
            include_context: Some(false),
            ..RunOptions::default()
        };
        agent
            .run_with_options(vec![Message::user("Hi")], options)
            .await
            .unwrap();

        let system = model.requests()[0].system.clone().unwrap();
        assert!(system.starts_with("Custom prompt.\n\nToday's date is "));
        assert!(!system.contains("# Current Data"));
    }

    #[tokio::test]
    async fn create_todo_is_tracked_in_metadata() {
        let plugins = PluginSet::in_memory();
        let model = Arc::new(SequentialMockModel::tool_then_answer(
            vec![make_tool_call(
                "create_todo",
                json!({"text": "Buy milk", "priority": "low"}),
            )],
            "Added **Buy milk** to your list.",
        ));
        let agent = agent_with(model.clone(), registry(&plugins), AgentSettings::default());

        let outcome = agent
            .run(vec![Message::user("Add a todo: buy milk, low priority")])
            .await
            .unwrap();

        let todos = plugins.todos.list().await;
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].text, "Buy milk");
        assert_eq!(
            outcome.metadata.get("created_todos"),
            Some(&[todos[0].id.clone()][..])
        );
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.profiling.tool_calls, 1);
    }

    #[tokio::test]
    async fn success_payload_reaches_next_request_unchanged() {
        let plugins = PluginSet::in_memory();
        let model = Arc::new(SequentialMockModel::tool_then_answer(
            vec![make_tool_call("create_note", json!({"title": "Ideas", "content": "Ship it"}))],
            "Saved.",
        ));
        let agent = agent_with(model.clone(), registry(&plugins), AgentSettings::default());
        agent.run(vec![Message::user("Save a note")]).await.unwrap();

        let note = plugins.notes.list().await.remove(0);
        let requests = model.requests();
        let tool_message = last_tool_message(&requests[1]);
        assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_create_note"));
        assert_eq!(
            tool_message.tool_result,
            Some(ToolOutcome::success(serde_json::to_value(&note).unwrap()))
        );
        assert_eq!(tool_message.content, serde_json::to_value(&note).unwrap().to_string());
    }

    #[tokio::test]
    async fn invalid_arguments_do_not_end_the_run() {
        let plugins = PluginSet::in_memory();
        let model = Arc::new(SequentialMockModel::tool_then_answer(
            vec![make_tool_call("search_notes", json!({}))],
            "I could not search your notes.",
        ));
        let agent = agent_with(model.clone(), registry(&plugins), AgentSettings::default());

        let outcome = agent.run(vec![Message::user("Find my notes")]).await.unwrap();
        assert_eq!(outcome.response, "I could not search your notes.");
        assert!(outcome.metadata.is_empty());

        let requests = model.requests();
        let tool_message = last_tool_message(&requests[1]);
        assert!(matches!(
            tool_message.tool_result,
            Some(ToolOutcome::Failure { .. })
        ));
        assert!(tool_message.content.contains("Invalid arguments for search_notes"));
    }

    #[tokio::test]
    async fn tool_calls_in_one_turn_run_in_order() {
        let plugins = PluginSet::in_memory();
        let model = Arc::new(SequentialMockModel::tool_then_answer(
            vec![
                make_tool_call("create_todo", json!({"text": "Buy milk", "priority": "low"})),
                make_tool_call("search_todos", json!({"query": "milk"})),
            ],
            "Done.",
        ));
        let agent = agent_with(model.clone(), registry(&plugins), AgentSettings::default());
        let outcome = agent.run(vec![Message::user("Add and find")]).await.unwrap();

        let tool_messages: Vec<&Message> = outcome
            .messages
            .iter()
            .filter(|m| m.role == Role::Tool)
            .collect();
        assert_eq!(tool_messages.len(), 2);
        assert_eq!(tool_messages[0].tool_call_id.as_deref(), Some("call_create_todo"));
        assert_eq!(tool_messages[1].tool_call_id.as_deref(), Some("call_search_todos"));
        let Some(ToolOutcome::Success { payload }) = &tool_messages[1].tool_result else {
            panic!("search should succeed");
        };
        assert_eq!(payload.as_array().unwrap().len(), 1);
        assert_eq!(payload[0]["text"], "Buy milk");
    }

    #[tokio::test]
    async fn malformed_argument_json_becomes_failure() {
        let plugins = PluginSet::in_memory();
        let call = MessageToolCall {
            id: "call_1".into(),
            name: "create_todo".into(),
            arguments: "{not json".into(),
        };
        let model = Arc::new(SequentialMockModel::tool_then_answer(vec![call], "Sorry."));
        let agent = agent_with(model.clone(), registry(&plugins), AgentSettings::default());

        let outcome = agent.run(vec![Message::user("Add")]).await.unwrap();
        assert_eq!(outcome.response, "Sorry.");
        assert!(plugins.todos.list().await.is_empty());
        let tool_message = last_tool_message(&model.requests()[1]).clone();
        assert!(tool_message.content.contains("malformed JSON"));
    }

    #[tokio::test]
    async fn iteration_limit_stops_at_exact_call_count() {
        let plugins = PluginSet::in_memory();
        let model = Arc::new(LoopingModel::new());
        let settings = AgentSettings::default().with_max_iterations(3);
        let agent = agent_with(model.clone(), registry(&plugins), settings);

        let err = agent.run(vec![Message::user("Loop")]).await.unwrap_err();
        assert!(matches!(err, RunError::IterationLimitExceeded { max: 3 }));
        assert_eq!(model.call_count(), 3);
    }

    #[tokio::test]
    async fn empty_response_is_skipped_but_counted() {
        let plugins = PluginSet::in_memory();
        let model = Arc::new(SequentialMockModel::new(vec![
            make_text_response("   "),
            make_text_response("Here you go."),
        ]));
        let agent = agent_with(model.clone(), registry(&plugins), AgentSettings::default());

        let outcome = agent.run(vec![Message::user("Hi")]).await.unwrap();
        assert_eq!(outcome.response, "Here you go.");
        assert_eq!(outcome.iterations, 2);
        assert!(outcome.messages.iter().all(|m| !m.is_empty()));
        assert_eq!(model.requests()[1].messages.len(), 1);
    }

    #[tokio::test]
    async fn empty_responses_hit_the_limit() {
        let plugins = PluginSet::in_memory();
        let model = Arc::new(SequentialMockModel::new(vec![
            make_text_response(""),
            make_text_response(""),
        ]));
        let settings = AgentSettings::default().with_max_iterations(2);
        let agent = agent_with(model.clone(), registry(&plugins), settings);

        let err = agent.run(vec![Message::user("Hi")]).await.unwrap_err();
        assert!(matches!(err, RunError::IterationLimitExceeded { max: 2 }));
    }

    #[tokio::test]
    async fn model_error_ends_the_run() {
        let plugins = PluginSet::in_memory();
        let model = Arc::new(SequentialMockModel::with_results(vec![Err(
            ProviderError::Network("connection reset".into()),
        )]));
        let agent = agent_with(model, registry(&plugins), AgentSettings::default());

        let err = agent.run(vec![Message::user("Hi")]).await.unwrap_err();
        assert!(matches!(err, RunError::ModelTransport(ProviderError::Network(_))));
    }

    struct StalledModel;

    #[async_trait]
    impl ModelProvider for StalledModel {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn complete(&self, _request: ModelRequest) -> Result<ModelResponse, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(make_text_response("too late"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn model_timeout_is_a_transport_error() {
        let plugins = PluginSet::in_memory();
        let settings = AgentSettings::default().with_model_timeout(Duration::from_secs(2));
        let agent = agent_with(Arc::new(StalledModel), registry(&plugins), settings);

        let err = agent.run(vec![Message::user("Hi")]).await.unwrap_err();
        assert!(matches!(err, RunError::ModelTransport(ProviderError::Timeout(_))));
    }

    #[tokio::test]
    async fn cancelled_before_first_call() {
        let plugins = PluginSet::in_memory();
        let model = Arc::new(SequentialMockModel::new(vec![]));
        let agent = agent_with(model.clone(), registry(&plugins), AgentSettings::default());

        let token = CancellationToken::new();
        token.cancel();
        let err = agent
            .run_with_cancel(vec![Message::user("Hi")], token)
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Cancelled));
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_model_call() {
        let plugins = PluginSet::in_memory();
        let agent = Arc::new(agent_with(
            Arc::new(StalledModel),
            registry(&plugins),
            AgentSettings::default(),
        ));

        let token = CancellationToken::new();
        let run = {
            let agent = Arc::clone(&agent);
            let token = token.clone();
            tokio::spawn(async move { agent.run_with_cancel(vec![Message::user("Hi")], token).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();

        let err = run.await.unwrap().unwrap_err();
        assert!(matches!(err, RunError::Cancelled));
    }

    struct Panicky;

    #[async_trait]
    impl CapabilityProvider for Panicky {
        fn name(&self) -> &str {
            "Panicky"
        }

        fn description(&self) -> &str {
            "Always panics"
        }

        fn list_tools(&self) -> Vec<ToolDescriptor> {
            vec![ToolDescriptor::new("explode", "Panics")]
        }

        async fn call_tool(&self, _name: &str, _arguments: Value) -> Result<Value, CapabilityError> {
            panic!("kaboom");
        }

        fn list_resources(&self) -> Vec<ResourceDescriptor> {
            Vec::new()
        }

        async fn read_resource(&self, uri: &str) -> Result<String, CapabilityError> {
            Err(CapabilityError::UnknownResource(uri.to_string()))
        }
    }

    #[tokio::test]
    async fn panicking_tool_is_reported_to_the_model() {
        let registry = Arc::new(
            CapabilityRegistry::new()
                .register(Arc::new(Panicky))
                .unwrap(),
        );
        let model = Arc::new(SequentialMockModel::tool_then_answer(
            vec![make_tool_call("explode", json!({}))],
            "That tool is broken.",
        ));
        let agent = agent_with(model.clone(), registry, AgentSettings::default());

        let outcome = agent.run(vec![Message::user("Boom")]).await.unwrap();
        assert_eq!(outcome.response, "That tool is broken.");
        let tool_message = last_tool_message(&model.requests()[1]).clone();
        assert!(tool_message.content.contains("panicked"));
        assert!(tool_message.content.contains("kaboom"));
    }

    /// Cancels the run from inside its first tool call.
    struct CancellingStep {
        token: CancellationToken,
        completed: AtomicUsize,
    }

    #[async_trait]
    impl CapabilityProvider for CancellingStep {
        fn name(&self) -> &str {
            "Steps"
        }

        fn description(&self) -> &str {
            "Cancels the run while executing"
        }

        fn list_tools(&self) -> Vec<ToolDescriptor> {
            vec![ToolDescriptor::new("step", "One step")]
        }

        async fn call_tool(&self, _name: &str, _arguments: Value) -> Result<Value, CapabilityError> {
            self.token.cancel();
            let n = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(json!({"step": n}))
        }

        fn list_resources(&self) -> Vec<ResourceDescriptor> {
            Vec::new()
        }

        async fn read_resource(&self, uri: &str) -> Result<String, CapabilityError> {
            Err(CapabilityError::UnknownResource(uri.to_string()))
        }
    }

    #[tokio::test]
    async fn cancel_during_tool_call_finishes_that_call_only() {
        let token = CancellationToken::new();
        let steps = Arc::new(CancellingStep {
            token: token.clone(),
            completed: AtomicUsize::new(0),
        });
        let registry = Arc::new(
            CapabilityRegistry::new()
                .register(steps.clone())
                .unwrap(),
        );
        let step = |id: &str| MessageToolCall {
            id: id.into(),
            name: "step".into(),
            arguments: "{}".into(),
        };
        let model = Arc::new(SequentialMockModel::new(vec![make_tool_call_response(
            vec![step("call_1"), step("call_2")],
        )]));
        let agent = agent_with(model.clone(), registry, AgentSettings::default());

        let err = agent
            .run_with_cancel(vec![Message::user("Do two steps")], token)
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Cancelled));
        assert_eq!(steps.completed.load(Ordering::SeqCst), 1);
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn empty_history_turns_never_reach_the_model() {
        let plugins = PluginSet::in_memory();
        let model = Arc::new(SequentialMockModel::single_text("Hi again!"));
        let agent = agent_with(model.clone(), registry(&plugins), AgentSettings::default());

        agent
            .run(vec![
                Message::user("Hi"),
                Message::assistant(""),
                Message::user("   "),
                Message::user("again"),
            ])
            .await
            .unwrap();

        let sent = &model.requests()[0].messages;
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|m| !m.is_empty()));
    }

    #[tokio::test]
    async fn stream_events_arrive_in_order() {
        let plugins = PluginSet::in_memory();
        let model = Arc::new(SequentialMockModel::tool_then_answer(
            vec![make_tool_call("create_todo", json!({"text": "Buy milk"}))],
            "Added.",
        ));
        let agent = Arc::new(agent_with(model, registry(&plugins), AgentSettings::default()));

        let events = collect(agent.run_stream(vec![Message::user("Add")], RunOptions::default())).await;
        let types: Vec<&str> = events.iter().map(AgentEvent::event_type).collect();
        assert_eq!(
            types,
            vec!["thinking", "tool_call", "tool_result", "thinking", "response", "done"]
        );
        let AgentEvent::Done { metadata, profiling } = events.last().unwrap() else {
            panic!("last event should be done");
        };
        assert_eq!(metadata.get("created_todos").map(<[String]>::len), Some(1));
        assert_eq!(profiling.llm_calls, 2);
    }

    #[tokio::test]
    async fn stream_ends_with_error_on_failure() {
        let plugins = PluginSet::in_memory();
        let model = Arc::new(SequentialMockModel::with_results(vec![Err(
            ProviderError::AuthenticationFailed("bad key".into()),
        )]));
        let agent = Arc::new(agent_with(model, registry(&plugins), AgentSettings::default()));

        let events = collect(agent.run_stream(vec![Message::user("Hi")], RunOptions::default())).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type(), "thinking");
        let AgentEvent::Error { message } = &events[1] else {
            panic!("last event should be error");
        };
        assert!(message.contains("bad key"));
    }

    #[tokio::test]
    async fn closed_receiver_cancels_run() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let cancel = CancellationToken::new();
        let sink = EventSink {
            tx: Some(tx),
            cancel: cancel.clone(),
        };
        sink.emit(AgentEvent::Thinking { iteration: 1 }).await;
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn orphan_tool_results_are_dropped() {
        let call = make_tool_call("search_todos", json!({"query": "x"}));
        let history = vec![
            Message::tool_result("call_stale", ToolOutcome::success(json!([]))),
            Message::user("Find x"),
            Message::assistant_with_tools("", vec![call]),
            Message::tool_result("call_search_todos", ToolOutcome::success(json!([]))),
            Message::tool_result("call_search_todos", ToolOutcome::success(json!([]))),
            Message::assistant("Nothing found."),
        ];
        let kept = sanitize_history(history);
        assert_eq!(kept.len(), 4);
        assert_eq!(kept[0].role, Role::User);
        assert_eq!(kept[2].role, Role::Tool);
        assert_eq!(kept[3].role, Role::Assistant);
    }

    #[test]
    fn empty_messages_are_dropped() {
        let call = make_tool_call("search_todos", json!({"query": "x"}));
        let history = vec![
            Message::user("Find x"),
            Message::assistant("  "),
            Message::assistant_with_tools("", vec![call]),
            Message::tool_result("call_search_todos", ToolOutcome::success(json!([]))),
            Message::assistant(""),
            Message::user("thanks"),
        ];
        let kept = sanitize_history(history);
        let roles: Vec<Role> = kept.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::Tool, Role::User]
        );
        assert_eq!(kept[1].tool_calls.len(), 1);
    }

    #[test]
    fn empty_arguments_mean_empty_object() {
        assert_eq!(parse_arguments("").unwrap(), json!({}));
        assert!(parse_arguments("[1,").is_err());
    }
}
