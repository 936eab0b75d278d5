//! Shared test helpers for agent tests.

use std::sync::Mutex;

use pico_core::error::ProviderError;
use pico_core::message::{Message, MessageToolCall};
use pico_core::model::{ModelProvider, ModelRequest, ModelResponse, Usage};

/// A mock model that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next entry and records the request.
/// Panics if more calls are made than entries provided.
pub struct SequentialMockModel {
    responses: Mutex<Vec<Result<ModelResponse, ProviderError>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl SequentialMockModel {
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    pub fn with_results(responses: Vec<Result<ModelResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    pub fn tool_then_answer(tool_calls: Vec<MessageToolCall>, answer: &str) -> Self {
        Self::new(vec![
            make_tool_call_response(tool_calls),
            make_text_response(answer),
        ])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ModelProvider for SequentialMockModel {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let call = requests.len();

        if call >= responses.len() {
            panic!(
                "SequentialMockModel: no more responses (call #{call}, have {})",
                responses.len()
            );
        }

        requests.push(request);
        responses[call].clone()
    }
}

/// A model that asks for the same tool on every call.
pub struct LoopingModel {
    calls: Mutex<usize>,
}

impl LoopingModel {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl ModelProvider for LoopingModel {
    fn name(&self) -> &str {
        "looping_mock"
    }

    async fn complete(&self, _request: ModelRequest) -> Result<ModelResponse, ProviderError> {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        let mut call = make_tool_call("search_todos", serde_json::json!({"query": "milk"}));
        call.id = format!("call_{}", *calls);
        Ok(make_tool_call_response(vec![call]))
    }
}

fn usage() -> Usage {
    Usage {
        input_tokens: 10,
        output_tokens: 5,
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ModelResponse {
    ModelResponse {
        message: Message::assistant(text),
        usage: usage(),
        model: "mock-model".into(),
        stop_reason: Some("end_turn".into()),
    }
}

/// Create a response that only carries tool calls.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>) -> ModelResponse {
    ModelResponse {
        message: Message::assistant_with_tools("", tool_calls),
        usage: usage(),
        model: "mock-model".into(),
        stop_reason: Some("tool_use".into()),
    }
}

/// Helper to create a tool call.
pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}
