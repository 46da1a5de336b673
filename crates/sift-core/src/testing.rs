//! Test utilities shared across the workspace.
//! Only compiled when running tests or with the `testing` feature.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::Error;
use crate::message::{Message, ToolCall, Usage};
use crate::provider::{CompletionRequest, CompletionResponse, FinishReason, Provider};
use crate::tool::{Tool, INPUT_ARG};

/// A mock provider that returns pre-configured responses.
pub struct MockProvider {
    responses: Mutex<Vec<Result<CompletionResponse, Error>>>,
    /// Captured requests (for assertion).
    pub captured_requests: Mutex<Vec<CompletionRequest>>,
    /// Returned for every call once the queue is empty, if set.
    fallback_tool: Mutex<Option<(String, String)>>,
    call_ids: AtomicUsize,
    pub name: String,
    pub default_model: Option<String>,
    /// Simulated latency before each reply.
    delay: Option<Duration>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            captured_requests: Mutex::new(Vec::new()),
            fallback_tool: Mutex::new(None),
            call_ids: AtomicUsize::new(0),
            name: "mock".to_string(),
            default_model: None,
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a final text answer.
    /// Responses are returned in FIFO order (first queued = first returned).
    pub fn queue_response(&self, content: &str) {
        self.queue_raw_response(Ok(CompletionResponse {
            message: Message::assistant(content),
            usage: Usage::new(10, 5),
            model: "mock-model".to_string(),
            finish_reason: FinishReason::Stop,
        }));
    }

    /// Queue a request to invoke `tool` with a text `input`.
    pub fn queue_tool_call(&self, tool: &str, input: &str) {
        let call = self.next_call(tool, input);
        self.queue_raw_response(Ok(tool_call_response(call)));
    }

    /// Queue an upstream failure.
    pub fn queue_error(&self, error: Error) {
        self.queue_raw_response(Err(error));
    }

    pub fn queue_raw_response(&self, response: Result<CompletionResponse, Error>) {
        self.responses.lock().unwrap().insert(0, response);
    }

    /// Keep requesting `tool` forever once the queue runs dry.
    pub fn always_call_tool(&self, tool: &str, input: &str) {
        *self.fallback_tool.lock().unwrap() = Some((tool.to_string(), input.to_string()));
    }

    /// Get the number of captured requests.
    pub fn request_count(&self) -> usize {
        self.captured_requests.lock().unwrap().len()
    }

    /// Get the last captured request.
    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.captured_requests.lock().unwrap().last().cloned()
    }

    fn next_call(&self, tool: &str, input: &str) -> ToolCall {
        let n = self.call_ids.fetch_add(1, Ordering::SeqCst);
        let mut arguments = serde_json::Map::new();
        arguments.insert(INPUT_ARG.to_string(), serde_json::Value::String(input.to_string()));
        ToolCall::new(format!("call-{}", n), tool, serde_json::Value::Object(arguments))
    }
}

fn tool_call_response(call: ToolCall) -> CompletionResponse {
    CompletionResponse {
        message: Message::assistant_with_tool_calls("", vec![call]),
        usage: Usage::new(10, 5),
        model: "mock-model".to_string(),
        finish_reason: FinishReason::ToolCalls,
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, Error> {
        self.captured_requests.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(response) = self.responses.lock().unwrap().pop() {
            return response;
        }
        let fallback = self.fallback_tool.lock().unwrap().clone();
        match fallback {
            Some((tool, input)) => Ok(tool_call_response(self.next_call(&tool, &input))),
            None => Err(Error::Unknown("No mock response queued".to_string())),
        }
    }
}

/// A tool that answers every invocation with the same text and records its inputs.
pub struct StaticTool {
    name: String,
    description: String,
    response: String,
    delay: Option<Duration>,
    pub inputs: Mutex<Vec<String>>,
}

impl StaticTool {
    pub fn new(name: &str, response: &str) -> Self {
        Self {
            name: name.to_string(),
            description: format!("Static test tool {}", name),
            response: response.to_string(),
            delay: None,
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Make every invocation take `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Tool for StaticTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(&self, input: &str) -> String {
        self.inputs.lock().unwrap().push(input.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.response.clone()
    }
}
