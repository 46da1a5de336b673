//! The research loop.
//!
//! A [`Researcher`] drives one session per call to [`Researcher::research`]:
//!
//! ```text
//! Init -> Reasoning -> (ToolSelected -> ToolExecuted -> Reasoning)* -> Final -> Done
//! ```
//!
//! with `Error` reachable from any non-terminal state. Each turn replays the
//! whole conversation to the provider, which either answers or asks for
//! tools. Tool calls run one after another; nothing in a session runs
//! concurrently. The loop is bounded by a step budget: when it runs out the
//! session is finalized with whatever partial text the model produced plus a
//! notice that the report is incomplete.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::memory::ConversationMemory;
use crate::message::{Message, ToolCall, Usage};
use crate::prompt::{max_steps_notice, research_prompt, SYSTEM_PROMPT};
use crate::provider::{CompletionRequest, CompletionResponse, Provider};
use crate::result::ResearchResult;
use crate::tool::{ToolRegistry, INPUT_ARG};

/// Reasoning turns allowed per session unless configured otherwise.
pub const DEFAULT_MAX_STEPS: usize = 15;

#[derive(Debug, Clone)]
pub struct ResearcherConfig {
    /// Model override; falls back to the provider's default.
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Maximum number of reasoning turns (provider calls) per session.
    pub max_steps: usize,
    pub system_prompt: String,
}

impl Default for ResearcherConfig {
    fn default() -> Self {
        Self {
            model: None,
            temperature: None,
            max_tokens: None,
            max_steps: DEFAULT_MAX_STEPS,
            system_prompt: SYSTEM_PROMPT.to_string(),
        }
    }
}

impl ResearcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the step budget. Zero is treated as one.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }
}

/// Where a session is in the research loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Reasoning,
    ToolSelected,
    ToolExecuted,
    Final,
    Done,
    Error,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Done | SessionState::Error)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Init => "init",
            SessionState::Reasoning => "reasoning",
            SessionState::ToolSelected => "tool_selected",
            SessionState::ToolExecuted => "tool_executed",
            SessionState::Final => "final",
            SessionState::Done => "done",
            SessionState::Error => "error",
        };
        f.write_str(name)
    }
}

/// State owned by a single research call.
#[derive(Debug)]
pub struct Session {
    pub topic: String,
    pub memory: ConversationMemory,
    /// Reasoning turns taken so far.
    pub steps: usize,
    pub usage: Usage,
    state: SessionState,
}

impl Session {
    fn start(topic: &str, system_prompt: &str) -> Self {
        Self {
            topic: topic.to_string(),
            memory: ConversationMemory::seeded(system_prompt, research_prompt(topic)),
            steps: 0,
            usage: Usage::default(),
            state: SessionState::Init,
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(
            !self.state.is_terminal(),
            "session already terminated in state {}",
            self.state
        );
        debug!(from = %self.state, to = %next, step = self.steps, "Session transition");
        self.state = next;
    }
}

/// What the model decided to do on one turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Run these tools, in order. `note` is any text sent alongside.
    Invoke { note: String, calls: Vec<ToolCall> },
    /// The final report.
    Finish(String),
}

impl Decision {
    /// Interpret a provider response.
    ///
    /// A response with neither tool calls nor text is malformed.
    pub fn from_response(response: CompletionResponse) -> Result<Self, Error> {
        let message = response.message;
        if !message.tool_calls.is_empty() {
            return Ok(Decision::Invoke {
                note: message.content,
                calls: message.tool_calls,
            });
        }
        if message.content.trim().is_empty() {
            return Err(Error::malformed(format!(
                "empty answer with no tool calls (finish reason: {:?})",
                response.finish_reason
            )));
        }
        Ok(Decision::Finish(message.content))
    }
}

/// How a session that did not fail came to an end.
#[derive(Debug)]
pub struct SessionOutcome {
    pub report: String,
    pub steps: usize,
    /// True when the step budget forced the final transition.
    pub budget_exhausted: bool,
    pub usage: Usage,
    pub memory: ConversationMemory,
}

/// Runs research sessions against a provider and a fixed tool set.
///
/// Each call to [`research`](Self::research) gets its own conversation
/// memory, so an instance can be reused for any number of topics.
pub struct Researcher {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    config: ResearcherConfig,
    cancel: CancellationToken,
}

impl Researcher {
    pub fn new(provider: Arc<dyn Provider>, tools: ToolRegistry, config: ResearcherConfig) -> Self {
        Self {
            provider,
            tools: Arc::new(tools),
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that cancels any session running on this researcher (e.g. on Ctrl-C).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Research a topic. Never fails: every error becomes a result with
    /// `error == true` and a description in `report`.
    pub async fn research(&self, topic: &str) -> ResearchResult {
        match self.run_session(topic).await {
            Ok(outcome) if outcome.budget_exhausted => ResearchResult::partial(topic, outcome.report),
            Ok(outcome) => ResearchResult::completed(topic, outcome.report),
            Err(e) => {
                warn!(topic, error = %e, retryable = e.is_retryable(), "Research failed");
                ResearchResult::failed(topic, &e)
            }
        }
    }

    /// Run one session to completion, surfacing reasoning failures as errors.
    pub async fn run_session(&self, topic: &str) -> Result<SessionOutcome, Error> {
        if topic.trim().is_empty() {
            return Err(Error::invalid_request("research topic must not be empty"));
        }

        info!(
            topic,
            provider = self.provider.name(),
            model = self.config.model.as_deref().or(self.provider.default_model()),
            tools = ?self.tools.names(),
            max_steps = self.config.max_steps,
            "Research session starting"
        );

        let mut session = Session::start(topic, &self.config.system_prompt);
        match self.drive(&mut session).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                session.transition(SessionState::Error);
                Err(e)
            }
        }
    }

    async fn drive(&self, session: &mut Session) -> Result<SessionOutcome, Error> {
        while session.steps < self.config.max_steps {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            session.transition(SessionState::Reasoning);
            session.steps += 1;
            debug!(
                step = session.steps,
                max_steps = self.config.max_steps,
                message_count = session.memory.len(),
                "Reasoning turn starting"
            );

            let response = self.reason(session).await?;
            session.usage.add(&response.usage);

            match Decision::from_response(response)? {
                Decision::Finish(report) => {
                    session.memory.push(Message::assistant(report.as_str()));
                    session.transition(SessionState::Final);
                    info!(
                        steps = session.steps,
                        report_len = report.len(),
                        "Research session completed"
                    );
                    return Ok(self.finish(session, report, false));
                }
                Decision::Invoke { note, calls } => {
                    let mut note = Some(note);
                    for call in calls {
                        if self.cancel.is_cancelled() {
                            return Err(Error::Cancelled);
                        }
                        session.transition(SessionState::ToolSelected);
                        let result = self.execute_tool(&call).await?;
                        session
                            .memory
                            .record_tool_exchange(note.take().unwrap_or_default(), call, result);
                        session.transition(SessionState::ToolExecuted);
                    }
                }
            }
        }

        warn!(
            max_steps = self.config.max_steps,
            "Step budget exhausted before a final answer"
        );
        session.transition(SessionState::Final);
        let notice = max_steps_notice(self.config.max_steps);
        let report = match session.memory.last_assistant_text() {
            Some(partial) => format!("{}\n\n{}", partial, notice),
            None => notice,
        };
        Ok(self.finish(session, report, true))
    }

    fn finish(&self, session: &mut Session, report: String, budget_exhausted: bool) -> SessionOutcome {
        session.transition(SessionState::Done);
        SessionOutcome {
            report,
            steps: session.steps,
            budget_exhausted,
            usage: session.usage.clone(),
            memory: std::mem::take(&mut session.memory),
        }
    }

    async fn reason(&self, session: &Session) -> Result<CompletionResponse, Error> {
        let mut request = CompletionRequest::new(session.memory.snapshot())
            .with_tools(self.tools.definitions());
        if let Some(model) = &self.config.model {
            request = request.with_model(model.as_str());
        }
        if let Some(temperature) = self.config.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.config.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            response = self.provider.complete(request) => response,
        }
    }

    /// Run one tool call. Unknown tools produce an explanatory result rather
    /// than an error; only cancellation fails here.
    async fn execute_tool(&self, call: &ToolCall) -> Result<String, Error> {
        let Some(tool) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, "Model requested an unknown tool");
            return Ok(format!(
                "Error: tool '{}' is not available. Available tools: {}",
                call.name,
                self.tools.names().join(", ")
            ));
        };

        let input = call.text_input(INPUT_ARG);
        info!(tool = %call.name, input = %input, "Invoking tool");

        let output = tokio::select! {
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            output = tool.invoke(&input) => output,
        };

        debug!(tool = %call.name, output_len = output.len(), "Tool finished");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageKind, Role};
    use crate::provider::FinishReason;
    use crate::testing::{MockProvider, StaticTool};
    use crate::tool::Tool;
    use std::time::{Duration, Instant};

    const TOPIC: &str = "impact of remote work on urban housing";
    const URL_A: &str = "https://news.example.com/remote-work-housing";
    const URL_B: &str = "https://research.example.org/urban-rents-2024";

    fn search_results() -> String {
        format!(
            "Result 1:\nTitle: Remote work reshapes housing\nURL: {}\nSnippet: Demand moved outward.\n\n\
             Result 2:\nTitle: Urban rents in 2024\nURL: {}\nSnippet: Downtown rents recovered.\n",
            URL_A, URL_B
        )
    }

    fn researcher_with(
        provider: Arc<MockProvider>,
        tools: Vec<Arc<StaticTool>>,
        config: ResearcherConfig,
    ) -> Researcher {
        let registry =
            ToolRegistry::with_tools(tools.into_iter().map(|t| t as Arc<dyn Tool>)).unwrap();
        Researcher::new(provider, registry, config)
    }

    #[test]
    fn test_config_defaults() {
        let config = ResearcherConfig::default();
        assert_eq!(config.max_steps, DEFAULT_MAX_STEPS);
        assert_eq!(config.system_prompt, SYSTEM_PROMPT);
        assert_eq!(ResearcherConfig::new().with_max_steps(0).max_steps, 1);
    }

    #[test]
    fn test_decision_from_response() {
        let call = ToolCall::new("c1", "WebSearch", serde_json::json!({"input": "q"}));
        let invoke = Decision::from_response(CompletionResponse {
            message: Message::assistant_with_tool_calls("thinking", vec![call.clone()]),
            usage: Usage::default(),
            model: "m".into(),
            finish_reason: FinishReason::ToolCalls,
        })
        .unwrap();
        assert_eq!(
            invoke,
            Decision::Invoke {
                note: "thinking".into(),
                calls: vec![call]
            }
        );

        let empty = Decision::from_response(CompletionResponse {
            message: Message::assistant("   "),
            usage: Usage::default(),
            model: "m".into(),
            finish_reason: FinishReason::Length,
        });
        assert!(matches!(empty, Err(Error::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn test_end_to_end_research() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_tool_call("WebSearch", "remote work urban housing impact 2024");
        provider.queue_tool_call("WebScraper", URL_A);
        provider.queue_response(&format!(
            "# Remote work and urban housing\n\n\
             - Demand shifted to suburbs ({}).\n\
             - Downtown rents recovered in 2024 ({}).\n\n\
             Sources: {}, {}",
            URL_A, URL_B, URL_A, URL_B
        ));

        let search = Arc::new(StaticTool::new("WebSearch", &search_results()));
        let scraper = Arc::new(StaticTool::new("WebScraper", "Cleaned article text about housing."));
        let researcher = researcher_with(
            provider.clone(),
            vec![search.clone(), scraper.clone()],
            ResearcherConfig::default(),
        );

        let result = researcher.research(TOPIC).await;

        assert!(!result.error);
        assert!(!result.incomplete);
        assert_eq!(result.topic, TOPIC);
        assert_eq!(result.sources, vec![URL_A.to_string(), URL_B.to_string()]);
        assert_eq!(search.calls(), vec!["remote work urban housing impact 2024"]);
        assert_eq!(scraper.calls(), vec![URL_A]);
        assert_eq!(provider.request_count(), 3);
    }

    #[tokio::test]
    async fn test_log_replayed_and_growing() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_tool_call("WebSearch", "query");
        provider.queue_response("Done. https://a.example");

        let researcher = researcher_with(
            provider.clone(),
            vec![Arc::new(StaticTool::new("WebSearch", "No results found."))],
            ResearcherConfig::default().with_model("gpt-test").with_temperature(0.1),
        );
        let outcome = researcher.run_session(TOPIC).await.unwrap();

        let requests = provider.captured_requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].messages.len(), 2);
        assert_eq!(requests[0].messages[0].role, Role::System);
        assert!(requests[0].messages[1].content.contains(TOPIC));
        assert_eq!(requests[1].messages.len(), 4);
        assert_eq!(&requests[1].messages[..2], &requests[0].messages[..]);
        assert_eq!(requests[1].model.as_deref(), Some("gpt-test"));
        assert_eq!(requests[1].temperature, Some(0.1));
        assert_eq!(requests[0].tools.len(), 1);

        let kinds: Vec<_> = outcome.memory.messages().iter().map(|m| m.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                MessageKind::System,
                MessageKind::User,
                MessageKind::ToolInvocation,
                MessageKind::ToolResult,
                MessageKind::Assistant,
            ]
        );
        assert_eq!(outcome.steps, 2);
        assert_eq!(outcome.usage.total_tokens, 30);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_back() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_tool_call("NonexistentTool", "anything");
        provider.queue_response("Final report without sources.");

        let researcher = researcher_with(
            provider.clone(),
            vec![Arc::new(StaticTool::new("WebSearch", "results"))],
            ResearcherConfig::default(),
        );
        let result = researcher.research(TOPIC).await;

        assert!(!result.error);
        assert_eq!(result.report, "Final report without sources.");

        let last = provider.last_request().unwrap();
        let tool_result = last
            .messages
            .iter()
            .find(|m| m.kind() == MessageKind::ToolResult)
            .unwrap();
        assert!(tool_result.content.contains("'NonexistentTool' is not available"));
        assert!(tool_result.content.contains("WebSearch"));
    }

    #[tokio::test]
    async fn test_provider_failure_packages_error() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_error(Error::api(503, "upstream unavailable"));

        let researcher = researcher_with(provider, vec![], ResearcherConfig::default());
        let result = researcher.research(TOPIC).await;

        assert!(result.error);
        assert!(result.sources.is_empty());
        assert_eq!(result.topic, TOPIC);
        assert!(result.report.contains("Research failed"));
        assert!(result.report.contains("upstream unavailable"));
    }

    #[tokio::test]
    async fn test_budget_forces_final() {
        let provider = Arc::new(MockProvider::new());
        provider.always_call_tool("WebSearch", "same query again");

        let search = Arc::new(StaticTool::new("WebSearch", "Result 1:\nURL: https://a.example\n"));
        let researcher = researcher_with(
            provider.clone(),
            vec![search.clone()],
            ResearcherConfig::default().with_max_steps(4),
        );
        let result = researcher.research(TOPIC).await;

        assert_eq!(provider.request_count(), 4);
        assert_eq!(search.calls().len(), 4);
        assert!(!result.error);
        assert!(result.incomplete);
        assert!(result.report.contains("maximum of 4 reasoning steps"));
    }

    #[tokio::test]
    async fn test_budget_keeps_partial_text() {
        let provider = Arc::new(MockProvider::new());
        let call = ToolCall::new("c1", "WebSearch", serde_json::json!({"input": "q"}));
        provider.queue_raw_response(Ok(CompletionResponse {
            message: Message::assistant_with_tool_calls(
                "Draft: prices rose (https://a.example/prices).",
                vec![call],
            ),
            usage: Usage::default(),
            model: "m".into(),
            finish_reason: FinishReason::ToolCalls,
        }));

        let researcher = researcher_with(
            provider,
            vec![Arc::new(StaticTool::new("WebSearch", "results"))],
            ResearcherConfig::default().with_max_steps(1),
        );
        let result = researcher.research(TOPIC).await;

        assert!(result.incomplete);
        assert!(result.report.starts_with("Draft: prices rose"));
        assert_eq!(result.sources, vec!["https://a.example/prices"]);
    }

    #[tokio::test]
    async fn test_multiple_calls_run_in_order() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_raw_response(Ok(CompletionResponse {
            message: Message::assistant_with_tool_calls(
                "",
                vec![
                    ToolCall::new("c1", "WebScraper", serde_json::json!({"input": "https://a.example"})),
                    ToolCall::new("c2", "WebScraper", serde_json::json!({"input": "https://b.example"})),
                ],
            ),
            usage: Usage::default(),
            model: "m".into(),
            finish_reason: FinishReason::ToolCalls,
        }));
        provider.queue_response("Report citing https://a.example and https://b.example");

        let scraper = Arc::new(StaticTool::new("WebScraper", "page"));
        let researcher = researcher_with(provider, vec![scraper.clone()], ResearcherConfig::default());
        let outcome = researcher.run_session(TOPIC).await.unwrap();

        assert_eq!(scraper.calls(), vec!["https://a.example", "https://b.example"]);
        assert_eq!(outcome.memory.count_kind(MessageKind::ToolInvocation), 2);
        assert_eq!(outcome.memory.count_kind(MessageKind::ToolResult), 2);
    }

    #[tokio::test]
    async fn test_empty_topic_is_an_error_result() {
        let provider = Arc::new(MockProvider::new());
        let researcher = researcher_with(provider.clone(), vec![], ResearcherConfig::default());
        let result = researcher.research("   ").await;

        assert!(result.error);
        assert_eq!(result.topic, "   ");
        assert_eq!(provider.request_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_response("never used");
        let researcher = researcher_with(provider.clone(), vec![], ResearcherConfig::default());
        researcher.cancellation_token().cancel();

        let result = researcher.research(TOPIC).await;
        assert!(result.error);
        assert_eq!(result.report, "Research cancelled by user.");
        assert_eq!(provider.request_count(), 0);
    }

    fn cancel_after(researcher: &Researcher, delay: Duration) {
        let cancel = researcher.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            cancel.cancel();
        });
    }

    #[tokio::test]
    async fn test_cancel_interrupts_running_tool() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_tool_call("WebScraper", URL_A);
        provider.queue_response("never reached");
        let slow = Arc::new(
            StaticTool::new("WebScraper", "page text").with_delay(Duration::from_secs(30)),
        );
        let researcher =
            researcher_with(provider.clone(), vec![slow.clone()], ResearcherConfig::default());

        cancel_after(&researcher, Duration::from_millis(100));
        let started = Instant::now();
        let result = researcher.research(TOPIC).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(result.error);
        assert_eq!(result.report, "Research cancelled by user.");
        assert!(result.sources.is_empty());
        assert_eq!(slow.calls(), vec![URL_A]);
        assert_eq!(provider.request_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_reasoning() {
        let provider = Arc::new(MockProvider::new().with_delay(Duration::from_secs(30)));
        provider.queue_response("too late");
        let researcher = researcher_with(provider.clone(), vec![], ResearcherConfig::default());

        cancel_after(&researcher, Duration::from_millis(100));
        let started = Instant::now();
        let result = researcher.research(TOPIC).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(result.error);
        assert_eq!(result.report, "Research cancelled by user.");
        assert_eq!(provider.request_count(), 1);
    }

    #[tokio::test]
    async fn test_instance_reuse_does_not_leak_context() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_response("first report");
        provider.queue_response("second report");
        let researcher = researcher_with(provider.clone(), vec![], ResearcherConfig::default());

        researcher.research("first topic").await;
        researcher.research("second topic").await;

        let last = provider.last_request().unwrap();
        assert_eq!(last.messages.len(), 2);
        assert!(last.messages[1].content.contains("second topic"));
        assert!(!last.messages.iter().any(|m| m.content.contains("first")));
    }
}
