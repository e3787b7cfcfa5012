use browsepilot_browser::BrowserExecutor;
use browsepilot_core::config::AgentConfig;
use browsepilot_core::types::ChatMessage;
use browsepilot_core::{BrowserAction, Error, LogEntry, LogKind, PageContext, TaskResult};
use browsepilot_providers::Provider;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::ContextCompressor;
use crate::history::ConversationHistory;
use crate::security::{PageMeta, SecurityClassifier};
use crate::stagnation::{StagnationDetector, StagnationVerdict};
use crate::tools::{tool_schemas, ToolInvocation};

const SYSTEM_PROMPT: &str = "You are a browser automation agent. Complete any task by analyzing the page yourself.

## Tools
- navigate: go to a URL
- click: click a CSS selector FROM THE ELEMENT LIST
- click_text: click an element by its visible text
- type_text: type into an input field
- scroll: scroll to reveal more elements
- press_key: press a key (Enter, Escape, Tab, ...)
- extract_text: read text from the page
- ask_user: ask the user for PERSONAL data (address, phone, password)
- complete_task: finish with a report

## How to work
1. ANALYZE the page context - it lists every visible element
2. DECIDE what moves you toward the goal
3. PICK a matching element from the list and an action
4. REPEAT until the task is done

## Rules
- Use ONLY selectors from the element list
- If the element you need is missing, scroll
- Do not repeat failed actions - try another approach
- If a modal dialog is open, work with its elements
- After typing into a search box you usually need Enter
- ask_user is ONLY for personal data, never for \"how do I do X\"

## Finishing
- complete_task when the goal is reached
- complete_task with an explanation if the task is impossible";

const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(5);
const ERROR_HINT_THRESHOLD: u32 = 3;
const ERROR_ABORT_THRESHOLD: u32 = 5;
const AGGRESSIVE_TRIM_KEEP: usize = 10;

/// Security confirmation handed to the UI layer; the loop parks on
/// `respond` until the user decides.
pub struct SecurityPrompt {
    pub warning: String,
    pub respond: oneshot::Sender<bool>,
}

/// Free-text question for the user (`ask_user` / `confirm_action`).
pub struct UserPrompt {
    pub question: String,
    /// True when raised by `confirm_action` rather than `ask_user`.
    pub confirm: bool,
    pub respond: oneshot::Sender<String>,
}

/// Channels through which the loop reaches whatever UI is attached.
pub struct TaskCallbacks {
    pub log_tx: mpsc::UnboundedSender<LogEntry>,
    pub security_tx: mpsc::Sender<SecurityPrompt>,
    pub input_tx: mpsc::Sender<UserPrompt>,
}

enum Outcome {
    Completed { success: bool, summary: String },
    IterationLimit,
    LoopDetected { tool: String },
    ErrorLimit,
    Cancelled,
}

enum ToolFlow {
    Continue,
    Finished(Outcome),
}

/// One task run: pull a page snapshot, compress it, ask the oracle, gate and
/// dispatch its tool calls, feed results back, until completion or one of
/// the fatal control limits. Owns its conversation state exclusively; a new
/// runner is built per run.
pub struct TaskRunner {
    config: AgentConfig,
    provider: Box<dyn Provider>,
    executor: Arc<dyn BrowserExecutor>,
    callbacks: TaskCallbacks,
    cancel: CancellationToken,
    compressor: ContextCompressor,
    classifier: SecurityClassifier,
    detector: StagnationDetector,
    history: ConversationHistory,
    actions_log: Vec<BrowserAction>,
    errors: Vec<String>,
    consecutive_errors: u32,
}

impl TaskRunner {
    pub fn new(
        config: AgentConfig,
        provider: Box<dyn Provider>,
        executor: Arc<dyn BrowserExecutor>,
        callbacks: TaskCallbacks,
        cancel: CancellationToken,
    ) -> Self {
        let compressor = ContextCompressor::new(config.context_max_tokens);
        Self {
            config,
            provider,
            executor,
            callbacks,
            cancel,
            compressor,
            classifier: SecurityClassifier::new(),
            detector: StagnationDetector::new(),
            history: ConversationHistory::new(),
            actions_log: Vec::new(),
            errors: Vec::new(),
            consecutive_errors: 0,
        }
    }

    pub async fn run_task(&mut self, task: &str) -> TaskResult {
        let start = Instant::now();
        info!(task = %task, "Task run started");

        self.history = ConversationHistory::new();
        self.history.push(ChatMessage::system(SYSTEM_PROMPT));
        self.history.push(ChatMessage::user(&format!(
            "Task: {}\n\nAnalyze the current page state and begin.",
            task
        )));
        self.detector.reset();
        self.compressor.clear_history();
        self.actions_log.clear();
        self.errors.clear();
        self.consecutive_errors = 0;

        let tools = tool_schemas();
        let mut iteration = 0u32;
        let mut outcome: Option<Outcome> = None;

        while iteration < self.config.max_iterations && outcome.is_none() {
            iteration += 1;
            if self.cancel.is_cancelled() {
                outcome = Some(Outcome::Cancelled);
                break;
            }
            self.log(
                LogKind::Info,
                &format!("--- Iteration {}/{} ---", iteration, self.config.max_iterations),
            );

            outcome = self.run_iteration(task, &tools).await;
        }

        let outcome = outcome.unwrap_or(Outcome::IterationLimit);
        let mut result = self.finish(outcome);
        result.duration_ms = start.elapsed().as_millis() as u64;
        info!(success = result.success, duration_ms = result.duration_ms, "Task run finished");
        result
    }

    /// One loop turn. Returns the terminal outcome when this turn ends the
    /// run, `None` to keep going. Failures inside a turn are folded into the
    /// conversation as recoverable hints; they never abort the run directly.
    async fn run_iteration(&mut self, task: &str, tools: &[serde_json::Value]) -> Option<Outcome> {
        // 1. Observe. A failed snapshot degrades to a minimal context inside
        // the executor, so this always yields something to reason over.
        let page_context = self.executor.extract_page_context().await;
        let formatted = self.compressor.render(&page_context);
        debug!(url = %page_context.url, elements = page_context.elements.len(), "Page context fetched");

        // 2. Remind the oracle of the task, what it already did, and what
        // the page looks like now.
        let recent: String = self
            .actions_log
            .iter()
            .rev()
            .take(5)
            .rev()
            .enumerate()
            .map(|(i, a)| format!("{}. {}", i + 1, a.describe()))
            .collect::<Vec<_>>()
            .join("\n");
        let actions_digest = if recent.is_empty() {
            String::new()
        } else {
            format!("\n\n--- Recent actions ---\n{}", recent)
        };
        self.history.push(ChatMessage::user(&format!(
            "[TASK: {}]{}\n\n--- Page state ---\n{}\n\nContinue with the task: \"{}\". Do NOT repeat actions that were already done.",
            task, actions_digest, formatted, task
        )));

        // 3. Bound the window before every oracle call.
        self.history.trim(self.config.history_max_messages);

        // 4. Ask the oracle.
        let response = match self.query_oracle(tools).await {
            Ok(response) => response,
            Err(OracleFailure::RetryNextIteration) => return None,
            Err(OracleFailure::GaveUp(message)) => {
                self.log(LogKind::Error, &message);
                self.errors.push(message.clone());
                self.history.push(ChatMessage::user(&format!(
                    "An error occurred: {}. Try another approach.",
                    message
                )));
                return None;
            }
        };

        // 5. A text-only turn is valid thinking; no action taken.
        if response.tool_calls.is_empty() {
            let thought = response.content.unwrap_or_else(|| "Thinking...".to_string());
            self.log(LogKind::Thought, &thought);
            self.history.push(ChatMessage::assistant(&thought));
            return None;
        }

        // 6. Append the assistant turn once, then work through its calls in
        // order. Never dispatch two actions concurrently.
        self.history.push(ChatMessage::assistant_with_tools(
            response.content.clone(),
            response.tool_calls.clone(),
        ));

        for call in &response.tool_calls {
            match self.handle_tool_call(call, &page_context).await {
                ToolFlow::Continue => {}
                ToolFlow::Finished(outcome) => return Some(outcome),
            }
        }
        None
    }

    async fn handle_tool_call(
        &mut self,
        call: &browsepilot_core::types::ToolCallRequest,
        page_context: &PageContext,
    ) -> ToolFlow {
        let invocation = match ToolInvocation::decode(call) {
            Ok(invocation) => invocation,
            Err(e) => {
                self.log(LogKind::Error, &format!("{}: {}", call.name, e));
                self.push_tool_failure(&call.id, &e.to_string());
                if self.consecutive_errors >= ERROR_ABORT_THRESHOLD {
                    return ToolFlow::Finished(Outcome::ErrorLimit);
                }
                return ToolFlow::Continue;
            }
        };

        // Stagnation gate runs before anything is executed.
        if self.detector.observe(&invocation.signature()) == StagnationVerdict::Loop {
            self.log(LogKind::Warning, "Action loop detected, stopping the task");
            return ToolFlow::Finished(Outcome::LoopDetected {
                tool: invocation.name().to_string(),
            });
        }

        match &invocation {
            ToolInvocation::CompleteTask { success, summary } => {
                self.history.push(ChatMessage::tool_result(&call.id, summary));
                ToolFlow::Finished(Outcome::Completed {
                    success: *success,
                    summary: summary.clone(),
                })
            }

            ToolInvocation::AskUser { question } => {
                self.log(LogKind::Warning, question);
                self.history
                    .push(ChatMessage::tool_result(&call.id, "Waiting for the user's answer..."));
                match self.await_user_answer(question, false).await {
                    Some(answer) => {
                        self.history.push(ChatMessage::user(&answer));
                        ToolFlow::Continue
                    }
                    None => ToolFlow::Finished(Outcome::Cancelled),
                }
            }

            ToolInvocation::ConfirmAction { question, .. } => {
                self.log(LogKind::Confirm, question);
                self.history
                    .push(ChatMessage::tool_result(&call.id, "Waiting for the user's confirmation..."));
                match self.await_user_answer(question, true).await {
                    Some(answer) => {
                        self.history.push(ChatMessage::user(&answer));
                        ToolFlow::Continue
                    }
                    None => ToolFlow::Finished(Outcome::Cancelled),
                }
            }

            _ => {
                let action = invocation
                    .to_action()
                    .expect("non-control tools always map to an action");
                self.dispatch_action(&call.id, &invocation, action, page_context).await
            }
        }
    }

    /// Classify, optionally confirm, then execute one browser action.
    async fn dispatch_action(
        &mut self,
        call_id: &str,
        invocation: &ToolInvocation,
        action: BrowserAction,
        page_context: &PageContext,
    ) -> ToolFlow {
        self.log(LogKind::Action, &action.describe());

        let meta = PageMeta {
            url: page_context.url.clone(),
            element_text: self.element_text_for(invocation, page_context),
        };
        let verdict = self.classifier.classify(&action, &meta);
        if verdict.requires_confirmation {
            let warning = self.classifier.format_warning(&verdict, &action);
            match self.await_security_decision(&warning).await {
                Some(true) => {}
                Some(false) => {
                    // Deny resolves the call with no side effects; this is a
                    // normal path, not an error.
                    self.log(LogKind::Warning, "Action cancelled by the user");
                    self.history
                        .push(ChatMessage::tool_result(call_id, "Action cancelled by the user"));
                    return ToolFlow::Continue;
                }
                None => return ToolFlow::Finished(Outcome::Cancelled),
            }
        }

        match self.executor.execute_action(&action).await {
            Ok(result) => {
                self.consecutive_errors = 0;
                self.history.push(ChatMessage::tool_result(call_id, &result));
                self.actions_log.push(action);
                ToolFlow::Continue
            }
            Err(e) => {
                self.log(LogKind::Error, &format!("{} failed: {}", invocation.name(), e));
                self.errors.push(e.to_string());
                self.push_tool_failure(call_id, &e.to_string());
                if self.consecutive_errors >= ERROR_ABORT_THRESHOLD {
                    self.log(LogKind::Warning, "Too many consecutive errors, stopping the task");
                    return ToolFlow::Finished(Outcome::ErrorLimit);
                }
                ToolFlow::Continue
            }
        }
    }

    /// Record a failed call as its tool result, with a corrective hint once
    /// the failures pile up.
    fn push_tool_failure(&mut self, call_id: &str, error: &str) {
        self.consecutive_errors += 1;
        debug!(consecutive = self.consecutive_errors, "Action failure");
        let mut result = format!("Error: {}", error);
        if self.consecutive_errors >= ERROR_HINT_THRESHOLD {
            result.push_str(
                "\n\nTOO MANY ERRORS! Use ONLY selectors from the element list. If the element you need is not there, call complete_task with an explanation.",
            );
        }
        self.history.push(ChatMessage::tool_result(call_id, &result));
    }

    fn element_text_for(&self, invocation: &ToolInvocation, page_context: &PageContext) -> Option<String> {
        match invocation {
            ToolInvocation::Click { selector, description } => page_context
                .elements
                .iter()
                .find(|el| el.selector == *selector)
                .map(|el| el.text.clone())
                .or_else(|| description.clone()),
            ToolInvocation::ClickText { text } => Some(text.clone()),
            _ => None,
        }
    }

    /// Oracle call with the recovery ladder: rate limits push the retry to
    /// the next iteration after a fixed backoff, context overflows trim the
    /// window and retry immediately, transient failures retry with
    /// exponential delay.
    async fn query_oracle(
        &mut self,
        tools: &[serde_json::Value],
    ) -> std::result::Result<browsepilot_core::types::LLMResponse, OracleFailure> {
        let mut last_error: Option<Error> = None;

        for attempt in 0..=self.config.llm_max_retries {
            if attempt > 0 {
                let delay = self.config.llm_retry_delay_ms * (1u64 << (attempt - 1).min(4));
                warn!(attempt, delay_ms = delay, "Retrying oracle call");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            match self.provider.chat(self.history.messages(), tools).await {
                Ok(response) => {
                    debug!(
                        tool_calls = response.tool_calls.len(),
                        finish_reason = %response.finish_reason,
                        "Oracle response received"
                    );
                    return Ok(response);
                }
                Err(Error::RateLimited(msg)) => {
                    self.log(LogKind::Warning, "Rate limited, backing off");
                    warn!(error = %msg, "Oracle rate limited");
                    tokio::time::sleep(RATE_LIMIT_BACKOFF).await;
                    return Err(OracleFailure::RetryNextIteration);
                }
                Err(Error::ContextTooLarge(msg)) => {
                    warn!(error = %msg, "Context too large, trimming history");
                    self.log(LogKind::Warning, "Trimming conversation to fit the context window");
                    self.history.aggressive_trim(AGGRESSIVE_TRIM_KEEP);
                    last_error = Some(Error::ContextTooLarge(msg));
                }
                Err(e) => {
                    warn!(error = %e, attempt, "Oracle call failed");
                    last_error = Some(e);
                }
            }
        }

        Err(OracleFailure::GaveUp(
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Oracle unavailable".to_string()),
        ))
    }

    /// Park on a security decision, aborting cleanly when the task is
    /// stopped mid-wait. `None` means cancelled.
    async fn await_security_decision(&mut self, warning: &str) -> Option<bool> {
        let (respond, rx) = oneshot::channel();
        let prompt = SecurityPrompt {
            warning: warning.to_string(),
            respond,
        };
        if self.callbacks.security_tx.send(prompt).await.is_err() {
            warn!("No security prompt listener, denying the action");
            return Some(false);
        }

        tokio::select! {
            _ = self.cancel.cancelled() => None,
            decision = rx => Some(decision.unwrap_or(false)),
        }
    }

    async fn await_user_answer(&mut self, question: &str, confirm: bool) -> Option<String> {
        let (respond, rx) = oneshot::channel();
        let prompt = UserPrompt {
            question: question.to_string(),
            confirm,
            respond,
        };
        if self.callbacks.input_tx.send(prompt).await.is_err() {
            warn!("No user input listener, treating as cancelled");
            return None;
        }

        tokio::select! {
            _ = self.cancel.cancelled() => None,
            answer = rx => answer.ok(),
        }
    }

    fn finish(&mut self, outcome: Outcome) -> TaskResult {
        let actions = std::mem::take(&mut self.actions_log);
        let mut errors = std::mem::take(&mut self.errors);
        match outcome {
            Outcome::Completed { success, summary } => {
                self.log(
                    if success { LogKind::Success } else { LogKind::Warning },
                    &summary,
                );
                TaskResult {
                    success,
                    summary,
                    actions,
                    errors,
                    duration_ms: 0,
                }
            }
            Outcome::IterationLimit => TaskResult::failed(
                &format!("Reached the iteration limit ({})", self.config.max_iterations),
                actions,
                errors,
            ),
            Outcome::LoopDetected { tool } => {
                errors.push("Action loop detected".to_string());
                TaskResult::failed(
                    &format!(
                        "Task not completed - the agent got stuck in a loop (repeating action: \"{}\"). A dialog may need to be closed manually, or the task refined.",
                        tool
                    ),
                    actions,
                    errors,
                )
            }
            Outcome::ErrorLimit => {
                errors.push("Error limit exceeded".to_string());
                TaskResult::failed(
                    "Could not complete the task - too many errors. Try rephrasing the task.",
                    actions,
                    errors,
                )
            }
            Outcome::Cancelled => TaskResult::failed("Task stopped by the user", actions, errors),
        }
    }

    fn log(&self, kind: LogKind, message: &str) {
        let _ = self.callbacks.log_tx.send(LogEntry::new(kind, message));
    }
}

enum OracleFailure {
    /// Back off now, try again on the next loop iteration.
    RetryNextIteration,
    /// All retries exhausted; fold the error into the conversation.
    GaveUp(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use browsepilot_core::types::{LLMResponse, ToolCallRequest};
    use browsepilot_core::Result;
    use serde_json::json;
    use std::sync::Mutex;

    /// Oracle stub that replays a fixed script of turns.
    struct ScriptedProvider {
        turns: Mutex<std::collections::VecDeque<LLMResponse>>,
    }

    impl ScriptedProvider {
        fn new(turns: Vec<LLMResponse>) -> Self {
            Self {
                turns: Mutex::new(turns.into()),
            }
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn chat(&self, _messages: &[ChatMessage], _tools: &[serde_json::Value]) -> Result<LLMResponse> {
            Ok(self
                .turns
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| turn_with_calls(vec![call("fallback", "complete_task", json!({"success": false, "summary": "script exhausted"}))])))
        }
    }

    /// Execution surface stub recording every dispatched action.
    struct MockExecutor {
        executed: Mutex<Vec<BrowserAction>>,
        context: PageContext,
    }

    impl MockExecutor {
        fn new(context: PageContext) -> Self {
            Self {
                executed: Mutex::new(Vec::new()),
                context,
            }
        }

        fn executed(&self) -> Vec<BrowserAction> {
            self.executed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BrowserExecutor for MockExecutor {
        async fn execute_action(&self, action: &BrowserAction) -> Result<String> {
            self.executed.lock().unwrap().push(action.clone());
            Ok("OK".to_string())
        }

        async fn extract_page_context(&self) -> PageContext {
            self.context.clone()
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    /// Executor whose actions always fail, for the error-cap path.
    struct FailingExecutor;

    #[async_trait]
    impl BrowserExecutor for FailingExecutor {
        async fn execute_action(&self, _action: &BrowserAction) -> Result<String> {
            Err(Error::Browser("element not found".to_string()))
        }

        async fn extract_page_context(&self) -> PageContext {
            PageContext::minimal("https://example.com", "Example")
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    fn call(id: &str, name: &str, args: serde_json::Value) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_string(),
            name: name.to_string(),
            arguments: args,
        }
    }

    fn turn_with_calls(calls: Vec<ToolCallRequest>) -> LLMResponse {
        LLMResponse {
            content: None,
            tool_calls: calls,
            finish_reason: "tool_calls".to_string(),
        }
    }

    fn complete_turn(success: bool, summary: &str) -> LLMResponse {
        turn_with_calls(vec![call(
            "tc_done",
            "complete_task",
            json!({"success": success, "summary": summary}),
        )])
    }

    struct Harness {
        runner: TaskRunner,
        _log_rx: mpsc::UnboundedReceiver<LogEntry>,
        security_rx: mpsc::Receiver<SecurityPrompt>,
        input_rx: mpsc::Receiver<UserPrompt>,
        cancel: CancellationToken,
    }

    fn harness(provider: ScriptedProvider, executor: Arc<dyn BrowserExecutor>) -> Harness {
        let (log_tx, log_rx) = mpsc::unbounded_channel();
        let (security_tx, security_rx) = mpsc::channel(4);
        let (input_tx, input_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let runner = TaskRunner::new(
            AgentConfig {
                api_key: "test".to_string(),
                llm_max_retries: 0,
                llm_retry_delay_ms: 1,
                ..Default::default()
            },
            Box::new(provider),
            executor,
            TaskCallbacks {
                log_tx,
                security_tx,
                input_tx,
            },
            cancel.clone(),
        );
        Harness {
            runner,
            _log_rx: log_rx,
            security_rx,
            input_rx,
            cancel,
        }
    }

    impl Harness {
        /// Run the task on a spawned task so the test can answer prompts,
        /// returning the result and the runner for post-run inspection.
        async fn run_with_prompts<F, Fut>(self, task: &str, prompt_driver: F) -> (TaskResult, TaskRunner)
        where
            F: FnOnce(mpsc::Receiver<SecurityPrompt>, mpsc::Receiver<UserPrompt>) -> Fut,
            Fut: std::future::Future<Output = ()> + Send + 'static,
        {
            let Harness {
                mut runner,
                _log_rx,
                security_rx,
                input_rx,
                cancel: _,
            } = self;
            let task = task.to_string();
            let driver = tokio::spawn(prompt_driver(security_rx, input_rx));
            let run = tokio::spawn(async move {
                let result = runner.run_task(&task).await;
                (result, runner)
            });
            let (result, runner) = run.await.unwrap();
            driver.await.unwrap();
            (result, runner)
        }
    }

    fn example_context() -> PageContext {
        PageContext {
            url: "https://example.com".to_string(),
            title: "Example".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_scenario_navigate_then_complete() {
        let provider = ScriptedProvider::new(vec![
            turn_with_calls(vec![call("tc_1", "navigate", json!({"url": "https://example.com"}))]),
            complete_turn(true, "Done"),
        ]);
        let executor = Arc::new(MockExecutor::new(example_context()));
        let mut h = harness(provider, executor.clone());

        let result = h.runner.run_task("navigate to example.com").await;
        assert!(result.success);
        assert_eq!(result.summary, "Done");
        assert_eq!(result.actions.len(), 1);
        assert!(matches!(result.actions[0], BrowserAction::Navigate { .. }));
        assert_eq!(executor.executed().len(), 1);
    }

    #[tokio::test]
    async fn test_scenario_repeated_click_stops_as_loop() {
        // Four identical clicks in a row; the fourth must trip the detector
        // before it is dispatched.
        let click_turn = || turn_with_calls(vec![call("tc", "click", json!({"selector": "#x"}))]);
        let provider = ScriptedProvider::new(vec![click_turn(), click_turn(), click_turn(), click_turn()]);
        let executor = Arc::new(MockExecutor::new(example_context()));
        let mut h = harness(provider, executor.clone());

        let result = h.runner.run_task("click the button").await;
        assert!(!result.success);
        assert!(result.summary.contains("loop"));
        assert!(result.errors.iter().any(|e| e.contains("loop")));
        // Three dispatches happened; the fourth was blocked.
        assert_eq!(executor.executed().len(), 3);
    }

    #[tokio::test]
    async fn test_scenario_denied_critical_click_not_dispatched() {
        let mut context = example_context();
        context.elements.push(browsepilot_core::page::PageElement {
            index: 0,
            tag: "button".to_string(),
            text: "Pay now".to_string(),
            selector: "#pay".to_string(),
            ..Default::default()
        });
        let provider = ScriptedProvider::new(vec![
            turn_with_calls(vec![call("tc_1", "click", json!({"selector": "#pay"}))]),
            complete_turn(false, "Payment declined by the user"),
        ]);
        let executor = Arc::new(MockExecutor::new(context));
        let h = harness(provider, executor.clone());

        let (result, _) = h
            .run_with_prompts("buy the item", |mut security_rx, _input_rx| async move {
                let prompt = security_rx
                    .recv()
                    .await
                    .expect("critical click should raise a security prompt");
                assert!(prompt.warning.contains("Pay now"));
                let _ = prompt.respond.send(false);
            })
            .await;

        assert!(!result.success);
        // The deny resolved the call without touching the browser.
        assert!(executor.executed().is_empty());
    }

    #[tokio::test]
    async fn test_approved_high_risk_click_is_dispatched() {
        let mut context = example_context();
        context.elements.push(browsepilot_core::page::PageElement {
            index: 0,
            tag: "button".to_string(),
            text: "Delete account".to_string(),
            selector: "#del".to_string(),
            ..Default::default()
        });
        let provider = ScriptedProvider::new(vec![
            turn_with_calls(vec![call("tc_1", "click", json!({"selector": "#del"}))]),
            complete_turn(true, "Deleted"),
        ]);
        let executor = Arc::new(MockExecutor::new(context));
        let h = harness(provider, executor.clone());

        let (result, _) = h
            .run_with_prompts("delete my account", |mut security_rx, _input_rx| async move {
                let prompt = security_rx.recv().await.expect("high risk click should prompt");
                let _ = prompt.respond.send(true);
            })
            .await;

        assert!(result.success);
        assert_eq!(executor.executed().len(), 1);
    }

    #[tokio::test]
    async fn test_error_cap_terminates_run() {
        // Every click fails; after five consecutive failures the run stops.
        let click_turn = |sel: &str| turn_with_calls(vec![call("tc", "click", json!({"selector": sel}))]);
        let provider = ScriptedProvider::new(vec![
            click_turn("#a"),
            click_turn("#b"),
            click_turn("#c"),
            click_turn("#d"),
            click_turn("#e"),
            click_turn("#f"),
        ]);
        let mut h = harness(provider, Arc::new(FailingExecutor));

        let result = h.runner.run_task("click things").await;
        assert!(!result.success);
        assert!(result.summary.contains("too many errors"));
        assert!(result.errors.iter().any(|e| e.contains("Error limit")));
    }

    #[tokio::test]
    async fn test_text_only_turn_continues() {
        let provider = ScriptedProvider::new(vec![
            LLMResponse {
                content: Some("Let me look at the page first.".to_string()),
                tool_calls: vec![],
                finish_reason: "stop".to_string(),
            },
            complete_turn(true, "Looked"),
        ]);
        let executor = Arc::new(MockExecutor::new(example_context()));
        let mut h = harness(provider, executor.clone());

        let result = h.runner.run_task("look around").await;
        assert!(result.success);
        // The thinking turn dispatched nothing.
        assert!(executor.executed().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_observed_at_iteration_top() {
        let provider = ScriptedProvider::new(vec![]);
        let executor = Arc::new(MockExecutor::new(example_context()));
        let mut h = harness(provider, executor);
        h.cancel.cancel();

        let result = h.runner.run_task("anything").await;
        assert!(!result.success);
        assert_eq!(result.summary, "Task stopped by the user");
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_ask_user_answer_flows_into_history() {
        let provider = ScriptedProvider::new(vec![
            turn_with_calls(vec![call("tc_1", "ask_user", json!({"question": "What is the zip code?"}))]),
            complete_turn(true, "Filled in"),
        ]);
        let executor = Arc::new(MockExecutor::new(example_context()));
        let h = harness(provider, executor);

        let (result, runner) = h
            .run_with_prompts("fill the address form", |_security_rx, mut input_rx| async move {
                let prompt = input_rx.recv().await.expect("ask_user should raise a prompt");
                assert!(!prompt.confirm);
                assert_eq!(prompt.question, "What is the zip code?");
                let _ = prompt.respond.send("90210".to_string());
            })
            .await;

        assert!(result.success);
        let answered = runner
            .history
            .messages()
            .iter()
            .any(|m| m.role == "user" && m.content.as_deref() == Some("90210"));
        assert!(answered, "the user's answer must enter the conversation");
    }

    #[tokio::test]
    async fn test_stop_during_user_wait_aborts_run() {
        let provider = ScriptedProvider::new(vec![turn_with_calls(vec![call(
            "tc_1",
            "ask_user",
            json!({"question": "Which account?"}),
        )])]);
        let executor = Arc::new(MockExecutor::new(example_context()));
        let h = harness(provider, executor);
        let cancel = h.cancel.clone();

        let (result, _) = h
            .run_with_prompts("log in", move |_security_rx, mut input_rx| async move {
                // Leave the question unanswered and stop the task instead.
                let _prompt = input_rx.recv().await.expect("prompt expected");
                cancel.cancel();
            })
            .await;

        assert!(!result.success);
        assert_eq!(result.summary, "Task stopped by the user");
    }
}
