use browsepilot_browser::BrowserExecutor;
use browsepilot_core::config::Config;
use browsepilot_core::{Error, LogEntry, LogKind, Result, TaskResult};
use browsepilot_providers::Provider;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::runtime::{TaskCallbacks, TaskRunner};

const LOG_RING_CAPACITY: usize = 100;
const STATUS_LOG_TAIL: usize = 50;

/// Events pushed to attached UIs, in the order they occur.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum AgentEvent {
    Log(LogEntry),
    TaskStart { task: String },
    TaskComplete(TaskResult),
    SecurityPrompt { warning: String },
    UserInput { question: String, confirm: bool },
    ExtensionConnected,
}

/// Snapshot for the status endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    pub is_running: bool,
    pub current_task: String,
    pub logs: Vec<LogEntry>,
    pub pending_security_prompt: Option<String>,
    pub pending_user_input: Option<String>,
    pub extension_connected: bool,
}

type ProviderFactory = dyn Fn() -> Result<Box<dyn Provider>> + Send + Sync;

#[derive(Default)]
struct SessionState {
    running: bool,
    current_task: String,
    logs: VecDeque<LogEntry>,
    pending_security: Option<(String, oneshot::Sender<bool>)>,
    pending_input: Option<(String, oneshot::Sender<String>)>,
    cancel: Option<CancellationToken>,
}

/// One process-wide agent session: the single active task flag, the log
/// ring, the suspended prompts and the event stream, owned explicitly so
/// tests can instantiate independent sessions instead of sharing globals.
pub struct AgentService {
    config: Config,
    executor: Arc<dyn BrowserExecutor>,
    provider_factory: Box<ProviderFactory>,
    state: Mutex<SessionState>,
    events: broadcast::Sender<AgentEvent>,
}

impl AgentService {
    pub fn new(
        config: Config,
        executor: Arc<dyn BrowserExecutor>,
        provider_factory: Box<ProviderFactory>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            config,
            executor,
            provider_factory,
            state: Mutex::new(SessionState::default()),
            events,
        })
    }

    /// Session wired to the real oracle from the configured model.
    pub fn with_default_provider(config: Config, executor: Arc<dyn BrowserExecutor>) -> Arc<Self> {
        let agent_config = config.agent.clone();
        Self::new(
            config,
            executor,
            Box::new(move || browsepilot_providers::create_provider(&agent_config)),
        )
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.events.subscribe()
    }

    pub fn executor(&self) -> Arc<dyn BrowserExecutor> {
        self.executor.clone()
    }

    /// Start a task run in the background. Rejected while another run is in
    /// progress or while the execution surface is unreachable.
    pub fn start_task(self: &Arc<Self>, task: &str) -> Result<()> {
        if !self.executor.is_connected() {
            return Err(Error::Relay(
                "Extension not connected. Open a browser with the browsepilot extension installed.".to_string(),
            ));
        }

        let provider = (self.provider_factory)()?;
        let cancel = CancellationToken::new();
        {
            let mut state = self.state.lock().unwrap();
            if state.running {
                return Err(Error::Validation("Task already running".to_string()));
            }
            state.running = true;
            state.current_task = task.to_string();
            state.cancel = Some(cancel.clone());
        }

        self.broadcast(AgentEvent::TaskStart { task: task.to_string() });

        let (log_tx, log_rx) = mpsc::unbounded_channel();
        let (security_tx, security_rx) = mpsc::channel(1);
        let (input_tx, input_rx) = mpsc::channel(1);

        self.spawn_log_pump(log_rx);
        self.spawn_security_pump(security_rx);
        self.spawn_input_pump(input_rx);

        let mut runner = TaskRunner::new(
            self.config.agent.clone(),
            provider,
            self.executor.clone(),
            TaskCallbacks {
                log_tx,
                security_tx,
                input_tx,
            },
            cancel,
        );

        let service = self.clone();
        let task = task.to_string();
        tokio::spawn(async move {
            let result = runner.run_task(&task).await;
            {
                let mut state = service.state.lock().unwrap();
                state.running = false;
                state.current_task.clear();
                state.pending_security = None;
                state.pending_input = None;
                state.cancel = None;
            }
            service.broadcast(AgentEvent::TaskComplete(result));
        });

        Ok(())
    }

    /// Stop the active run. Observed at the top of the next loop iteration
    /// and inside any suspended confirmation or user-input wait.
    pub fn stop(&self) {
        let state = self.state.lock().unwrap();
        if let Some(cancel) = &state.cancel {
            info!("Stop requested");
            cancel.cancel();
        }
    }

    /// Resolve the pending security confirmation, if one is suspended.
    pub fn resolve_security(&self, approved: bool) {
        let pending = self.state.lock().unwrap().pending_security.take();
        match pending {
            Some((_, respond)) => {
                let _ = respond.send(approved);
            }
            None => warn!("Security response with no pending prompt"),
        }
    }

    /// Resolve the pending user question, if one is suspended.
    pub fn resolve_user_input(&self, answer: &str) {
        let pending = self.state.lock().unwrap().pending_input.take();
        match pending {
            Some((_, respond)) => {
                let _ = respond.send(answer.to_string());
            }
            None => warn!("User input with no pending question"),
        }
    }

    pub fn status(&self) -> AgentStatus {
        let state = self.state.lock().unwrap();
        let logs: Vec<LogEntry> = state
            .logs
            .iter()
            .rev()
            .take(STATUS_LOG_TAIL)
            .rev()
            .cloned()
            .collect();
        AgentStatus {
            is_running: state.running,
            current_task: state.current_task.clone(),
            logs,
            pending_security_prompt: state.pending_security.as_ref().map(|(w, _)| w.clone()),
            pending_user_input: state.pending_input.as_ref().map(|(q, _)| q.clone()),
            extension_connected: self.executor.is_connected(),
        }
    }

    /// Record a log line outside a task run (e.g. gateway lifecycle).
    pub fn log(&self, kind: LogKind, message: &str) {
        let entry = LogEntry::new(kind, message);
        self.push_log(entry.clone());
        self.broadcast(AgentEvent::Log(entry));
    }

    pub fn notify_extension_connected(&self) {
        self.log(LogKind::Success, "Extension connected");
        self.broadcast(AgentEvent::ExtensionConnected);
    }

    fn spawn_log_pump(self: &Arc<Self>, mut rx: mpsc::UnboundedReceiver<LogEntry>) {
        let service = self.clone();
        tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                service.push_log(entry.clone());
                service.broadcast(AgentEvent::Log(entry));
            }
        });
    }

    fn spawn_security_pump(self: &Arc<Self>, mut rx: mpsc::Receiver<crate::runtime::SecurityPrompt>) {
        let service = self.clone();
        tokio::spawn(async move {
            while let Some(prompt) = rx.recv().await {
                {
                    let mut state = service.state.lock().unwrap();
                    state.pending_security = Some((prompt.warning.clone(), prompt.respond));
                }
                service.broadcast(AgentEvent::SecurityPrompt {
                    warning: prompt.warning,
                });
            }
        });
    }

    fn spawn_input_pump(self: &Arc<Self>, mut rx: mpsc::Receiver<crate::runtime::UserPrompt>) {
        let service = self.clone();
        tokio::spawn(async move {
            while let Some(prompt) = rx.recv().await {
                {
                    let mut state = service.state.lock().unwrap();
                    state.pending_input = Some((prompt.question.clone(), prompt.respond));
                }
                service.broadcast(AgentEvent::UserInput {
                    question: prompt.question,
                    confirm: prompt.confirm,
                });
            }
        });
    }

    fn push_log(&self, entry: LogEntry) {
        let mut state = self.state.lock().unwrap();
        state.logs.push_back(entry);
        if state.logs.len() > LOG_RING_CAPACITY {
            state.logs.pop_front();
        }
    }

    fn broadcast(&self, event: AgentEvent) {
        // No subscribers is fine; the ring buffer still has the logs.
        let _ = self.events.send(event);
    }
}
