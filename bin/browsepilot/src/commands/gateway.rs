use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use browsepilot_agent::{AgentEvent, AgentService};
use browsepilot_browser::{RelayChannel, RelayExecutor};
use browsepilot_core::{Config, LogKind, Paths};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{info, warn};

#[derive(Clone)]
pub struct GatewayState {
    pub service: Arc<AgentService>,
    pub relay: Arc<RelayChannel>,
}

/// Wire up the session: one relay, one executor binding, one service.
pub fn build_state(config: Config) -> GatewayState {
    let relay = Arc::new(RelayChannel::new(
        Duration::from_millis(config.relay.poll_wait_ms),
        Duration::from_millis(config.relay.command_timeout_ms),
    ));
    let executor = Arc::new(RelayExecutor::new(relay.clone()));
    let service = AgentService::with_default_provider(config, executor);
    GatewayState { service, relay }
}

pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/api/task", post(handle_task))
        .route("/api/stop", post(handle_stop))
        .route("/api/security-response", post(handle_security_response))
        .route("/api/user-input", post(handle_user_input))
        .route("/api/status", get(handle_status))
        .route("/api/events", get(handle_events))
        .route("/api/extension/poll", post(handle_extension_poll))
        .route("/api/extension/result", post(handle_extension_result))
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

pub async fn run(host: Option<String>, port: Option<u16>) -> Result<()> {
    let paths = Paths::new();
    let mut config = Config::load(&paths.config_file())?;
    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }

    let bind_addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let state = build_state(config);
    state
        .service
        .log(LogKind::Info, "Gateway started, waiting for the extension to poll in");

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "browsepilot gateway listening");
    println!("browsepilot gateway: http://{}", bind_addr);
    println!("Open a browser with the browsepilot extension to connect.");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    Ok(())
}

#[derive(Deserialize)]
struct TaskRequest {
    task: String,
}

async fn handle_task(
    State(state): State<GatewayState>,
    Json(request): Json<TaskRequest>,
) -> impl IntoResponse {
    match state.service.start_task(&request.task) {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({"success": true, "message": "Task started"})),
        ),
        Err(e) => {
            warn!(error = %e, "Task rejected");
            (
                StatusCode::CONFLICT,
                Json(serde_json::json!({"success": false, "error": e.to_string()})),
            )
        }
    }
}

async fn handle_stop(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    state.service.stop();
    Json(serde_json::json!({"success": true}))
}

#[derive(Deserialize)]
struct SecurityResponse {
    approved: bool,
}

async fn handle_security_response(
    State(state): State<GatewayState>,
    Json(response): Json<SecurityResponse>,
) -> Json<serde_json::Value> {
    state.service.resolve_security(response.approved);
    Json(serde_json::json!({"success": true}))
}

#[derive(Deserialize)]
struct UserInputResponse {
    answer: String,
}

async fn handle_user_input(
    State(state): State<GatewayState>,
    Json(response): Json<UserInputResponse>,
) -> Json<serde_json::Value> {
    state.service.resolve_user_input(&response.answer);
    Json(serde_json::json!({"success": true}))
}

async fn handle_status(State(state): State<GatewayState>) -> Json<browsepilot_agent::AgentStatus> {
    Json(state.service.status())
}

/// Push-event stream: every `AgentEvent` as one SSE message, preceded by a
/// status snapshot so late joiners can render immediately.
async fn handle_events(
    State(state): State<GatewayState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, std::convert::Infallible>>> {
    let status = state.service.status();
    let initial = tokio_stream::once(Ok::<_, std::convert::Infallible>(
        Event::default().data(serde_json::json!({"event": "status", "data": status}).to_string()),
    ));

    let events = BroadcastStream::new(state.service.subscribe()).filter_map(|event| {
        let event: AgentEvent = event.ok()?;
        let data = serde_json::to_string(&event).ok()?;
        Some(Ok(Event::default().data(data)))
    });

    Sse::new(initial.chain(events)).keep_alive(KeepAlive::default())
}

/// Long-poll fetch path for the extension: the next queued command, or `{}`
/// after the wait window so the peer re-polls.
async fn handle_extension_poll(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    if !state.relay.is_connected() {
        // First poll flips the session to connected.
        state.service.notify_extension_connected();
    }
    match state.relay.poll().await {
        Some(command) => Json(command),
        None => Json(serde_json::json!({})),
    }
}

#[derive(Deserialize)]
struct ExtensionResult {
    id: String,
    result: serde_json::Value,
}

async fn handle_extension_result(
    State(state): State<GatewayState>,
    Json(message): Json<ExtensionResult>,
) -> Json<serde_json::Value> {
    let resolved = state.relay.post_result(&message.id, message.result);
    Json(serde_json::json!({"success": resolved}))
}
