use anyhow::{bail, Result};
use browsepilot_agent::AgentEvent;
use browsepilot_core::{Config, Paths};
use std::time::Duration;
use tracing::info;

use super::gateway::{build_router, build_state};

const CONNECT_WAIT: Duration = Duration::from_secs(120);

/// One-shot mode: serve the extension endpoints, wait for the extension to
/// connect, run the task, print the outcome, exit.
pub async fn run(task: &str, port: Option<u16>) -> Result<()> {
    let paths = Paths::new();
    let mut config = Config::load(&paths.config_file())?;
    if let Some(port) = port {
        config.gateway.port = port;
    }

    let bind_addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let state = build_state(config);
    let service = state.service.clone();
    let relay = state.relay.clone();

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    info!(addr = %bind_addr, "browsepilot listening");
    println!("Waiting for the extension to connect on http://{} ...", bind_addr);

    // Liveness is the first poll; give the user time to open the browser.
    let deadline = tokio::time::Instant::now() + CONNECT_WAIT;
    while !relay.is_connected() {
        if tokio::time::Instant::now() >= deadline {
            server.abort();
            bail!("Extension did not connect within {}s", CONNECT_WAIT.as_secs());
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    let mut events = service.subscribe();
    service.start_task(task).map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let result = loop {
        match events.recv().await {
            Ok(AgentEvent::Log(entry)) => {
                println!("[{}] {}", entry.time, entry.message);
            }
            Ok(AgentEvent::SecurityPrompt { warning }) => {
                // No interactive confirmation surface in one-shot mode;
                // stay safe and deny.
                println!("{}", warning);
                println!("(one-shot mode: denying automatically, use the gateway UI to approve)");
                service.resolve_security(false);
            }
            Ok(AgentEvent::UserInput { question, .. }) => {
                println!("Agent asks: {}", question);
                println!("(one-shot mode: no input surface, stopping the task)");
                service.stop();
            }
            Ok(AgentEvent::TaskComplete(result)) => break result,
            Ok(_) => {}
            Err(e) => bail!("Event stream closed: {}", e),
        }
    };

    let marker = if result.success { "OK" } else { "FAILED" };
    println!("\n[{}] {}", marker, result.summary);
    println!(
        "{} action(s), {} error(s), {:.1}s",
        result.actions.len(),
        result.errors.len(),
        result.duration_ms as f64 / 1000.0
    );
    server.abort();
    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}
