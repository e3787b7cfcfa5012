use browsepilot_core::{Error, Result};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// A command handed to the remote peer: `{id, type, ...payload}` on the wire.
#[derive(Debug, Clone)]
pub struct Command {
    pub id: String,
    pub kind: String,
    pub payload: Value,
}

impl Command {
    /// Flatten to the wire object the extension expects.
    pub fn to_wire(&self) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert("id".to_string(), Value::String(self.id.clone()));
        obj.insert("type".to_string(), Value::String(self.kind.clone()));
        if let Value::Object(fields) = &self.payload {
            for (k, v) in fields {
                obj.insert(k.clone(), v.clone());
            }
        }
        Value::Object(obj)
    }
}

/// Correlator state shared between the issuing side (`send`) and the two
/// inbound paths (`poll`, `post_result`). One mutex is the single point of
/// truth per id: no id can be resolved twice.
#[derive(Default)]
struct RelayState {
    /// Outstanding requests awaiting a result, keyed by command id.
    pending: HashMap<String, oneshot::Sender<Value>>,
    /// Commands issued while no poller was parked.
    queued: VecDeque<Command>,
    /// Parked long-poll requests waiting for work. Senders whose receiver
    /// has already timed out are skipped at hand-off time.
    waiters: VecDeque<oneshot::Sender<Value>>,
}

/// Turns the pull-based extension transport into an async request/response
/// interface. The remote peer long-polls for commands and posts results
/// back; the orchestrator awaits `send`.
///
/// Liveness is inferred from poll recency: the peer counts as connected from
/// its first successful poll, and only per-command timeouts bound a silent
/// disappearance afterwards.
pub struct RelayChannel {
    state: Mutex<RelayState>,
    next_id: AtomicU64,
    connected: AtomicBool,
    poll_wait: Duration,
    command_timeout: Duration,
}

impl RelayChannel {
    pub fn new(poll_wait: Duration, command_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(RelayState::default()),
            next_id: AtomicU64::new(0),
            connected: AtomicBool::new(false),
            poll_wait,
            command_timeout,
        }
    }

    /// Peer considered connected once the first poll has arrived.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Issue a command and await its result. Ids are unique for the process
    /// lifetime; at most one request is outstanding per id.
    pub async fn send(&self, kind: &str, payload: Value) -> Result<Value> {
        self.send_with_timeout(kind, payload, self.command_timeout).await
    }

    pub async fn send_with_timeout(&self, kind: &str, payload: Value, timeout: Duration) -> Result<Value> {
        if !self.is_connected() {
            return Err(Error::Relay(
                "Extension not connected. Open a browser with the browsepilot extension installed.".to_string(),
            ));
        }

        let id = format!("cmd_{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let command = Command {
            id: id.clone(),
            kind: kind.to_string(),
            payload,
        };

        debug!(id = %id, kind = %kind, "Relay command issued");

        let (result_tx, result_rx) = oneshot::channel();
        {
            let mut state = self.state.lock().unwrap();
            state.pending.insert(id.clone(), result_tx);

            // Hand the command to a parked poller if one is live; otherwise
            // queue it for the next poll.
            let mut delivered = false;
            while let Some(waiter) = state.waiters.pop_front() {
                if waiter.send(command.to_wire()).is_ok() {
                    delivered = true;
                    break;
                }
                // Receiver gone: that poll already timed out. Try the next.
            }
            if !delivered {
                state.queued.push_back(command);
            }
        }

        match tokio::time::timeout(timeout, result_rx).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => {
                // Sender dropped without a result; should not happen while
                // the channel is alive.
                Err(Error::Relay(format!("Relay closed while awaiting {}", id)))
            }
            Err(_) => {
                let mut state = self.state.lock().unwrap();
                state.pending.remove(&id);
                state.queued.retain(|c| c.id != id);
                warn!(id = %id, "Relay command timed out");
                Err(Error::Timeout(format!("No response from extension for {}", id)))
            }
        }
    }

    /// Long-poll entry point for the remote peer. Returns the next command
    /// immediately when one is queued, otherwise parks the caller for up to
    /// the poll window and returns `None` on expiry so the peer re-polls.
    pub async fn poll(&self) -> Option<Value> {
        if !self.connected.swap(true, Ordering::Relaxed) {
            info!("Extension connected (first poll)");
        }

        let rx = {
            let mut state = self.state.lock().unwrap();
            if let Some(command) = state.queued.pop_front() {
                return Some(command.to_wire());
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            rx
        };

        match tokio::time::timeout(self.poll_wait, rx).await {
            Ok(Ok(command)) => Some(command),
            // Window elapsed, or the channel is shutting down. The stale
            // waiter entry is skipped by the next send.
            _ => None,
        }
    }

    /// Inbound result path. Resolves the matching pending request; results
    /// for unknown or already-timed-out ids are dropped without effect.
    /// Returns whether a pending request was resolved.
    pub fn post_result(&self, id: &str, result: Value) -> bool {
        let sender = {
            let mut state = self.state.lock().unwrap();
            state.pending.remove(id)
        };
        match sender {
            Some(tx) => {
                if tx.send(result).is_err() {
                    debug!(id = %id, "Result arrived as the awaiter gave up");
                    return false;
                }
                true
            }
            None => {
                debug!(id = %id, "Discarding result for unknown or expired command");
                false
            }
        }
    }
}
