//! Central-system initiated calls
//!
//! [`CommandSender`] writes raw `[2, id, action, payload]` frames through the
//! [`SessionRegistry`](super::session::SessionRegistry) and parks the caller
//! on a oneshot until the read loop of the same connection hands back the
//! matching CallResult or CallError. Typed wrappers live in the submodules.

pub mod get_configuration;
pub mod refresh;
pub mod trigger_message;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{info, warn};

use super::session::SharedSessionRegistry;
use crate::shared::ocpp_frame::OcppFrame;

pub use get_configuration::{get_configuration, ConfigurationResult};
pub use refresh::{RefreshReport, RefreshService, RefreshStep, SharedRefreshService};
pub use trigger_message::{trigger_message, TriggerType};

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

struct PendingRequest {
    action_name: String,
    sent_at: Instant,
    response_sender: oneshot::Sender<Result<Value, CommandError>>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("charge point not connected: {0}")]
    NotConnected(String),
    #[error("failed to send: {0}")]
    SendFailed(String),
    #[error("response timeout")]
    Timeout,
    #[error("connection closed before a response arrived")]
    ConnectionClosed,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("CallError {code}: {description}")]
    CallError { code: String, description: String },
}

impl CommandError {
    fn outcome_label(&self) -> &'static str {
        match self {
            Self::NotConnected(_) => "not_connected",
            Self::SendFailed(_) => "send_failed",
            Self::Timeout => "timeout",
            Self::ConnectionClosed => "connection_closed",
            Self::InvalidResponse(_) => "invalid_response",
            Self::CallError { .. } => "call_error",
        }
    }
}

pub struct CommandSender {
    session_registry: SharedSessionRegistry,
    /// Keyed by `(connection_id, message_id)`.
    pending_requests: DashMap<(u64, String), PendingRequest>,
    message_counter: AtomicU64,
    call_timeout: Duration,
}

impl CommandSender {
    pub fn new(session_registry: SharedSessionRegistry, call_timeout: Duration) -> Self {
        Self {
            session_registry,
            pending_requests: DashMap::new(),
            message_counter: AtomicU64::new(1),
            call_timeout,
        }
    }

    fn generate_message_id(&self) -> String {
        let id = self.message_counter.fetch_add(1, Ordering::SeqCst);
        format!("CS-{}", id)
    }

    /// Send `action` to the charge point and wait for its answer.
    pub async fn send_command(
        &self,
        charge_point_id: &str,
        action: &str,
        payload: Value,
    ) -> Result<Value, CommandError> {
        let result = self.call(charge_point_id, action, payload).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.outcome_label(),
        };
        metrics::counter!("ocpp_commands_total", "action" => action.to_string(), "outcome" => outcome)
            .increment(1);
        result
    }

    async fn call(
        &self,
        charge_point_id: &str,
        action: &str,
        payload: Value,
    ) -> Result<Value, CommandError> {
        let message_id = self.generate_message_id();
        let frame = OcppFrame::Call {
            unique_id: message_id.clone(),
            action: action.to_string(),
            payload,
        };
        let (tx, rx) = oneshot::channel();

        // The waiter is keyed to the same connection the frame is queued on.
        let key = self
            .session_registry
            .with_connection(charge_point_id, |conn| {
                let key = (conn.connection_id, message_id.clone());
                self.pending_requests.insert(
                    key.clone(),
                    PendingRequest {
                        action_name: action.to_string(),
                        sent_at: Instant::now(),
                        response_sender: tx,
                    },
                );
                match conn.send(frame.serialize()) {
                    Ok(()) => Ok(key),
                    Err(e) => {
                        self.pending_requests.remove(&key);
                        Err(CommandError::SendFailed(e.to_string()))
                    }
                }
            })
            .ok_or_else(|| CommandError::NotConnected(charge_point_id.to_string()))??;

        info!(
            charge_point_id,
            action,
            message_id = message_id.as_str(),
            connection_id = key.0,
            "Sent command"
        );

        match timeout(self.call_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                self.pending_requests.remove(&key);
                Err(CommandError::ConnectionClosed)
            }
            Err(_) => {
                self.pending_requests.remove(&key);
                warn!(
                    charge_point_id,
                    action,
                    message_id = message_id.as_str(),
                    timeout_secs = self.call_timeout.as_secs_f64(),
                    "Command timed out"
                );
                Err(CommandError::Timeout)
            }
        }
    }

    fn take_pending(
        &self,
        connection_id: u64,
        charge_point_id: &str,
        message_id: &str,
    ) -> Option<PendingRequest> {
        let pending = self
            .pending_requests
            .remove(&(connection_id, message_id.to_string()))
            .map(|(_, p)| p);
        match &pending {
            Some(p) => {
                metrics::histogram!("ocpp_command_latency_seconds", "action" => p.action_name.clone())
                    .record(p.sent_at.elapsed().as_secs_f64());
            }
            None => warn!(
                charge_point_id,
                message_id, "Response for unknown or expired request, discarded"
            ),
        }
        pending
    }

    pub fn handle_response(
        &self,
        connection_id: u64,
        charge_point_id: &str,
        message_id: &str,
        payload: Value,
    ) {
        if let Some(pending) = self.take_pending(connection_id, charge_point_id, message_id) {
            info!(
                charge_point_id,
                action = pending.action_name.as_str(),
                message_id,
                "Received response"
            );
            let _ = pending.response_sender.send(Ok(payload));
        }
    }

    pub fn handle_error(
        &self,
        connection_id: u64,
        charge_point_id: &str,
        message_id: &str,
        error_code: &str,
        error_description: &str,
    ) {
        if let Some(pending) = self.take_pending(connection_id, charge_point_id, message_id) {
            warn!(
                charge_point_id,
                action = pending.action_name.as_str(),
                message_id,
                error_code,
                error_description,
                "Received error"
            );
            let _ = pending.response_sender.send(Err(CommandError::CallError {
                code: error_code.to_string(),
                description: error_description.to_string(),
            }));
        }
    }

    /// Fail every call still waiting on `connection_id`.
    pub fn cleanup_connection(&self, connection_id: u64) -> usize {
        let keys: Vec<(u64, String)> = self
            .pending_requests
            .iter()
            .filter(|entry| entry.key().0 == connection_id)
            .map(|entry| entry.key().clone())
            .collect();

        let mut failed = 0;
        for key in keys {
            if let Some((_, pending)) = self.pending_requests.remove(&key) {
                let _ = pending
                    .response_sender
                    .send(Err(CommandError::ConnectionClosed));
                failed += 1;
            }
        }
        failed
    }

    pub fn pending_count(&self) -> usize {
        self.pending_requests.len()
    }
}

pub type SharedCommandSender = Arc<CommandSender>;

pub fn create_command_sender(
    session_registry: SharedSessionRegistry,
    call_timeout: Duration,
) -> SharedCommandSender {
    Arc::new(CommandSender::new(session_registry, call_timeout))
}

#[cfg(test)]
pub(crate) mod test_support {
    use tokio::sync::mpsc;

    use crate::application::session::{
        Connection, OutboundMessage, SessionRegistry, SharedSessionRegistry,
    };

    /// Registry with one attached charge point whose outbound queue is
    /// returned to the test.
    pub fn attached(
        charge_point_id: &str,
    ) -> (SharedSessionRegistry, u64, mpsc::UnboundedReceiver<OutboundMessage>) {
        let registry = SessionRegistry::shared(1);
        let (tx, rx) = mpsc::unbounded_channel();
        let connection_id = registry.next_connection_id();
        registry.register(Connection::new(connection_id, charge_point_id, None, tx));
        (registry, connection_id, rx)
    }

    /// Next outbound Call as `(message_id, action, payload)`.
    pub async fn next_call(
        rx: &mut mpsc::UnboundedReceiver<OutboundMessage>,
    ) -> (String, String, serde_json::Value) {
        use crate::shared::OcppFrame;

        match rx.recv().await {
            Some(OutboundMessage::Frame(text)) => match OcppFrame::parse(&text) {
                Ok(OcppFrame::Call {
                    unique_id,
                    action,
                    payload,
                }) => (unique_id, action, payload),
                other => panic!("expected a Call, got {other:?}"),
            },
            other => panic!("expected a frame, got {other:?}"),
        }
    }
}
