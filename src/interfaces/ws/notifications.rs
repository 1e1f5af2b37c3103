//! Change-notification stream for dashboards
//!
//! `GET /api/v1/events/ws` upgrades to a WebSocket that first sends the
//! current snapshot, then every [`EventMessage`] published on the bus.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::select;
use tracing::{debug, error, info, warn};

use crate::application::events::EventMessage;
use crate::application::state::SharedStateStore;

/// Query parameters for filtering events
#[derive(Debug, Default, Deserialize)]
pub struct EventFilter {
    /// Only lifecycle events of this charge point. State changes always pass.
    pub charge_point_id: Option<String>,
    /// Comma-separated event types, e.g. `state_changed,charge_point_connected`.
    pub event_types: Option<String>,
}

impl EventFilter {
    pub fn matches(&self, event: &EventMessage) -> bool {
        if let (Some(wanted), Some(actual)) =
            (self.charge_point_id.as_deref(), event.event.charge_point_id())
        {
            if wanted != actual {
                return false;
            }
        }

        if let Some(ref types) = self.event_types {
            if !types
                .split(',')
                .map(str::trim)
                .any(|t| t == event.event.event_type())
            {
                return false;
            }
        }

        true
    }
}

#[derive(Clone)]
pub struct NotificationState {
    pub state: SharedStateStore,
}

pub async fn ws_notifications_handler(
    ws: WebSocketUpgrade,
    State(state): State<NotificationState>,
    Query(filter): Query<EventFilter>,
) -> impl IntoResponse {
    info!(
        charge_point_id = ?filter.charge_point_id,
        event_types = ?filter.event_types,
        "New notification WebSocket connection"
    );

    ws.on_upgrade(move |socket| handle_notification_socket(socket, state, filter))
}

async fn handle_notification_socket(socket: WebSocket, state: NotificationState, filter: EventFilter) {
    let (mut sender, mut receiver) = socket.split();
    // Subscribe before taking the snapshot so no change falls in between.
    let mut subscriber = state.state.events().subscribe();

    let welcome = serde_json::json!({
        "type": "connected",
        "snapshot": state.state.snapshot(),
    });
    if let Err(e) = sender.send(Message::Text(welcome.to_string().into())).await {
        error!("Failed to send welcome message: {}", e);
        return;
    }

    loop {
        select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sender.send(Message::Pong(data)).await {
                            error!("Failed to send pong: {}", e);
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!("Notification socket error: {}", e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }

            event = subscriber.recv() => {
                let Some(event_msg) = event else {
                    warn!("Event bus closed");
                    break;
                };
                if !filter.matches(&event_msg) {
                    continue;
                }
                match serde_json::to_string(&event_msg) {
                    Ok(json) => {
                        if let Err(e) = sender.send(Message::Text(json.into())).await {
                            debug!("Notification client gone: {}", e);
                            break;
                        }
                    }
                    Err(e) => error!("Failed to serialize event: {}", e),
                }
            }
        }
    }

    info!("Notification WebSocket client disconnected");
}
