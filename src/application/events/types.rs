//! Events broadcast to in-process subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    /// Charger state changed; re-read the snapshot.
    StateChanged,
    ChargePointConnected(ChargePointConnectedEvent),
    ChargePointDisconnected(ChargePointDisconnectedEvent),
}

impl Event {
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::StateChanged => "state_changed",
            Event::ChargePointConnected(_) => "charge_point_connected",
            Event::ChargePointDisconnected(_) => "charge_point_disconnected",
        }
    }

    pub fn charge_point_id(&self) -> Option<&str> {
        match self {
            Event::StateChanged => None,
            Event::ChargePointConnected(e) => Some(&e.charge_point_id),
            Event::ChargePointDisconnected(e) => Some(&e.charge_point_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargePointConnectedEvent {
    pub charge_point_id: String,
    pub remote_addr: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargePointDisconnectedEvent {
    pub charge_point_id: String,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Envelope put on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: Event,
}

impl EventMessage {
    pub fn new(event: Event) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event,
        }
    }
}
