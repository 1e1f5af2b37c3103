//! One accepted charge point connection

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::shared::TransportFault;

/// Item on a connection's outbound queue.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Serialized OCPP frame.
    Frame(String),
    /// Close the socket with the given reason.
    Close(String),
}

#[derive(Debug)]
pub struct Connection {
    /// Unique per accepted socket, never reused within the process.
    pub connection_id: u64,
    pub charge_point_id: String,
    pub remote_addr: Option<String>,
    pub sender: mpsc::UnboundedSender<OutboundMessage>,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// What is left of a connection replaced by a reconnect.
#[derive(Debug)]
pub struct EvictedSession {
    pub connection_id: u64,
    pub charge_point_id: String,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Connection {
    pub fn new(
        connection_id: u64,
        charge_point_id: impl Into<String>,
        remote_addr: Option<String>,
        sender: mpsc::UnboundedSender<OutboundMessage>,
    ) -> Self {
        let now = Utc::now();
        Self {
            connection_id,
            charge_point_id: charge_point_id.into(),
            remote_addr,
            sender,
            connected_at: now,
            last_activity: now,
        }
    }

    pub fn send(&self, frame: String) -> Result<(), TransportFault> {
        self.sender
            .send(OutboundMessage::Frame(frame))
            .map_err(|_| TransportFault::QueueClosed)
    }

    /// Ask the write task to close the socket. A closed queue means the
    /// socket is already gone.
    pub fn close(&self, reason: impl Into<String>) {
        let _ = self.sender.send(OutboundMessage::Close(reason.into()));
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub(super) fn evicted(&self) -> EvictedSession {
        EvictedSession {
            connection_id: self.connection_id,
            charge_point_id: self.charge_point_id.clone(),
            connected_at: self.connected_at,
            last_activity: self.last_activity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection() -> (Connection, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Connection::new(7, "THOR1", None, tx), rx)
    }

    #[test]
    fn send_queues_frame() {
        let (conn, mut rx) = make_connection();
        conn.send("[2,\"1\",\"Heartbeat\",{}]".into()).unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            OutboundMessage::Frame("[2,\"1\",\"Heartbeat\",{}]".into())
        );
    }

    #[test]
    fn send_after_writer_gone_fails() {
        let (conn, rx) = make_connection();
        drop(rx);
        assert!(matches!(conn.send("x".into()), Err(TransportFault::QueueClosed)));
    }

    #[test]
    fn close_queues_close_request() {
        let (conn, mut rx) = make_connection();
        conn.close("replaced");
        assert_eq!(rx.try_recv().unwrap(), OutboundMessage::Close("replaced".into()));
    }
}
