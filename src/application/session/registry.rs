//! Session slots for connected charge points

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{info, warn};

use super::connection::{Connection, EvictedSession};

pub struct SessionRegistry {
    sessions: DashMap<String, Connection>,
    capacity: usize,
    /// Held across the slot check and the insert in [`register`](Self::register).
    admission: Mutex<()>,
    next_connection_id: AtomicU64,
}

pub type SharedSessionRegistry = Arc<SessionRegistry>;

#[derive(Debug)]
pub enum RegisterResult {
    Registered,
    /// Same identity reconnected; the old connection was told to close.
    Replaced(EvictedSession),
    /// All slots are held by other identities.
    Rejected { active: Vec<String> },
}

impl SessionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            capacity: capacity.max(1),
            admission: Mutex::new(()),
            next_connection_id: AtomicU64::new(1),
        }
    }

    pub fn shared(capacity: usize) -> SharedSessionRegistry {
        Arc::new(Self::new(capacity))
    }

    pub fn next_connection_id(&self) -> u64 {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Whether a handshake for `charge_point_id` may proceed.
    pub fn can_accept(&self, charge_point_id: &str) -> bool {
        self.sessions.contains_key(charge_point_id) || self.sessions.len() < self.capacity
    }

    pub fn register(&self, connection: Connection) -> RegisterResult {
        let charge_point_id = connection.charge_point_id.clone();
        let _admission = self.admission.lock();

        if !self.can_accept(&charge_point_id) {
            let active = self.connected_ids();
            warn!(
                charge_point_id = charge_point_id.as_str(),
                ?active,
                capacity = self.capacity,
                "Session rejected: no free slot"
            );
            return RegisterResult::Rejected { active };
        }

        info!(
            charge_point_id = charge_point_id.as_str(),
            connection_id = connection.connection_id,
            remote_addr = ?connection.remote_addr,
            "Registering charge point session"
        );

        match self.sessions.insert(charge_point_id, connection) {
            Some(previous) => {
                warn!(
                    charge_point_id = previous.charge_point_id.as_str(),
                    old_connection_id = previous.connection_id,
                    "Replacing existing session"
                );
                previous.close("replaced by a new connection");
                RegisterResult::Replaced(previous.evicted())
            }
            None => RegisterResult::Registered,
        }
    }

    /// Release the slot if it is still held by `connection_id`.
    pub fn unregister(&self, charge_point_id: &str, connection_id: u64) -> bool {
        let removed = self
            .sessions
            .remove_if(charge_point_id, |_, conn| conn.connection_id == connection_id)
            .is_some();
        if removed {
            info!(charge_point_id, connection_id, "Unregistered charge point session");
        } else {
            info!(
                charge_point_id,
                connection_id, "Session slot already taken over, leaving it"
            );
        }
        removed
    }

    /// Run `f` on the live connection of `charge_point_id` while its slot is
    /// held, so a reconnect cannot swap the connection halfway through.
    pub fn with_connection<R>(
        &self,
        charge_point_id: &str,
        f: impl FnOnce(&Connection) -> R,
    ) -> Option<R> {
        self.sessions.get(charge_point_id).map(|conn| f(&conn))
    }

    pub fn touch(&self, charge_point_id: &str) {
        if let Some(mut conn) = self.sessions.get_mut(charge_point_id) {
            conn.touch();
        }
    }

    pub fn is_connected(&self, charge_point_id: &str) -> bool {
        self.sessions.contains_key(charge_point_id)
    }

    pub fn connected_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    /// The attached charger, if any. With more than one slot this is the
    /// lowest identity.
    pub fn current(&self) -> Option<String> {
        self.connected_ids().into_iter().next()
    }

    /// Close every connection, used on shutdown.
    pub fn close_all(&self, reason: &str) {
        for entry in self.sessions.iter() {
            entry.close(reason);
        }
    }
}
