pub mod connection;
pub mod registry;

pub use connection::{Connection, EvictedSession, OutboundMessage};
pub use registry::{RegisterResult, SessionRegistry, SharedSessionRegistry};
