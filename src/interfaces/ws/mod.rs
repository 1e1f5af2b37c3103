//! WebSocket interfaces
//!
//! - `ocpp_server`: the charger-facing OCPP 1.6J listener
//! - `notifications`: change stream for dashboards

pub mod notifications;
pub mod ocpp_server;

pub use notifications::{ws_notifications_handler, EventFilter, NotificationState};
pub use ocpp_server::{OcppServer, OCPP_SUBPROTOCOL};
