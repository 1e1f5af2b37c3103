//! OCPP 1.6 action handlers
//!
//! One file per inbound action. Each handler decodes its request, applies
//! it to the state store and returns the response payload.

mod handle_authorize;
mod handle_boot_notification;
mod handle_data_transfer;
mod handle_heartbeat;
mod handle_meter_values;
mod handle_start_transaction;
mod handle_status_notification;
mod handle_stop_transaction;

pub use handle_authorize::AuthorizeHandler;
pub use handle_boot_notification::BootNotificationHandler;
pub use handle_data_transfer::DataTransferHandler;
pub use handle_heartbeat::HeartbeatHandler;
pub use handle_meter_values::MeterValuesHandler;
pub use handle_start_transaction::StartTransactionHandler;
pub use handle_status_notification::StatusNotificationHandler;
pub use handle_stop_transaction::StopTransactionHandler;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use super::router::ActionRouter;
use crate::domain::vendor::BatchOutcome;
use crate::shared::HandlerFault;

/// Register every inbound 1.6 action the central system answers.
pub fn register_all(router: &mut ActionRouter) {
    router
        .register("BootNotification", BootNotificationHandler)
        .register("Heartbeat", HeartbeatHandler)
        .register("StatusNotification", StatusNotificationHandler)
        .register("Authorize", AuthorizeHandler)
        .register("StartTransaction", StartTransactionHandler)
        .register("StopTransaction", StopTransactionHandler)
        .register("MeterValues", MeterValuesHandler)
        .register("DataTransfer", DataTransferHandler);
}

fn decode<T: DeserializeOwned>(action: &'static str, payload: Value) -> Result<T, HandlerFault> {
    serde_json::from_value(payload).map_err(|source| HandlerFault::InvalidPayload { action, source })
}

fn encode<T: Serialize>(response: &T) -> Result<Value, HandlerFault> {
    Ok(serde_json::to_value(response)?)
}

fn log_rejected(charge_point_id: &str, source: &'static str, outcome: &BatchOutcome) {
    for (key, error) in &outcome.rejected {
        warn!(charge_point_id, source, key = key.as_str(), %error, "Value skipped");
    }
}
