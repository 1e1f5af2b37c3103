//! TriggerMessage (1.6)

use rust_ocpp::v1_6::messages::trigger_message::{TriggerMessageRequest, TriggerMessageResponse};
use rust_ocpp::v1_6::types::MessageTrigger;
use tracing::info;

use super::{CommandError, SharedCommandSender};

/// Messages the refresh flow asks the charger to resend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerType {
    MeterValues,
    StatusNotification,
}

impl TriggerType {
    fn to_ocpp(self) -> MessageTrigger {
        match self {
            Self::MeterValues => MessageTrigger::MeterValues,
            Self::StatusNotification => MessageTrigger::StatusNotification,
        }
    }
}

/// Returns the charger's answer (`Accepted`, `Rejected`, `NotImplemented`).
pub async fn trigger_message(
    command_sender: &SharedCommandSender,
    charge_point_id: &str,
    requested_message: TriggerType,
    connector_id: Option<u32>,
) -> Result<String, CommandError> {
    info!(charge_point_id, ?requested_message, ?connector_id, "TriggerMessage");

    let request = TriggerMessageRequest {
        requested_message: requested_message.to_ocpp(),
        connector_id,
    };
    let payload = serde_json::to_value(&request)
        .map_err(|e| CommandError::SendFailed(format!("Serialization failed: {}", e)))?;

    let result = command_sender
        .send_command(charge_point_id, "TriggerMessage", payload)
        .await?;

    let response: TriggerMessageResponse = serde_json::from_value(result)
        .map_err(|e| CommandError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

    Ok(format!("{:?}", response.status))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::application::commands::create_command_sender;
    use crate::application::commands::test_support::{attached, next_call};

    #[tokio::test]
    async fn sends_requested_message_and_reports_status() {
        let (registry, connection_id, mut rx) = attached("THOR1");
        let sender = create_command_sender(registry, Duration::from_secs(5));

        let responder = {
            let sender = sender.clone();
            tokio::spawn(async move {
                let (id, action, payload) = next_call(&mut rx).await;
                assert_eq!(action, "TriggerMessage");
                assert_eq!(payload["requestedMessage"], "StatusNotification");
                sender.handle_response(connection_id, "THOR1", &id, json!({"status": "Accepted"}));
            })
        };

        let status = trigger_message(&sender, "THOR1", TriggerType::StatusNotification, None).await;
        responder.await.unwrap();
        assert_eq!(status, Ok("Accepted".to_string()));
    }

    #[tokio::test]
    async fn malformed_answer_is_invalid_response() {
        let (registry, connection_id, mut rx) = attached("THOR1");
        let sender = create_command_sender(registry, Duration::from_secs(5));

        let responder = {
            let sender = sender.clone();
            tokio::spawn(async move {
                let (id, _, _) = next_call(&mut rx).await;
                sender.handle_response(connection_id, "THOR1", &id, json!({"status": 7}));
            })
        };

        let status = trigger_message(&sender, "THOR1", TriggerType::MeterValues, Some(1)).await;
        responder.await.unwrap();
        assert!(matches!(status, Err(CommandError::InvalidResponse(_))));
    }
}
