//! GetConfiguration (1.6)

use rust_ocpp::v1_6::messages::get_configuration::GetConfigurationRequest;
use serde::Deserialize;
use tracing::info;

use super::{CommandError, SharedCommandSender};
use crate::domain::ocpp::messages::ConfigurationEntry;

/// The answer, decoded loosely: THOR sends numeric values unquoted.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationResult {
    #[serde(default)]
    pub configuration_key: Vec<ConfigurationEntry>,
    #[serde(default)]
    pub unknown_key: Vec<String>,
}

pub async fn get_configuration(
    command_sender: &SharedCommandSender,
    charge_point_id: &str,
    keys: Option<Vec<String>>,
) -> Result<ConfigurationResult, CommandError> {
    info!(charge_point_id, ?keys, "GetConfiguration");

    let request = GetConfigurationRequest { key: keys };
    let payload = serde_json::to_value(&request)
        .map_err(|e| CommandError::SendFailed(format!("Serialization failed: {}", e)))?;

    let result = command_sender
        .send_command(charge_point_id, "GetConfiguration", payload)
        .await?;

    serde_json::from_value(result)
        .map_err(|e| CommandError::InvalidResponse(format!("Failed to parse response: {}", e)))
}
