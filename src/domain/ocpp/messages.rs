//! Inbound payloads that the charger fills in loosely.
//!
//! The strict `rust_ocpp` types reject status strings, measurands and
//! reasons outside the 1.6 enumerations, and numbers sent as JSON numbers
//! where the schema says string. THOR firmware does all of these, so the
//! actions below are decoded into these structs instead.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::domain::metering::ENERGY_ACTIVE_IMPORT_REGISTER;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusNotificationPayload {
    #[serde(default)]
    pub connector_id: Option<u32>,
    pub status: String,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub info: Option<String>,
    #[serde(default)]
    pub vendor_error_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTransactionPayload {
    #[serde(default)]
    pub transaction_id: Option<i32>,
    #[serde(default)]
    pub meter_stop: Option<i32>,
    #[serde(default)]
    pub id_tag: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterValuesPayload {
    #[serde(default)]
    pub connector_id: Option<u32>,
    #[serde(default)]
    pub transaction_id: Option<i32>,
    #[serde(default)]
    pub meter_value: Vec<MeterValue>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterValue {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub sampled_value: Vec<SampledValue>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampledValue {
    #[serde(default, deserialize_with = "opt_text_or_scalar")]
    pub value: Option<String>,
    #[serde(default)]
    pub measurand: Option<String>,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
}

impl SampledValue {
    /// Measurand with the OCPP default applied.
    pub fn measurand(&self) -> &str {
        self.measurand
            .as_deref()
            .unwrap_or(ENERGY_ACTIVE_IMPORT_REGISTER)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataTransferPayload {
    pub vendor_id: String,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

/// One `{key, value}` pair of a configuration report.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConfigurationEntry {
    pub key: String,
    #[serde(default, deserialize_with = "opt_text_or_scalar")]
    pub value: Option<String>,
    #[serde(default)]
    pub readonly: Option<bool>,
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn opt_text_or_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_text(Value::deserialize(deserializer)?))
}
