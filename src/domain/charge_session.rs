//! Charging-session lifecycle state

use std::fmt;

use serde::{Serialize, Serializer};

/// Charger status as tracked by the central system.
///
/// Values the device reports that have no dedicated variant are kept
/// verbatim in [`ChargeStatus::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChargeStatus {
    Idle,
    Charging,
    #[default]
    Unavailable,
    Other(String),
}

impl ChargeStatus {
    /// Map a StatusNotification status string.
    pub fn from_reported(raw: &str) -> Self {
        match raw {
            "Available" | "Idle" => Self::Idle,
            "Charging" => Self::Charging,
            "Unavailable" => Self::Unavailable,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Idle => "Idle",
            Self::Charging => "Charging",
            Self::Unavailable => "Unavailable",
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ChargeStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Lifecycle of the (single) charging session.
///
/// `transaction_id` is `Some` exactly while a session started by
/// StartTransaction has not been stopped or cut off by a disconnect.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChargeSessionState {
    pub status: ChargeStatus,
    pub transaction_id: Option<i32>,
    pub id_tag: Option<String>,
    pub reason: Option<String>,
    pub meter_start_wh: Option<i32>,
    pub meter_stop_wh: Option<i32>,
    /// Connector error code from the latest StatusNotification.
    pub error_code: Option<String>,
}

/// Identification sent in BootNotification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootInfo {
    pub vendor: String,
    pub model: String,
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_reported_status() {
        assert_eq!(ChargeStatus::from_reported("Available"), ChargeStatus::Idle);
        assert_eq!(ChargeStatus::from_reported("Charging"), ChargeStatus::Charging);
        assert_eq!(
            ChargeStatus::from_reported("SuspendedEV"),
            ChargeStatus::Other("SuspendedEV".into())
        );
    }

    #[test]
    fn default_is_unavailable() {
        assert_eq!(ChargeSessionState::default().status, ChargeStatus::Unavailable);
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_value(ChargeStatus::Other("Faulted".into())).unwrap();
        assert_eq!(json, "Faulted");
    }
}
