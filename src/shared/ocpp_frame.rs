//! OCPP-J message framing
//!
//! Implements the OCPP-J (JSON over WebSocket) transport envelope:
//!
//! - **Call**       `[2, "<uniqueId>", "<action>", {<payload>}]`
//! - **CallResult** `[3, "<uniqueId>", {<payload>}]`
//! - **CallError**  `[4, "<uniqueId>", "<errorCode>", "<errorDescription>", {<errorDetails>}]`

use serde_json::{Map, Value};
use thiserror::Error;

// ── Message-type constants ─────────────────────────────────────

const MSG_TYPE_CALL: u64 = 2;
const MSG_TYPE_CALL_RESULT: u64 = 3;
const MSG_TYPE_CALL_ERROR: u64 = 4;

/// Smallest envelope the codec accepts (`[3, id, payload]`).
const MIN_FRAME_LEN: usize = 3;

// ── Error codes (OCPP-J §4.2.3) ────────────────────────────────

pub mod error_code {
    pub const NOT_IMPLEMENTED: &str = "NotImplemented";
    pub const FORMATION_VIOLATION: &str = "FormationViolation";
    pub const INTERNAL_ERROR: &str = "InternalError";
    pub const GENERIC_ERROR: &str = "GenericError";
}

// ── OcppFrame ──────────────────────────────────────────────────

/// A parsed OCPP-J frame.
#[derive(Debug, Clone, PartialEq)]
pub enum OcppFrame {
    /// `[2, uniqueId, action, payload]`
    Call {
        unique_id: String,
        action: String,
        payload: Value,
    },
    /// `[3, uniqueId, payload]`
    CallResult { unique_id: String, payload: Value },
    /// `[4, uniqueId, errorCode, errorDescription, errorDetails]`
    CallError {
        unique_id: String,
        error_code: String,
        error_description: String,
        error_details: Value,
    },
}

impl OcppFrame {
    // ── Parsing ────────────────────────────────────────────

    /// Parse a raw JSON text into an `OcppFrame`.
    pub fn parse(text: &str) -> Result<Self, OcppFrameError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| OcppFrameError::InvalidJson(e.to_string()))?;

        let arr = value.as_array().ok_or(OcppFrameError::NotAnArray)?;

        if arr.len() < MIN_FRAME_LEN {
            return Err(OcppFrameError::MissingFields {
                expected: MIN_FRAME_LEN,
                got: arr.len(),
            });
        }

        let msg_type = arr[0].as_u64().ok_or(OcppFrameError::InvalidMessageType)?;

        match msg_type {
            MSG_TYPE_CALL => Self::parse_call(arr),
            MSG_TYPE_CALL_RESULT => Self::parse_call_result(arr),
            MSG_TYPE_CALL_ERROR => Self::parse_call_error(arr),
            _ => Err(OcppFrameError::UnknownMessageType(msg_type)),
        }
    }

    fn parse_call(arr: &[Value]) -> Result<Self, OcppFrameError> {
        if arr.len() < 4 {
            return Err(OcppFrameError::MissingFields {
                expected: 4,
                got: arr.len(),
            });
        }

        let unique_id = unique_id_of(arr)?;
        let action = arr[2]
            .as_str()
            .ok_or(OcppFrameError::FieldTypeMismatch("action must be a string"))?
            .to_string();
        let payload = object_payload(&arr[3])?;

        Ok(Self::Call {
            unique_id,
            action,
            payload,
        })
    }

    fn parse_call_result(arr: &[Value]) -> Result<Self, OcppFrameError> {
        let unique_id = unique_id_of(arr)?;
        let payload = object_payload(&arr[2])?;

        Ok(Self::CallResult { unique_id, payload })
    }

    fn parse_call_error(arr: &[Value]) -> Result<Self, OcppFrameError> {
        let unique_id = unique_id_of(arr)?;
        let error_code = arr[2]
            .as_str()
            .ok_or(OcppFrameError::FieldTypeMismatch("errorCode must be a string"))?
            .to_string();
        let error_description = arr
            .get(3)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let error_details = match arr.get(4) {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(details) => object_payload(details)?,
        };

        Ok(Self::CallError {
            unique_id,
            error_code,
            error_description,
            error_details,
        })
    }

    /// Best-effort recovery of the unique id of a Call that failed to parse,
    /// so the peer can be answered with a CallError instead of silence.
    pub fn recover_call_id(text: &str) -> Option<String> {
        let value: Value = serde_json::from_str(text).ok()?;
        let arr = value.as_array()?;
        if arr.first()?.as_u64()? != MSG_TYPE_CALL {
            return None;
        }
        arr.get(1)?.as_str().map(str::to_string)
    }

    // ── Serialization ──────────────────────────────────────

    /// Serialize this frame to a JSON string.
    pub fn serialize(&self) -> String {
        let arr = match self {
            Self::Call {
                unique_id,
                action,
                payload,
            } => vec![
                Value::from(MSG_TYPE_CALL),
                Value::String(unique_id.clone()),
                Value::String(action.clone()),
                payload.clone(),
            ],

            Self::CallResult { unique_id, payload } => vec![
                Value::from(MSG_TYPE_CALL_RESULT),
                Value::String(unique_id.clone()),
                payload.clone(),
            ],

            Self::CallError {
                unique_id,
                error_code,
                error_description,
                error_details,
            } => vec![
                Value::from(MSG_TYPE_CALL_ERROR),
                Value::String(unique_id.clone()),
                Value::String(error_code.clone()),
                Value::String(error_description.clone()),
                error_details.clone(),
            ],
        };

        Value::Array(arr).to_string()
    }

    // ── Helpers ────────────────────────────────────────────

    pub fn unique_id(&self) -> &str {
        match self {
            Self::Call { unique_id, .. }
            | Self::CallResult { unique_id, .. }
            | Self::CallError { unique_id, .. } => unique_id,
        }
    }

    /// Create a `CallError` response for a given unique ID.
    pub fn error_response(
        unique_id: impl Into<String>,
        error_code: impl Into<String>,
        error_description: impl Into<String>,
    ) -> Self {
        Self::CallError {
            unique_id: unique_id.into(),
            error_code: error_code.into(),
            error_description: error_description.into(),
            error_details: Value::Object(Map::new()),
        }
    }
}

fn unique_id_of(arr: &[Value]) -> Result<String, OcppFrameError> {
    arr[1]
        .as_str()
        .map(str::to_string)
        .ok_or(OcppFrameError::FieldTypeMismatch("uniqueId must be a string"))
}

fn object_payload(value: &Value) -> Result<Value, OcppFrameError> {
    if value.is_object() {
        Ok(value.clone())
    } else {
        Err(OcppFrameError::FieldTypeMismatch("payload must be a JSON object"))
    }
}

// ── Errors ─────────────────────────────────────────────────────

/// Errors that can occur when parsing an OCPP-J frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OcppFrameError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
    #[error("OCPP message is not a JSON array")]
    NotAnArray,
    #[error("Message type is not a number")]
    InvalidMessageType,
    #[error("Unknown message type: {0}")]
    UnknownMessageType(u64),
    #[error("Expected at least {expected} fields, got {got}")]
    MissingFields { expected: usize, got: usize },
    #[error("Field type mismatch: {0}")]
    FieldTypeMismatch(&'static str),
}
