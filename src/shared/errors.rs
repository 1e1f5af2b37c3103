//! Error taxonomy shared across layers.
//!
//! Frame decoding errors live next to the codec
//! ([`OcppFrameError`](super::ocpp_frame::OcppFrameError)) and outbound call
//! errors next to the sender (`application::commands::CommandError`).

use thiserror::Error;

use super::ocpp_frame::error_code;

/// A single field or sample could not be coerced to its target type.
///
/// Always recovered locally: the field is skipped and the rest of the batch
/// is still applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoercionError {
    #[error("'{value}' is not a number")]
    NotANumber { value: String },
    #[error("'{value}' is not an integer")]
    NotAnInteger { value: String },
    #[error("'{value}' is not a recognised boolean")]
    NotABoolean { value: String },
    #[error("value is missing")]
    Missing,
}

/// Failure inside an action handler. Converted into a CallError at the
/// router boundary; the connection stays open.
#[derive(Debug, Error)]
pub enum HandlerFault {
    #[error("invalid {action} payload: {source}")]
    InvalidPayload {
        action: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerFault {
    /// OCPP-J error code reported back to the charge point.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidPayload { .. } => error_code::FORMATION_VIOLATION,
            Self::Encode(_) | Self::Panicked(_) => error_code::INTERNAL_ERROR,
        }
    }
}

/// A frame could not be handed to a connection's writer.
#[derive(Debug, Error)]
pub enum TransportFault {
    #[error("outbound queue closed")]
    QueueClosed,
}
