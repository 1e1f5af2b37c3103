//! Outer surfaces: the OCPP listener and the admin HTTP API.

pub mod http;
pub mod ws;
