//! Charger state model. Pure data plus the rules for changing it; no I/O.

pub mod charge_session;
pub mod coercion;
pub mod metering;
pub mod ocpp;
pub mod vendor;

pub use charge_session::{BootInfo, ChargeSessionState, ChargeStatus};
pub use metering::{MeterField, MeteringAggregate, Phase};
pub use vendor::{SessionSummary, VendorConfiguration, VendorMessage, VendorPayload};
