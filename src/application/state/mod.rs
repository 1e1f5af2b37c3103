//! Authoritative charger state and its change rules.

pub mod reducer;
pub mod snapshot;
pub mod store;

pub use reducer::{ChargePointState, MeterOutcome, StopOutcome};
pub use snapshot::{MeteringSnapshot, StateSnapshot};
pub use store::{SharedStateStore, StateStore};
