//! HTTP API handlers

pub mod charger;
pub mod health;
pub mod metrics;

pub use charger::ChargerState;
pub use health::HealthState;
pub use metrics::MetricsState;
