//! # THOR OCPP Central System
//!
//! OCPP 1.6J central system for a single Growatt THOR charger.
//!
//! ## Architecture
//!
//! - **shared**: OCPP-J frame codec, error taxonomy, shutdown signal
//! - **domain**: charge session, metering and vendor (Growatt) payload types
//! - **application**: state store, session registry, outbound commands and
//!   the inbound action router
//! - **interfaces**: the OCPP WebSocket listener and the admin HTTP API
//! - **server**: runtime wiring used by the CLI

pub mod application;
pub mod config;
pub mod domain;
pub mod interfaces;
pub mod server;
pub mod shared;

pub use config::{default_config_path, AppConfig, Config, ConfigError};

pub use application::{
    create_event_bus, Event, EventBus, RefreshReport, SharedEventBus, SharedStateStore,
    StateSnapshot, StateStore,
};
pub use server::{init_tracing, ServerHandle, ServerOptions};
