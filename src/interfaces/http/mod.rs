//! Admin HTTP API
//!
//! - `handlers`: health, charger state, refresh and metrics
//! - `router`: route table and layers

pub mod handlers;
pub mod router;

pub use router::{create_api_router, ApiState};
