//! Heartbeat handler

use async_trait::async_trait;
use chrono::Utc;
use rust_ocpp::v1_6::messages::heart_beat::HeartbeatResponse;
use serde_json::Value;
use tracing::debug;

use super::encode;
use crate::application::handlers::router::{ActionHandler, HandlerContext};
use crate::shared::HandlerFault;

pub struct HeartbeatHandler;

#[async_trait]
impl ActionHandler for HeartbeatHandler {
    async fn handle(&self, ctx: &HandlerContext, _payload: Value) -> Result<Value, HandlerFault> {
        debug!(charge_point_id = ctx.charge_point_id.as_str(), "Heartbeat");
        encode(&HeartbeatResponse {
            current_time: Utc::now(),
        })
    }
}
