//! BootNotification handler

use async_trait::async_trait;
use chrono::Utc;
use rust_ocpp::v1_6::messages::boot_notification::{
    BootNotificationRequest, BootNotificationResponse,
};
use rust_ocpp::v1_6::types::RegistrationStatus;
use serde_json::Value;
use tracing::info;

use super::{decode, encode};
use crate::application::handlers::router::{ActionHandler, HandlerContext};
use crate::domain::BootInfo;
use crate::shared::HandlerFault;

pub struct BootNotificationHandler;

#[async_trait]
impl ActionHandler for BootNotificationHandler {
    async fn handle(&self, ctx: &HandlerContext, payload: Value) -> Result<Value, HandlerFault> {
        let request: BootNotificationRequest = decode("BootNotification", payload)?;

        info!(
            charge_point_id = ctx.charge_point_id.as_str(),
            vendor = request.charge_point_vendor.as_str(),
            model = request.charge_point_model.as_str(),
            serial = ?request.charge_point_serial_number,
            firmware = ?request.firmware_version,
            "BootNotification"
        );

        let boot = BootInfo {
            vendor: request.charge_point_vendor,
            model: request.charge_point_model,
            serial_number: request.charge_point_serial_number,
            firmware_version: request.firmware_version,
        };
        ctx.state
            .apply(|s| s.register_boot(&ctx.charge_point_id, boot));

        encode(&BootNotificationResponse {
            current_time: Utc::now(),
            interval: ctx.heartbeat_interval,
            status: RegistrationStatus::Accepted,
        })
    }
}
