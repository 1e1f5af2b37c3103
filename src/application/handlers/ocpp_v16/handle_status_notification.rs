//! StatusNotification handler

use async_trait::async_trait;
use rust_ocpp::v1_6::messages::status_notification::StatusNotificationResponse;
use serde_json::Value;
use tracing::info;

use super::{decode, encode};
use crate::application::handlers::router::{ActionHandler, HandlerContext};
use crate::domain::ocpp::messages::StatusNotificationPayload;
use crate::shared::HandlerFault;

const NO_ERROR: &str = "NoError";

pub struct StatusNotificationHandler;

#[async_trait]
impl ActionHandler for StatusNotificationHandler {
    async fn handle(&self, ctx: &HandlerContext, payload: Value) -> Result<Value, HandlerFault> {
        let request: StatusNotificationPayload = decode("StatusNotification", payload)?;

        let error_code = request.error_code.filter(|code| code != NO_ERROR);
        let changed = ctx
            .state
            .apply(|s| s.apply_status(&request.status, error_code.clone()));

        info!(
            charge_point_id = ctx.charge_point_id.as_str(),
            connector_id = ?request.connector_id,
            status = request.status.as_str(),
            error_code = ?error_code,
            info = ?request.info,
            vendor_error_code = ?request.vendor_error_code,
            changed,
            "StatusNotification"
        );

        encode(&StatusNotificationResponse {})
    }
}
