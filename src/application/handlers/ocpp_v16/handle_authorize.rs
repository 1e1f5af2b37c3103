//! Authorize handler. Every id tag is accepted.

use async_trait::async_trait;
use rust_ocpp::v1_6::messages::authorize::{AuthorizeRequest, AuthorizeResponse};
use rust_ocpp::v1_6::types::{AuthorizationStatus, IdTagInfo};
use serde_json::Value;
use tracing::info;

use super::{decode, encode};
use crate::application::handlers::router::{ActionHandler, HandlerContext};
use crate::shared::HandlerFault;

pub struct AuthorizeHandler;

pub(super) fn accepted() -> IdTagInfo {
    IdTagInfo {
        status: AuthorizationStatus::Accepted,
        expiry_date: None,
        parent_id_tag: None,
    }
}

#[async_trait]
impl ActionHandler for AuthorizeHandler {
    async fn handle(&self, ctx: &HandlerContext, payload: Value) -> Result<Value, HandlerFault> {
        let request: AuthorizeRequest = decode("Authorize", payload)?;
        info!(
            charge_point_id = ctx.charge_point_id.as_str(),
            id_tag = request.id_tag.as_str(),
            "Authorize"
        );
        encode(&AuthorizeResponse {
            id_tag_info: accepted(),
        })
    }
}
