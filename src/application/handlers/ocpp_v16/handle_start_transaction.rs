//! StartTransaction handler

use async_trait::async_trait;
use rust_ocpp::v1_6::messages::start_transaction::{
    StartTransactionRequest, StartTransactionResponse,
};
use serde_json::Value;
use tracing::info;

use super::handle_authorize::accepted;
use super::{decode, encode};
use crate::application::handlers::router::{ActionHandler, HandlerContext};
use crate::shared::HandlerFault;

pub struct StartTransactionHandler;

#[async_trait]
impl ActionHandler for StartTransactionHandler {
    async fn handle(&self, ctx: &HandlerContext, payload: Value) -> Result<Value, HandlerFault> {
        let request: StartTransactionRequest = decode("StartTransaction", payload)?;

        let transaction_id = ctx.state.update(|s| {
            (true, s.start_transaction(&request.id_tag, request.meter_start))
        });

        info!(
            charge_point_id = ctx.charge_point_id.as_str(),
            connector_id = request.connector_id,
            id_tag = request.id_tag.as_str(),
            meter_start = request.meter_start,
            transaction_id,
            "StartTransaction"
        );

        encode(&StartTransactionResponse {
            transaction_id,
            id_tag_info: accepted(),
        })
    }
}
