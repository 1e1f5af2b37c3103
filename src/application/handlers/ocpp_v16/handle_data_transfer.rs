//! DataTransfer handler (Growatt vendor extensions)

use async_trait::async_trait;
use rust_ocpp::v1_6::messages::data_transfer::DataTransferResponse;
use rust_ocpp::v1_6::types::DataTransferStatus;
use serde_json::Value;
use tracing::{debug, info};

use super::handle_meter_values::ingest;
use super::{decode, encode, log_rejected};
use crate::application::handlers::router::{ActionHandler, HandlerContext};
use crate::domain::ocpp::messages::DataTransferPayload;
use crate::domain::VendorMessage;
use crate::shared::HandlerFault;

pub struct DataTransferHandler;

#[async_trait]
impl ActionHandler for DataTransferHandler {
    async fn handle(&self, ctx: &HandlerContext, payload: Value) -> Result<Value, HandlerFault> {
        let request: DataTransferPayload = decode("DataTransfer", payload)?;
        let cp = ctx.charge_point_id.as_str();

        let message = VendorMessage::classify(
            &request.vendor_id,
            request.message_id.as_deref(),
            request.data.as_ref(),
        );

        debug!(
            charge_point_id = cp,
            vendor_id = request.vendor_id.as_str(),
            message_id = ?request.message_id,
            kind = message.kind(),
            "DataTransfer"
        );

        let changed = match &message {
            VendorMessage::FrozenRecord(record) => {
                let outcome = ctx.state.update(|s| {
                    let o = s.apply_session_summary(record);
                    (o.changed, o)
                });
                log_rejected(cp, "frozenrecord", &outcome);
                outcome.changed
            }
            VendorMessage::ConfigurationBatch(entries) => {
                let outcome = ctx.state.update(|s| {
                    let o = s.apply_configuration(entries);
                    (o.changed, o)
                });
                log_rejected(cp, "configuration", &outcome);
                outcome.changed
            }
            VendorMessage::MeterValues(values) => ingest(ctx, values).changed,
            VendorMessage::Generic { payload, .. } => {
                let outcome = ctx.state.update(|s| {
                    let o = s.merge_vendor_payload(payload);
                    (o.changed, o)
                });
                log_rejected(cp, "vendor", &outcome);
                outcome.changed
            }
        };

        info!(
            charge_point_id = cp,
            message_id = ?request.message_id,
            kind = message.kind(),
            changed,
            "DataTransfer handled"
        );

        encode(&DataTransferResponse {
            status: DataTransferStatus::Accepted,
            data: None,
        })
    }
}
