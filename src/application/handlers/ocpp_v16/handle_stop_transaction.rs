//! StopTransaction handler

use async_trait::async_trait;
use rust_ocpp::v1_6::messages::stop_transaction::StopTransactionResponse;
use serde_json::Value;
use tracing::{info, warn};

use super::handle_authorize::accepted;
use super::{decode, encode};
use crate::application::handlers::router::{ActionHandler, HandlerContext};
use crate::domain::ocpp::messages::StopTransactionPayload;
use crate::shared::HandlerFault;

pub struct StopTransactionHandler;

#[async_trait]
impl ActionHandler for StopTransactionHandler {
    async fn handle(&self, ctx: &HandlerContext, payload: Value) -> Result<Value, HandlerFault> {
        let request: StopTransactionPayload = decode("StopTransaction", payload)?;

        let outcome = ctx.state.update(|s| {
            let outcome =
                s.stop_transaction(request.transaction_id, request.meter_stop, request.reason.clone());
            (true, outcome)
        });

        if outcome.is_mismatch() {
            metrics::counter!("ocpp_stop_transaction_mismatch_total").increment(1);
            warn!(
                charge_point_id = ctx.charge_point_id.as_str(),
                referenced = ?outcome.referenced,
                tracked = ?outcome.tracked,
                "StopTransaction for a transaction that is not the tracked one"
            );
        }

        info!(
            charge_point_id = ctx.charge_point_id.as_str(),
            transaction_id = ?request.transaction_id,
            meter_stop = ?request.meter_stop,
            reason = ?request.reason,
            "StopTransaction"
        );

        encode(&StopTransactionResponse {
            id_tag_info: Some(accepted()),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::application::handlers::router::test_support::context;
    use crate::domain::ChargeStatus;

    #[tokio::test]
    async fn stop_without_start_still_idles() {
        let (ctx, _) = context();
        let mut events = ctx.state.events().subscribe();

        let reply = StopTransactionHandler
            .handle(
                &ctx,
                json!({"transactionId": 12, "meterStop": 300, "timestamp": "2025-12-27T12:00:00Z", "reason": "EVDisconnected"}),
            )
            .await
            .unwrap();

        assert_eq!(reply["idTagInfo"]["status"], "Accepted");
        let snapshot = ctx.state.snapshot();
        assert_eq!(snapshot.status, ChargeStatus::Idle);
        assert_eq!(snapshot.transaction_id, None);
        assert_eq!(snapshot.reason.as_deref(), Some("EVDisconnected"));
        assert_eq!(events.drain(), 1);
    }
}
