//! MeterValues handler

use async_trait::async_trait;
use rust_ocpp::v1_6::messages::meter_values::MeterValuesResponse;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{decode, encode};
use crate::application::handlers::router::{ActionHandler, HandlerContext};
use crate::application::state::MeterOutcome;
use crate::domain::ocpp::messages::{MeterValue, MeterValuesPayload};
use crate::shared::HandlerFault;

pub struct MeterValuesHandler;

/// Apply metering samples and log what was dropped. Shared with the vendor
/// `GetMeterValues` DataTransfer.
pub(super) fn ingest(ctx: &HandlerContext, values: &[MeterValue]) -> MeterOutcome {
    let outcome = ctx.state.update(|s| {
        let outcome = s.apply_meter_values(values);
        (outcome.changed, outcome)
    });

    for (measurand, error) in &outcome.rejected {
        warn!(
            charge_point_id = ctx.charge_point_id.as_str(),
            measurand = measurand.as_str(),
            %error,
            "Sample skipped"
        );
    }
    if !outcome.ignored.is_empty() {
        debug!(
            charge_point_id = ctx.charge_point_id.as_str(),
            ignored = ?outcome.ignored,
            "Samples without a slot ignored"
        );
    }
    outcome
}

#[async_trait]
impl ActionHandler for MeterValuesHandler {
    async fn handle(&self, ctx: &HandlerContext, payload: Value) -> Result<Value, HandlerFault> {
        let request: MeterValuesPayload = decode("MeterValues", payload)?;
        let outcome = ingest(ctx, &request.meter_value);

        info!(
            charge_point_id = ctx.charge_point_id.as_str(),
            connector_id = ?request.connector_id,
            transaction_id = ?request.transaction_id,
            applied = outcome.applied,
            changed = outcome.changed,
            "MeterValues"
        );

        encode(&MeterValuesResponse {})
    }
}
