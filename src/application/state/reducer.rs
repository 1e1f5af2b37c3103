//! State transitions for the connected charger.
//!
//! Every method reports whether it effectively changed anything so the
//! store can raise at most one notification per call.

use serde::Serialize;
use tracing::warn;

use crate::domain::coercion::{self, set_if_changed};
use crate::domain::ocpp::messages::{ConfigurationEntry, MeterValue};
use crate::domain::vendor::BatchOutcome;
use crate::domain::{
    BootInfo, ChargeSessionState, ChargeStatus, MeterField, MeteringAggregate, Phase,
    SessionSummary, VendorConfiguration, VendorPayload,
};
use crate::shared::CoercionError;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChargePointState {
    pub charge_point_id: Option<String>,
    pub connected: bool,
    pub boot: Option<BootInfo>,
    pub session: ChargeSessionState,
    pub metering: MeteringAggregate,
    pub configuration: VendorConfiguration,
    pub last_session: SessionSummary,
    /// Highest transaction id handed out by this process.
    pub last_transaction_id: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopOutcome {
    pub tracked: Option<i32>,
    pub referenced: Option<i32>,
}

impl StopOutcome {
    pub fn is_mismatch(&self) -> bool {
        self.tracked != self.referenced
    }
}

#[derive(Debug, Default)]
pub struct MeterOutcome {
    pub changed: bool,
    pub applied: usize,
    /// `(measurand, error)` for samples whose value did not parse.
    pub rejected: Vec<(String, CoercionError)>,
    /// `measurand[/phase]` of samples with no slot.
    pub ignored: Vec<String>,
}

impl ChargePointState {
    pub fn mark_connected(&mut self, charge_point_id: &str) -> bool {
        let mut changed = set_if_changed(&mut self.charge_point_id, charge_point_id.to_string());
        if !self.connected {
            self.connected = true;
            changed = true;
        }
        changed
    }

    /// Connection lost: no session can be running any more.
    pub fn mark_disconnected(&mut self) -> bool {
        let changed = self.connected
            || self.session.transaction_id.is_some()
            || self.session.status != ChargeStatus::Unavailable;
        self.connected = false;
        self.session.transaction_id = None;
        self.session.status = ChargeStatus::Unavailable;
        changed
    }

    pub fn register_boot(&mut self, charge_point_id: &str, boot: BootInfo) -> bool {
        let id_changed = set_if_changed(&mut self.charge_point_id, charge_point_id.to_string());
        set_if_changed(&mut self.boot, boot) | id_changed
    }

    /// A status of Idle or Unavailable also ends any running transaction.
    pub fn apply_status(&mut self, reported: &str, error_code: Option<String>) -> bool {
        let status = ChargeStatus::from_reported(reported);
        let mut changed = false;
        if matches!(status, ChargeStatus::Idle | ChargeStatus::Unavailable)
            && self.session.transaction_id.take().is_some()
        {
            changed = true;
        }
        if self.session.status != status {
            self.session.status = status;
            changed = true;
        }
        if self.session.error_code != error_code {
            self.session.error_code = error_code;
            changed = true;
        }
        changed
    }

    /// Allocate the next transaction id and enter Charging.
    pub fn start_transaction(&mut self, id_tag: &str, meter_start_wh: i32) -> i32 {
        let transaction_id = match self.last_transaction_id.checked_add(1) {
            Some(next) => next,
            None => {
                warn!(last = self.last_transaction_id, "Transaction id space exhausted, restarting at 1");
                1
            }
        };
        self.last_transaction_id = transaction_id;

        self.session.transaction_id = Some(transaction_id);
        self.session.status = ChargeStatus::Charging;
        self.session.id_tag = Some(id_tag.to_string());
        self.session.meter_start_wh = Some(meter_start_wh);
        self.session.meter_stop_wh = None;
        self.session.reason = None;

        transaction_id
    }

    /// End the tracked session whatever id the charger referenced.
    pub fn stop_transaction(
        &mut self,
        referenced: Option<i32>,
        meter_stop_wh: Option<i32>,
        reason: Option<String>,
    ) -> StopOutcome {
        let tracked = self.session.transaction_id.take();
        self.session.status = ChargeStatus::Idle;
        self.session.meter_stop_wh = meter_stop_wh;
        self.session.reason = reason;

        StopOutcome { tracked, referenced }
    }

    pub fn apply_meter_values(&mut self, values: &[MeterValue]) -> MeterOutcome {
        let mut outcome = MeterOutcome::default();

        for sample in values.iter().flat_map(|mv| &mv.sampled_value) {
            let measurand = sample.measurand();
            let phase = sample.phase.as_deref().and_then(Phase::parse);

            let Some(field) = MeterField::route(measurand, phase) else {
                outcome.ignored.push(match sample.phase.as_deref() {
                    Some(p) => format!("{measurand}/{p}"),
                    None => measurand.to_string(),
                });
                continue;
            };

            let Some(raw) = sample.value.as_deref() else {
                outcome.rejected.push((measurand.to_string(), CoercionError::Missing));
                continue;
            };
            let value = match coercion::to_f64(raw) {
                Ok(v) => field.normalize(v, sample.unit.as_deref()),
                Err(e) => {
                    outcome.rejected.push((measurand.to_string(), e));
                    continue;
                }
            };

            outcome.applied += 1;
            outcome.changed |= self.metering.apply(field, value);
        }

        outcome.changed |= self.metering.recompute_total_power();
        outcome
    }

    /// Apply a configuration report. Entries without a value are skipped.
    pub fn apply_configuration(&mut self, entries: &[ConfigurationEntry]) -> BatchOutcome {
        self.configuration.apply_batch(
            entries
                .iter()
                .filter_map(|e| e.value.as_deref().map(|v| (e.key.as_str(), v))),
        )
    }

    pub fn apply_session_summary(&mut self, payload: &VendorPayload) -> BatchOutcome {
        self.last_session.apply(payload)
    }

    /// Merge a flat vendor payload into the configuration.
    pub fn merge_vendor_payload(&mut self, payload: &VendorPayload) -> BatchOutcome {
        let pairs: Vec<(&str, String)> = payload
            .iter()
            .map(|(k, v)| (k.as_str(), v.to_text()))
            .collect();
        self.configuration
            .apply_batch(pairs.iter().map(|(k, v)| (*k, v.as_str())))
    }
}
