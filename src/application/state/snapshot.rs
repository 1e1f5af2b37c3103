//! Read-only view handed to consumers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::reducer::ChargePointState;
use crate::domain::metering::wh_to_kwh;
use crate::domain::{BootInfo, ChargeStatus, Phase, SessionSummary, VendorConfiguration};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeteringSnapshot {
    pub energy_kwh: Option<f64>,
    pub total_power_w: Option<f64>,
    pub power_w: BTreeMap<Phase, f64>,
    pub current_a: BTreeMap<Phase, f64>,
    pub voltage_v: BTreeMap<Phase, f64>,
    pub temperature_c: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSnapshot {
    pub charge_point_id: Option<String>,
    pub connected: bool,
    pub status: ChargeStatus,
    pub error_code: Option<String>,
    pub transaction_id: Option<i32>,
    pub id_tag: Option<String>,
    pub reason: Option<String>,
    pub meter_start_kwh: Option<f64>,
    pub meter_stop_kwh: Option<f64>,
    pub boot: Option<BootInfo>,
    pub metering: MeteringSnapshot,
    pub configuration: VendorConfiguration,
    pub last_session: SessionSummary,
    pub taken_at: DateTime<Utc>,
}

impl From<&ChargePointState> for StateSnapshot {
    fn from(state: &ChargePointState) -> Self {
        let session = &state.session;
        let metering = &state.metering;

        Self {
            charge_point_id: state.charge_point_id.clone(),
            connected: state.connected,
            status: session.status.clone(),
            error_code: session.error_code.clone(),
            transaction_id: session.transaction_id,
            id_tag: session.id_tag.clone(),
            reason: session.reason.clone(),
            meter_start_kwh: session.meter_start_wh.map(|wh| wh_to_kwh(f64::from(wh))),
            meter_stop_kwh: session.meter_stop_wh.map(|wh| wh_to_kwh(f64::from(wh))),
            boot: state.boot.clone(),
            metering: MeteringSnapshot {
                energy_kwh: metering.energy_kwh(),
                total_power_w: metering.total_power_w,
                power_w: metering.power_w.clone(),
                current_a: metering.current_a.clone(),
                voltage_v: metering.voltage_v.clone(),
                temperature_c: metering.temperature_c,
            },
            configuration: state.configuration.clone(),
            last_session: state.last_session.clone(),
            taken_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MeterField;

    #[test]
    fn presents_energy_in_kwh() {
        let mut state = ChargePointState::default();
        state.metering.apply(MeterField::Energy, 1500.0);
        state.start_transaction("X", 1234);

        let snapshot = StateSnapshot::from(&state);
        assert_eq!(snapshot.metering.energy_kwh, Some(1.5));
        assert_eq!(snapshot.meter_start_kwh, Some(1.234));
        assert_eq!(snapshot.status, ChargeStatus::Charging);
    }

    #[test]
    fn serializes_phase_keys_as_labels() {
        let mut state = ChargePointState::default();
        state.metering.apply(MeterField::PhaseVoltage(Phase::L3), 229.0);

        let json = serde_json::to_value(StateSnapshot::from(&state)).unwrap();
        assert_eq!(json["metering"]["voltage_v"]["L3"], 229.0);
        assert_eq!(json["status"], "Unavailable");
    }
}
