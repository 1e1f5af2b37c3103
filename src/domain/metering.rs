//! Live metering aggregate and the measurand routing table.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::coercion::set_if_changed;

// ── Measurands ─────────────────────────────────────────────────

pub const ENERGY_ACTIVE_IMPORT_REGISTER: &str = "Energy.Active.Import.Register";
pub const POWER_ACTIVE_IMPORT: &str = "Power.Active.Import";
pub const CURRENT_IMPORT: &str = "Current.Import";
pub const VOLTAGE: &str = "Voltage";
pub const TEMPERATURE: &str = "Temperature";

/// Electrical phase a per-phase sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Phase {
    L1,
    L2,
    L3,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::L1, Phase::L2, Phase::L3];

    /// Line-to-neutral labels collapse onto their line; line-to-line and
    /// neutral labels have no per-phase slot.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "L1" | "L1-N" => Some(Self::L1),
            "L2" | "L2-N" => Some(Self::L2),
            "L3" | "L3-N" => Some(Self::L3),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::L1 => "L1",
            Self::L2 => "L2",
            Self::L3 => "L3",
        };
        f.write_str(label)
    }
}

/// Destination of a metering sample in [`MeteringAggregate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterField {
    Energy,
    PhasePower(Phase),
    PhaseCurrent(Phase),
    PhaseVoltage(Phase),
    Temperature,
}

impl MeterField {
    /// Route a `(measurand, phase)` pair. `None` means the sample has no
    /// slot and is ignored by the caller.
    pub fn route(measurand: &str, phase: Option<Phase>) -> Option<Self> {
        match (measurand, phase) {
            (ENERGY_ACTIVE_IMPORT_REGISTER, _) => Some(Self::Energy),
            (POWER_ACTIVE_IMPORT, Some(p)) => Some(Self::PhasePower(p)),
            (CURRENT_IMPORT, Some(p)) => Some(Self::PhaseCurrent(p)),
            (VOLTAGE, Some(p)) => Some(Self::PhaseVoltage(p)),
            (TEMPERATURE, _) => Some(Self::Temperature),
            _ => None,
        }
    }

    /// Convert a sample to the unit stored for this field
    /// (Wh, W, A, V, °C).
    pub fn normalize(self, value: f64, unit: Option<&str>) -> f64 {
        match (self, unit) {
            (Self::Energy, Some("kWh")) => value * 1000.0,
            (Self::PhasePower(_), Some("kW")) => value * 1000.0,
            (Self::Temperature, Some("K")) => value - 273.15,
            (Self::Temperature, Some("Fahrenheit")) => (value - 32.0) * 5.0 / 9.0,
            _ => value,
        }
    }
}

// ── Aggregate ──────────────────────────────────────────────────

/// Latest known metering values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MeteringAggregate {
    pub energy_wh: Option<f64>,
    pub power_w: BTreeMap<Phase, f64>,
    pub current_a: BTreeMap<Phase, f64>,
    pub voltage_v: BTreeMap<Phase, f64>,
    pub temperature_c: Option<f64>,
    /// Sum of the known entries of `power_w`; `None` while none is known.
    pub total_power_w: Option<f64>,
}

impl MeteringAggregate {
    /// Store one normalized sample. Returns whether the stored value changed.
    ///
    /// Does not recompute the total; callers batch samples and call
    /// [`recompute_total_power`](Self::recompute_total_power) once.
    pub fn apply(&mut self, field: MeterField, value: f64) -> bool {
        match field {
            MeterField::Energy => set_if_changed(&mut self.energy_wh, value),
            MeterField::PhasePower(p) => insert_if_changed(&mut self.power_w, p, value),
            MeterField::PhaseCurrent(p) => insert_if_changed(&mut self.current_a, p, value),
            MeterField::PhaseVoltage(p) => insert_if_changed(&mut self.voltage_v, p, value),
            MeterField::Temperature => set_if_changed(&mut self.temperature_c, value),
        }
    }

    /// Recompute the derived total power. Returns whether it changed.
    pub fn recompute_total_power(&mut self) -> bool {
        let total = if self.power_w.is_empty() {
            None
        } else {
            Some(self.power_w.values().sum::<f64>())
        };
        if self.total_power_w == total {
            false
        } else {
            self.total_power_w = total;
            true
        }
    }

    pub fn energy_kwh(&self) -> Option<f64> {
        self.energy_wh.map(wh_to_kwh)
    }
}

fn insert_if_changed(map: &mut BTreeMap<Phase, f64>, phase: Phase, value: f64) -> bool {
    match map.insert(phase, value) {
        Some(previous) => previous != value,
        None => true,
    }
}

/// Wh → kWh, rounded to three decimals.
pub fn wh_to_kwh(wh: f64) -> f64 {
    round3(wh / 1000.0)
}

pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
