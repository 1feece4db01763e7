use crate::prelude::*;
use crate::inverter::store::Telemetry;

use serde::Serialize;

/// Human readable status block for the diagnostics log.
pub fn snapshot_lines(telemetry: &Telemetry) -> Vec<String> {
    let s = &telemetry.status;
    let mut lines = vec!["--- Inverter Status Snapshot ---".to_string()];

    if !telemetry.valid {
        lines.push("Read failed, no data available".to_string());
    } else {
        lines.push(format!("Mode: {}", telemetry.mode));
        lines.push(format!("Grid V: {:.2} V, Grid F: {:.2} Hz", s.grid_voltage, s.grid_frequency));
        lines.push(format!("AC Out V: {:.2} V, AC Out F: {:.2} Hz", s.ac_out_voltage, s.ac_out_frequency));
        lines.push(format!(
            "Apparent VA: {} VA, Active W: {} W, Load %: {}",
            s.ac_apparent_va, s.ac_active_w, s.load_percent
        ));
        lines.push(format!(
            "BUS V: {:.2} V, Batt V: {:.2} V, Batt Charge I: {:.2} A, Batt SOC: {} %",
            s.bus_voltage, s.batt_voltage, s.batt_charge_current, s.batt_soc
        ));
        lines.push(format!(
            "Heatsink: {:.2} C, PV I: {:.2} A, PV V: {:.2} V",
            s.heatsink_temp, s.pv_input_current, s.pv_input_voltage
        ));
        lines.push(format!(
            "Batt V from SCC: {:.2} V, Batt Disch I: {:.2} A",
            s.batt_voltage_from_scc, s.batt_discharge_current
        ));
        lines.push(format!(
            "Device status bits: 0x{:02X}, Additional status bits: 0x{:02X}",
            s.device_status_bits, s.additional_status_bits
        ));
        lines.push(format!(
            "Batt fan offset: {} (10mV), EEPROM ver: {}, PV charging power: {} W",
            s.batt_fan_offset_10mv, s.eeprom_version, s.pv_charging_power
        ));
        lines.push(format!("Timestamp: {} ms", s.ts_ms));
    }

    lines.push("---------------------------------".to_string());
    lines
}

pub fn log_snapshot(telemetry: &Telemetry) {
    for line in snapshot_lines(telemetry) {
        info!("{}", line);
    }
}

/// Status document pushed to network clients. When the data is stale the
/// readings are `null` so clients show a placeholder instead of old numbers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusDocument {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub valid: bool,
    pub demo: bool,
    pub mode_code: String,
    pub mode_name: &'static str,
    pub pv_w: Option<i32>,
    pub batt_soc: Option<i32>,
    pub batt_v: Option<f32>,
    pub load_w: Option<i32>,
    pub grid_ok: bool,
    pub state: &'static str,
    pub ts_ms: u64,
}

impl StatusDocument {
    pub fn new(telemetry: &Telemetry, demo: bool) -> Self {
        let s = &telemetry.status;
        let valid = telemetry.valid;
        let reading = |v| if valid { Some(v) } else { None };

        let state = if demo {
            "Demo"
        } else if valid {
            "Running"
        } else {
            "No data"
        };

        Self {
            kind: "status",
            valid,
            demo,
            mode_code: telemetry.mode.display_code().to_string(),
            mode_name: telemetry.mode.name(),
            pv_w: reading(s.pv_charging_power),
            batt_soc: reading(s.batt_soc),
            batt_v: if valid { Some(s.batt_voltage) } else { None },
            load_w: reading(s.ac_active_w),
            grid_ok: valid && s.grid_voltage > 0.0,
            state,
            ts_ms: s.ts_ms,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
