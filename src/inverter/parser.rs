use crate::prelude::*;

use num_enum::{FromPrimitive, IntoPrimitive};
use serde::{Serialize, Serializer};

/// QPIGS must carry at least this many tokens for the record to count.
pub const STATUS_FIELD_COUNT: usize = 21;

/// Mode code used when QMOD came back empty.
pub const NO_MODE_CODE: char = '\0';

// Mode {{{
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Mode {
    PowerOn = 0x50,     // P
    Standby = 0x53,     // S
    Line = 0x4C,        // L
    Battery = 0x42,     // B
    Fault = 0x46,       // F
    PowerSaving = 0x48, // H
    #[num_enum(default)]
    Unknown = 0x3F, // ?
}

impl Mode {
    pub fn from_code(code: char) -> Self {
        if code.is_ascii() {
            Self::from(code as u8)
        } else {
            Self::Unknown
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::PowerOn => "Power On",
            Self::Standby => "Standby",
            Self::Line => "Line",
            Self::Battery => "Battery",
            Self::Fault => "Fault",
            Self::PowerSaving => "Power Saving",
            Self::Unknown => "Unknown",
        }
    }
}

impl Serialize for Mode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.name())
    }
} // }}}

// ModeRecord {{{
/// Result of one QMOD query. The code is kept exactly as received, even when
/// it isn't one we know.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ModeRecord {
    pub code: char,
    pub mode: Mode,
}

impl ModeRecord {
    pub fn name(&self) -> &'static str {
        self.mode.name()
    }

    /// The code as shown to people; the empty sentinel displays as `?`.
    pub fn display_code(&self) -> char {
        if self.code == NO_MODE_CODE {
            '?'
        } else {
            self.code
        }
    }
}

impl Default for ModeRecord {
    fn default() -> Self {
        Self {
            code: NO_MODE_CODE,
            mode: Mode::Unknown,
        }
    }
}

impl std::fmt::Display for ModeRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.display_code(), self.name())
    }
} // }}}

// StatusRecord {{{
/// One complete QPIGS reading. Built in one go and replaced wholesale.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct StatusRecord {
    pub grid_voltage: f32,           // V
    pub grid_frequency: f32,         // Hz
    pub ac_out_voltage: f32,         // V
    pub ac_out_frequency: f32,       // Hz
    pub ac_apparent_va: i32,         // VA
    pub ac_active_w: i32,            // W
    pub load_percent: i32,           // %
    pub bus_voltage: f32,            // V
    pub batt_voltage: f32,           // V
    pub batt_charge_current: f32,    // A
    pub batt_soc: i32,               // %
    pub heatsink_temp: f32,          // C
    pub pv_input_current: f32,       // A
    pub pv_input_voltage: f32,       // V
    pub batt_voltage_from_scc: f32,  // V
    pub batt_discharge_current: f32, // A
    /// low byte of the device status token taken as a decimal number
    pub device_status_bits: u8,
    pub batt_fan_offset_10mv: i32,
    pub eeprom_version: i32,
    pub pv_charging_power: i32, // W
    /// same treatment as `device_status_bits`
    pub additional_status_bits: u8,
    /// monotonic milliseconds at parse time
    pub ts_ms: u64,
} // }}}

/// First character of the QMOD payload is the mode code.
pub fn parse_mode(payload: &str) -> ModeRecord {
    let code = payload.chars().next().unwrap_or(NO_MODE_CODE);

    ModeRecord {
        code,
        mode: Mode::from_code(code),
    }
}

/// Maps the space separated QPIGS tokens positionally onto a StatusRecord.
/// Extra trailing tokens are ignored; too few is an error and no record is
/// produced.
pub fn parse_status(payload: &str) -> Result<StatusRecord, LinkError> {
    let tokens: Vec<&str> = payload.split(' ').filter(|t| !t.is_empty()).collect();

    if tokens.len() < STATUS_FIELD_COUNT {
        return Err(LinkError::InsufficientFields {
            found: tokens.len(),
            expected: STATUS_FIELD_COUNT,
        });
    }

    let f = |i: usize| Utils::lenient_f32(tokens[i]);
    let n = |i: usize| Utils::lenient_i32(tokens[i]);

    Ok(StatusRecord {
        grid_voltage: f(0),
        grid_frequency: f(1),
        ac_out_voltage: f(2),
        ac_out_frequency: f(3),
        ac_apparent_va: n(4),
        ac_active_w: n(5),
        load_percent: n(6),
        bus_voltage: f(7),
        batt_voltage: f(8),
        batt_charge_current: f(9),
        batt_soc: n(10),
        heatsink_temp: f(11),
        pv_input_current: f(12),
        pv_input_voltage: f(13),
        batt_voltage_from_scc: f(14),
        batt_discharge_current: f(15),
        device_status_bits: Utils::lenient_low_byte(tokens[16]),
        batt_fan_offset_10mv: n(17),
        eeprom_version: n(18),
        pv_charging_power: n(19),
        additional_status_bits: Utils::lenient_low_byte(tokens[20]),
        ts_ms: Utils::uptime_ms(),
    })
}
