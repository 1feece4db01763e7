use crate::prelude::*;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Phase advance per generated sample.
pub const PHASE_STEP: f32 = 0.12;

/// Produces plausible, smoothly varying readings when there is no inverter
/// on the other end of the cable.
#[derive(Debug, Default, Clone)]
pub struct DemoGenerator {
    phase: f32,
}

impl DemoGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    /// Steps the phase once and derives the next record from `previous`.
    pub fn next(&mut self, previous: &StatusRecord) -> StatusRecord {
        self.phase += PHASE_STEP;

        StatusRecord {
            ts_ms: Utils::uptime_ms(),
            ..Self::sample(self.phase, previous)
        }
    }

    /// The synthetic values at phase `t`. Fields without a model are carried
    /// over from `base` untouched.
    pub fn sample(t: f32, base: &StatusRecord) -> StatusRecord {
        StatusRecord {
            grid_voltage: 230.0 + 5.0 * (t * 0.7).sin(),
            load_percent: (35.0 + 25.0 * ((t * 0.5).sin() * 0.5 + 0.5)) as i32,
            batt_voltage: 52.1 + 0.45 * (t * 0.6).sin(),
            batt_charge_current: 8.0 + 3.0 * (t * 0.9).sin(),
            batt_soc: (60.0 + 12.0 * (t * 0.25).sin()) as i32,
            pv_input_current: 10.0 + 4.0 * t.sin(),
            pv_input_voltage: 280.0 + 15.0 * (t * 0.4).sin(),
            pv_charging_power: (1350.0 + 300.0 * t.sin()) as i32,
            ..*base
        }
    }
}

/// Externally owned on/off switch for demo mode, read by the poller once per
/// cycle.
#[derive(Clone, Debug, Default)]
pub struct DemoSwitch(Arc<AtomicBool>);

impl DemoSwitch {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, enabled: bool) {
        if self.0.swap(enabled, Ordering::Relaxed) != enabled {
            info!("demo mode {}", if enabled { "enabled" } else { "disabled" });
        }
    }
}
