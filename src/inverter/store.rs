use crate::prelude::*;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Everything the store holds, copied out in one piece.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Telemetry {
    pub status: StatusRecord,
    pub valid: bool,
    pub mode: ModeRecord,
}

/// Latest inverter readings, shared between the poller (the only writer) and
/// any number of readers.
///
/// The lock is only ever held to copy a record in or out; callers format,
/// log and do I/O on their own copies.
#[derive(Clone, Default)]
pub struct TelemetryStore {
    inner: Arc<Mutex<Telemetry>>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Telemetry> {
        // a panicking reader can't leave a half written record behind, every
        // write is a single assignment
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_status(&self) -> StatusRecord {
        self.lock().status
    }

    pub fn get_validity(&self) -> bool {
        self.lock().valid
    }

    pub fn get_mode(&self) -> ModeRecord {
        self.lock().mode
    }

    pub fn snapshot(&self) -> Telemetry {
        *self.lock()
    }

    /// Replaces the status record and marks the data valid.
    pub fn publish_status(&self, status: StatusRecord) {
        let mut telemetry = self.lock();
        telemetry.status = status;
        telemetry.valid = true;
    }

    pub fn publish_mode(&self, mode: ModeRecord) {
        self.lock().mode = mode;
    }

    /// Flags the data as stale. The last good record stays in place.
    pub fn mark_invalid(&self) {
        self.lock().valid = false;
    }
}
