use crate::prelude::*;
use crate::channels::ChannelData;
use crate::inverter::frame::{self, Frame, MAX_RX_LEN};
use crate::inverter::parser;
use crate::inverter::transport::Transport;

use {
    std::sync::{Arc, Mutex},
    std::time::Duration,
    tokio::io::{AsyncRead, AsyncWrite},
    tokio::time::Instant,
};

pub const QUERY_MODE: &str = "QMOD";
pub const QUERY_STATUS: &str = "QPIGS";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    QueryingMode,
    QueryingStatus,
    Settled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// both queries answered and parsed
    Ok,
    /// at least one query failed; whatever did succeed was still published,
    /// but the data is flagged invalid
    Failed,
    /// synthetic data was published instead of polling
    Demo,
}

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub poll_interval: Duration,
    pub read_timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

// PollStats {{{
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollStats {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub demo_cycles: u64,
    /// cycles dropped because an earlier one overran the interval
    pub missed_cycles: u64,
    pub mode_updates: u64,
    pub status_updates: u64,
    // per failure kind
    pub no_response: u64,
    pub incomplete: u64,
    pub checksum_mismatches: u64,
    pub malformed: u64,
    pub insufficient_fields: u64,
    pub io_errors: u64,
    /// last time a checksum mismatch was dumped, raw bytes included
    pub last_checksum_mismatch: Option<Vec<u8>>,
}

impl PollStats {
    pub fn record_error(&mut self, err: &LinkError) {
        match err {
            LinkError::NoResponse => self.no_response += 1,
            LinkError::Incomplete { .. } => self.incomplete += 1,
            LinkError::ChecksumMismatch { raw, .. } => {
                self.checksum_mismatches += 1;
                self.last_checksum_mismatch = Some(raw.clone());
            }
            LinkError::MalformedFrame(_) | LinkError::FrameTooLong { .. } => self.malformed += 1,
            LinkError::InsufficientFields { .. } => self.insufficient_fields += 1,
            LinkError::Io(_) => self.io_errors += 1,
        }
    }

    pub fn print_summary(&self) {
        info!("Poll Statistics:");
        info!(
            "  Cycles: {} ({} failed, {} demo, {} missed)",
            self.cycles, self.failed_cycles, self.demo_cycles, self.missed_cycles
        );
        info!("  Mode updates: {}", self.mode_updates);
        info!("  Status updates: {}", self.status_updates);
        info!("  Failures:");
        info!("    No response: {}", self.no_response);
        info!("    Incomplete: {}", self.incomplete);
        info!("    CRC mismatch: {}", self.checksum_mismatches);
        info!("    Malformed: {}", self.malformed);
        info!("    Insufficient fields: {}", self.insufficient_fields);
        info!("    I/O errors: {}", self.io_errors);
    }
} // }}}

// CycleClock {{{
/// Fixed-rate schedule: cycle `n` is due at `start + n * period`, no matter
/// how long earlier cycles took.
#[derive(Debug, Clone, Copy)]
pub struct CycleClock {
    start: Instant,
    period: Duration,
    cycle: u32,
}

impl CycleClock {
    pub fn new(start: Instant, period: Duration) -> Self {
        Self {
            start,
            period,
            cycle: 0,
        }
    }

    pub fn deadline(&self, cycle: u32) -> Instant {
        self.start + self.period * cycle
    }

    /// Deadline of the next cycle, advancing the counter.
    pub fn next_deadline(&mut self) -> Instant {
        let deadline = self.deadline(self.cycle);
        self.cycle += 1;
        deadline
    }

    /// Drops every cycle whose deadline is already behind `now`, so an overrun
    /// resumes on the next grid point instead of firing the backlog back to
    /// back. Returns how many were dropped.
    pub fn skip_missed(&mut self, now: Instant) -> u32 {
        if self.period.is_zero() || now <= self.start {
            return 0;
        }

        let elapsed = now.duration_since(self.start).as_nanos();
        let period = self.period.as_nanos();
        let due = ((elapsed + period - 1) / period).min(u32::MAX as u128) as u32;

        let skipped = due.saturating_sub(self.cycle);
        self.cycle = self.cycle.max(due);
        skipped
    }

    pub fn cycle(&self) -> u32 {
        self.cycle
    }
} // }}}

/// Owns the serial link and keeps the TelemetryStore up to date.
pub struct Poller<S> {
    transport: Option<Transport<S>>,
    store: TelemetryStore,
    demo: DemoSwitch,
    generator: DemoGenerator,
    settings: PollSettings,
    channels: Channels,
    stats: Arc<Mutex<PollStats>>,
    state: PollState,
}

impl<S> Poller<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// `transport` may be `None` when running demo-only; real cycles then
    /// fail with an I/O error.
    pub fn new(
        transport: Option<Transport<S>>,
        store: TelemetryStore,
        demo: DemoSwitch,
        settings: PollSettings,
        channels: Channels,
    ) -> Self {
        Self {
            transport,
            store,
            demo,
            generator: DemoGenerator::new(),
            settings,
            channels,
            stats: Arc::new(Mutex::new(PollStats::default())),
            state: PollState::Idle,
        }
    }

    pub fn shared_stats(&self) -> Arc<Mutex<PollStats>> {
        self.stats.clone()
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub async fn start(&mut self) -> Result<()> {
        let mut shutdown = self.channels.shutdown.subscribe();
        let mut clock = CycleClock::new(Instant::now(), self.settings.poll_interval);

        info!(
            "poller starting, interval {}ms, read timeout {}ms",
            self.settings.poll_interval.as_millis(),
            self.settings.read_timeout.as_millis()
        );

        loop {
            let deadline = clock.next_deadline();

            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {}
                _ = shutdown.recv() => break,
            }

            let outcome = self.poll_once().await;
            let _ = self
                .channels
                .from_poller
                .send(ChannelData::CycleComplete(outcome));

            let skipped = clock.skip_missed(Instant::now());
            if skipped > 0 {
                warn!("[INV] poll cycle overran the interval, skipped {} cycles", skipped);
                self.with_stats(|s| s.missed_cycles += u64::from(skipped));
            }
        }

        let _ = self.channels.from_poller.send(ChannelData::Shutdown);
        info!("poller exiting at cycle {}", clock.cycle());

        Ok(())
    }

    /// Runs a single cycle: demo tick, or QMOD then QPIGS.
    pub async fn poll_once(&mut self) -> CycleOutcome {
        self.with_stats(|s| s.cycles += 1);

        if self.demo.is_enabled() {
            self.demo_tick();
            self.state = PollState::Idle;
            return CycleOutcome::Demo;
        }

        let mut failed = false;

        self.state = PollState::QueryingMode;
        match self.query(QUERY_MODE).await.map(|p| parser::parse_mode(&p)) {
            Ok(mode) => {
                debug!("mode {}", mode);
                self.store.publish_mode(mode);
                self.with_stats(|s| s.mode_updates += 1);
            }
            Err(err) => {
                self.report(QUERY_MODE, &err);
                failed = true;
            }
        }

        self.state = PollState::QueryingStatus;
        match self
            .query(QUERY_STATUS)
            .await
            .and_then(|p| parser::parse_status(&p))
        {
            Ok(status) => {
                self.store.publish_status(status);
                self.with_stats(|s| s.status_updates += 1);
            }
            Err(err) => {
                self.report(QUERY_STATUS, &err);
                failed = true;
            }
        }

        self.state = PollState::Settled;

        if failed {
            // either query failing makes the whole reading stale; the mode
            // keeps its last value
            self.store.mark_invalid();
            self.with_stats(|s| s.failed_cycles += 1);
            warn!("[INV] poll cycle failed");
            CycleOutcome::Failed
        } else {
            CycleOutcome::Ok
        }
    }

    fn demo_tick(&mut self) {
        let previous = self.store.get_status();
        let status = self.generator.next(&previous);
        // demo data always counts as valid
        self.store.publish_status(status);
        self.with_stats(|s| s.demo_cycles += 1);
    }

    async fn query(&mut self, command: &str) -> Result<String, LinkError> {
        let timeout = self.settings.read_timeout;
        let transport = self.transport.as_mut().ok_or_else(|| {
            LinkError::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "serial port not open",
            ))
        })?;

        let frame = Frame::encode(command)?;
        trace!("[INV] TX {}: {}", command, Utils::hex(frame.as_bytes()));
        transport.write_frame(&frame).await?;

        let raw = transport.read_until_terminator(MAX_RX_LEN, timeout).await?;
        trace!("[INV] RX {}: {}", command, Utils::hex(&raw));

        frame::decode_and_validate(&raw)
    }

    fn report(&self, command: &str, err: &LinkError) {
        self.with_stats(|s| s.record_error(err));

        match err.raw() {
            Some(raw) => {
                error!("[INV] {} for cmd '{}'", err, command);
                if let Some(payload) = frame::payload_hint(raw) {
                    error!("[INV] RX (payload): {}", payload);
                }
                error!("[INV] RX (hex): {}", Utils::hex(raw));
                error!("[INV] RX (ascii): {}", Utils::ascii(raw));
            }
            None => warn!("[INV] {} for cmd '{}'", err, command),
        }
    }

    fn with_stats(&self, f: impl FnOnce(&mut PollStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            f(&mut stats);
        }
    }
}
