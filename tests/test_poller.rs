mod common;
use common::*;
use voltronic_bridge::channels::ChannelData;
use voltronic_bridge::inverter::parser::parse_status;
use voltronic_bridge::inverter::poller::{CycleClock, PollState};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio::time::Instant;

fn with_inverter<F>(respond: F) -> (TelemetryStore, DemoSwitch, Poller<DuplexStream>)
where
    F: FnMut(&str) -> Option<Vec<u8>> + Send + 'static,
{
    common_setup();
    let (near, far) = tokio::io::duplex(1024);
    tokio::spawn(fake_inverter(far, respond));

    let store = TelemetryStore::new();
    let demo = DemoSwitch::new(false);
    let poller = Factory::poller(Some(near), &store, &demo);
    (store, demo, poller)
}

fn stats(poller: &Poller<DuplexStream>) -> PollStats {
    poller.shared_stats().lock().unwrap().clone()
}

fn strip_ts(status: StatusRecord) -> StatusRecord {
    StatusRecord { ts_ms: 0, ..status }
}

#[tokio::test]
async fn healthy_cycle_publishes_everything() {
    let (store, _demo, mut poller) = with_inverter(healthy);

    assert_eq!(poller.poll_once().await, CycleOutcome::Ok);
    assert_eq!(poller.state(), PollState::Settled);

    let telemetry = store.snapshot();
    assert!(telemetry.valid);
    assert_eq!(telemetry.mode.mode, Mode::Line);
    assert_eq!(
        strip_ts(telemetry.status),
        strip_ts(parse_status(Factory::QPIGS_PAYLOAD).unwrap())
    );

    let s = stats(&poller);
    assert_eq!(s.cycles, 1);
    assert_eq!(s.failed_cycles, 0);
    assert_eq!(s.mode_updates, 1);
    assert_eq!(s.status_updates, 1);
}

#[tokio::test]
async fn corrupted_status_invalidates() {
    let statuses = Arc::new(AtomicUsize::new(0));
    let counter = statuses.clone();
    let (store, _demo, mut poller) = with_inverter(move |command| {
        // the first QPIGS is clean, the second has a damaged checksum
        if command == "QPIGS" && counter.fetch_add(1, Ordering::SeqCst) > 0 {
            return Some(Factory::corrupted_qpigs_response());
        }
        healthy(command)
    });

    assert_eq!(poller.poll_once().await, CycleOutcome::Ok);
    assert!(store.get_validity());
    let good = store.get_status();

    assert_eq!(poller.poll_once().await, CycleOutcome::Failed);
    assert!(!store.get_validity());
    assert_eq!(store.get_status(), good);
    assert_eq!(store.get_mode().mode, Mode::Line);

    let s = stats(&poller);
    assert_eq!(s.checksum_mismatches, 1);
    assert_eq!(s.failed_cycles, 1);
    assert_eq!(s.status_updates, 1);
    assert_eq!(
        s.last_checksum_mismatch,
        Some(Factory::corrupted_qpigs_response())
    );
}

#[tokio::test(start_paused = true)]
async fn silent_inverter_is_no_response() {
    let (store, _demo, mut poller) = with_inverter(|_| None);

    assert_eq!(poller.poll_once().await, CycleOutcome::Failed);
    assert!(!store.get_validity());
    assert_eq!(store.get_mode(), ModeRecord::default());

    let s = stats(&poller);
    assert_eq!(s.no_response, 2);
    assert_eq!(s.mode_updates, 0);
}

#[tokio::test(start_paused = true)]
async fn failure_keeps_last_good_record() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let (store, _demo, mut poller) = with_inverter(move |command| {
        // first QPIGS answers, later ones time out
        if command == "QPIGS" && counter.fetch_add(1, Ordering::SeqCst) > 0 {
            return None;
        }
        healthy(command)
    });

    assert_eq!(poller.poll_once().await, CycleOutcome::Ok);
    let good = store.get_status();

    assert_eq!(poller.poll_once().await, CycleOutcome::Failed);
    let telemetry = store.snapshot();
    assert!(!telemetry.valid);
    assert_eq!(telemetry.status, good);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn mode_failure_invalidates_but_keeps_mode() {
    let modes = Arc::new(AtomicUsize::new(0));
    let counter = modes.clone();
    let (store, _demo, mut poller) = with_inverter(move |command| {
        // only the first QMOD gets an answer
        if command == "QMOD" && counter.fetch_add(1, Ordering::SeqCst) > 0 {
            return None;
        }
        healthy(command)
    });

    assert_eq!(poller.poll_once().await, CycleOutcome::Ok);
    assert!(store.get_validity());

    assert_eq!(poller.poll_once().await, CycleOutcome::Failed);
    assert!(!store.get_validity());
    assert_eq!(store.get_mode().mode, Mode::Line);

    let s = stats(&poller);
    assert_eq!(s.no_response, 1);
    assert_eq!(s.mode_updates, 1);
    assert_eq!(s.status_updates, 2);
    assert_eq!(s.failed_cycles, 1);
}

#[tokio::test(start_paused = true)]
async fn mode_failure_on_first_cycle() {
    let (store, _demo, mut poller) = with_inverter(|command| match command {
        "QMOD" => None,
        other => healthy(other),
    });

    assert_eq!(poller.poll_once().await, CycleOutcome::Failed);
    assert!(!store.get_validity());
    assert_eq!(store.get_mode(), ModeRecord::default());
    assert_eq!(stats(&poller).mode_updates, 0);
}

#[tokio::test]
async fn short_status_is_rejected() {
    let short: String = Factory::QPIGS_PAYLOAD
        .split(' ')
        .take(20)
        .collect::<Vec<_>>()
        .join(" ");
    let (store, _demo, mut poller) = with_inverter(move |command| match command {
        "QPIGS" => Some(Frame::response(&short).unwrap().as_bytes().to_vec()),
        other => healthy(other),
    });

    assert_eq!(poller.poll_once().await, CycleOutcome::Failed);
    assert!(!store.get_validity());
    assert_eq!(stats(&poller).insufficient_fields, 1);
}

#[tokio::test]
async fn unknown_mode_is_kept() {
    let (store, _demo, mut poller) = with_inverter(|command| match command {
        "QMOD" => Some(Factory::qmod_response("D")),
        other => healthy(other),
    });

    assert_eq!(poller.poll_once().await, CycleOutcome::Ok);
    let mode = store.get_mode();
    assert_eq!(mode.code, 'D');
    assert_eq!(mode.mode, Mode::Unknown);
}

#[tokio::test]
async fn demo_mode_skips_the_link() {
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = requests.clone();
    let (store, demo, mut poller) = with_inverter(move |command| {
        counter.fetch_add(1, Ordering::SeqCst);
        healthy(command)
    });
    demo.set(true);

    for _ in 0..3 {
        assert_eq!(poller.poll_once().await, CycleOutcome::Demo);
        assert!(store.get_validity());
    }
    assert_eq!(poller.state(), PollState::Idle);
    assert_eq!(requests.load(Ordering::SeqCst), 0);

    let s = stats(&poller);
    assert_eq!(s.demo_cycles, 3);
    assert_eq!(s.cycles, 3);

    // back to the real thing
    demo.set(false);
    assert_eq!(poller.poll_once().await, CycleOutcome::Ok);
    assert_eq!(requests.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn demo_without_serial_port() {
    common_setup();
    let store = TelemetryStore::new();
    let demo = DemoSwitch::new(true);
    let mut poller = Factory::poller(None, &store, &demo);

    assert_eq!(poller.poll_once().await, CycleOutcome::Demo);
    assert!(store.get_validity());
    assert_eq!(store.get_status().grid_voltage, 230.0 + 5.0 * (0.12f32 * 0.7).sin());
}

#[tokio::test]
async fn missing_port_fails_real_cycles() {
    common_setup();
    let store = TelemetryStore::new();
    let demo = DemoSwitch::new(false);
    let mut poller = Factory::poller(None, &store, &demo);

    assert_eq!(poller.poll_once().await, CycleOutcome::Failed);
    assert!(!store.get_validity());
    assert_eq!(stats(&poller).io_errors, 2);
}

#[test]
fn clock_deadlines_do_not_drift() {
    let start = Instant::now();
    let mut clock = CycleClock::new(start, Duration::from_millis(3000));

    for n in 0..100u64 {
        assert_eq!(clock.next_deadline(), start + Duration::from_millis(3000 * n));
    }
    assert_eq!(clock.cycle(), 100);
    assert_eq!(clock.deadline(1000), start + Duration::from_secs(3000));
}

#[test]
fn clock_skips_overrun_cycles() {
    let start = Instant::now();
    let period = Duration::from_millis(300);
    let mut clock = CycleClock::new(start, period);

    assert_eq!(clock.next_deadline(), start);
    // on time, nothing to drop
    assert_eq!(clock.skip_missed(start + Duration::from_millis(100)), 0);
    assert_eq!(clock.skip_missed(start + period), 0);

    // cycle 0 ran until 400ms, so the 300ms slot is gone
    assert_eq!(clock.skip_missed(start + Duration::from_millis(400)), 1);
    assert_eq!(clock.next_deadline(), start + Duration::from_millis(600));

    assert_eq!(clock.skip_missed(start + Duration::from_millis(1700)), 3);
    assert_eq!(clock.next_deadline(), start + Duration::from_millis(1800));
}

#[tokio::test(start_paused = true)]
async fn overrunning_cycles_stay_on_the_grid() {
    common_setup();
    let (near, far) = tokio::io::duplex(1024);
    tokio::spawn(fake_inverter(far, |_| None));

    let channels = Channels::new();
    // two silent queries take 400ms against a 300ms interval
    let mut poller = Poller::new(
        Some(Transport::new(near)),
        TelemetryStore::new(),
        DemoSwitch::new(false),
        PollSettings {
            poll_interval: Duration::from_millis(300),
            read_timeout: Duration::from_millis(200),
        },
        channels.clone(),
    );
    let stats = poller.shared_stats();

    let mut events = channels.from_poller.subscribe();
    let started = Instant::now();
    let handle = tokio::spawn(async move { poller.start().await });

    for finished in [400u64, 1000, 1600] {
        assert_eq!(
            events.recv().await.unwrap(),
            ChannelData::CycleComplete(CycleOutcome::Failed)
        );
        assert_eq!(started.elapsed(), Duration::from_millis(finished));
    }

    channels.shutdown.send(()).unwrap();
    assert_eq!(events.recv().await.unwrap(), ChannelData::Shutdown);
    handle.await.unwrap().unwrap();

    let stats = stats.lock().unwrap().clone();
    assert_eq!(stats.cycles, 3);
    assert_eq!(stats.missed_cycles, 3);
}

#[tokio::test(start_paused = true)]
async fn cycles_start_on_fixed_schedule() {
    common_setup();
    let (near, far) = tokio::io::duplex(1024);
    tokio::spawn(fake_inverter(far, healthy));

    let channels = Channels::new();
    let store = TelemetryStore::new();
    let mut poller = Poller::new(
        Some(Transport::new(near)),
        store.clone(),
        DemoSwitch::new(false),
        Factory::settings(),
        channels.clone(),
    );

    let mut events = channels.from_poller.subscribe();
    let started = Instant::now();
    let handle = tokio::spawn(async move { poller.start().await });

    for n in 0..4u64 {
        let event = events.recv().await.unwrap();
        assert_eq!(event, ChannelData::CycleComplete(CycleOutcome::Ok));
        assert_eq!(started.elapsed(), Duration::from_millis(3000 * n));
    }

    channels.shutdown.send(()).unwrap();
    assert_eq!(events.recv().await.unwrap(), ChannelData::Shutdown);
    handle.await.unwrap().unwrap();
    assert!(store.get_validity());
}

#[tokio::test(start_paused = true)]
async fn demo_switch_applies_from_next_cycle() {
    common_setup();
    let channels = Channels::new();
    let demo = DemoSwitch::new(false);
    // no port: every query fails at once with an I/O error
    let mut poller: Poller<DuplexStream> = Poller::new(
        None,
        TelemetryStore::new(),
        demo.clone(),
        PollSettings {
            poll_interval: Duration::from_millis(500),
            read_timeout: Duration::from_millis(100),
        },
        channels.clone(),
    );

    let mut events = channels.from_poller.subscribe();
    let started = Instant::now();
    let handle = tokio::spawn(async move { poller.start().await });

    let mut outcomes = Vec::new();
    for n in 0..6u64 {
        if n == 3 {
            demo.set(true);
        }
        match events.recv().await.unwrap() {
            ChannelData::CycleComplete(outcome) => outcomes.push(outcome),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(started.elapsed(), Duration::from_millis(500 * n));
    }

    channels.shutdown.send(()).unwrap();
    assert_eq!(events.recv().await.unwrap(), ChannelData::Shutdown);
    handle.await.unwrap().unwrap();

    assert_eq!(&outcomes[..3], &[CycleOutcome::Failed; 3]);
    assert!(outcomes[3..].iter().all(|o| *o == CycleOutcome::Demo));
}
