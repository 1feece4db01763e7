#![allow(dead_code)]

pub use voltronic_bridge::prelude::*;
pub use voltronic_bridge::inverter::frame::{self, Frame, CR};
pub use voltronic_bridge::inverter::poller::{CycleOutcome, PollSettings};
pub use voltronic_bridge::inverter::transport::Transport;

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

pub fn common_setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct Factory;

impl Factory {
    /// QPIGS reply body from a PIP-type inverter running on grid with PV
    pub const QPIGS_PAYLOAD: &'static str = "224.0 50.0 230.0 50.0 0414 0361 008 394.0 51.20 012 062 0042.1 03.6 140.5 00.00 000.0 00000110 00 02 01200 00000010";

    pub fn qpigs_response() -> Vec<u8> {
        Frame::response(Self::QPIGS_PAYLOAD).unwrap().as_bytes().to_vec()
    }

    pub fn qmod_response(code: &str) -> Vec<u8> {
        Frame::response(code).unwrap().as_bytes().to_vec()
    }

    /// QPIGS reply with the low checksum byte damaged
    pub fn corrupted_qpigs_response() -> Vec<u8> {
        let mut raw = Self::qpigs_response();
        let lo = raw.len() - 2;
        raw[lo] ^= 0x01;
        raw
    }

    pub fn settings() -> PollSettings {
        PollSettings {
            poll_interval: Duration::from_millis(3000),
            read_timeout: Duration::from_millis(200),
        }
    }

    pub fn poller(
        stream: Option<DuplexStream>,
        store: &TelemetryStore,
        demo: &DemoSwitch,
    ) -> Poller<DuplexStream> {
        Poller::new(
            stream.map(Transport::new),
            store.clone(),
            demo.clone(),
            Self::settings(),
            Channels::new(),
        )
    }
}

/// Plays the inverter on the far end of a duplex pipe: reads CR terminated
/// requests, checks their checksum and answers with whatever `respond`
/// returns for the command (nothing for `None`).
pub async fn fake_inverter<F>(mut stream: DuplexStream, mut respond: F)
where
    F: FnMut(&str) -> Option<Vec<u8>> + Send + 'static,
{
    let mut request = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        match stream.read(&mut byte).await {
            Ok(0) | Err(_) => return,
            Ok(_) => request.push(byte[0]),
        }

        if byte[0] != CR {
            continue;
        }

        assert!(request.len() >= 3, "request too short: {:?}", request);
        let body = &request[..request.len() - 3];
        let crc = &request[request.len() - 3..request.len() - 1];
        assert_eq!(crc, frame::checksum(body), "bad request checksum");

        let command = String::from_utf8_lossy(body).into_owned();
        request.clear();

        if let Some(reply) = respond(&command) {
            if stream.write_all(&reply).await.is_err() {
                return;
            }
        }
    }
}

/// Standard healthy inverter: line mode, full QPIGS.
pub fn healthy(command: &str) -> Option<Vec<u8>> {
    match command {
        "QMOD" => Some(Factory::qmod_response("L")),
        "QPIGS" => Some(Factory::qpigs_response()),
        _ => None,
    }
}
