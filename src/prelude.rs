pub use anyhow::{anyhow, bail, Result};
pub use log::{debug, error, info, trace, warn};
pub use std::io::Write;
pub use tokio::sync::broadcast;

pub use crate::{
    channels::Channels,
    config::{self, Config, ConfigWrapper},
    error::LinkError,
    inverter::{
        self,
        demo::{DemoGenerator, DemoSwitch},
        parser::{Mode, ModeRecord, StatusRecord},
        poller::{PollStats, Poller},
        store::TelemetryStore,
    },
    options::Options,
    utils::Utils,
};
