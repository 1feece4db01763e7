use crate::prelude::*;
use crate::inverter::poller::CycleOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelData {
    CycleComplete(CycleOutcome),
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct Channels {
    pub from_poller: broadcast::Sender<ChannelData>,
    pub shutdown: broadcast::Sender<()>,
}

impl Default for Channels {
    fn default() -> Self {
        Self::new()
    }
}

impl Channels {
    pub fn new() -> Self {
        Self {
            from_poller: Self::channel(),
            shutdown: Self::channel(),
        }
    }

    fn channel<T: Clone>() -> broadcast::Sender<T> {
        broadcast::channel(64).0
    }
}
