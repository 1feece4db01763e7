use thiserror::Error;

/// Everything that can go wrong with one query on the inverter link.
///
/// None of these are fatal: the poller logs them, counts them and carries on
/// with the next query.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("no response")]
    NoResponse,

    #[error("incomplete response ({len} bytes, no CR)")]
    Incomplete { len: usize },

    #[error(
        "CRC mismatch - recv: {:02X} {:02X} calc: {:02X} {:02X}",
        .received[0], .received[1], .calculated[0], .calculated[1]
    )]
    ChecksumMismatch {
        received: [u8; 2],
        calculated: [u8; 2],
        raw: Vec<u8>,
    },

    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),

    #[error("insufficient fields: got {found}, need {expected}")]
    InsufficientFields { found: usize, expected: usize },

    #[error("frame too long: {len} bytes (max {max})")]
    FrameTooLong { len: usize, max: usize },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl LinkError {
    /// Raw bytes worth dumping to the log, if this error carries any.
    pub fn raw(&self) -> Option<&[u8]> {
        match self {
            LinkError::ChecksumMismatch { raw, .. } => Some(raw),
            _ => None,
        }
    }
}
