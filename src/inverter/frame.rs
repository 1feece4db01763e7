use crate::prelude::*;

use bytes::{BufMut, Bytes, BytesMut};

/// Opening marker of every inverter response.
pub const START: u8 = b'(';
pub const CR: u8 = 0x0D;
pub const LF: u8 = 0x0A;

pub const MAX_TX_LEN: usize = 128;
pub const MAX_RX_LEN: usize = 512;

// checksum bytes that would be confused with framing get bumped by one
const RESERVED: [u8; 3] = [START, CR, LF];

/// One outbound request: `payload || crc_hi || crc_lo || CR`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Frame(Bytes);

impl Frame {
    pub fn encode(payload: &str) -> Result<Self, LinkError> {
        Self::build(&[], payload)
    }

    /// A response as the inverter would send it, `(` included. Mostly useful
    /// for simulating the far end of the link.
    pub fn response(payload: &str) -> Result<Self, LinkError> {
        Self::build(&[START], payload)
    }

    fn build(prefix: &[u8], payload: &str) -> Result<Self, LinkError> {
        let len = prefix.len() + payload.len() + 3;
        if len > MAX_TX_LEN {
            return Err(LinkError::FrameTooLong {
                len,
                max: MAX_TX_LEN,
            });
        }

        let mut buf = BytesMut::with_capacity(len);
        buf.put_slice(prefix);
        buf.put_slice(payload.as_bytes());
        let [hi, lo] = checksum(&buf);
        buf.put_u8(hi);
        buf.put_u8(lo);
        buf.put_u8(CR);

        Ok(Self(buf.freeze()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// CRC-16/XMODEM of `data`, big-endian, with the reserved-byte adjustment
/// applied to both halves.
pub fn checksum(data: &[u8]) -> [u8; 2] {
    let [hi, lo] = crc16::State::<crc16::XMODEM>::calculate(data).to_be_bytes();
    [adjust(hi), adjust(lo)]
}

pub fn adjust(byte: u8) -> u8 {
    if RESERVED.contains(&byte) {
        byte.wrapping_add(1)
    } else {
        byte
    }
}

/// Checks a raw response (`(` + payload + crc + CR) and returns the payload
/// text. Nothing gets parsed unless this succeeds.
pub fn decode_and_validate(raw: &[u8]) -> Result<String, LinkError> {
    if raw.is_empty() {
        return Err(LinkError::NoResponse);
    }
    if raw.len() > MAX_RX_LEN {
        return Err(LinkError::FrameTooLong {
            len: raw.len(),
            max: MAX_RX_LEN,
        });
    }

    let Some((&CR, body)) = raw.split_last() else {
        return Err(LinkError::Incomplete { len: raw.len() });
    };

    // '(' plus two checksum bytes at the very least
    if body.len() < 3 {
        return Err(LinkError::MalformedFrame("response too short"));
    }

    let (data, received) = body.split_at(body.len() - 2);
    let received = [received[0], received[1]];
    let calculated = checksum(data);

    if received != calculated {
        return Err(LinkError::ChecksumMismatch {
            received,
            calculated,
            raw: raw.to_vec(),
        });
    }

    if data[0] != START {
        return Err(LinkError::MalformedFrame("missing opening '('"));
    }

    Ok(String::from_utf8_lossy(&data[1..]).into_owned())
}

/// The payload text of a raw response, if it looks structurally like one.
/// Only used for diagnostics, no checksum involved.
pub fn payload_hint(raw: &[u8]) -> Option<String> {
    let body = raw.strip_suffix(&[CR]).unwrap_or(raw);
    if body.len() < 4 || body[0] != START {
        return None;
    }
    Some(Utils::ascii(&body[1..body.len() - 2]))
}
