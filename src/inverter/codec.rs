use crate::prelude::*;
use crate::inverter::frame::CR;

use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// Splits an inbound byte stream into raw responses at the CR terminator.
///
/// No validation happens here: a chunk that reaches `max_len` without a CR is
/// handed out as-is and left for the frame checks to reject.
#[derive(Debug, Clone, Copy)]
pub struct ResponseDecoder {
    max_len: usize,
}

impl ResponseDecoder {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len: max_len.max(1),
        }
    }
}

impl Decoder for ResponseDecoder {
    type Item = BytesMut;
    type Error = LinkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let window = src.len().min(self.max_len);

        if let Some(pos) = src[..window].iter().position(|&b| b == CR) {
            return Ok(Some(src.split_to(pos + 1)));
        }

        if src.len() >= self.max_len {
            return Ok(Some(src.split_to(self.max_len)));
        }

        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Ok(Some(src.split())),
        }
    }
}
