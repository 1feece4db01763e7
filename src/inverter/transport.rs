use crate::prelude::*;
use crate::inverter::codec::ResponseDecoder;
use crate::inverter::frame::Frame;

use {
    bytes::BytesMut,
    futures::FutureExt,
    std::time::Duration,
    tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    tokio::time::Instant,
    tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits},
    tokio_util::codec::Decoder,
};

pub const DEFAULT_BAUD_RATE: u32 = 2400;

/// Opens the inverter's RS232 port, 8N1 with no flow control.
pub fn open_serial(path: &str, baud_rate: u32) -> Result<Transport<SerialStream>> {
    info!("Opening serial port {} at {} baud", path, baud_rate);

    let stream = tokio_serial::new(path, baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .open_native_async()
        .map_err(|err| anyhow!("failed to open serial port {}: {}", path, err))?;

    Ok(Transport::new(stream))
}

/// Half-duplex byte pipe to the inverter. Knows about the CR terminator and
/// nothing else about the protocol.
pub struct Transport<S> {
    stream: S,
    buf: BytesMut,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(crate::inverter::frame::MAX_RX_LEN),
        }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Sends a whole frame. Anything still sitting in the input buffer is
    /// thrown away first so it can't be mistaken for the reply.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), LinkError> {
        let discarded = self.discard_input()?;
        if discarded > 0 {
            debug!("discarded {} stale bytes before TX", discarded);
        }

        self.stream.write_all(frame.as_bytes()).await?;
        self.stream.flush().await?;

        Ok(())
    }

    /// Accumulates bytes until CR, `max_len` or `timeout`, whichever comes
    /// first. Whatever arrived is returned, possibly nothing.
    pub async fn read_until_terminator(
        &mut self,
        max_len: usize,
        timeout: Duration,
    ) -> Result<BytesMut, LinkError> {
        let mut decoder = ResponseDecoder::new(max_len);
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(frame) = decoder.decode(&mut self.buf)? {
                return Ok(frame);
            }

            match tokio::time::timeout_at(deadline, self.stream.read_buf(&mut self.buf)).await {
                Ok(Ok(0)) => break, // peer went away
                Ok(Ok(_)) => continue,
                Ok(Err(err)) => return Err(err.into()),
                Err(_) => break, // timed out
            }
        }

        Ok(decoder.decode_eof(&mut self.buf)?.unwrap_or_default())
    }

    // drain whatever can be read right now without waiting
    fn discard_input(&mut self) -> Result<usize, LinkError> {
        let mut discarded = self.buf.len();
        self.buf.clear();

        let mut scratch = [0u8; 64];
        while let Some(read) = self.stream.read(&mut scratch).now_or_never() {
            match read? {
                0 => break,
                n => discarded += n,
            }
        }

        Ok(discarded)
    }
}
