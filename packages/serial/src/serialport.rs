use crate::binding::SerialBinding;
use crate::error::Result;
use crate::frame::RawSerialFrame;
use bytes::{Buf, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use zwh_core::parse::ParseError;
use zwh_core::serialize::Serializable;

const BAUD_RATE: u32 = 115_200;
const READ_CHUNK_SIZE: usize = 256;

/// After this long without completing a partial data frame, the buffered
/// bytes are discarded and framing starts over
pub const FRAME_RECEIVE_TIMEOUT: Duration = Duration::from_millis(1500);

/// The production [SerialBinding] on top of a real serial port
pub struct SerialPortBinding {
    port: SerialStream,
    buffer: BytesMut,
}

impl SerialPortBinding {
    pub fn open(path: &str) -> Result<Self> {
        let port = tokio_serial::new(path, BAUD_RATE).open_native_async()?;
        Ok(Self {
            port,
            buffer: BytesMut::with_capacity(512),
        })
    }

    /// Tries to split one frame off the front of the buffer
    fn try_parse(&mut self) -> Option<RawSerialFrame> {
        if self.buffer.is_empty() {
            return None;
        }
        let mut input = self.buffer.clone().freeze();
        match RawSerialFrame::parse(&mut input) {
            Ok(frame) => {
                let consumed = self.buffer.len() - input.len();
                self.buffer.advance(consumed);
                Some(frame)
            }
            Err(ParseError::Incomplete(_)) => None,
            Err(_) => {
                // Should not happen - unparseable bytes come back as
                // Garbage. Skip one byte to make progress regardless.
                self.buffer.advance(1);
                None
            }
        }
    }
}

impl SerialBinding for SerialPortBinding {
    async fn write(&mut self, frame: RawSerialFrame) -> Result<()> {
        self.port.write_all(&frame.as_bytes()).await?;
        self.port.flush().await?;
        Ok(())
    }

    async fn read(&mut self) -> Option<RawSerialFrame> {
        loop {
            if let Some(frame) = self.try_parse() {
                return Some(frame);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = if self.buffer.is_empty() {
                self.port.read(&mut chunk).await
            } else {
                // A frame is in progress: bound the wait and drop the
                // partial frame when the sender goes quiet
                match tokio::time::timeout(FRAME_RECEIVE_TIMEOUT, self.port.read(&mut chunk)).await
                {
                    Ok(result) => result,
                    Err(_elapsed) => {
                        self.buffer.clear();
                        continue;
                    }
                }
            };

            match read {
                Ok(0) => return None,
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(_) => return None,
            }
        }
    }
}
