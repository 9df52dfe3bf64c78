use crate::error::Result;
use crate::frame::RawSerialFrame;
use std::future::Future;

/// The duplex byte stream the driver runs on. Writes are ordered and
/// non-lossy; reads deliver whole frames and `None` once the underlying
/// stream is gone. Tests substitute an in-memory implementation with the
/// identical contract.
pub trait SerialBinding: Send + 'static {
    fn write(&mut self, frame: RawSerialFrame) -> impl Future<Output = Result<()>> + Send;
    fn read(&mut self) -> impl Future<Output = Option<RawSerialFrame>> + Send;
}
