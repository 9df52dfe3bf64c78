use crate::{Direction, ImmutableLogger, LogInfo, Loglevel};
use std::sync::Arc;
use zwh_core::log::LogPayload;

const LABEL: &str = "SERIAL";

/// Logs raw traffic on the serial port: control flow bytes, data frames as
/// hex dumps and discarded garbage
pub struct SerialLogger {
    inner: Arc<dyn ImmutableLogger>,
}

impl SerialLogger {
    pub fn new(inner: Arc<dyn ImmutableLogger>) -> Self {
        Self { inner }
    }

    pub fn data(&self, data: &[u8], direction: Direction) {
        let level = Loglevel::Debug;
        if self.inner.log_level() < level {
            return;
        }

        let log = LogInfo::builder()
            .label(LABEL)
            .direction(direction)
            .payload(format!("0x{}", hex::encode(data)))
            .build();
        self.inner.log(log, level);
    }

    pub fn control_flow(&self, byte: &'static str, direction: Direction) {
        let level = Loglevel::Debug;
        if self.inner.log_level() < level {
            return;
        }

        let log = LogInfo::builder()
            .label(LABEL)
            .direction(direction)
            .payload(format!("[{}]", byte))
            .build();
        self.inner.log(log, level);
    }

    pub fn discarded(&self, data: &[u8]) {
        let level = Loglevel::Warn;
        if self.inner.log_level() < level {
            return;
        }

        let log = LogInfo::builder()
            .label(LABEL)
            .direction(Direction::Inbound)
            .payload(format!("invalid data, discarded: 0x{}", hex::encode(data)))
            .build();
        self.inner.log(log, level);
    }

    pub fn message<L: Into<LogPayload>>(&self, message: impl Fn() -> L, level: Loglevel) {
        if self.inner.log_level() < level {
            return;
        }

        let log = LogInfo::builder().label(LABEL).payload(message()).build();
        self.inner.log(log, level);
    }
}
