use crate::{Direction, ImmutableLogger, LogInfo, Loglevel};
use std::borrow::Cow;
use std::sync::Arc;
use zwh_core::definitions::CommandType;
use zwh_core::log::{LogPayload, LogPayloadText, ToLogPayload};
use zwh_serial::command::Command;

const LABEL: &str = "CNTRLR";

pub struct ControllerLogger {
    inner: Arc<dyn ImmutableLogger>,
}

impl ControllerLogger {
    pub fn new(inner: Arc<dyn ImmutableLogger>) -> Self {
        Self { inner }
    }

    pub fn message<L: Into<LogPayload>>(&self, message: impl Fn() -> L, level: Loglevel) {
        if self.inner.log_level() < level {
            return;
        }

        let log = LogInfo::builder().label(LABEL).payload(message()).build();
        self.inner.log(log, level);
    }

    pub fn command(&self, command: &Command, direction: Direction) {
        let level = Loglevel::Debug;
        if self.inner.log_level() < level {
            return;
        }

        let type_tag = if command.command_type() == CommandType::Request {
            "REQ"
        } else {
            "RES"
        };
        let primary_tags: Vec<Cow<_>> = vec![type_tag.into(), command.function_name().into()];

        let payload = LogPayloadText::new("").with_nested(command.to_log_payload());
        let log = LogInfo::builder()
            .label(LABEL)
            .primary_tags(primary_tags)
            .direction(direction)
            .payload(payload)
            .build();
        self.inner.log(log, level);
    }

    /// Logs an outgoing command that only exists in its typed form
    pub fn outbound(&self, function_name: &str, payload: LogPayload) {
        let level = Loglevel::Debug;
        if self.inner.log_level() < level {
            return;
        }

        let primary_tags: Vec<Cow<_>> = vec!["REQ".into(), function_name.to_owned().into()];
        let payload = LogPayloadText::new("").with_nested(payload);
        let log = LogInfo::builder()
            .label(LABEL)
            .primary_tags(primary_tags)
            .direction(Direction::Outbound)
            .payload(payload)
            .build();
        self.inner.log(log, level);
    }

    pub fn error<L: Into<LogPayload>>(&self, message: impl Fn() -> L) {
        self.message(message, Loglevel::Error);
    }

    pub fn warn<L: Into<LogPayload>>(&self, message: impl Fn() -> L) {
        self.message(message, Loglevel::Warn);
    }

    pub fn info<L: Into<LogPayload>>(&self, message: impl Fn() -> L) {
        self.message(message, Loglevel::Info);
    }

    pub fn debug<L: Into<LogPayload>>(&self, message: impl Fn() -> L) {
        self.message(message, Loglevel::Debug);
    }

    pub fn silly<L: Into<LogPayload>>(&self, message: impl Fn() -> L) {
        self.message(message, Loglevel::Silly);
    }
}
