use crate::{Direction, ImmutableLogger, LogInfo, Loglevel};
use std::borrow::Cow;
use std::sync::Arc;
use zwh_core::definitions::{CommandType, EndpointIndex, NodeId};
use zwh_core::log::{LogPayload, LogPayloadText, ToLogPayload};
use zwh_serial::command::Command;

const LABEL: &str = "CNTRLR";

pub struct NodeLogger {
    node_id: NodeId,
    endpoint: EndpointIndex,
    inner: Arc<dyn ImmutableLogger>,
}

impl NodeLogger {
    pub fn new(inner: Arc<dyn ImmutableLogger>, node_id: NodeId, endpoint: EndpointIndex) -> Self {
        Self {
            inner,
            node_id,
            endpoint,
        }
    }

    fn primary_tags(&self) -> Vec<Cow<'static, str>> {
        let mut tags: Vec<Cow<'static, str>> = vec![format!("Node {:0>3}", self.node_id).into()];
        if let EndpointIndex::Endpoint(index) = self.endpoint {
            tags.push(format!("EP {}", index).into());
        }
        tags
    }

    pub fn message<L: Into<LogPayload>>(&self, message: impl Fn() -> L, level: Loglevel) {
        if self.inner.log_level() < level {
            return;
        }

        let log = LogInfo::builder()
            .label(LABEL)
            .primary_tags(self.primary_tags())
            .payload(message())
            .build();
        self.inner.log(log, level);
    }

    pub fn command(&self, command: &Command, direction: Direction) {
        let level = Loglevel::Debug;
        if self.inner.log_level() < level {
            return;
        }

        let mut primary_tags = self.primary_tags();
        let type_tag = if command.command_type() == CommandType::Request {
            "REQ"
        } else {
            "RES"
        };
        primary_tags.push(type_tag.into());
        primary_tags.push(command.function_name().into());

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

        let mut primary_tags = self.primary_tags();
        primary_tags.push("REQ".into());
        primary_tags.push(function_name.to_owned().into());

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

    pub fn verbose<L: Into<LogPayload>>(&self, message: impl Fn() -> L) {
        self.message(message, Loglevel::Verbose);
    }

    pub fn debug<L: Into<LogPayload>>(&self, message: impl Fn() -> L) {
        self.message(message, Loglevel::Debug);
    }

    pub fn silly<L: Into<LogPayload>>(&self, message: impl Fn() -> L) {
        self.message(message, Loglevel::Silly);
    }
}
