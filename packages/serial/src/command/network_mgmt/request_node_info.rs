use crate::command::{
    ApplicationUpdateRequest, ApplicationUpdateStatus, Command, CommandBase,
    CommandEncodingContext, CommandId, CommandParsable, CommandParsingContext, CommandRequest,
};
use bytes::{Bytes, BytesMut};
use zwh_core::parse::{Parser, bytes::be_u8, combinators::map};
use zwh_core::prelude::*;

/// Asks a node to send its NIF. The result does not arrive as a regular
/// callback but as an ApplicationUpdateRequest without a callback id.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestNodeInfoRequest {
    pub node_id: NodeId,
}

impl RequestNodeInfoRequest {
    pub fn new(node_id: NodeId) -> Self {
        Self { node_id }
    }
}

impl CommandId for RequestNodeInfoRequest {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function_type(&self) -> FunctionType {
        FunctionType::RequestNodeInfo
    }

    fn origin(&self) -> MessageOrigin {
        MessageOrigin::Host
    }
}

impl CommandBase for RequestNodeInfoRequest {}

impl CommandRequest for RequestNodeInfoRequest {
    fn expects_response(&self) -> bool {
        true
    }

    fn expects_callback(&self) -> bool {
        true
    }

    fn test_callback(&self, callback: &Command) -> bool {
        let Command::ApplicationUpdateRequest(update) = callback else {
            return false;
        };
        match update.status {
            ApplicationUpdateStatus::NodeInfoReceived => update.node_id == Some(self.node_id),
            // The failure callback does not carry a node id
            ApplicationUpdateStatus::NodeInfoRequestFailed => true,
            _ => false,
        }
    }
}

impl SerializableWith<&CommandEncodingContext> for RequestNodeInfoRequest {
    fn serialize(&self, output: &mut BytesMut, _ctx: &CommandEncodingContext) {
        self.node_id.serialize(output);
    }
}

impl ToLogPayload for RequestNodeInfoRequest {
    fn to_log_payload(&self) -> LogPayload {
        LogPayloadDict::new()
            .with_entry("node id", self.node_id.to_string())
            .into()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestNodeInfoResponse {
    pub was_sent: bool,
}

impl CommandId for RequestNodeInfoResponse {
    fn command_type(&self) -> CommandType {
        CommandType::Response
    }

    fn function_type(&self) -> FunctionType {
        FunctionType::RequestNodeInfo
    }

    fn origin(&self) -> MessageOrigin {
        MessageOrigin::Controller
    }
}

impl CommandBase for RequestNodeInfoResponse {
    fn is_ok(&self) -> bool {
        self.was_sent
    }
}

impl CommandParsable for RequestNodeInfoResponse {
    fn parse(i: &mut Bytes, _ctx: &CommandParsingContext) -> ParseResult<Self> {
        let was_sent = map(be_u8, |x| x > 0).parse(i)?;
        Ok(Self { was_sent })
    }
}

impl SerializableWith<&CommandEncodingContext> for RequestNodeInfoResponse {
    fn serialize(&self, output: &mut BytesMut, _ctx: &CommandEncodingContext) {
        serialize::bytes::be_u8(if self.was_sent { 0x01 } else { 0x00 }).serialize(output);
    }
}

impl ToLogPayload for RequestNodeInfoResponse {
    fn to_log_payload(&self) -> LogPayload {
        LogPayloadDict::new()
            .with_entry("was sent", self.was_sent)
            .into()
    }
}
