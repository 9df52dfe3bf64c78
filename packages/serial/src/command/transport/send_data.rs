use crate::command::{
    Command, CommandBase, CommandEncodingContext, CommandId, CommandParsable,
    CommandParsingContext, CommandRequest,
};
use bytes::{Bytes, BytesMut};
use typed_builder::TypedBuilder;
use zwh_cc::prelude::*;
use zwh_core::parse::{Parser, bytes::be_u8, combinators::map};
use zwh_core::prelude::*;

/// Sends a CC to a node. The response acknowledges the queueing, the
/// callback reports the transmission outcome.
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct SendDataRequest {
    #[builder(setter(into))]
    pub node_id: NodeId,
    pub command: CC,
    #[builder(setter(skip), default)]
    pub callback_id: Option<u8>,
    #[builder(default)]
    pub transmit_options: TransmitOptions,
}

impl CommandId for SendDataRequest {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function_type(&self) -> FunctionType {
        FunctionType::SendData
    }

    fn origin(&self) -> MessageOrigin {
        MessageOrigin::Host
    }
}

impl CommandBase for SendDataRequest {
    fn callback_id(&self) -> Option<u8> {
        self.callback_id
    }
}

impl CommandRequest for SendDataRequest {
    fn expects_response(&self) -> bool {
        true
    }

    fn expects_callback(&self) -> bool {
        self.callback_id.is_some()
    }

    fn needs_callback_id(&self) -> bool {
        true
    }

    fn set_callback_id(&mut self, callback_id: Option<u8>) {
        self.callback_id = callback_id;
    }
}

impl SerializableWith<&CommandEncodingContext> for SendDataRequest {
    fn serialize(&self, output: &mut BytesMut, ctx: &CommandEncodingContext) {
        use serialize::bytes::{be_u8, slice};

        let cc_ctx = CCEncodingContext::builder()
            .own_node_id(ctx.own_node_id)
            .node_id(self.node_id)
            .home_id(ctx.home_id)
            .security_manager(ctx.security_manager.clone())
            .security_manager_s2(ctx.security_manager_s2.clone())
            .build();
        let payload = self.command.as_raw(&cc_ctx).as_bytes();

        self.node_id.serialize(output);
        be_u8(payload.len() as u8).serialize(output);
        slice(&payload).serialize(output);
        self.transmit_options.serialize(output);
        be_u8(self.callback_id.unwrap_or(0)).serialize(output);
    }
}

impl ToLogPayload for SendDataRequest {
    fn to_log_payload(&self) -> LogPayload {
        let mut ret = LogPayloadDict::new()
            .with_entry("transmit options", self.transmit_options.to_string());
        if let Some(callback_id) = self.callback_id {
            ret = ret.with_entry("callback id", callback_id);
        }
        ret.with_nested(self.command.to_log_payload()).into()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendDataResponse {
    pub was_sent: bool,
}

impl CommandId for SendDataResponse {
    fn command_type(&self) -> CommandType {
        CommandType::Response
    }

    fn function_type(&self) -> FunctionType {
        FunctionType::SendData
    }

    fn origin(&self) -> MessageOrigin {
        MessageOrigin::Controller
    }
}

impl CommandBase for SendDataResponse {
    fn is_ok(&self) -> bool {
        self.was_sent
    }
}

impl CommandParsable for SendDataResponse {
    fn parse(i: &mut Bytes, _ctx: &CommandParsingContext) -> ParseResult<Self> {
        let was_sent = map(be_u8, |x| x > 0).parse(i)?;
        Ok(Self { was_sent })
    }
}

impl SerializableWith<&CommandEncodingContext> for SendDataResponse {
    fn serialize(&self, output: &mut BytesMut, _ctx: &CommandEncodingContext) {
        serialize::bytes::be_u8(if self.was_sent { 0x01 } else { 0x00 }).serialize(output);
    }
}

impl ToLogPayload for SendDataResponse {
    fn to_log_payload(&self) -> LogPayload {
        LogPayloadDict::new()
            .with_entry("was sent", self.was_sent)
            .into()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendDataCallback {
    pub callback_id: Option<u8>,
    pub transmit_status: TransmitStatus,
    pub transmit_report: TransmitReport,
}

impl CommandId for SendDataCallback {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function_type(&self) -> FunctionType {
        FunctionType::SendData
    }

    fn origin(&self) -> MessageOrigin {
        MessageOrigin::Controller
    }
}

impl CommandBase for SendDataCallback {
    fn callback_id(&self) -> Option<u8> {
        self.callback_id
    }

    fn is_ok(&self) -> bool {
        self.transmit_status == TransmitStatus::Ok
    }
}

impl CommandParsable for SendDataCallback {
    fn parse(i: &mut Bytes, _ctx: &CommandParsingContext) -> ParseResult<Self> {
        let callback_id = be_u8(i)?;
        let transmit_status = TransmitStatus::parse(i)?;
        let transmit_report = TransmitReport::parse(i)?;

        Ok(Self {
            callback_id: Some(callback_id),
            transmit_status,
            transmit_report,
        })
    }
}

impl SerializableWith<&CommandEncodingContext> for SendDataCallback {
    fn serialize(&self, output: &mut BytesMut, _ctx: &CommandEncodingContext) {
        use serialize::bytes::{be_u8, slice};
        be_u8(self.callback_id.unwrap_or(0)).serialize(output);
        self.transmit_status.serialize(output);
        if let Some(ticks) = self.transmit_report.tx_ticks {
            serialize::bytes::be_u16(ticks).serialize(output);
        }
        slice(&self.transmit_report.rest).serialize(output);
    }
}

impl ToLogPayload for SendDataCallback {
    fn to_log_payload(&self) -> LogPayload {
        let mut ret = LogPayloadDict::new();
        if let Some(callback_id) = self.callback_id {
            ret = ret.with_entry("callback id", callback_id);
        }
        let status = match self.transmit_report.tx_ticks {
            Some(ticks) => format!("{:?}, took {} ms", self.transmit_status, ticks as u32 * 10),
            None => format!("{:?}", self.transmit_status),
        };
        ret.with_entry("transmit status", status).into()
    }
}

/// Aborts the transmission of the current SendData command
#[derive(Default, Debug, Clone, PartialEq)]
pub struct SendDataAbortRequest {}

impl CommandId for SendDataAbortRequest {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function_type(&self) -> FunctionType {
        FunctionType::SendDataAbort
    }

    fn origin(&self) -> MessageOrigin {
        MessageOrigin::Host
    }
}

impl CommandBase for SendDataAbortRequest {}

impl CommandRequest for SendDataAbortRequest {
    fn expects_response(&self) -> bool {
        false
    }

    fn expects_callback(&self) -> bool {
        false
    }
}

impl SerializableWith<&CommandEncodingContext> for SendDataAbortRequest {
    fn serialize(&self, _output: &mut BytesMut, _ctx: &CommandEncodingContext) {
        // No payload
    }
}

impl ToLogPayload for SendDataAbortRequest {
    fn to_log_payload(&self) -> LogPayload {
        LogPayload::empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::command::AsCommandRaw;
    use zwh_core::serialize::Serializable;

    #[test]
    fn test_request_serialization() {
        let mut request = SendDataRequest::builder()
            .node_id(NodeId::new(5))
            .command(BinarySwitchCCSet::builder().target_value(BinarySet::On).build().into())
            .build();
        request.set_callback_id(Some(0x21));

        let raw = request.as_raw(&CommandEncodingContext::default());
        // node id, cc length, 25 01 ff, transmit options, callback id
        assert_eq!(
            raw.payload,
            Bytes::from_static(&[0x05, 0x03, 0x25, 0x01, 0xff, 0x25, 0x21])
        );
        // Frame: SOF, length 0x0a, REQ, SendData, payload, checksum
        let frame = raw.as_bytes();
        assert_eq!(frame[0], 0x01);
        assert_eq!(frame[3], 0x13);
    }

    #[test]
    fn test_callback_matching() {
        let mut request = SendDataRequest::builder()
            .node_id(NodeId::new(5))
            .command(BinarySwitchCCGet::default().into())
            .build();
        request.set_callback_id(Some(7));

        let callback = |id: u8| {
            Command::SendDataCallback(SendDataCallback {
                callback_id: Some(id),
                transmit_status: TransmitStatus::Ok,
                transmit_report: TransmitReport::default(),
            })
        };
        assert!(request.test_callback(&callback(7)));
        assert!(!request.test_callback(&callback(8)));
    }
}
