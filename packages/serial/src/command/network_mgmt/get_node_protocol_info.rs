use crate::command::{
    CommandBase, CommandEncodingContext, CommandId, CommandParsable, CommandParsingContext,
    CommandRequest,
};
use bytes::{Bytes, BytesMut};
use zwh_core::prelude::*;

#[derive(Debug, Clone, PartialEq)]
pub struct GetNodeProtocolInfoRequest {
    pub node_id: NodeId,
}

impl GetNodeProtocolInfoRequest {
    pub fn new(node_id: NodeId) -> Self {
        Self { node_id }
    }
}

impl CommandId for GetNodeProtocolInfoRequest {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function_type(&self) -> FunctionType {
        FunctionType::GetNodeProtocolInfo
    }

    fn origin(&self) -> MessageOrigin {
        MessageOrigin::Host
    }
}

impl CommandBase for GetNodeProtocolInfoRequest {}

impl CommandRequest for GetNodeProtocolInfoRequest {
    fn expects_response(&self) -> bool {
        true
    }

    fn expects_callback(&self) -> bool {
        false
    }
}

impl SerializableWith<&CommandEncodingContext> for GetNodeProtocolInfoRequest {
    fn serialize(&self, output: &mut BytesMut, _ctx: &CommandEncodingContext) {
        self.node_id.serialize(output);
    }
}

impl ToLogPayload for GetNodeProtocolInfoRequest {
    fn to_log_payload(&self) -> LogPayload {
        LogPayloadDict::new()
            .with_entry("node id", self.node_id.to_string())
            .into()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetNodeProtocolInfoResponse {
    pub protocol_data: NodeProtocolData,
}

impl CommandId for GetNodeProtocolInfoResponse {
    fn command_type(&self) -> CommandType {
        CommandType::Response
    }

    fn function_type(&self) -> FunctionType {
        FunctionType::GetNodeProtocolInfo
    }

    fn origin(&self) -> MessageOrigin {
        MessageOrigin::Controller
    }
}

impl CommandBase for GetNodeProtocolInfoResponse {}

impl CommandParsable for GetNodeProtocolInfoResponse {
    fn parse(i: &mut Bytes, _ctx: &CommandParsingContext) -> ParseResult<Self> {
        let protocol_data = NodeProtocolData::parse(i)?;
        Ok(Self { protocol_data })
    }
}

impl SerializableWith<&CommandEncodingContext> for GetNodeProtocolInfoResponse {
    fn serialize(&self, output: &mut BytesMut, _ctx: &CommandEncodingContext) {
        self.protocol_data.serialize(output);
    }
}

impl ToLogPayload for GetNodeProtocolInfoResponse {
    fn to_log_payload(&self) -> LogPayload {
        let d = &self.protocol_data;
        LogPayloadDict::new()
            .with_entry("listening", d.listening)
            .with_entry("frequent listening", d.frequent_listening)
            .with_entry("routing", d.routing)
            .with_entry("max data rate", format!("{:?}", d.max_data_rate))
            .with_entry("secure", d.secure)
            .with_entry("beaming", d.beaming)
            .with_entry("protocol version", format!("{:?}", d.protocol_version))
            .into()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use zwh_core::serialize::SerializableWith;

    #[test]
    fn test_roundtrip_listening_node() {
        let response = GetNodeProtocolInfoResponse {
            protocol_data: NodeProtocolData {
                listening: true,
                frequent_listening: false,
                routing: true,
                max_data_rate: DataRate::DataRate100k,
                protocol_version: ProtocolVersion::V4_5x_6_0x,
                beaming: true,
                secure: false,
                optional_functionality: true,
                device_class: DeviceClass {
                    basic: 0x04,
                    generic: 0x10,
                    specific: 0x01,
                },
            },
        };

        let mut bytes = response.as_bytes(&CommandEncodingContext::default());
        let parsed =
            GetNodeProtocolInfoResponse::parse(&mut bytes, &CommandParsingContext::default())
                .unwrap();
        assert_eq!(parsed, response);
    }
}
