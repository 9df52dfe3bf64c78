use crate::command::{
    CommandBase, CommandEncodingContext, CommandId, CommandParsable, CommandParsingContext,
    CommandRequest,
};
use bitvec::prelude::*;
use bytes::{Bytes, BytesMut};
use zwh_core::parse::{Parser, bytes::be_u8, combinators::opt, multi::length_data};
use zwh_core::prelude::*;

const CAP_SECONDARY: u8 = 0b0000_0100;
const CAP_SUC: u8 = 0b0000_1000;
const NODE_BITMASK_LENGTH: usize = 29;

#[derive(Default, Debug, Clone, PartialEq)]
pub struct GetSerialApiInitDataRequest {}

impl CommandId for GetSerialApiInitDataRequest {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function_type(&self) -> FunctionType {
        FunctionType::GetSerialApiInitData
    }

    fn origin(&self) -> MessageOrigin {
        MessageOrigin::Host
    }
}

impl CommandBase for GetSerialApiInitDataRequest {}

impl CommandRequest for GetSerialApiInitDataRequest {
    fn expects_response(&self) -> bool {
        true
    }

    fn expects_callback(&self) -> bool {
        false
    }
}

impl SerializableWith<&CommandEncodingContext> for GetSerialApiInitDataRequest {
    fn serialize(&self, _output: &mut BytesMut, _ctx: &CommandEncodingContext) {
        // No payload
    }
}

impl ToLogPayload for GetSerialApiInitDataRequest {
    fn to_log_payload(&self) -> LogPayload {
        LogPayload::empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetSerialApiInitDataResponse {
    pub api_version: u8,
    pub is_secondary: bool,
    pub is_suc: bool,
    /// The ids of all nodes currently in the network
    pub node_ids: Vec<NodeId>,
    pub chip_type: Option<u8>,
    pub chip_version: Option<u8>,
}

impl CommandId for GetSerialApiInitDataResponse {
    fn command_type(&self) -> CommandType {
        CommandType::Response
    }

    fn function_type(&self) -> FunctionType {
        FunctionType::GetSerialApiInitData
    }

    fn origin(&self) -> MessageOrigin {
        MessageOrigin::Controller
    }
}

impl CommandBase for GetSerialApiInitDataResponse {}

impl CommandParsable for GetSerialApiInitDataResponse {
    fn parse(i: &mut Bytes, _ctx: &CommandParsingContext) -> ParseResult<Self> {
        let api_version = be_u8(i)?;
        let capabilities = be_u8(i)?;
        let bitmask = length_data(be_u8).parse(i)?;
        let chip_type = opt(be_u8).parse(i)?;
        let chip_version = opt(be_u8).parse(i)?;

        // Node n is present when bit (n-1) is set, LSB first
        let bits = bitmask.view_bits::<Lsb0>();
        let node_ids = bits
            .iter()
            .enumerate()
            .filter(|(_, bit)| **bit)
            .map(|(index, _)| NodeId::new(index as u8 + 1))
            .collect();

        Ok(Self {
            api_version,
            is_secondary: capabilities & CAP_SECONDARY != 0,
            is_suc: capabilities & CAP_SUC != 0,
            node_ids,
            chip_type,
            chip_version,
        })
    }
}

impl SerializableWith<&CommandEncodingContext> for GetSerialApiInitDataResponse {
    fn serialize(&self, output: &mut BytesMut, _ctx: &CommandEncodingContext) {
        use serialize::bytes::{be_u8, slice};

        let mut capabilities = 0;
        if self.is_secondary {
            capabilities |= CAP_SECONDARY;
        }
        if self.is_suc {
            capabilities |= CAP_SUC;
        }

        let mut bitmask = [0u8; NODE_BITMASK_LENGTH];
        let bits = bitmask.view_bits_mut::<Lsb0>();
        for node_id in &self.node_ids {
            let index = u8::from(*node_id) as usize - 1;
            if index < bits.len() {
                bits.set(index, true);
            }
        }

        be_u8(self.api_version).serialize(output);
        be_u8(capabilities).serialize(output);
        be_u8(NODE_BITMASK_LENGTH as u8).serialize(output);
        slice(bitmask).serialize(output);
        self.chip_type.map(be_u8).serialize(output);
        self.chip_version.map(be_u8).serialize(output);
    }
}

impl ToLogPayload for GetSerialApiInitDataResponse {
    fn to_log_payload(&self) -> LogPayload {
        LogPayloadDict::new()
            .with_entry("api version", self.api_version)
            .with_entry("is secondary", self.is_secondary)
            .with_entry("is SUC", self.is_suc)
            .with_entry(
                "nodes",
                self.node_ids
                    .iter()
                    .map(|n| n.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            )
            .into()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use zwh_core::serialize::SerializableWith;

    #[test]
    fn test_node_bitmask_roundtrip() {
        let response = GetSerialApiInitDataResponse {
            api_version: 8,
            is_secondary: false,
            is_suc: true,
            node_ids: vec![NodeId::new(1), NodeId::new(2), NodeId::new(9), NodeId::new(232)],
            chip_type: Some(7),
            chip_version: Some(0),
        };

        let ctx = CommandEncodingContext::default();
        let mut bytes = response.as_bytes(&ctx);
        let parsed =
            GetSerialApiInitDataResponse::parse(&mut bytes, &CommandParsingContext::default())
                .unwrap();
        assert_eq!(parsed, response);
    }
}
