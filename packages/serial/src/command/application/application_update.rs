use crate::command::{
    CommandBase, CommandEncodingContext, CommandId, CommandParsable, CommandParsingContext,
};
use bytes::{Bytes, BytesMut};
use derive_try_from_primitive::*;
use zwh_core::parse::{
    Parser,
    bytes::be_u8,
    combinators::{context, map_res},
    multi::length_value,
};
use zwh_core::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum ApplicationUpdateStatus {
    SmartStartHomeIdReceivedLR = 0x87,
    SmartStartIncludedNodeInfoReceived = 0x86,
    SmartStartHomeIdReceived = 0x85,
    NodeInfoReceived = 0x84,
    NodeInfoRequestDone = 0x82,
    NodeInfoRequestFailed = 0x81,
    RoutingPending = 0x80,
    NewIdAssigned = 0x40,
    DeleteDone = 0x20,
    SucIdChanged = 0x10,
}

/// Delivered by the controller when it learns something new about a node,
/// most importantly the NIF after a RequestNodeInfo
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationUpdateRequest {
    pub status: ApplicationUpdateStatus,
    pub node_id: Option<NodeId>,
    pub nif: Option<NodeInformationFrame>,
}

impl CommandId for ApplicationUpdateRequest {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function_type(&self) -> FunctionType {
        FunctionType::ApplicationUpdateRequest
    }

    fn origin(&self) -> MessageOrigin {
        MessageOrigin::Controller
    }
}

impl CommandBase for ApplicationUpdateRequest {
    fn is_ok(&self) -> bool {
        self.status != ApplicationUpdateStatus::NodeInfoRequestFailed
    }
}

impl CommandParsable for ApplicationUpdateRequest {
    fn parse(i: &mut Bytes, _ctx: &CommandParsingContext) -> ParseResult<Self> {
        let status = context(
            "ApplicationUpdateStatus",
            map_res(be_u8, ApplicationUpdateStatus::try_from),
        )
        .parse(i)?;

        let (node_id, nif) = match status {
            ApplicationUpdateStatus::NodeInfoReceived => {
                let node_id = NodeId::parse(i)?;
                let nif = length_value(be_u8, NodeInformationFrame::parse).parse(i)?;
                (Some(node_id), Some(nif))
            }
            _ => (None, None),
        };

        Ok(Self {
            status,
            node_id,
            nif,
        })
    }
}

impl SerializableWith<&CommandEncodingContext> for ApplicationUpdateRequest {
    fn serialize(&self, _output: &mut BytesMut, _ctx: &CommandEncodingContext) {
        unimplemented!("ApplicationUpdateRequest is only ever received")
    }
}

impl ToLogPayload for ApplicationUpdateRequest {
    fn to_log_payload(&self) -> LogPayload {
        let mut ret = LogPayloadDict::new().with_entry("status", format!("{:?}", self.status));
        if let Some(node_id) = self.node_id {
            ret = ret.with_entry("node id", node_id.to_string());
        }
        if let Some(nif) = &self.nif {
            ret = ret.with_entry(
                "supported CCs",
                nif.supported_ccs
                    .iter()
                    .map(|cc| cc.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            );
        }
        ret.into()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_node_info_received() {
        // status, node id 5, length 7, device class + CCs
        let mut input = Bytes::from_static(&[
            0x84, 0x05, 0x07, 0x04, 0x10, 0x01, 0x25, 0x86, 0xef, 0x20,
        ]);
        let update =
            ApplicationUpdateRequest::parse(&mut input, &CommandParsingContext::default()).unwrap();
        assert_eq!(update.status, ApplicationUpdateStatus::NodeInfoReceived);
        assert_eq!(update.node_id, Some(NodeId::new(5)));
        let nif = update.nif.unwrap();
        assert_eq!(
            nif.supported_ccs,
            vec![CommandClasses::BinarySwitch, CommandClasses::Version]
        );
        assert_eq!(nif.controlled_ccs, vec![CommandClasses::Basic]);
    }

    #[test]
    fn test_parse_request_failed() {
        let mut input = Bytes::from_static(&[0x81]);
        let update =
            ApplicationUpdateRequest::parse(&mut input, &CommandParsingContext::default()).unwrap();
        assert_eq!(update.status, ApplicationUpdateStatus::NodeInfoRequestFailed);
        assert!(!update.is_ok());
    }
}
