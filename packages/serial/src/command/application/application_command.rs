use crate::command::{
    CommandBase, CommandEncodingContext, CommandId, CommandParsable, CommandParsingContext,
};
use bytes::{Bytes, BytesMut};
use zwh_cc::prelude::*;
use zwh_core::parse::{Parser, bytes::be_u8, combinators::opt, multi::length_value};
use zwh_core::prelude::*;

/// An application command from another node: the carrier of every inbound CC
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationCommandRequest {
    pub frame_info: FrameInfo,
    pub command: WithAddress<CC>,
    pub rssi: Option<i8>,
}

impl CommandId for ApplicationCommandRequest {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function_type(&self) -> FunctionType {
        FunctionType::ApplicationCommand
    }

    fn origin(&self) -> MessageOrigin {
        MessageOrigin::Controller
    }
}

impl CommandBase for ApplicationCommandRequest {}

impl CommandParsable for ApplicationCommandRequest {
    fn parse(i: &mut Bytes, ctx: &CommandParsingContext) -> ParseResult<Self> {
        let frame_info = FrameInfo::parse(i)?;
        let source_node_id = NodeId::parse(i)?;

        let cc_ctx = CCParsingContext::builder()
            .source_node_id(source_node_id)
            .own_node_id(ctx.own_node_id)
            .home_id(ctx.home_id)
            .security_class(ctx.security_class(source_node_id))
            .frame_addressing(Some(frame_info.frame_addressing))
            .security_manager(ctx.security_manager.clone())
            .security_manager_s2(ctx.security_manager_s2.clone())
            .build();
        let cc = length_value(be_u8, map_cc(&cc_ctx)).parse(i)?;

        let rssi = opt(zwh_core::parse::bytes::be_i8).parse(i)?;

        let destination = match frame_info.frame_addressing {
            FrameAddressing::Singlecast => Destination::Singlecast(ctx.own_node_id),
            FrameAddressing::Broadcast => Destination::Broadcast,
            FrameAddressing::Multicast => Destination::Multicast(vec![ctx.own_node_id]),
        };
        let address = CCAddress {
            source_node_id,
            destination,
            endpoint_index: EndpointIndex::Root,
        };

        Ok(Self {
            frame_info,
            command: cc.with_address(address),
            rssi,
        })
    }
}

fn map_cc(ctx: &CCParsingContext) -> impl Parser<Bytes, CC> + '_ {
    move |i: &mut Bytes| {
        let raw = CCRaw::parse(i)?;
        CC::try_from_raw(raw, ctx)
    }
}

impl SerializableWith<&CommandEncodingContext> for ApplicationCommandRequest {
    fn serialize(&self, _output: &mut BytesMut, _ctx: &CommandEncodingContext) {
        unimplemented!("ApplicationCommandRequest is only ever received")
    }
}

impl ToLogPayload for ApplicationCommandRequest {
    fn to_log_payload(&self) -> LogPayload {
        let mut ret = LogPayloadDict::new();
        if let Some(rssi) = self.rssi {
            ret = ret.with_entry("RSSI", format!("{} dBm", rssi));
        }
        ret = ret.with_nested(self.command.to_log_payload());
        ret.into()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_binary_switch_report() {
        // status (singlecast), source node 5, cc length 3, 25 03 ff
        let mut input = Bytes::from_static(&[0x00, 0x05, 0x03, 0x25, 0x03, 0xff]);
        let ctx = CommandParsingContext::builder()
            .own_node_id(NodeId::new(1))
            .build();
        let cmd = ApplicationCommandRequest::parse(&mut input, &ctx).unwrap();
        assert_eq!(cmd.command.address().source_node_id, NodeId::new(5));
        assert!(matches!(&*cmd.command, CC::BinarySwitchCCReport(_)));
    }
}
