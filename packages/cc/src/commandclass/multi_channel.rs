use crate::commandclass_raw::CCRaw;
use crate::prelude::*;
use bytes::{Bytes, BytesMut};
use derive_try_from_primitive::*;
use typed_builder::TypedBuilder;
use zwh_core::parse::{Parser, bytes::be_u8, combinators::opt, validate};
use zwh_core::prelude::*;

const DEST_MULTICAST: u8 = 0b1000_0000;
const ENDPOINT_MASK: u8 = 0b0111_1111;
const ENDPOINT_COUNT_DYNAMIC: u8 = 0b1000_0000;
const ENDPOINT_COUNT_IDENTICAL: u8 = 0b0100_0000;

#[derive(Debug, Clone, Copy, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum MultiChannelCCCommand {
    EndPointGet = 0x07,
    EndPointReport = 0x08,
    CapabilityGet = 0x09,
    CapabilityReport = 0x0a,
    CommandEncapsulation = 0x0d,
}

#[derive(Default, Debug, Clone, PartialEq)]
pub struct MultiChannelCCEndPointGet {}

impl CCBase for MultiChannelCCEndPointGet {
    fn expects_response(&self) -> bool {
        true
    }

    fn test_response(&self, response: &CC) -> bool {
        matches!(response, CC::MultiChannelCCEndPointReport(_))
    }
}

impl CCValues for MultiChannelCCEndPointGet {}

impl CCId for MultiChannelCCEndPointGet {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::MultiChannel
    }

    fn cc_command(&self) -> Option<u8> {
        Some(MultiChannelCCCommand::EndPointGet as _)
    }
}

impl CCParsable for MultiChannelCCEndPointGet {
    fn parse(_i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        Ok(Self {})
    }
}

impl CCSerializable for MultiChannelCCEndPointGet {
    fn serialize(&self, _output: &mut BytesMut, _ctx: &CCEncodingContext) {
        // No payload
    }
}

impl ToLogPayload for MultiChannelCCEndPointGet {
    fn to_log_payload(&self) -> LogPayload {
        LogPayload::empty()
    }
}

#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct MultiChannelCCEndPointReport {
    pub endpoints_are_dynamic: bool,
    pub endpoints_are_identical: bool,
    pub individual_count: u8,
    #[builder(default, setter(into))]
    pub aggregated_count: Option<u8>,
}

impl CCBase for MultiChannelCCEndPointReport {}

impl CCValues for MultiChannelCCEndPointReport {}

impl CCId for MultiChannelCCEndPointReport {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::MultiChannel
    }

    fn cc_command(&self) -> Option<u8> {
        Some(MultiChannelCCCommand::EndPointReport as _)
    }
}

impl CCParsable for MultiChannelCCEndPointReport {
    fn parse(i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        let flags = be_u8(i)?;
        let individual_count = be_u8(i)? & ENDPOINT_MASK;
        let aggregated_count = opt(be_u8).parse(i)?.map(|c| c & ENDPOINT_MASK);

        Ok(Self {
            endpoints_are_dynamic: flags & ENDPOINT_COUNT_DYNAMIC != 0,
            endpoints_are_identical: flags & ENDPOINT_COUNT_IDENTICAL != 0,
            individual_count,
            aggregated_count,
        })
    }
}

impl CCSerializable for MultiChannelCCEndPointReport {
    fn serialize(&self, output: &mut BytesMut, _ctx: &CCEncodingContext) {
        use serialize::bytes::be_u8;

        let mut flags = 0;
        if self.endpoints_are_dynamic {
            flags |= ENDPOINT_COUNT_DYNAMIC;
        }
        if self.endpoints_are_identical {
            flags |= ENDPOINT_COUNT_IDENTICAL;
        }
        be_u8(flags).serialize(output);
        be_u8(self.individual_count & ENDPOINT_MASK).serialize(output);
        self.aggregated_count.map(be_u8).serialize(output);
    }
}

impl ToLogPayload for MultiChannelCCEndPointReport {
    fn to_log_payload(&self) -> LogPayload {
        let mut ret = LogPayloadDict::new()
            .with_entry("dynamic", self.endpoints_are_dynamic)
            .with_entry("identical", self.endpoints_are_identical)
            .with_entry("individual endpoints", self.individual_count);
        if let Some(aggregated) = self.aggregated_count {
            ret = ret.with_entry("aggregated endpoints", aggregated);
        }
        ret.into()
    }
}

#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct MultiChannelCCCapabilityGet {
    pub requested_endpoint: u8,
}

impl CCBase for MultiChannelCCCapabilityGet {
    fn expects_response(&self) -> bool {
        true
    }

    fn test_response(&self, response: &CC) -> bool {
        matches!(
            response,
            CC::MultiChannelCCCapabilityReport(report)
                if report.endpoint == self.requested_endpoint
        )
    }
}

impl CCValues for MultiChannelCCCapabilityGet {}

impl CCId for MultiChannelCCCapabilityGet {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::MultiChannel
    }

    fn cc_command(&self) -> Option<u8> {
        Some(MultiChannelCCCommand::CapabilityGet as _)
    }
}

impl CCParsable for MultiChannelCCCapabilityGet {
    fn parse(i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        let requested_endpoint = be_u8(i)? & ENDPOINT_MASK;
        Ok(Self { requested_endpoint })
    }
}

impl CCSerializable for MultiChannelCCCapabilityGet {
    fn serialize(&self, output: &mut BytesMut, _ctx: &CCEncodingContext) {
        serialize::bytes::be_u8(self.requested_endpoint & ENDPOINT_MASK).serialize(output);
    }
}

impl ToLogPayload for MultiChannelCCCapabilityGet {
    fn to_log_payload(&self) -> LogPayload {
        LogPayloadDict::new()
            .with_entry("endpoint", self.requested_endpoint)
            .into()
    }
}

#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct MultiChannelCCCapabilityReport {
    pub endpoint: u8,
    pub is_dynamic: bool,
    pub generic_device_class: u8,
    pub specific_device_class: u8,
    pub supported_ccs: Vec<CommandClasses>,
}

impl CCBase for MultiChannelCCCapabilityReport {}

impl CCValues for MultiChannelCCCapabilityReport {}

impl CCId for MultiChannelCCCapabilityReport {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::MultiChannel
    }

    fn cc_command(&self) -> Option<u8> {
        Some(MultiChannelCCCommand::CapabilityReport as _)
    }
}

impl CCParsable for MultiChannelCCCapabilityReport {
    fn parse(i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        let endpoint_byte = be_u8(i)?;
        let generic_device_class = be_u8(i)?;
        let specific_device_class = be_u8(i)?;

        let mut supported_ccs = Vec::new();
        while !i.is_empty() {
            let id = be_u8(i)?;
            // Skip CCs this driver does not know
            if let Ok(cc) = CommandClasses::try_from(id) {
                supported_ccs.push(cc);
            }
        }

        Ok(Self {
            endpoint: endpoint_byte & ENDPOINT_MASK,
            is_dynamic: endpoint_byte & DEST_MULTICAST != 0,
            generic_device_class,
            specific_device_class,
            supported_ccs,
        })
    }
}

impl CCSerializable for MultiChannelCCCapabilityReport {
    fn serialize(&self, output: &mut BytesMut, _ctx: &CCEncodingContext) {
        use serialize::bytes::be_u8;

        let mut endpoint_byte = self.endpoint & ENDPOINT_MASK;
        if self.is_dynamic {
            endpoint_byte |= DEST_MULTICAST;
        }
        be_u8(endpoint_byte).serialize(output);
        be_u8(self.generic_device_class).serialize(output);
        be_u8(self.specific_device_class).serialize(output);
        for cc in &self.supported_ccs {
            cc.serialize(output);
        }
    }
}

impl ToLogPayload for MultiChannelCCCapabilityReport {
    fn to_log_payload(&self) -> LogPayload {
        LogPayloadDict::new()
            .with_entry("endpoint", self.endpoint)
            .with_entry(
                "supported CCs",
                self.supported_ccs
                    .iter()
                    .map(|cc| cc.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            )
            .into()
    }
}

/// Routes a CC to a specific endpoint of a node
#[derive(Debug, Clone, PartialEq)]
pub struct MultiChannelCCCommandEncapsulation {
    pub source_endpoint: u8,
    pub destination_endpoint: u8,
    pub encapsulated: Box<CC>,
}

impl MultiChannelCCCommandEncapsulation {
    pub fn new(destination_endpoint: u8, encapsulated: CC) -> Self {
        Self {
            source_endpoint: 0,
            destination_endpoint,
            encapsulated: Box::new(encapsulated),
        }
    }
}

impl CCBase for MultiChannelCCCommandEncapsulation {
    fn expects_response(&self) -> bool {
        // The encapsulated CC decides
        self.encapsulated.expects_response()
    }

    fn test_response(&self, response: &CC) -> bool {
        let CC::MultiChannelCCCommandEncapsulation(response) = response else {
            return false;
        };
        // The response must come from the endpoint we addressed
        response.source_endpoint == self.destination_endpoint
            && self.encapsulated.test_response(&response.encapsulated)
    }
}

impl CCValues for MultiChannelCCCommandEncapsulation {}

impl CCId for MultiChannelCCCommandEncapsulation {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::MultiChannel
    }

    fn cc_command(&self) -> Option<u8> {
        Some(MultiChannelCCCommand::CommandEncapsulation as _)
    }
}

impl CCParsable for MultiChannelCCCommandEncapsulation {
    fn parse(i: &mut Bytes, ctx: &CCParsingContext) -> ParseResult<Self> {
        let source_endpoint = be_u8(i)? & ENDPOINT_MASK;
        let destination = be_u8(i)?;
        // Bit-addressed multicast destinations are only used node-to-node
        validate(
            destination & DEST_MULTICAST == 0,
            "bit-addressed Multi Channel destinations are not supported",
        )?;

        let raw = CCRaw::parse(i)?;
        let encapsulated = CC::try_from_raw(raw, ctx)?;

        Ok(Self {
            source_endpoint,
            destination_endpoint: destination & ENDPOINT_MASK,
            encapsulated: Box::new(encapsulated),
        })
    }
}

impl CCSerializable for MultiChannelCCCommandEncapsulation {
    fn serialize(&self, output: &mut BytesMut, ctx: &CCEncodingContext) {
        use serialize::bytes::{be_u8, slice};

        be_u8(self.source_endpoint & ENDPOINT_MASK).serialize(output);
        be_u8(self.destination_endpoint & ENDPOINT_MASK).serialize(output);
        slice(self.encapsulated.as_raw(ctx).as_bytes()).serialize(output);
    }
}

impl ToLogPayload for MultiChannelCCCommandEncapsulation {
    fn to_log_payload(&self) -> LogPayload {
        LogPayloadDict::new()
            .with_entry("source endpoint", self.source_endpoint)
            .with_entry("destination endpoint", self.destination_endpoint)
            .with_nested(self.encapsulated.to_log_payload())
            .into()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_encap_binary_switch_get() {
        // BinarySwitchCC::Get for endpoint 2:
        // 60 0d (Multi Channel CmdEncap) 00 (source) 02 (dest) 25 02 (inner)
        let cc = CC::from(MultiChannelCCCommandEncapsulation::new(
            2,
            BinarySwitchCCGet::default().into(),
        ));
        let raw = cc.as_raw(&CCEncodingContext::default());
        assert_eq!(
            raw.as_bytes(),
            Bytes::from_static(&[0x60, 0x0d, 0x00, 0x02, 0x25, 0x02])
        );
    }

    #[test]
    fn test_encap_roundtrip() {
        let mut input = Bytes::from_static(&[0x60, 0x0d, 0x02, 0x00, 0x25, 0x03, 0xff]);
        let raw = CCRaw::parse(&mut input).unwrap();
        let cc = CC::try_from_raw(raw, &CCParsingContext::default()).unwrap();
        let CC::MultiChannelCCCommandEncapsulation(encap) = &cc else {
            panic!("expected an encapsulation");
        };
        assert_eq!(encap.source_endpoint, 2);
        assert_eq!(encap.destination_endpoint, 0);
        assert!(matches!(*encap.encapsulated, CC::BinarySwitchCCReport(_)));
    }

    #[test]
    fn test_response_must_come_from_addressed_endpoint() {
        let get = MultiChannelCCCommandEncapsulation::new(2, BinarySwitchCCGet::default().into());

        let mut report = MultiChannelCCCommandEncapsulation::new(
            0,
            CC::BinarySwitchCCReport(
                BinarySwitchCCReport::builder()
                    .current_value(BinaryReport::On)
                    .build(),
            ),
        );
        report.source_endpoint = 2;
        assert!(get.test_response(&report.clone().into()));

        report.source_endpoint = 3;
        assert!(!get.test_response(&report.into()));
    }
}
