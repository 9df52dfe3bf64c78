use crate::cc_value;
use crate::prelude::*;
use bytes::{Bytes, BytesMut};
use derive_try_from_primitive::*;
use typed_builder::TypedBuilder;
use zwh_core::parse::{Parser, bytes::be_u8, combinators::opt};
use zwh_core::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum VersionCCCommand {
    Get = 0x11,
    Report = 0x12,
    CommandClassGet = 0x13,
    CommandClassReport = 0x14,
}

pub struct VersionCCValues;
impl VersionCCValues {
    cc_value!(
        pub firmware_version,
        Version,
        0x00u8,
        ValueMetadata::readonly_string("Firmware version")
    );

    cc_value!(
        pub protocol_version,
        Version,
        0x01u8,
        ValueMetadata::readonly_string("Z-Wave protocol version")
    );

    cc_value!(
        pub library_type,
        Version,
        0x02u8,
        ValueMetadata::readonly_number("Library type")
    );
}

#[derive(Default, Debug, Clone, PartialEq)]
pub struct VersionCCGet {}

impl CCBase for VersionCCGet {
    fn expects_response(&self) -> bool {
        true
    }

    fn test_response(&self, response: &CC) -> bool {
        matches!(response, CC::VersionCCReport(_))
    }
}

impl CCValues for VersionCCGet {}

impl CCId for VersionCCGet {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::Version
    }

    fn cc_command(&self) -> Option<u8> {
        Some(VersionCCCommand::Get as _)
    }
}

impl CCParsable for VersionCCGet {
    fn parse(_i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        Ok(Self {})
    }
}

impl CCSerializable for VersionCCGet {
    fn serialize(&self, _output: &mut BytesMut, _ctx: &CCEncodingContext) {
        // No payload
    }
}

impl ToLogPayload for VersionCCGet {
    fn to_log_payload(&self) -> LogPayload {
        LogPayload::empty()
    }
}

#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct VersionCCReport {
    pub library_type: u8,
    pub protocol_version: (u8, u8),
    pub firmware_version: (u8, u8),
    #[builder(default, setter(into))]
    pub hardware_version: Option<u8>,
}

impl CCBase for VersionCCReport {}

impl CCValues for VersionCCReport {
    fn to_values(&self) -> Vec<(ValueId, CacheValue)> {
        vec![
            (
                VersionCCValues::firmware_version().id,
                CacheValue::String(format!(
                    "{}.{}",
                    self.firmware_version.0, self.firmware_version.1
                )),
            ),
            (
                VersionCCValues::protocol_version().id,
                CacheValue::String(format!(
                    "{}.{}",
                    self.protocol_version.0, self.protocol_version.1
                )),
            ),
            (
                VersionCCValues::library_type().id,
                CacheValue::UInt8(self.library_type),
            ),
        ]
    }

    fn to_metadata(&self) -> Vec<(ValueId, ValueMetadata)> {
        [
            VersionCCValues::firmware_version(),
            VersionCCValues::protocol_version(),
            VersionCCValues::library_type(),
        ]
        .into_iter()
        .map(|v| (v.id, v.metadata))
        .collect()
    }
}

impl CCId for VersionCCReport {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::Version
    }

    fn cc_command(&self) -> Option<u8> {
        Some(VersionCCCommand::Report as _)
    }
}

impl CCParsable for VersionCCReport {
    fn parse(i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        let library_type = be_u8(i)?;
        let protocol_version = (be_u8(i)?, be_u8(i)?);
        let firmware_version = (be_u8(i)?, be_u8(i)?);
        // Version CC V2 adds the hardware version and additional firmware
        // targets, which are ignored here
        let hardware_version = opt(be_u8).parse(i)?;

        Ok(Self {
            library_type,
            protocol_version,
            firmware_version,
            hardware_version,
        })
    }
}

impl CCSerializable for VersionCCReport {
    fn serialize(&self, output: &mut BytesMut, _ctx: &CCEncodingContext) {
        use serialize::bytes::be_u8;
        be_u8(self.library_type).serialize(output);
        be_u8(self.protocol_version.0).serialize(output);
        be_u8(self.protocol_version.1).serialize(output);
        be_u8(self.firmware_version.0).serialize(output);
        be_u8(self.firmware_version.1).serialize(output);
        self.hardware_version.map(be_u8).serialize(output);
    }
}

impl ToLogPayload for VersionCCReport {
    fn to_log_payload(&self) -> LogPayload {
        LogPayloadDict::new()
            .with_entry("library type", self.library_type)
            .with_entry(
                "protocol version",
                format!("{}.{}", self.protocol_version.0, self.protocol_version.1),
            )
            .with_entry(
                "firmware version",
                format!("{}.{}", self.firmware_version.0, self.firmware_version.1),
            )
            .into()
    }
}

#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct VersionCCCommandClassGet {
    pub requested_cc: CommandClasses,
}

impl CCBase for VersionCCCommandClassGet {
    fn expects_response(&self) -> bool {
        true
    }

    fn test_response(&self, response: &CC) -> bool {
        matches!(
            response,
            CC::VersionCCCommandClassReport(report) if report.requested_cc == self.requested_cc
        )
    }
}

impl CCValues for VersionCCCommandClassGet {}

impl CCId for VersionCCCommandClassGet {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::Version
    }

    fn cc_command(&self) -> Option<u8> {
        Some(VersionCCCommand::CommandClassGet as _)
    }
}

impl CCParsable for VersionCCCommandClassGet {
    fn parse(i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        let requested_cc = CommandClasses::parse(i)?;
        Ok(Self { requested_cc })
    }
}

impl CCSerializable for VersionCCCommandClassGet {
    fn serialize(&self, output: &mut BytesMut, _ctx: &CCEncodingContext) {
        self.requested_cc.serialize(output);
    }
}

impl ToLogPayload for VersionCCCommandClassGet {
    fn to_log_payload(&self) -> LogPayload {
        LogPayloadDict::new()
            .with_entry("command class", self.requested_cc.to_string())
            .into()
    }
}

#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct VersionCCCommandClassReport {
    pub requested_cc: CommandClasses,
    pub version: u8,
}

impl CCBase for VersionCCCommandClassReport {}

impl CCValues for VersionCCCommandClassReport {}

impl CCId for VersionCCCommandClassReport {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::Version
    }

    fn cc_command(&self) -> Option<u8> {
        Some(VersionCCCommand::CommandClassReport as _)
    }
}

impl CCParsable for VersionCCCommandClassReport {
    fn parse(i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        let requested_cc = CommandClasses::parse(i)?;
        let version = be_u8(i)?;
        Ok(Self {
            requested_cc,
            version,
        })
    }
}

impl CCSerializable for VersionCCCommandClassReport {
    fn serialize(&self, output: &mut BytesMut, _ctx: &CCEncodingContext) {
        self.requested_cc.serialize(output);
        serialize::bytes::be_u8(self.version).serialize(output);
    }
}

impl ToLogPayload for VersionCCCommandClassReport {
    fn to_log_payload(&self) -> LogPayload {
        LogPayloadDict::new()
            .with_entry("command class", self.requested_cc.to_string())
            .with_entry("version", self.version)
            .into()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_command_class_get_matches_report_for_same_cc() {
        let get = VersionCCCommandClassGet::builder()
            .requested_cc(CommandClasses::BinarySwitch)
            .build();

        let matching = CC::from(
            VersionCCCommandClassReport::builder()
                .requested_cc(CommandClasses::BinarySwitch)
                .version(2)
                .build(),
        );
        let other = CC::from(
            VersionCCCommandClassReport::builder()
                .requested_cc(CommandClasses::Version)
                .version(1)
                .build(),
        );

        assert!(get.test_response(&matching));
        assert!(!get.test_response(&other));
    }
}
