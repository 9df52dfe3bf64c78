use crate::cc_value;
use crate::prelude::*;
use bytes::{Bytes, BytesMut};
use derive_try_from_primitive::*;
use typed_builder::TypedBuilder;
use zwh_core::parse::bytes::be_u8;
use zwh_core::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum WakeUpCCCommand {
    IntervalSet = 0x04,
    IntervalGet = 0x05,
    IntervalReport = 0x06,
    Notification = 0x07,
    NoMoreInformation = 0x08,
}

pub struct WakeUpCCValues;
impl WakeUpCCValues {
    cc_value!(
        pub wakeup_interval,
        WakeUp,
        0x00u8,
        ValueMetadata::builder()
            .value_type(ValueType::Number)
            .label(Some("Wake-up interval".into()))
            .unit(Some("s".into()))
            .build()
    );

    cc_value!(
        pub controller_node_id,
        WakeUp,
        0x01u8,
        ValueMetadata::readonly_number("Node to notify on wake-up")
    );
}

fn parse_u24(i: &mut Bytes) -> ParseResult<u32> {
    let high = be_u8(i)? as u32;
    let mid = be_u8(i)? as u32;
    let low = be_u8(i)? as u32;
    Ok((high << 16) | (mid << 8) | low)
}

fn write_u24(value: u32, output: &mut BytesMut) {
    use serialize::bytes::be_u8;
    be_u8((value >> 16) as u8).serialize(output);
    be_u8((value >> 8) as u8).serialize(output);
    be_u8(value as u8).serialize(output);
}

#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct WakeUpCCIntervalSet {
    /// Wake-up interval in seconds (24-bit)
    pub interval: u32,
    pub controller_node_id: NodeId,
}

impl CCBase for WakeUpCCIntervalSet {}

impl CCValues for WakeUpCCIntervalSet {}

impl CCId for WakeUpCCIntervalSet {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::WakeUp
    }

    fn cc_command(&self) -> Option<u8> {
        Some(WakeUpCCCommand::IntervalSet as _)
    }
}

impl CCParsable for WakeUpCCIntervalSet {
    fn parse(i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        let interval = parse_u24(i)?;
        let controller_node_id = NodeId::parse(i)?;
        Ok(Self {
            interval,
            controller_node_id,
        })
    }
}

impl CCSerializable for WakeUpCCIntervalSet {
    fn serialize(&self, output: &mut BytesMut, _ctx: &CCEncodingContext) {
        write_u24(self.interval, output);
        self.controller_node_id.serialize(output);
    }
}

impl ToLogPayload for WakeUpCCIntervalSet {
    fn to_log_payload(&self) -> LogPayload {
        LogPayloadDict::new()
            .with_entry("interval", format!("{} s", self.interval))
            .with_entry("controller node", self.controller_node_id.to_string())
            .into()
    }
}

#[derive(Default, Debug, Clone, PartialEq)]
pub struct WakeUpCCIntervalGet {}

impl CCBase for WakeUpCCIntervalGet {
    fn expects_response(&self) -> bool {
        true
    }

    fn test_response(&self, response: &CC) -> bool {
        matches!(response, CC::WakeUpCCIntervalReport(_))
    }
}

impl CCValues for WakeUpCCIntervalGet {}

impl CCId for WakeUpCCIntervalGet {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::WakeUp
    }

    fn cc_command(&self) -> Option<u8> {
        Some(WakeUpCCCommand::IntervalGet as _)
    }
}

impl CCParsable for WakeUpCCIntervalGet {
    fn parse(_i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        Ok(Self {})
    }
}

impl CCSerializable for WakeUpCCIntervalGet {
    fn serialize(&self, _output: &mut BytesMut, _ctx: &CCEncodingContext) {
        // No payload
    }
}

impl ToLogPayload for WakeUpCCIntervalGet {
    fn to_log_payload(&self) -> LogPayload {
        LogPayload::empty()
    }
}

#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct WakeUpCCIntervalReport {
    pub interval: u32,
    pub controller_node_id: NodeId,
}

impl CCBase for WakeUpCCIntervalReport {}

impl CCValues for WakeUpCCIntervalReport {
    fn to_values(&self) -> Vec<(ValueId, CacheValue)> {
        vec![
            (
                WakeUpCCValues::wakeup_interval().id,
                CacheValue::UInt32(self.interval),
            ),
            (
                WakeUpCCValues::controller_node_id().id,
                CacheValue::UInt8(self.controller_node_id.into()),
            ),
        ]
    }

    fn to_metadata(&self) -> Vec<(ValueId, ValueMetadata)> {
        [
            WakeUpCCValues::wakeup_interval(),
            WakeUpCCValues::controller_node_id(),
        ]
        .into_iter()
        .map(|v| (v.id, v.metadata))
        .collect()
    }
}

impl CCId for WakeUpCCIntervalReport {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::WakeUp
    }

    fn cc_command(&self) -> Option<u8> {
        Some(WakeUpCCCommand::IntervalReport as _)
    }
}

impl CCParsable for WakeUpCCIntervalReport {
    fn parse(i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        let interval = parse_u24(i)?;
        let controller_node_id = NodeId::parse(i)?;
        Ok(Self {
            interval,
            controller_node_id,
        })
    }
}

impl CCSerializable for WakeUpCCIntervalReport {
    fn serialize(&self, output: &mut BytesMut, _ctx: &CCEncodingContext) {
        write_u24(self.interval, output);
        self.controller_node_id.serialize(output);
    }
}

impl ToLogPayload for WakeUpCCIntervalReport {
    fn to_log_payload(&self) -> LogPayload {
        LogPayloadDict::new()
            .with_entry("interval", format!("{} s", self.interval))
            .with_entry("controller node", self.controller_node_id.to_string())
            .into()
    }
}

/// Sent by a sleeping node when it wakes up. The driver uses this to flush
/// the node's pending transactions.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct WakeUpCCNotification {}

impl CCBase for WakeUpCCNotification {}

impl CCValues for WakeUpCCNotification {}

impl CCId for WakeUpCCNotification {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::WakeUp
    }

    fn cc_command(&self) -> Option<u8> {
        Some(WakeUpCCCommand::Notification as _)
    }
}

impl CCParsable for WakeUpCCNotification {
    fn parse(_i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        Ok(Self {})
    }
}

impl CCSerializable for WakeUpCCNotification {
    fn serialize(&self, _output: &mut BytesMut, _ctx: &CCEncodingContext) {
        // No payload
    }
}

impl ToLogPayload for WakeUpCCNotification {
    fn to_log_payload(&self) -> LogPayload {
        LogPayload::empty()
    }
}

/// Tells a woken-up node that it may go back to sleep
#[derive(Default, Debug, Clone, PartialEq)]
pub struct WakeUpCCNoMoreInformation {}

impl CCBase for WakeUpCCNoMoreInformation {}

impl CCValues for WakeUpCCNoMoreInformation {}

impl CCId for WakeUpCCNoMoreInformation {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::WakeUp
    }

    fn cc_command(&self) -> Option<u8> {
        Some(WakeUpCCCommand::NoMoreInformation as _)
    }
}

impl CCParsable for WakeUpCCNoMoreInformation {
    fn parse(_i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        Ok(Self {})
    }
}

impl CCSerializable for WakeUpCCNoMoreInformation {
    fn serialize(&self, _output: &mut BytesMut, _ctx: &CCEncodingContext) {
        // No payload
    }
}

impl ToLogPayload for WakeUpCCNoMoreInformation {
    fn to_log_payload(&self) -> LogPayload {
        LogPayload::empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_interval_report_roundtrip() {
        // 3600 s, notify node 1
        let mut input = Bytes::from_static(&[0x84, 0x06, 0x00, 0x0e, 0x10, 0x01]);
        let raw = CCRaw::parse(&mut input).unwrap();
        let cc = CC::try_from_raw(raw, &CCParsingContext::default()).unwrap();
        let CC::WakeUpCCIntervalReport(report) = &cc else {
            panic!("expected WakeUpCCIntervalReport");
        };
        assert_eq!(report.interval, 3600);
        assert_eq!(report.controller_node_id, NodeId::new(1));

        let raw = cc.as_raw(&CCEncodingContext::default());
        assert_eq!(
            raw.as_bytes(),
            Bytes::from_static(&[0x84, 0x06, 0x00, 0x0e, 0x10, 0x01])
        );
    }
}
