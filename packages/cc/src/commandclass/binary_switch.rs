use crate::cc_value;
use crate::prelude::*;
use bytes::{Bytes, BytesMut};
use derive_try_from_primitive::*;
use typed_builder::TypedBuilder;
use zwh_core::parse::{
    Parser,
    combinators::{map, opt},
};
use zwh_core::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum BinarySwitchCCCommand {
    Set = 0x01,
    Get = 0x02,
    Report = 0x03,
}

#[derive(Debug, Clone, Copy, PartialEq, TryFromPrimitive)]
#[repr(u8)]
enum BinarySwitchCCProperties {
    CurrentValue = 0x00,
    TargetValue = 0x01,
    Duration = 0x02,
}

pub struct BinarySwitchCCValues;
impl BinarySwitchCCValues {
    cc_value!(
        pub current_value,
        BinarySwitch,
        BinarySwitchCCProperties::CurrentValue,
        ValueMetadata::readonly_boolean("Current value")
    );

    cc_value!(
        pub target_value,
        BinarySwitch,
        BinarySwitchCCProperties::TargetValue,
        ValueMetadata::boolean("Target value")
    );

    cc_value!(
        pub duration,
        BinarySwitch,
        BinarySwitchCCProperties::Duration,
        ValueMetadata::readonly_duration("Remaining duration")
    );
}

#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct BinarySwitchCCSet {
    pub target_value: BinarySet,
    #[builder(default, setter(into))]
    pub duration: Option<DurationSet>,
}

impl CCBase for BinarySwitchCCSet {}

impl CCValues for BinarySwitchCCSet {}

impl CCId for BinarySwitchCCSet {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::BinarySwitch
    }

    fn cc_command(&self) -> Option<u8> {
        Some(BinarySwitchCCCommand::Set as _)
    }
}

impl CCParsable for BinarySwitchCCSet {
    fn parse(i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        let target_value = BinarySet::parse(i)?;
        let duration = opt(DurationSet::parse).parse(i)?;

        Ok(Self {
            target_value,
            duration,
        })
    }
}

impl CCSerializable for BinarySwitchCCSet {
    fn serialize(&self, output: &mut BytesMut, _ctx: &CCEncodingContext) {
        self.target_value.serialize(output);
        self.duration.serialize(output);
    }
}

impl ToLogPayload for BinarySwitchCCSet {
    fn to_log_payload(&self) -> LogPayload {
        let mut ret =
            LogPayloadDict::new().with_entry("target value", format!("{:?}", self.target_value));
        if let Some(duration) = self.duration {
            ret = ret.with_entry("duration", format!("{:?}", duration));
        }
        ret.into()
    }
}

#[derive(Default, Debug, Clone, PartialEq)]
pub struct BinarySwitchCCGet {}

impl CCBase for BinarySwitchCCGet {
    fn expects_response(&self) -> bool {
        true
    }

    fn test_response(&self, response: &CC) -> bool {
        matches!(response, CC::BinarySwitchCCReport(_))
    }
}

impl CCValues for BinarySwitchCCGet {}

impl CCId for BinarySwitchCCGet {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::BinarySwitch
    }

    fn cc_command(&self) -> Option<u8> {
        Some(BinarySwitchCCCommand::Get as _)
    }
}

impl CCParsable for BinarySwitchCCGet {
    fn parse(_i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        // No payload
        Ok(Self {})
    }
}

impl CCSerializable for BinarySwitchCCGet {
    fn serialize(&self, _output: &mut BytesMut, _ctx: &CCEncodingContext) {
        // No payload
    }
}

impl ToLogPayload for BinarySwitchCCGet {
    fn to_log_payload(&self) -> LogPayload {
        LogPayload::empty()
    }
}

#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct BinarySwitchCCReport {
    pub current_value: BinaryReport,
    #[builder(default, setter(into))]
    pub target_value: Option<BinaryReport>,
    #[builder(default, setter(into))]
    pub duration: Option<DurationReport>,
}

impl CCBase for BinarySwitchCCReport {}

impl CCValues for BinarySwitchCCReport {
    fn to_values(&self) -> Vec<(ValueId, CacheValue)> {
        let mut ret = vec![(
            BinarySwitchCCValues::current_value().id,
            CacheValue::BinaryReport(self.current_value),
        )];
        if let Some(target_value) = self.target_value {
            ret.push((
                BinarySwitchCCValues::target_value().id,
                CacheValue::BinaryReport(target_value),
            ));
        }
        if let Some(duration) = self.duration {
            ret.push((
                BinarySwitchCCValues::duration().id,
                CacheValue::DurationReport(duration),
            ));
        }
        ret
    }

    fn to_metadata(&self) -> Vec<(ValueId, ValueMetadata)> {
        let mut ret = vec![{
            let v = BinarySwitchCCValues::current_value();
            (v.id, v.metadata)
        }];
        if self.target_value.is_some() {
            let v = BinarySwitchCCValues::target_value();
            ret.push((v.id, v.metadata));
        }
        if self.duration.is_some() {
            let v = BinarySwitchCCValues::duration();
            ret.push((v.id, v.metadata));
        }
        ret
    }
}

impl CCId for BinarySwitchCCReport {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::BinarySwitch
    }

    fn cc_command(&self) -> Option<u8> {
        Some(BinarySwitchCCCommand::Report as _)
    }
}

impl CCParsable for BinarySwitchCCReport {
    fn parse(i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        let current_value = BinaryReport::parse(i)?;
        let (target_value, duration) =
            map(opt((BinaryReport::parse, DurationReport::parse)), |x| {
                x.unzip()
            })
            .parse(i)?;

        Ok(Self {
            current_value,
            target_value,
            duration,
        })
    }
}

impl CCSerializable for BinarySwitchCCReport {
    fn serialize(&self, output: &mut BytesMut, _ctx: &CCEncodingContext) {
        self.current_value.serialize(output);
        if let Some(target_value) = self.target_value {
            target_value.serialize(output);
            self.duration.unwrap_or_default().serialize(output);
        }
    }
}

impl ToLogPayload for BinarySwitchCCReport {
    fn to_log_payload(&self) -> LogPayload {
        let mut ret =
            LogPayloadDict::new().with_entry("current value", format!("{:?}", self.current_value));
        if let Some(target_value) = self.target_value {
            ret = ret.with_entry("target value", format!("{:?}", target_value));
        }
        if let Some(duration) = self.duration {
            ret = ret.with_entry("duration", format!("{:?}", duration));
        }
        ret.into()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_set_roundtrip() {
        // BinarySwitchCC::Set(targetValue: true) => 25 01 ff
        let cc = CC::from(BinarySwitchCCSet::builder().target_value(BinarySet::On).build());
        let ctx = CCEncodingContext::default();
        let raw = cc.as_raw(&ctx);
        assert_eq!(raw.as_bytes(), Bytes::from_static(&[0x25, 0x01, 0xff]));

        let mut input = Bytes::from_static(&[0x25, 0x01, 0xff]);
        let raw = CCRaw::parse(&mut input).unwrap();
        let parsed = CC::try_from_raw(raw, &CCParsingContext::default()).unwrap();
        assert_eq!(parsed, cc);
    }

    #[test]
    fn test_get_serializes_to_command_only() {
        let cc = CC::from(BinarySwitchCCGet::default());
        let ctx = CCEncodingContext::default();
        assert_eq!(cc.as_raw(&ctx).as_bytes(), Bytes::from_static(&[0x25, 0x02]));
    }

    #[test]
    fn test_report_with_target_and_duration() {
        let mut input = Bytes::from_static(&[0x25, 0x03, 0x00, 0xff, 0x05]);
        let raw = CCRaw::parse(&mut input).unwrap();
        let parsed = CC::try_from_raw(raw, &CCParsingContext::default()).unwrap();
        let CC::BinarySwitchCCReport(report) = parsed else {
            panic!("expected a BinarySwitchCCReport");
        };
        assert_eq!(report.current_value, BinaryReport::Off);
        assert_eq!(report.target_value, Some(BinaryReport::On));
        assert_eq!(report.duration, Some(DurationReport::Seconds(5)));
    }
}
