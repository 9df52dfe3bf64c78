use crate::cc_value;
use crate::prelude::*;
use bytes::{Bytes, BytesMut};
use derive_try_from_primitive::*;
use typed_builder::TypedBuilder;
use zwh_core::parse::{
    Parser,
    bytes::be_u8,
    combinators::{map, map_res, opt},
};
use zwh_core::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum MultilevelSwitchCCCommand {
    Set = 0x01,
    Get = 0x02,
    Report = 0x03,
    StartLevelChange = 0x04,
    StopLevelChange = 0x05,
    SupportedGet = 0x06,
    SupportedReport = 0x07,
}

#[derive(Debug, Clone, Copy, PartialEq, TryFromPrimitive)]
#[repr(u8)]
enum MultilevelSwitchCCProperties {
    CurrentValue = 0x00,
    TargetValue = 0x01,
    Duration = 0x02,
    SwitchType = 0x03,
}

/// The primary switch type reported by SupportedReport. Determines the
/// labels shown for the up/down directions - the ValueDB keys stay numeric,
/// only the metadata labels change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum SwitchType {
    NotSupported = 0x00,
    OffOn = 0x01,
    DownUp = 0x02,
    CloseOpen = 0x03,
    CounterClockwiseClockwise = 0x04,
    LeftRight = 0x05,
    ReverseForward = 0x06,
    PullPush = 0x07,
}

impl SwitchType {
    /// The (down, up) direction labels for this switch type
    pub fn label_pair(&self) -> (&'static str, &'static str) {
        match self {
            Self::NotSupported => ("Down", "Up"),
            Self::OffOn => ("Off", "On"),
            Self::DownUp => ("Down", "Up"),
            Self::CloseOpen => ("Close", "Open"),
            Self::CounterClockwiseClockwise => ("Counter-clockwise", "Clockwise"),
            Self::LeftRight => ("Left", "Right"),
            Self::ReverseForward => ("Reverse", "Forward"),
            Self::PullPush => ("Pull", "Push"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelChangeDirection {
    Up,
    Down,
}

pub struct MultilevelSwitchCCValues;
impl MultilevelSwitchCCValues {
    cc_value!(
        pub current_value,
        MultilevelSwitch,
        MultilevelSwitchCCProperties::CurrentValue,
        ValueMetadata::readonly_level("Current value")
    );

    cc_value!(
        pub target_value,
        MultilevelSwitch,
        MultilevelSwitchCCProperties::TargetValue,
        ValueMetadata::level("Target value")
    );

    cc_value!(
        pub duration,
        MultilevelSwitch,
        MultilevelSwitchCCProperties::Duration,
        ValueMetadata::readonly_duration("Remaining duration")
    );

    cc_value!(
        pub switch_type,
        MultilevelSwitch,
        MultilevelSwitchCCProperties::SwitchType,
        ValueMetadata::readonly_number("Switch type")
    );
}

#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct MultilevelSwitchCCSet {
    pub target_value: LevelSet,
    #[builder(default, setter(into))]
    pub duration: Option<DurationSet>,
}

impl CCBase for MultilevelSwitchCCSet {}

impl CCValues for MultilevelSwitchCCSet {}

impl CCId for MultilevelSwitchCCSet {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::MultilevelSwitch
    }

    fn cc_command(&self) -> Option<u8> {
        Some(MultilevelSwitchCCCommand::Set as _)
    }
}

impl CCParsable for MultilevelSwitchCCSet {
    fn parse(i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        let target_value = LevelSet::parse(i)?;
        let duration = opt(DurationSet::parse).parse(i)?;

        Ok(Self {
            target_value,
            duration,
        })
    }
}

impl CCSerializable for MultilevelSwitchCCSet {
    fn serialize(&self, output: &mut BytesMut, _ctx: &CCEncodingContext) {
        self.target_value.serialize(output);
        self.duration.serialize(output);
    }
}

impl ToLogPayload for MultilevelSwitchCCSet {
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
pub struct MultilevelSwitchCCGet {}

impl CCBase for MultilevelSwitchCCGet {
    fn expects_response(&self) -> bool {
        true
    }

    fn test_response(&self, response: &CC) -> bool {
        matches!(response, CC::MultilevelSwitchCCReport(_))
    }
}

impl CCValues for MultilevelSwitchCCGet {}

impl CCId for MultilevelSwitchCCGet {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::MultilevelSwitch
    }

    fn cc_command(&self) -> Option<u8> {
        Some(MultilevelSwitchCCCommand::Get as _)
    }
}

impl CCParsable for MultilevelSwitchCCGet {
    fn parse(_i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        Ok(Self {})
    }
}

impl CCSerializable for MultilevelSwitchCCGet {
    fn serialize(&self, _output: &mut BytesMut, _ctx: &CCEncodingContext) {
        // No payload
    }
}

impl ToLogPayload for MultilevelSwitchCCGet {
    fn to_log_payload(&self) -> LogPayload {
        LogPayload::empty()
    }
}

#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct MultilevelSwitchCCReport {
    pub current_value: LevelReport,
    #[builder(default, setter(into))]
    pub target_value: Option<LevelReport>,
    #[builder(default, setter(into))]
    pub duration: Option<DurationReport>,
}

impl CCBase for MultilevelSwitchCCReport {}

impl CCValues for MultilevelSwitchCCReport {
    fn to_values(&self) -> Vec<(ValueId, CacheValue)> {
        let mut ret = vec![(
            MultilevelSwitchCCValues::current_value().id,
            CacheValue::LevelReport(self.current_value),
        )];
        if let Some(target_value) = self.target_value {
            ret.push((
                MultilevelSwitchCCValues::target_value().id,
                CacheValue::LevelReport(target_value),
            ));
        }
        if let Some(duration) = self.duration {
            ret.push((
                MultilevelSwitchCCValues::duration().id,
                CacheValue::DurationReport(duration),
            ));
        }
        ret
    }

    fn to_metadata(&self) -> Vec<(ValueId, ValueMetadata)> {
        let mut ret = vec![{
            let v = MultilevelSwitchCCValues::current_value();
            (v.id, v.metadata)
        }];
        if self.target_value.is_some() {
            let v = MultilevelSwitchCCValues::target_value();
            ret.push((v.id, v.metadata));
        }
        if self.duration.is_some() {
            let v = MultilevelSwitchCCValues::duration();
            ret.push((v.id, v.metadata));
        }
        ret
    }
}

impl CCId for MultilevelSwitchCCReport {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::MultilevelSwitch
    }

    fn cc_command(&self) -> Option<u8> {
        Some(MultilevelSwitchCCCommand::Report as _)
    }
}

impl CCParsable for MultilevelSwitchCCReport {
    fn parse(i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        let current_value = LevelReport::parse(i)?;
        let (target_value, duration) =
            map(opt((LevelReport::parse, DurationReport::parse)), |x| {
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

impl CCSerializable for MultilevelSwitchCCReport {
    fn serialize(&self, output: &mut BytesMut, _ctx: &CCEncodingContext) {
        self.current_value.serialize(output);
        if let Some(target_value) = self.target_value {
            target_value.serialize(output);
            self.duration.unwrap_or_default().serialize(output);
        }
    }
}

impl ToLogPayload for MultilevelSwitchCCReport {
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

const START_LEVEL_CHANGE_DOWN: u8 = 0b0100_0000;
const START_LEVEL_CHANGE_IGNORE_START: u8 = 0b0010_0000;

#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct MultilevelSwitchCCStartLevelChange {
    pub direction: LevelChangeDirection,
    #[builder(default = true)]
    pub ignore_start_level: bool,
    #[builder(default)]
    pub start_level: u8,
    #[builder(default, setter(into))]
    pub duration: Option<DurationSet>,
}

impl CCBase for MultilevelSwitchCCStartLevelChange {}

impl CCValues for MultilevelSwitchCCStartLevelChange {}

impl CCId for MultilevelSwitchCCStartLevelChange {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::MultilevelSwitch
    }

    fn cc_command(&self) -> Option<u8> {
        Some(MultilevelSwitchCCCommand::StartLevelChange as _)
    }
}

impl CCParsable for MultilevelSwitchCCStartLevelChange {
    fn parse(i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        let flags = be_u8(i)?;
        let start_level = be_u8(i)?;
        let duration = opt(DurationSet::parse).parse(i)?;

        Ok(Self {
            direction: if flags & START_LEVEL_CHANGE_DOWN != 0 {
                LevelChangeDirection::Down
            } else {
                LevelChangeDirection::Up
            },
            ignore_start_level: flags & START_LEVEL_CHANGE_IGNORE_START != 0,
            start_level,
            duration,
        })
    }
}

impl CCSerializable for MultilevelSwitchCCStartLevelChange {
    fn serialize(&self, output: &mut BytesMut, _ctx: &CCEncodingContext) {
        use serialize::bytes::be_u8;

        let mut flags = 0;
        if self.direction == LevelChangeDirection::Down {
            flags |= START_LEVEL_CHANGE_DOWN;
        }
        if self.ignore_start_level {
            flags |= START_LEVEL_CHANGE_IGNORE_START;
        }
        be_u8(flags).serialize(output);
        be_u8(self.start_level).serialize(output);
        self.duration.serialize(output);
    }
}

impl ToLogPayload for MultilevelSwitchCCStartLevelChange {
    fn to_log_payload(&self) -> LogPayload {
        LogPayloadDict::new()
            .with_entry("direction", format!("{:?}", self.direction))
            .with_entry("ignore start level", self.ignore_start_level)
            .with_entry("start level", self.start_level)
            .into()
    }
}

#[derive(Default, Debug, Clone, PartialEq)]
pub struct MultilevelSwitchCCStopLevelChange {}

impl CCBase for MultilevelSwitchCCStopLevelChange {}

impl CCValues for MultilevelSwitchCCStopLevelChange {}

impl CCId for MultilevelSwitchCCStopLevelChange {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::MultilevelSwitch
    }

    fn cc_command(&self) -> Option<u8> {
        Some(MultilevelSwitchCCCommand::StopLevelChange as _)
    }
}

impl CCParsable for MultilevelSwitchCCStopLevelChange {
    fn parse(_i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        Ok(Self {})
    }
}

impl CCSerializable for MultilevelSwitchCCStopLevelChange {
    fn serialize(&self, _output: &mut BytesMut, _ctx: &CCEncodingContext) {
        // No payload
    }
}

impl ToLogPayload for MultilevelSwitchCCStopLevelChange {
    fn to_log_payload(&self) -> LogPayload {
        LogPayload::empty()
    }
}

#[derive(Default, Debug, Clone, PartialEq)]
pub struct MultilevelSwitchCCSupportedGet {}

impl CCBase for MultilevelSwitchCCSupportedGet {
    fn expects_response(&self) -> bool {
        true
    }

    fn test_response(&self, response: &CC) -> bool {
        matches!(response, CC::MultilevelSwitchCCSupportedReport(_))
    }
}

impl CCValues for MultilevelSwitchCCSupportedGet {}

impl CCId for MultilevelSwitchCCSupportedGet {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::MultilevelSwitch
    }

    fn cc_command(&self) -> Option<u8> {
        Some(MultilevelSwitchCCCommand::SupportedGet as _)
    }
}

impl CCParsable for MultilevelSwitchCCSupportedGet {
    fn parse(_i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        Ok(Self {})
    }
}

impl CCSerializable for MultilevelSwitchCCSupportedGet {
    fn serialize(&self, _output: &mut BytesMut, _ctx: &CCEncodingContext) {
        // No payload
    }
}

impl ToLogPayload for MultilevelSwitchCCSupportedGet {
    fn to_log_payload(&self) -> LogPayload {
        LogPayload::empty()
    }
}

#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct MultilevelSwitchCCSupportedReport {
    pub switch_type: SwitchType,
}

impl CCBase for MultilevelSwitchCCSupportedReport {}

impl CCValues for MultilevelSwitchCCSupportedReport {
    fn to_values(&self) -> Vec<(ValueId, CacheValue)> {
        vec![(
            MultilevelSwitchCCValues::switch_type().id,
            CacheValue::UInt8(self.switch_type as u8),
        )]
    }

    fn to_metadata(&self) -> Vec<(ValueId, ValueMetadata)> {
        // The direction labels depend on the reported switch type
        let (down, up) = self.switch_type.label_pair();
        let v = MultilevelSwitchCCValues::switch_type();
        vec![
            (v.id, v.metadata),
            (
                MultilevelSwitchCCValues::current_value().id,
                ValueMetadata::readonly_level(format!("Current value ({}/{})", down, up)),
            ),
            (
                MultilevelSwitchCCValues::target_value().id,
                ValueMetadata::level(format!("Target value ({}/{})", down, up)),
            ),
        ]
    }
}

impl CCId for MultilevelSwitchCCSupportedReport {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::MultilevelSwitch
    }

    fn cc_command(&self) -> Option<u8> {
        Some(MultilevelSwitchCCCommand::SupportedReport as _)
    }
}

impl CCParsable for MultilevelSwitchCCSupportedReport {
    fn parse(i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        let switch_type = map_res(map(be_u8, |b| b & 0x1f), SwitchType::try_from).parse(i)?;
        Ok(Self { switch_type })
    }
}

impl CCSerializable for MultilevelSwitchCCSupportedReport {
    fn serialize(&self, output: &mut BytesMut, _ctx: &CCEncodingContext) {
        serialize::bytes::be_u8(self.switch_type as u8).serialize(output);
    }
}

impl ToLogPayload for MultilevelSwitchCCSupportedReport {
    fn to_log_payload(&self) -> LogPayload {
        LogPayloadDict::new()
            .with_entry("switch type", format!("{:?}", self.switch_type))
            .into()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_set_roundtrip() {
        let cc = CC::from(
            MultilevelSwitchCCSet::builder()
                .target_value(LevelSet::Level(80))
                .build(),
        );
        let raw = cc.as_raw(&CCEncodingContext::default());
        assert_eq!(raw.as_bytes(), Bytes::from_static(&[0x26, 0x01, 0x50]));

        let mut input = Bytes::from_static(&[0x26, 0x01, 0x50]);
        let raw = CCRaw::parse(&mut input).unwrap();
        assert_eq!(CC::try_from_raw(raw, &CCParsingContext::default()).unwrap(), cc);
    }

    #[test]
    fn test_switch_type_labels() {
        assert_eq!(SwitchType::CloseOpen.label_pair(), ("Close", "Open"));

        let report = MultilevelSwitchCCSupportedReport::builder()
            .switch_type(SwitchType::CloseOpen)
            .build();
        let metadata = report.to_metadata();
        let current = &metadata[1].1;
        assert_eq!(current.label.as_deref(), Some("Current value (Close/Open)"));
    }
}
