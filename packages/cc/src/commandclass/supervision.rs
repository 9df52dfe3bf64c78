use crate::commandclass_raw::CCRaw;
use bytes::{Bytes, BytesMut};
use crate::prelude::*;
use derive_try_from_primitive::*;
use typed_builder::TypedBuilder;
use zwh_core::parse::{
    Parser,
    bytes::be_u8,
    combinators::{map_res, opt},
    multi::length_value,
};
use zwh_core::prelude::*;

const SESSION_ID_MASK: u8 = 0b0011_1111;
const GET_STATUS_UPDATES: u8 = 0b1000_0000;
const REPORT_MORE_UPDATES: u8 = 0b1000_0000;

#[derive(Debug, Clone, Copy, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum SupervisionCCCommand {
    Get = 0x01,
    Report = 0x02,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum SupervisionStatus {
    NoSupport = 0x00,
    Working = 0x01,
    Fail = 0x02,
    Success = 0xff,
}

impl SupervisionStatus {
    /// Whether this status ends the supervision session
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Working)
    }
}

/// Wraps a command and asks the target to confirm the outcome explicitly
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisionCCGet {
    pub session_id: u8,
    pub status_updates: bool,
    pub encapsulated: Box<CC>,
}

impl SupervisionCCGet {
    pub fn new(session_id: u8, encapsulated: CC) -> Self {
        Self {
            session_id: session_id & SESSION_ID_MASK,
            status_updates: true,
            encapsulated: Box::new(encapsulated),
        }
    }
}

impl CCBase for SupervisionCCGet {
    fn expects_response(&self) -> bool {
        // Supervision always confirms with a report, regardless of the
        // encapsulated CC
        true
    }

    fn test_response(&self, response: &CC) -> bool {
        matches!(
            response,
            CC::SupervisionCCReport(report) if report.session_id == self.session_id
        )
    }
}

impl CCValues for SupervisionCCGet {}

impl CCId for SupervisionCCGet {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::Supervision
    }

    fn cc_command(&self) -> Option<u8> {
        Some(SupervisionCCCommand::Get as _)
    }
}

impl CCParsable for SupervisionCCGet {
    fn parse(i: &mut Bytes, ctx: &CCParsingContext) -> ParseResult<Self> {
        let flags = be_u8(i)?;
        let encapsulated = length_value(
            be_u8,
            map_res(CCRaw::parse, |raw| CC::try_from_raw(raw, ctx)),
        )
        .parse(i)?;

        Ok(Self {
            session_id: flags & SESSION_ID_MASK,
            status_updates: flags & GET_STATUS_UPDATES != 0,
            encapsulated: Box::new(encapsulated),
        })
    }
}

impl CCSerializable for SupervisionCCGet {
    fn serialize(&self, output: &mut BytesMut, ctx: &CCEncodingContext) {
        use serialize::bytes::{be_u8, slice};

        let mut flags = self.session_id & SESSION_ID_MASK;
        if self.status_updates {
            flags |= GET_STATUS_UPDATES;
        }
        let payload = self.encapsulated.as_raw(ctx).as_bytes();

        be_u8(flags).serialize(output);
        be_u8(payload.len() as u8).serialize(output);
        slice(payload).serialize(output);
    }
}

impl ToLogPayload for SupervisionCCGet {
    fn to_log_payload(&self) -> LogPayload {
        LogPayloadDict::new()
            .with_entry("session id", self.session_id)
            .with_entry("status updates", self.status_updates)
            .with_nested(self.encapsulated.to_log_payload())
            .into()
    }
}

#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct SupervisionCCReport {
    pub session_id: u8,
    #[builder(default)]
    pub more_updates: bool,
    pub status: SupervisionStatus,
    #[builder(default, setter(into))]
    pub duration: Option<DurationReport>,
}

impl CCBase for SupervisionCCReport {}

impl CCValues for SupervisionCCReport {}

impl CCId for SupervisionCCReport {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::Supervision
    }

    fn cc_command(&self) -> Option<u8> {
        Some(SupervisionCCCommand::Report as _)
    }
}

impl CCParsable for SupervisionCCReport {
    fn parse(i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        let flags = be_u8(i)?;
        let status = map_res(be_u8, SupervisionStatus::try_from).parse(i)?;
        let duration = opt(DurationReport::parse).parse(i)?;

        Ok(Self {
            session_id: flags & SESSION_ID_MASK,
            more_updates: flags & REPORT_MORE_UPDATES != 0,
            status,
            duration,
        })
    }
}

impl CCSerializable for SupervisionCCReport {
    fn serialize(&self, output: &mut BytesMut, _ctx: &CCEncodingContext) {
        use serialize::bytes::be_u8;

        let mut flags = self.session_id & SESSION_ID_MASK;
        if self.more_updates {
            flags |= REPORT_MORE_UPDATES;
        }
        be_u8(flags).serialize(output);
        be_u8(self.status as u8).serialize(output);
        self.duration.map(|d| be_u8(d.into())).serialize(output);
    }
}

impl ToLogPayload for SupervisionCCReport {
    fn to_log_payload(&self) -> LogPayload {
        let mut ret = LogPayloadDict::new()
            .with_entry("session id", self.session_id)
            .with_entry("more updates", self.more_updates)
            .with_entry("status", format!("{:?}", self.status));
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
    fn test_get_roundtrip() {
        let inner = CC::from(
            MultilevelSwitchCCSet::builder()
                .target_value(LevelSet::Level(80))
                .build(),
        );
        let cc = CC::from(SupervisionCCGet::new(11, inner));
        let raw = cc.as_raw(&CCEncodingContext::default());
        // 6c 01 (Get), session 11 with status updates, length 3, 26 01 50
        assert_eq!(
            raw.as_bytes(),
            Bytes::from_static(&[0x6c, 0x01, 0x8b, 0x03, 0x26, 0x01, 0x50])
        );

        let mut input = raw.as_bytes();
        let raw = CCRaw::parse(&mut input).unwrap();
        assert_eq!(CC::try_from_raw(raw, &CCParsingContext::default()).unwrap(), cc);
    }

    #[test]
    fn test_report_matches_session() {
        let get = SupervisionCCGet::new(5, CC::from(BinarySwitchCCGet::default()));
        let report = |session_id: u8| {
            CC::from(
                SupervisionCCReport::builder()
                    .session_id(session_id)
                    .status(SupervisionStatus::Success)
                    .build(),
            )
        };
        assert!(get.test_response(&report(5)));
        assert!(!get.test_response(&report(6)));
    }
}
