use crate::parse::{ParseResult, Parser, TryFromReprError, bytes::be_u8, combinators::map_res};
use crate::serialize::{self, Serializable};
use ::bytes::{Bytes, BytesMut};

pub const LEVEL_MAX: u8 = 99;
pub const LEVEL_UNKNOWN: u8 = 0xfe;
pub const LEVEL_RESTORE_PREVIOUS: u8 = 0xff;

/// A multilevel target value in a SET command: an absolute level or the
/// request to restore the previous non-zero level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelSet {
    Level(u8),
    RestorePrevious,
}

impl TryFrom<u8> for LevelSet {
    type Error = TryFromReprError<u8>;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0..=LEVEL_MAX => Ok(Self::Level(value)),
            LEVEL_RESTORE_PREVIOUS => Ok(Self::RestorePrevious),
            _ => Err(TryFromReprError::Invalid(value)),
        }
    }
}

impl From<LevelSet> for u8 {
    fn from(value: LevelSet) -> Self {
        match value {
            LevelSet::Level(level) => level.min(LEVEL_MAX),
            LevelSet::RestorePrevious => LEVEL_RESTORE_PREVIOUS,
        }
    }
}

impl crate::parse::Parsable for LevelSet {
    fn parse(i: &mut Bytes) -> ParseResult<Self> {
        map_res(be_u8, Self::try_from).parse(i)
    }
}

impl Serializable for LevelSet {
    fn serialize(&self, output: &mut BytesMut) {
        serialize::bytes::be_u8((*self).into()).serialize(output);
    }
}

/// A multilevel value reported by a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelReport {
    Level(u8),
    Unknown,
}

impl TryFrom<u8> for LevelReport {
    type Error = TryFromReprError<u8>;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0..=LEVEL_MAX => Ok(Self::Level(value)),
            LEVEL_UNKNOWN => Ok(Self::Unknown),
            // Some legacy devices report 0xff for "fully on"
            LEVEL_RESTORE_PREVIOUS => Ok(Self::Level(LEVEL_MAX)),
            _ => Err(TryFromReprError::Invalid(value)),
        }
    }
}

impl From<LevelReport> for Option<u8> {
    fn from(value: LevelReport) -> Self {
        match value {
            LevelReport::Level(level) => Some(level),
            LevelReport::Unknown => None,
        }
    }
}

impl crate::parse::Parsable for LevelReport {
    fn parse(i: &mut Bytes) -> ParseResult<Self> {
        map_res(be_u8, Self::try_from).parse(i)
    }
}

impl Serializable for LevelReport {
    fn serialize(&self, output: &mut BytesMut) {
        let raw = match self {
            Self::Level(level) => (*level).min(LEVEL_MAX),
            Self::Unknown => LEVEL_UNKNOWN,
        };
        serialize::bytes::be_u8(raw).serialize(output);
    }
}
