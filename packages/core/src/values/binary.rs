use crate::parse::{ParseResult, Parser, TryFromReprError, bytes::be_u8, combinators::map_res};
use crate::serialize::{self, Serializable};
use ::bytes::{Bytes, BytesMut};

// All values from 1 to BINARY_SET_MAX are interpreted as ON in SET commands
pub const BINARY_SET_MAX: u8 = 99;
pub const BINARY_UNKNOWN: u8 = 0xfe;
pub const BINARY_ON: u8 = 0xff;

/// A binary target value in a SET command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BinarySet {
    Off = 0,
    On = BINARY_ON,
}

impl TryFrom<u8> for BinarySet {
    type Error = TryFromReprError<u8>;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Off),
            1..=BINARY_SET_MAX | BINARY_ON => Ok(Self::On),
            _ => Err(TryFromReprError::Invalid(value)),
        }
    }
}

impl From<bool> for BinarySet {
    fn from(value: bool) -> Self {
        if value { Self::On } else { Self::Off }
    }
}

impl From<BinarySet> for bool {
    fn from(value: BinarySet) -> Self {
        value == BinarySet::On
    }
}

impl crate::parse::Parsable for BinarySet {
    fn parse(i: &mut Bytes) -> ParseResult<Self> {
        map_res(be_u8, Self::try_from).parse(i)
    }
}

impl Serializable for BinarySet {
    fn serialize(&self, output: &mut BytesMut) {
        serialize::bytes::be_u8(*self as u8).serialize(output);
    }
}

/// A binary value reported by a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BinaryReport {
    Off = 0,
    Unknown = BINARY_UNKNOWN,
    On = BINARY_ON,
}

impl TryFrom<u8> for BinaryReport {
    type Error = TryFromReprError<u8>;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Off),
            BINARY_UNKNOWN => Ok(Self::Unknown),
            BINARY_ON => Ok(Self::On),
            _ => Err(TryFromReprError::Invalid(value)),
        }
    }
}

impl crate::parse::Parsable for BinaryReport {
    fn parse(i: &mut Bytes) -> ParseResult<Self> {
        map_res(be_u8, Self::try_from).parse(i)
    }
}

impl Serializable for BinaryReport {
    fn serialize(&self, output: &mut BytesMut) {
        serialize::bytes::be_u8(*self as u8).serialize(output);
    }
}

impl From<Option<bool>> for BinaryReport {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => Self::On,
            Some(false) => Self::Off,
            None => Self::Unknown,
        }
    }
}

impl From<BinaryReport> for Option<bool> {
    fn from(value: BinaryReport) -> Self {
        match value {
            BinaryReport::On => Some(true),
            BinaryReport::Off => Some(false),
            BinaryReport::Unknown => None,
        }
    }
}

impl From<BinarySet> for BinaryReport {
    fn from(value: BinarySet) -> Self {
        match value {
            BinarySet::On => Self::On,
            BinarySet::Off => Self::Off,
        }
    }
}
