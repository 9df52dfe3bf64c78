use crate::parse::{ParseResult, Parser, TryFromReprError, bytes::be_u8, combinators::map_res};
use crate::serialize::{self, Serializable};
use crate::values::Canonical;
use ::bytes::{Bytes, BytesMut};
use num_traits::clamp;
use std::time::Duration;

const MINUTES_MASK: u8 = 0b1000_0000;
const SECONDS_MASK: u8 = 0b0111_1111;

/// A transition duration in a SET command. `Default` leaves the choice to
/// the device.
#[derive(Default, Debug, Clone, Copy)]
pub enum DurationSet {
    Seconds(u8),
    Minutes(u8),
    #[default]
    Default,
}

impl TryFrom<u8> for DurationSet {
    type Error = TryFromReprError<u8>;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0xff => Ok(Self::Default),
            0..=SECONDS_MASK => Ok(Self::Seconds(value)),
            _ => Ok(Self::Minutes((value & SECONDS_MASK) + 1)),
        }
    }
}

impl From<DurationSet> for u8 {
    fn from(value: DurationSet) -> Self {
        match value.to_canonical() {
            DurationSet::Seconds(seconds) => seconds & SECONDS_MASK,
            DurationSet::Minutes(minutes) => MINUTES_MASK | ((minutes - 1) & SECONDS_MASK),
            DurationSet::Default => 0xff,
        }
    }
}

impl Canonical for DurationSet {
    fn to_canonical(&self) -> Self {
        // A set duration can represent 0..127 seconds or 1..127 minutes
        match self {
            Self::Default => Self::Default,
            Self::Minutes(m) => Self::Minutes(clamp(*m, 1, 127)),
            Self::Seconds(s) if *s <= 127u8 => *self,
            // Round seconds > 127 to minutes
            Self::Seconds(s) => {
                let minutes = (*s as f32 / 60.0).round() as u8;
                Self::Minutes(clamp(minutes, 1, 127))
            }
        }
    }
}

impl PartialEq for DurationSet {
    fn eq(&self, other: &Self) -> bool {
        match (self.to_canonical(), other.to_canonical()) {
            (Self::Seconds(l0), Self::Seconds(r0)) => l0 == r0,
            (Self::Minutes(l0), Self::Minutes(r0)) => l0 == r0,
            (l, r) => core::mem::discriminant(&l) == core::mem::discriminant(&r),
        }
    }
}

impl crate::parse::Parsable for DurationSet {
    fn parse(i: &mut Bytes) -> ParseResult<Self> {
        map_res(be_u8, Self::try_from).parse(i)
    }
}

impl Serializable for DurationSet {
    fn serialize(&self, output: &mut BytesMut) {
        serialize::bytes::be_u8((*self).into()).serialize(output);
    }
}

/// A remaining transition duration reported by a device
#[derive(Default, Debug, Clone, Copy)]
pub enum DurationReport {
    Seconds(u8),
    Minutes(u8),
    #[default]
    Unknown,
}

impl DurationReport {
    /// The reported duration as wall-clock time, if known
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Self::Seconds(s) => Some(Duration::from_secs(*s as u64)),
            Self::Minutes(m) => Some(Duration::from_secs(*m as u64 * 60)),
            Self::Unknown => None,
        }
    }
}

impl TryFrom<u8> for DurationReport {
    type Error = TryFromReprError<u8>;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0xfe => Ok(Self::Unknown),
            0xff => Err(TryFromReprError::Invalid(value)),
            0..=SECONDS_MASK => Ok(Self::Seconds(value)),
            _ => Ok(Self::Minutes((value & SECONDS_MASK) + 1)),
        }
    }
}

impl From<DurationReport> for u8 {
    fn from(value: DurationReport) -> Self {
        match value.to_canonical() {
            DurationReport::Seconds(seconds) => seconds & SECONDS_MASK,
            DurationReport::Minutes(minutes) => MINUTES_MASK | ((minutes - 1) & SECONDS_MASK),
            DurationReport::Unknown => 0xfe,
        }
    }
}

impl Canonical for DurationReport {
    fn to_canonical(&self) -> Self {
        match self {
            Self::Unknown => Self::Unknown,
            Self::Minutes(m) => Self::Minutes(clamp(*m, 1, 127)),
            Self::Seconds(s) if *s <= 127u8 => *self,
            Self::Seconds(s) => {
                let minutes = (*s as f32 / 60.0).round() as u8;
                Self::Minutes(clamp(minutes, 1, 127))
            }
        }
    }
}

impl PartialEq for DurationReport {
    fn eq(&self, other: &Self) -> bool {
        match (self.to_canonical(), other.to_canonical()) {
            (Self::Seconds(l0), Self::Seconds(r0)) => l0 == r0,
            (Self::Minutes(l0), Self::Minutes(r0)) => l0 == r0,
            (l, r) => core::mem::discriminant(&l) == core::mem::discriminant(&r),
        }
    }
}

impl crate::parse::Parsable for DurationReport {
    fn parse(i: &mut Bytes) -> ParseResult<Self> {
        map_res(be_u8, Self::try_from).parse(i)
    }
}

impl Serializable for DurationReport {
    fn serialize(&self, output: &mut BytesMut) {
        serialize::bytes::be_u8((*self).into()).serialize(output);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_duration_set_roundtrip() {
        for raw in [0u8, 1, 60, 127, 0x80, 0x81, 0xfe, 0xff] {
            let parsed = DurationSet::try_from(raw).unwrap();
            assert_eq!(u8::from(parsed), raw);
        }
    }

    #[test]
    fn test_duration_report_as_duration() {
        assert_eq!(
            DurationReport::Seconds(5).as_duration(),
            Some(Duration::from_secs(5))
        );
        assert_eq!(
            DurationReport::Minutes(2).as_duration(),
            Some(Duration::from_secs(120))
        );
        assert_eq!(DurationReport::Unknown.as_duration(), None);
    }
}
