use crate::definitions::{COMMAND_CLASS_SUPPORT_CONTROL_MARK, CommandClasses};
use crate::parse::{ParseResult, bytes::be_u8};
use crate::serialize::{self, Serializable};
use ::bytes::{Bytes, BytesMut};
use derive_try_from_primitive::*;

const CAPABILITY_LISTENING: u8 = 0b1000_0000;
const CAPABILITY_ROUTING: u8 = 0b0100_0000;
const CAPABILITY_MAX_DATA_RATE: u8 = 0b0011_1000;
const CAPABILITY_PROTOCOL_VERSION: u8 = 0b0000_0111;

const SECURITY_SECURE: u8 = 0b0000_0001;
const SECURITY_FLIRS_250MS: u8 = 0b0010_0000;
const SECURITY_FLIRS_1000MS: u8 = 0b0100_0000;
const SECURITY_BEAMING: u8 = 0b0001_0000;
const SECURITY_OPTIONAL_FUNCTIONALITY: u8 = 0b1000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum DataRate {
    DataRate9k6 = 0x01,
    DataRate40k = 0x02,
    DataRate100k = 0x03,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum ProtocolVersion {
    Unknown = 0,
    V2_0 = 1,
    V4_2x_5_0x = 2,
    V4_5x_6_0x = 3,
}

/// The device class triple advertised in protocol info and NIFs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceClass {
    pub basic: u8,
    pub generic: u8,
    pub specific: u8,
}

impl crate::parse::Parsable for DeviceClass {
    fn parse(i: &mut Bytes) -> ParseResult<Self> {
        let basic = be_u8(i)?;
        let generic = be_u8(i)?;
        let specific = be_u8(i)?;
        Ok(Self {
            basic,
            generic,
            specific,
        })
    }
}

impl Serializable for DeviceClass {
    fn serialize(&self, output: &mut BytesMut) {
        use serialize::{bytes::be_u8, sequence::tuple};
        tuple((be_u8(self.basic), be_u8(self.generic), be_u8(self.specific))).serialize(output);
    }
}

/// What the controller knows about a node's protocol-level capabilities.
/// A listening node is never frequent listening - the FLiRS bits are only
/// valid when the listening flag is unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeProtocolData {
    pub listening: bool,
    pub frequent_listening: bool,
    pub routing: bool,
    pub max_data_rate: DataRate,
    pub protocol_version: ProtocolVersion,
    pub beaming: bool,
    pub secure: bool,
    pub optional_functionality: bool,
    pub device_class: DeviceClass,
}

impl NodeProtocolData {
    /// A node that is neither always-on nor frequent listening can only be
    /// reached around wake-up notifications.
    pub fn is_sleeping(&self) -> bool {
        !self.listening && !self.frequent_listening
    }
}

impl Serializable for NodeProtocolData {
    fn serialize(&self, output: &mut BytesMut) {
        use serialize::bytes::be_u8;

        let mut capability = 0u8;
        if self.listening {
            capability |= CAPABILITY_LISTENING;
        }
        if self.routing {
            capability |= CAPABILITY_ROUTING;
        }
        capability |= (self.max_data_rate as u8) << 3;
        capability |= self.protocol_version as u8;

        let mut security = 0u8;
        if self.secure {
            security |= SECURITY_SECURE;
        }
        if self.frequent_listening {
            security |= SECURITY_FLIRS_1000MS;
        }
        if self.beaming {
            security |= SECURITY_BEAMING;
        }
        if self.optional_functionality {
            security |= SECURITY_OPTIONAL_FUNCTIONALITY;
        }

        be_u8(capability).serialize(output);
        be_u8(security).serialize(output);
        be_u8(0).serialize(output);
        self.device_class.serialize(output);
    }
}

impl crate::parse::Parsable for NodeProtocolData {
    fn parse(i: &mut Bytes) -> ParseResult<Self> {
        let capability = be_u8(i)?;
        let security = be_u8(i)?;
        // One reserved byte between the flags and the device class
        be_u8(i)?;

        let listening = capability & CAPABILITY_LISTENING != 0;
        let frequent_listening = !listening
            && security & (SECURITY_FLIRS_250MS | SECURITY_FLIRS_1000MS) != 0;

        let max_data_rate = DataRate::try_from((capability & CAPABILITY_MAX_DATA_RATE) >> 3)
            .unwrap_or(DataRate::DataRate9k6);
        let protocol_version = ProtocolVersion::try_from(capability & CAPABILITY_PROTOCOL_VERSION)
            .unwrap_or(ProtocolVersion::Unknown);

        let device_class = DeviceClass::parse(i)?;

        Ok(Self {
            listening,
            frequent_listening,
            routing: capability & CAPABILITY_ROUTING != 0,
            max_data_rate,
            protocol_version,
            beaming: security & SECURITY_BEAMING != 0,
            secure: security & SECURITY_SECURE != 0,
            optional_functionality: security & SECURITY_OPTIONAL_FUNCTIONALITY != 0,
            device_class,
        })
    }
}

/// A Node Information Frame: the node's advertisement of its device class
/// and the command classes it supports and controls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInformationFrame {
    pub device_class: DeviceClass,
    pub supported_ccs: Vec<CommandClasses>,
    pub controlled_ccs: Vec<CommandClasses>,
}

impl crate::parse::Parsable for NodeInformationFrame {
    fn parse(i: &mut Bytes) -> ParseResult<Self> {
        let device_class = DeviceClass::parse(i)?;

        let mut supported_ccs = Vec::new();
        let mut controlled_ccs = Vec::new();
        let mut controlled = false;
        while !i.is_empty() {
            let id = be_u8(i)?;
            if id == COMMAND_CLASS_SUPPORT_CONTROL_MARK {
                controlled = true;
                continue;
            }
            // CC ids we don't know are skipped, not an error - the node may
            // speak a newer revision of the standard
            let Ok(cc) = CommandClasses::try_from(id) else {
                continue;
            };
            if controlled {
                controlled_ccs.push(cc);
            } else {
                supported_ccs.push(cc);
            }
        }

        Ok(Self {
            device_class,
            supported_ccs,
            controlled_ccs,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parse::Parsable;

    #[test]
    fn test_parse_nif() {
        // Binary switch supporting Version + controlling Basic
        let mut input = Bytes::from_static(&[0x04, 0x10, 0x01, 0x25, 0x86, 0xef, 0x20]);
        let nif = NodeInformationFrame::parse(&mut input).unwrap();
        assert_eq!(
            nif.supported_ccs,
            vec![CommandClasses::BinarySwitch, CommandClasses::Version]
        );
        assert_eq!(nif.controlled_ccs, vec![CommandClasses::Basic]);
    }

    #[test]
    fn test_listening_excludes_frequent_listening() {
        // Listening bit set, FLiRS bits set too: listening wins
        let mut input = Bytes::from_static(&[0xd3, 0x60, 0x00, 0x04, 0x10, 0x01]);
        let data = NodeProtocolData::parse(&mut input).unwrap();
        assert!(data.listening);
        assert!(!data.frequent_listening);
    }
}
