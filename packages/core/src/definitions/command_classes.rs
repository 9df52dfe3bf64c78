use crate::parse::{
    ParseResult, Parser,
    bytes::be_u8,
    combinators::{context, map_res},
};
use crate::serialize::{self, Serializable};
use ::bytes::{Bytes, BytesMut};
use derive_try_from_primitive::*;
use std::fmt::Display;

/// The command classes this driver knows about. Nodes may advertise others;
/// those are preserved as raw ids where possible and skipped where a typed
/// id is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum CommandClasses {
    NoOperation = 0x00,
    Basic = 0x20,
    BinarySwitch = 0x25,
    MultilevelSwitch = 0x26,
    BinarySensor = 0x30,
    MultilevelSensor = 0x31,
    Meter = 0x32,
    ColorSwitch = 0x33,
    ThermostatMode = 0x40,
    ThermostatSetpoint = 0x43,
    CentralScene = 0x5b,
    TransportService = 0x55,
    CRC16Encapsulation = 0x56,
    ZWavePlusInfo = 0x5e,
    MultiChannel = 0x60,
    DoorLock = 0x62,
    UserCode = 0x63,
    Supervision = 0x6c,
    Configuration = 0x70,
    Notification = 0x71,
    ManufacturerSpecific = 0x72,
    Powerlevel = 0x73,
    Protection = 0x75,
    NodeNaming = 0x77,
    Battery = 0x80,
    Clock = 0x81,
    WakeUp = 0x84,
    Association = 0x85,
    Version = 0x86,
    Indicator = 0x87,
    TimeParameters = 0x8b,
    MultiChannelAssociation = 0x8e,
    Security = 0x98,
    Security2 = 0x9f,
}

/// Marks the end of the supported CC list in a NIF; everything after it is
/// controlled rather than supported.
pub const COMMAND_CLASS_SUPPORT_CONTROL_MARK: u8 = 0xef;

impl CommandClasses {
    /// Whether this CC wraps other CCs
    pub fn is_encapsulation(&self) -> bool {
        matches!(
            self,
            Self::TransportService
                | Self::CRC16Encapsulation
                | Self::MultiChannel
                | Self::Supervision
                | Self::Security
                | Self::Security2
        )
    }

    /// CCs that control an actuator or report sensor readings. These are
    /// interviewed on the root device after its endpoints.
    pub fn is_application_cc(&self) -> bool {
        matches!(
            self,
            Self::Basic
                | Self::BinarySwitch
                | Self::MultilevelSwitch
                | Self::BinarySensor
                | Self::MultilevelSensor
                | Self::Meter
                | Self::ColorSwitch
                | Self::ThermostatMode
                | Self::ThermostatSetpoint
                | Self::CentralScene
                | Self::DoorLock
                | Self::UserCode
                | Self::Notification
        )
    }
}

impl Display for CommandClasses {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl crate::parse::Parsable for CommandClasses {
    fn parse(i: &mut Bytes) -> ParseResult<Self> {
        context("CommandClasses", map_res(be_u8, CommandClasses::try_from)).parse(i)
    }
}

impl Serializable for CommandClasses {
    fn serialize(&self, output: &mut BytesMut) {
        serialize::bytes::be_u8(*self as u8).serialize(output);
    }
}
