use crate::parse::{
    ParseResult, Parser,
    bytes::be_u8,
    combinators::{context, map_res},
};
use crate::serialize::{self, Serializable};
use ::bytes::{Bytes, BytesMut};
use derive_try_from_primitive::*;

/// The function ids of the Serial API commands implemented by this driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum FunctionType {
    GetSerialApiInitData = 0x02,

    /// A command from another node
    ApplicationCommand = 0x04,

    SoftReset = 0x08,

    SendData = 0x13,

    GetControllerVersion = 0x15,

    SendDataAbort = 0x16,

    /// Returns home ID and controller node ID
    GetControllerId = 0x20,

    /// Protocol info (baud rate, listening, ...) for a given node
    GetNodeProtocolInfo = 0x41,

    /// Delivers a NIF, either requested or unsolicited
    ApplicationUpdateRequest = 0x49,

    /// Asks a node to advertise its supported command classes
    RequestNodeInfo = 0x60,
}

impl crate::parse::Parsable for FunctionType {
    fn parse(i: &mut Bytes) -> ParseResult<Self> {
        context("FunctionType", map_res(be_u8, FunctionType::try_from)).parse(i)
    }
}

impl Serializable for FunctionType {
    fn serialize(&self, output: &mut BytesMut) {
        serialize::bytes::be_u8(*self as u8).serialize(output);
    }
}
