use crate::parse::{
    ParseResult, Parser,
    bytes::{be_u8, be_u16},
    combinators::{context, map_res, opt},
};
use crate::serialize::{self, Serializable};
use ::bytes::{Bytes, BytesMut};
use derive_try_from_primitive::*;
use std::fmt::Display;

const TRANSMIT_OPTION_ACK: u8 = 0x01;
const TRANSMIT_OPTION_AUTO_ROUTE: u8 = 0x04;
const TRANSMIT_OPTION_NO_ROUTE: u8 = 0x10;
const TRANSMIT_OPTION_EXPLORE: u8 = 0x20;

/// Options for the controller's routing engine when sending node commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmitOptions {
    pub ack: bool,
    pub auto_route: bool,
    pub no_route: bool,
    pub explore: bool,
}

impl Default for TransmitOptions {
    fn default() -> Self {
        Self {
            ack: true,
            auto_route: true,
            no_route: false,
            explore: true,
        }
    }
}

impl TransmitOptions {
    /// Options for a retry after the first route attempt failed: skip the
    /// last working route and let explorer frames discover a fresh one.
    pub fn route_reset() -> Self {
        Self {
            no_route: true,
            ..Default::default()
        }
    }
}

impl From<TransmitOptions> for u8 {
    fn from(val: TransmitOptions) -> Self {
        let mut ret = 0;
        if val.ack {
            ret |= TRANSMIT_OPTION_ACK;
        }
        if val.auto_route {
            ret |= TRANSMIT_OPTION_AUTO_ROUTE;
        }
        if val.no_route {
            ret |= TRANSMIT_OPTION_NO_ROUTE;
        }
        if val.explore {
            ret |= TRANSMIT_OPTION_EXPLORE;
        }
        ret
    }
}

impl From<u8> for TransmitOptions {
    fn from(val: u8) -> Self {
        Self {
            ack: val & TRANSMIT_OPTION_ACK != 0,
            auto_route: val & TRANSMIT_OPTION_AUTO_ROUTE != 0,
            no_route: val & TRANSMIT_OPTION_NO_ROUTE != 0,
            explore: val & TRANSMIT_OPTION_EXPLORE != 0,
        }
    }
}

impl crate::parse::Parsable for TransmitOptions {
    fn parse(i: &mut Bytes) -> ParseResult<Self> {
        Ok(be_u8(i)?.into())
    }
}

impl Serializable for TransmitOptions {
    fn serialize(&self, output: &mut BytesMut) {
        serialize::bytes::be_u8((*self).into()).serialize(output);
    }
}

impl Display for TransmitOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut opts = Vec::new();
        if self.ack {
            opts.push("ACK");
        }
        if self.auto_route {
            opts.push("auto route");
        }
        if self.no_route {
            opts.push("no route");
        }
        if self.explore {
            opts.push("explore");
        }
        write!(f, "{}", opts.join(", "))
    }
}

/// The outcome reported by a SendData callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum TransmitStatus {
    Ok = 0x00,
    NoAck = 0x01,
    Fail = 0x02,
    NotIdle = 0x03,
    NoRoute = 0x04,
}

impl crate::parse::Parsable for TransmitStatus {
    fn parse(i: &mut Bytes) -> ParseResult<Self> {
        context("TransmitStatus", map_res(be_u8, TransmitStatus::try_from)).parse(i)
    }
}

impl Serializable for TransmitStatus {
    fn serialize(&self, output: &mut BytesMut) {
        serialize::bytes::be_u8(*self as u8).serialize(output);
    }
}

/// Statistics the controller reports alongside a transmit status. Only the
/// transmit duration is interpreted; everything else depends heavily on the
/// firmware version and is preserved as-is.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TransmitReport {
    pub tx_ticks: Option<u16>,
    pub rest: Bytes,
}

impl crate::parse::Parsable for TransmitReport {
    fn parse(i: &mut Bytes) -> ParseResult<Self> {
        let tx_ticks = opt(be_u16).parse(i)?;
        let rest = crate::parse::bytes::rest(i)?;
        Ok(Self { tx_ticks, rest })
    }
}
