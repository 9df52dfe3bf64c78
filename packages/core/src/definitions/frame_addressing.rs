use crate::parse::{ParseResult, bytes::be_u8};
use ::bytes::Bytes;

const RX_STATUS_LOW_POWER: u8 = 0b0000_0010;
const RX_STATUS_FRAME_TYPE: u8 = 0b0000_1100;
const RX_STATUS_EXPLORER: u8 = 0b0001_0000;

const FRAME_TYPE_BROADCAST: u8 = 0b0000_0100;
const FRAME_TYPE_MULTICAST: u8 = 0b0000_1000;

/// How an incoming frame was addressed to us
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAddressing {
    Singlecast,
    Broadcast,
    Multicast,
}

/// Receive metadata the controller attaches to application commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub frame_addressing: FrameAddressing,
    pub low_power: bool,
    pub explorer_frame: bool,
}

impl crate::parse::Parsable for FrameInfo {
    fn parse(i: &mut Bytes) -> ParseResult<Self> {
        let status = be_u8(i)?;
        let frame_addressing = match status & RX_STATUS_FRAME_TYPE {
            FRAME_TYPE_BROADCAST => FrameAddressing::Broadcast,
            FRAME_TYPE_MULTICAST => FrameAddressing::Multicast,
            _ => FrameAddressing::Singlecast,
        };
        Ok(Self {
            frame_addressing,
            low_power: status & RX_STATUS_LOW_POWER != 0,
            explorer_frame: status & RX_STATUS_EXPLORER != 0,
        })
    }
}
