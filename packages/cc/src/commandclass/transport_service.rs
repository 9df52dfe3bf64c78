use crate::commandclass_raw::CCRaw;
use crate::prelude::*;
use bytes::{Bytes, BytesMut};
use derive_try_from_primitive::*;
use zwh_core::checksum::crc16_incremental;
use zwh_core::parse::{
    ParseError, Parser,
    bytes::{be_u8, be_u16, complete::take},
    validate,
};
use zwh_core::prelude::*;

const COMMAND_MASK: u8 = 0b1111_1000;
const SIZE_MSB_MASK: u8 = 0b0000_0111;
const SESSION_ID_SHIFT: u8 = 4;
const EXTENSION_FLAG: u8 = 0b0000_1000;
const OFFSET_MSB_MASK: u8 = 0b0000_0111;
const CRC_SIZE: usize = 2;

/// The maximum number of payload bytes per segment on a 100 kbit/s link
pub const SEGMENT_PAYLOAD_SIZE: usize = 39;

#[derive(Debug, Clone, Copy, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum TransportServiceCCCommand {
    FirstSegment = 0xc0,
    SegmentComplete = 0xe8,
    SegmentRequest = 0xc8,
    SegmentWait = 0xf0,
    SubsequentSegment = 0xe0,
}

fn segment_checksum(payload_with_command: &[u8]) -> u16 {
    crc16_incremental()
        .update(&[CommandClasses::TransportService as u8])
        .update(payload_with_command)
        .get()
}

/// Splits the raw payload (which still includes the command byte) into the
/// checked part and validates the trailing CRC16
fn validate_segment_crc(i: &mut Bytes) -> ParseResult<Bytes> {
    validate(i.len() > CRC_SIZE, "Transport Service segment too short")?;
    let checked = take(i.len() - CRC_SIZE).parse(i)?;
    let checksum = be_u16(i)?;
    validate(
        checksum == segment_checksum(&checked),
        "Transport Service segment checksum mismatch",
    )?;
    Ok(checked)
}

/// The first segment of a fragmented datagram
#[derive(Debug, Clone, PartialEq)]
pub struct TransportServiceCCFirstSegment {
    pub datagram_size: u16,
    pub session_id: u8,
    pub payload: Bytes,
}

impl CCBase for TransportServiceCCFirstSegment {}

impl CCValues for TransportServiceCCFirstSegment {}

impl CCId for TransportServiceCCFirstSegment {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::TransportService
    }

    fn cc_command(&self) -> Option<u8> {
        Some(TransportServiceCCCommand::FirstSegment as _)
    }
}

impl CCParsable for TransportServiceCCFirstSegment {
    fn parse(i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        let mut checked = validate_segment_crc(i)?;
        let i = &mut checked;

        let command_byte = be_u8(i)?;
        validate(
            command_byte & COMMAND_MASK == TransportServiceCCCommand::FirstSegment as u8,
            "not a first segment",
        )?;
        let size_lsb = be_u8(i)?;
        let datagram_size = (((command_byte & SIZE_MSB_MASK) as u16) << 8) | size_lsb as u16;
        let session_byte = be_u8(i)?;
        let session_id = session_byte >> SESSION_ID_SHIFT;
        // Skip an extension if the sender included one
        if session_byte & EXTENSION_FLAG != 0 {
            let ext_len = be_u8(i)?;
            take(ext_len).parse(i)?;
        }
        let payload = zwh_core::parse::bytes::rest(i)?;

        Ok(Self {
            datagram_size,
            session_id,
            payload,
        })
    }
}

impl CCSerializable for TransportServiceCCFirstSegment {
    fn serialize(&self, output: &mut BytesMut, _ctx: &CCEncodingContext) {
        use serialize::bytes::{be_u16, slice};

        let mut checked = Vec::with_capacity(3 + self.payload.len());
        checked.push(
            TransportServiceCCCommand::FirstSegment as u8
                | ((self.datagram_size >> 8) as u8 & SIZE_MSB_MASK),
        );
        checked.push(self.datagram_size as u8);
        checked.push(self.session_id << SESSION_ID_SHIFT);
        checked.extend_from_slice(&self.payload);

        let checksum = segment_checksum(&checked);
        slice(&checked).serialize(output);
        be_u16(checksum).serialize(output);
    }
}

impl ToLogPayload for TransportServiceCCFirstSegment {
    fn to_log_payload(&self) -> LogPayload {
        LogPayloadDict::new()
            .with_entry("session id", self.session_id)
            .with_entry("datagram size", self.datagram_size as u32)
            .with_entry("segment size", self.payload.len())
            .into()
    }
}

/// A follow-up segment carrying bytes at the given datagram offset
#[derive(Debug, Clone, PartialEq)]
pub struct TransportServiceCCSubsequentSegment {
    pub datagram_size: u16,
    pub session_id: u8,
    pub datagram_offset: u16,
    pub payload: Bytes,
}

impl CCBase for TransportServiceCCSubsequentSegment {}

impl CCValues for TransportServiceCCSubsequentSegment {}

impl CCId for TransportServiceCCSubsequentSegment {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::TransportService
    }

    fn cc_command(&self) -> Option<u8> {
        Some(TransportServiceCCCommand::SubsequentSegment as _)
    }
}

impl CCParsable for TransportServiceCCSubsequentSegment {
    fn parse(i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        let mut checked = validate_segment_crc(i)?;
        let i = &mut checked;

        let command_byte = be_u8(i)?;
        validate(
            command_byte & COMMAND_MASK == TransportServiceCCCommand::SubsequentSegment as u8,
            "not a subsequent segment",
        )?;
        let size_lsb = be_u8(i)?;
        let datagram_size = (((command_byte & SIZE_MSB_MASK) as u16) << 8) | size_lsb as u16;
        let session_byte = be_u8(i)?;
        let session_id = session_byte >> SESSION_ID_SHIFT;
        let offset_lsb = be_u8(i)?;
        let datagram_offset =
            (((session_byte & OFFSET_MSB_MASK) as u16) << 8) | offset_lsb as u16;
        if session_byte & EXTENSION_FLAG != 0 {
            let ext_len = be_u8(i)?;
            take(ext_len).parse(i)?;
        }
        let payload = zwh_core::parse::bytes::rest(i)?;

        Ok(Self {
            datagram_size,
            session_id,
            datagram_offset,
            payload,
        })
    }
}

impl CCSerializable for TransportServiceCCSubsequentSegment {
    fn serialize(&self, output: &mut BytesMut, _ctx: &CCEncodingContext) {
        use serialize::bytes::{be_u16, slice};

        let mut checked = Vec::with_capacity(4 + self.payload.len());
        checked.push(
            TransportServiceCCCommand::SubsequentSegment as u8
                | ((self.datagram_size >> 8) as u8 & SIZE_MSB_MASK),
        );
        checked.push(self.datagram_size as u8);
        checked.push(
            (self.session_id << SESSION_ID_SHIFT)
                | ((self.datagram_offset >> 8) as u8 & OFFSET_MSB_MASK),
        );
        checked.push(self.datagram_offset as u8);
        checked.extend_from_slice(&self.payload);

        let checksum = segment_checksum(&checked);
        slice(&checked).serialize(output);
        be_u16(checksum).serialize(output);
    }
}

impl ToLogPayload for TransportServiceCCSubsequentSegment {
    fn to_log_payload(&self) -> LogPayload {
        LogPayloadDict::new()
            .with_entry("session id", self.session_id)
            .with_entry("datagram offset", self.datagram_offset as u32)
            .with_entry("segment size", self.payload.len())
            .into()
    }
}

/// Acknowledges the complete reception of a datagram
#[derive(Debug, Clone, PartialEq)]
pub struct TransportServiceCCSegmentComplete {
    pub session_id: u8,
}

impl CCBase for TransportServiceCCSegmentComplete {}

impl CCValues for TransportServiceCCSegmentComplete {}

impl CCId for TransportServiceCCSegmentComplete {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::TransportService
    }

    fn cc_command(&self) -> Option<u8> {
        Some(TransportServiceCCCommand::SegmentComplete as _)
    }
}

impl CCParsable for TransportServiceCCSegmentComplete {
    fn parse(i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        // Command byte, then the session id
        be_u8(i)?;
        let session_id = be_u8(i)? >> SESSION_ID_SHIFT;
        Ok(Self { session_id })
    }
}

impl CCSerializable for TransportServiceCCSegmentComplete {
    fn serialize(&self, output: &mut BytesMut, _ctx: &CCEncodingContext) {
        use serialize::bytes::be_u8;
        be_u8(TransportServiceCCCommand::SegmentComplete as u8).serialize(output);
        be_u8(self.session_id << SESSION_ID_SHIFT).serialize(output);
    }
}

impl ToLogPayload for TransportServiceCCSegmentComplete {
    fn to_log_payload(&self) -> LogPayload {
        LogPayloadDict::new()
            .with_entry("session id", self.session_id)
            .into()
    }
}

/// Asks the sender to retransmit the segment at the given offset
#[derive(Debug, Clone, PartialEq)]
pub struct TransportServiceCCSegmentRequest {
    pub session_id: u8,
    pub datagram_offset: u16,
}

impl CCBase for TransportServiceCCSegmentRequest {}

impl CCValues for TransportServiceCCSegmentRequest {}

impl CCId for TransportServiceCCSegmentRequest {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::TransportService
    }

    fn cc_command(&self) -> Option<u8> {
        Some(TransportServiceCCCommand::SegmentRequest as _)
    }
}

impl CCParsable for TransportServiceCCSegmentRequest {
    fn parse(i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        be_u8(i)?;
        let session_byte = be_u8(i)?;
        let offset_lsb = be_u8(i)?;
        Ok(Self {
            session_id: session_byte >> SESSION_ID_SHIFT,
            datagram_offset: (((session_byte & OFFSET_MSB_MASK) as u16) << 8) | offset_lsb as u16,
        })
    }
}

impl CCSerializable for TransportServiceCCSegmentRequest {
    fn serialize(&self, output: &mut BytesMut, _ctx: &CCEncodingContext) {
        use serialize::bytes::be_u8;
        be_u8(TransportServiceCCCommand::SegmentRequest as u8).serialize(output);
        be_u8(
            (self.session_id << SESSION_ID_SHIFT)
                | ((self.datagram_offset >> 8) as u8 & OFFSET_MSB_MASK),
        )
        .serialize(output);
        be_u8(self.datagram_offset as u8).serialize(output);
    }
}

impl ToLogPayload for TransportServiceCCSegmentRequest {
    fn to_log_payload(&self) -> LogPayload {
        LogPayloadDict::new()
            .with_entry("session id", self.session_id)
            .with_entry("datagram offset", self.datagram_offset as u32)
            .into()
    }
}

/// Asks the sender to pause until the receiver has caught up
#[derive(Debug, Clone, PartialEq)]
pub struct TransportServiceCCSegmentWait {
    pub pending_segments: u8,
}

impl CCBase for TransportServiceCCSegmentWait {}

impl CCValues for TransportServiceCCSegmentWait {}

impl CCId for TransportServiceCCSegmentWait {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::TransportService
    }

    fn cc_command(&self) -> Option<u8> {
        Some(TransportServiceCCCommand::SegmentWait as _)
    }
}

impl CCParsable for TransportServiceCCSegmentWait {
    fn parse(i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        be_u8(i)?;
        let pending_segments = be_u8(i)?;
        Ok(Self { pending_segments })
    }
}

impl CCSerializable for TransportServiceCCSegmentWait {
    fn serialize(&self, output: &mut BytesMut, _ctx: &CCEncodingContext) {
        use serialize::bytes::be_u8;
        be_u8(TransportServiceCCCommand::SegmentWait as u8).serialize(output);
        be_u8(self.pending_segments).serialize(output);
    }
}

impl ToLogPayload for TransportServiceCCSegmentWait {
    fn to_log_payload(&self) -> LogPayload {
        LogPayloadDict::new()
            .with_entry("pending segments", self.pending_segments)
            .into()
    }
}

/// Collects the segments of one datagram until it is complete
pub struct TransportServiceSession {
    pub session_id: u8,
    datagram: Vec<u8>,
    received: Vec<bool>,
}

impl TransportServiceSession {
    pub fn new(first: &TransportServiceCCFirstSegment) -> Self {
        let size = first.datagram_size as usize;
        let mut session = Self {
            session_id: first.session_id,
            datagram: vec![0; size],
            received: vec![false; size],
        };
        session.fill(0, &first.payload);
        session
    }

    fn fill(&mut self, offset: usize, data: &[u8]) {
        for (index, byte) in data.iter().enumerate() {
            if let Some(slot) = self.datagram.get_mut(offset + index) {
                *slot = *byte;
                self.received[offset + index] = true;
            }
        }
    }

    pub fn add(&mut self, segment: &TransportServiceCCSubsequentSegment) {
        if segment.session_id == self.session_id {
            self.fill(segment.datagram_offset as usize, &segment.payload);
        }
    }

    pub fn is_complete(&self) -> bool {
        self.received.iter().all(|r| *r)
    }

    /// The offset of the first missing byte, to put into a SegmentRequest
    pub fn first_missing_offset(&self) -> Option<u16> {
        self.received.iter().position(|r| !*r).map(|o| o as u16)
    }

    /// Parses the reassembled datagram as a CC
    pub fn assemble(&self, ctx: &CCParsingContext) -> ParseResult<CC> {
        if !self.is_complete() {
            return Err(ParseError::recoverable("datagram is incomplete"));
        }
        let mut i = Bytes::from(self.datagram.clone());
        let raw = CCRaw::parse(&mut i)?;
        CC::try_from_raw(raw, ctx)
    }
}

/// Splits a serialized CC into Transport Service segments
pub fn segment_datagram(datagram: &Bytes, session_id: u8) -> Vec<CC> {
    let size = datagram.len() as u16;
    let mut segments = Vec::new();

    let first_len = datagram.len().min(SEGMENT_PAYLOAD_SIZE);
    segments.push(
        TransportServiceCCFirstSegment {
            datagram_size: size,
            session_id,
            payload: datagram.slice(..first_len),
        }
        .into(),
    );

    let mut offset = first_len;
    while offset < datagram.len() {
        let len = (datagram.len() - offset).min(SEGMENT_PAYLOAD_SIZE);
        segments.push(
            TransportServiceCCSubsequentSegment {
                datagram_size: size,
                session_id,
                datagram_offset: offset as u16,
                payload: datagram.slice(offset..offset + len),
            }
            .into(),
        );
        offset += len;
    }

    segments
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_first_segment_roundtrip() {
        let cc = CC::from(TransportServiceCCFirstSegment {
            datagram_size: 0x10a,
            session_id: 3,
            payload: Bytes::from_static(&[0xaa, 0xbb]),
        });
        let bytes = cc.as_raw(&CCEncodingContext::default()).as_bytes();
        assert_eq!(&bytes[..2], &[0x55, 0xc1]);

        let mut input = bytes;
        let raw = CCRaw::parse(&mut input).unwrap();
        assert_eq!(CC::try_from_raw(raw, &CCParsingContext::default()).unwrap(), cc);
    }

    #[test]
    fn test_reassembly_out_of_order() {
        let small = Bytes::from_static(&[0x72, 0x05, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        let segments = segment_datagram(&small, 5);
        assert_eq!(segments.len(), 1);

        let big = Bytes::from(vec![0x55u8; 100]);
        let segments = segment_datagram(&big, 6);
        assert_eq!(segments.len(), 3);

        let CC::TransportServiceCCFirstSegment(first) = &segments[0] else {
            panic!("expected a first segment");
        };
        let mut session = TransportServiceSession::new(first);
        assert!(!session.is_complete());

        // Deliver the remaining segments in reverse order
        for segment in segments.iter().skip(1).rev() {
            let CC::TransportServiceCCSubsequentSegment(segment) = segment else {
                panic!("expected a subsequent segment");
            };
            session.add(segment);
        }
        assert!(session.is_complete());
        assert_eq!(session.first_missing_offset(), None);
    }

    #[test]
    fn test_missing_segment_is_detected() {
        let big = Bytes::from(vec![0x26u8; 100]);
        let segments = segment_datagram(&big, 1);
        let CC::TransportServiceCCFirstSegment(first) = &segments[0] else {
            panic!("expected a first segment");
        };
        let session = TransportServiceSession::new(first);
        assert_eq!(session.first_missing_offset(), Some(SEGMENT_PAYLOAD_SIZE as u16));
    }
}
