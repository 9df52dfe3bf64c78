use bytes::{Bytes, BytesMut};
use derive_try_from_primitive::*;
use zwh_core::parse::{
    ParseError, ParseResult, Parser,
    bytes::{
        be_u8,
        streaming::{literal, take, take_while1},
    },
    combinators::peek,
};
use zwh_core::serialize::{self, Serializable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum SerialControlByte {
    SOF = 0x01,
    ACK = 0x06,
    NAK = 0x15,
    CAN = 0x18,
}

/// The single-byte frames used for flow control on the serial link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlow {
    ACK = SerialControlByte::ACK as isize,
    NAK = SerialControlByte::NAK as isize,
    CAN = SerialControlByte::CAN as isize,
}

impl ControlFlow {
    pub fn as_byte(&self) -> u8 {
        *self as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ACK => "ACK",
            Self::NAK => "NAK",
            Self::CAN => "CAN",
        }
    }
}

/// A link-layer unit on the serial line, before any interpretation of data
/// frame contents
#[derive(Clone, Debug, PartialEq)]
pub enum RawSerialFrame {
    ControlFlow(ControlFlow),
    /// A complete data frame from SOF up to and including the checksum
    Data(Bytes),
    /// Bytes that cannot start a frame. A host waiting for new traffic must
    /// ignore everything that is not SOF, ACK, NAK or CAN.
    Garbage(Bytes),
}

fn consume_garbage(i: &mut Bytes) -> ParseResult<RawSerialFrame> {
    let garbage = take_while1(|b| SerialControlByte::try_from(b).is_err()).parse(i)?;
    Ok(RawSerialFrame::Garbage(garbage))
}

fn parse_control_flow(i: &mut Bytes) -> ParseResult<RawSerialFrame> {
    let byte = be_u8(i)?;
    match SerialControlByte::try_from(byte) {
        Ok(SerialControlByte::ACK) => Ok(RawSerialFrame::ControlFlow(ControlFlow::ACK)),
        Ok(SerialControlByte::NAK) => Ok(RawSerialFrame::ControlFlow(ControlFlow::NAK)),
        Ok(SerialControlByte::CAN) => Ok(RawSerialFrame::ControlFlow(ControlFlow::CAN)),
        _ => Err(ParseError::recoverable(())),
    }
}

fn parse_data(i: &mut Bytes) -> ParseResult<RawSerialFrame> {
    // Ensure the buffer starts with SOF and contains the length byte
    let (_, len) = peek((literal(SerialControlByte::SOF as u8), be_u8)).parse(i)?;
    // Frame length = SOF + length byte + `len` remaining bytes
    let data = take(len as usize + 2).parse(i)?;
    Ok(RawSerialFrame::Data(data))
}

impl RawSerialFrame {
    /// Parses a frame from a byte stream. Fails with
    /// [ParseError::Incomplete] when the buffer holds the beginning of a
    /// frame but not all of it yet.
    pub fn parse(i: &mut Bytes) -> ParseResult<Self> {
        if i.is_empty() {
            return Err(ParseError::needed(1));
        }
        // A serial frame is either skipped garbage, a control byte, or a
        // data frame starting with SOF
        if let Ok(frame) = consume_garbage.parse_peek(i) {
            return Ok(frame);
        }
        if i[0] != SerialControlByte::SOF as u8 {
            return parse_control_flow(i);
        }
        parse_data(i)
    }
}

impl Serializable for RawSerialFrame {
    fn serialize(&self, output: &mut BytesMut) {
        use serialize::bytes::{be_u8, slice};
        match self {
            RawSerialFrame::ControlFlow(byte) => be_u8(byte.as_byte()).serialize(output),
            RawSerialFrame::Data(data) => slice(data).serialize(output),
            RawSerialFrame::Garbage(data) => slice(data).serialize(output),
        }
    }
}

impl RawSerialFrame {
    /// The payload portion of a data frame: everything between the length
    /// byte and the checksum
    pub fn data_payload(&self) -> Option<&[u8]> {
        match self {
            RawSerialFrame::Data(data) if data.len() >= 5 => Some(&data[2..data.len() - 1]),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn hex_bytes(hex_str: &str) -> Bytes {
        Bytes::from(hex::decode(hex_str).unwrap())
    }

    #[test]
    fn test_garbage() {
        let mut data = hex_bytes("07080901");
        assert_eq!(
            RawSerialFrame::parse(&mut data),
            Ok(RawSerialFrame::Garbage(hex_bytes("070809")))
        );
        assert_eq!(&data[..], &[0x01]);
    }

    #[test]
    fn test_control_flow() {
        let mut data = hex_bytes("061518");
        assert_eq!(
            RawSerialFrame::parse(&mut data),
            Ok(RawSerialFrame::ControlFlow(ControlFlow::ACK))
        );
        assert_eq!(
            RawSerialFrame::parse(&mut data),
            Ok(RawSerialFrame::ControlFlow(ControlFlow::NAK))
        );
        assert_eq!(
            RawSerialFrame::parse(&mut data),
            Ok(RawSerialFrame::ControlFlow(ControlFlow::CAN))
        );
        assert!(RawSerialFrame::parse(&mut data).is_err());
    }

    #[test]
    fn test_data() {
        let mut data = hex_bytes("01030008f406");
        assert_eq!(
            RawSerialFrame::parse(&mut data),
            Ok(RawSerialFrame::Data(hex_bytes("01030008f4")))
        );
        assert_eq!(
            RawSerialFrame::parse(&mut data),
            Ok(RawSerialFrame::ControlFlow(ControlFlow::ACK))
        );
    }

    #[test]
    fn test_data_incomplete() {
        let mut data = hex_bytes("010300");
        assert!(matches!(
            RawSerialFrame::parse(&mut data),
            Err(ParseError::Incomplete(_))
        ));
        // Nothing was consumed
        assert_eq!(data.len(), 3);
    }

    #[test]
    fn test_frame_surrounded_by_garbage() {
        // A valid data frame inside arbitrary garbage is extracted unchanged
        let mut data = hex_bytes("00f2e801030008f4180000000801");
        let mut frames = Vec::new();
        while let Ok(frame) = RawSerialFrame::parse(&mut data) {
            frames.push(frame);
        }
        assert_eq!(
            frames,
            vec![
                RawSerialFrame::Garbage(hex_bytes("00f2e8")),
                RawSerialFrame::Data(hex_bytes("01030008f4")),
                RawSerialFrame::ControlFlow(ControlFlow::CAN),
                RawSerialFrame::Garbage(hex_bytes("00000008")),
            ]
        );
        // The trailing lone SOF stays in the buffer as a partial frame
        assert_eq!(&data[..], &[0x01]);
    }
}
