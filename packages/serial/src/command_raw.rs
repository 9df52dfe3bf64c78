use crate::frame::{RawSerialFrame, SerialControlByte};
use bytes::{Bytes, BytesMut};
use custom_debug_derive::Debug;
use zwh_core::checksum::xor_sum;
use zwh_core::parse::{
    ParseResult, Parser, validate,
    bytes::{
        be_u8,
        complete::{literal, skip, take},
    },
    combinators::peek,
};
use zwh_core::prelude::*;

fn hex_fmt<T: AsRef<[u8]>>(data: &T, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    write!(f, "0x{}", hex::encode(data))
}

/// A framed Serial API command with a validated checksum. The function is
/// kept as a raw byte here so that unknown functions survive framing and can
/// be reported at the dispatch layer instead of being NAKed.
#[derive(Clone, PartialEq, Debug)]
pub struct CommandRaw {
    pub command_type: CommandType,
    pub function: u8,
    #[debug(with = hex_fmt)]
    pub payload: Bytes,
    #[debug(format = "{:#04x}")]
    pub checksum: u8,
}

fn command_checksum(cmd_buffer: &[u8]) -> u8 {
    xor_sum(&cmd_buffer[1..cmd_buffer.len() - 1])
}

impl Parsable for CommandRaw {
    fn parse(i: &mut Bytes) -> ParseResult<Self> {
        // Ensure the buffer starts with SOF, read the length and make sure
        // the frame is complete
        let (_, len, _) = peek((
            literal(SerialControlByte::SOF as u8),
            be_u8,
            take(3usize),
        ))
        .parse(i)?;

        validate(len >= 3, "frame too short to hold a command")?;
        if i.len() < len as usize + 2 {
            return Err(ParseError::needed(len as usize + 2 - i.len()));
        }

        // Remember a copy of the whole frame for the checksum
        let raw_data: Bytes = i.clone().split_to(len as usize + 2);

        // Skip the SOF and length bytes
        skip(2usize).parse(i)?;

        let command_type = CommandType::parse(i)?;
        let function = be_u8(i)?;
        let payload = take(len - 3).parse(i)?;
        let checksum = be_u8(i)?;

        let expected_checksum = command_checksum(&raw_data);
        validate(
            checksum == expected_checksum,
            format!(
                "checksum mismatch: expected {:#04x}, got {:#04x}",
                expected_checksum, checksum
            ),
        )?;

        Ok(Self {
            command_type,
            function,
            payload,
            checksum,
        })
    }
}

impl Serializable for CommandRaw {
    fn serialize(&self, output: &mut BytesMut) {
        use serialize::{
            bytes::{be_u8, slice},
            sequence::tuple,
        };

        let mut buf = tuple((
            be_u8(SerialControlByte::SOF as u8),
            be_u8(self.payload.len() as u8 + 3),
            self.command_type,
            be_u8(self.function),
            slice(&self.payload),
            // Checksum placeholder
            be_u8(0),
        ))
        .as_bytes_mut();

        let checksum = command_checksum(&buf);
        let len = buf.len();
        buf[len - 1] = checksum;

        slice(buf).serialize(output);
    }
}

impl From<CommandRaw> for RawSerialFrame {
    fn from(val: CommandRaw) -> Self {
        RawSerialFrame::Data(val.as_bytes())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn hex_bytes(hex_str: &str) -> Bytes {
        Bytes::from(hex::decode(hex_str).unwrap())
    }

    #[test]
    fn test_parse_ok() {
        // An actual GetSerialApiInitData request with a correct checksum
        let mut input = hex_bytes("01030002fe");
        let raw = CommandRaw::parse(&mut input).unwrap();
        assert_eq!(raw.command_type, CommandType::Request);
        assert_eq!(raw.function, 0x02);
        assert!(raw.payload.is_empty());
        assert_eq!(raw.checksum, 0xfe);
    }

    #[test]
    fn test_parse_invalid_checksum() {
        let mut input = hex_bytes("01030002ff");
        let result = CommandRaw::parse(&mut input);
        match result {
            Ok(_) => panic!("Expected an error"),
            Err(ParseError::Incomplete(_)) => panic!("Expected a parser error"),
            Err(_) => (),
        }
    }

    #[test]
    fn test_serialize() {
        let cmd = CommandRaw {
            command_type: CommandType::Request,
            function: 0x02,
            payload: Bytes::new(),
            checksum: 0,
        };
        assert_eq!(cmd.as_bytes(), hex_bytes("01030002fe"));
    }
}
