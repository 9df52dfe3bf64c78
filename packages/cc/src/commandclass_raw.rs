use bytes::{Bytes, BytesMut};
use custom_debug_derive::Debug;
use zwh_core::parse::{
    ParseResult, Parser,
    bytes::{be_u8, rest},
    combinators::{map, peek},
};
use zwh_core::prelude::*;

fn hex_fmt<T: AsRef<[u8]>>(data: &T, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    write!(f, "0x{}", hex::encode(data))
}

/// A command class frame split into its id, command and payload, without
/// interpreting the payload
#[derive(Clone, PartialEq, Debug)]
pub struct CCRaw {
    pub cc_id: CommandClasses,
    pub cc_command: Option<u8>,
    #[debug(with = hex_fmt)]
    pub payload: Bytes,
}

impl Parsable for CCRaw {
    fn parse(i: &mut Bytes) -> ParseResult<Self> {
        let cc_id = CommandClasses::parse(i)?;

        let (cc_command, payload) = match cc_id {
            // NoOperation has neither a command nor a payload
            CommandClasses::NoOperation => (None, Bytes::new()),
            // Transport Service folds datagram length bits into the low
            // bits of the command byte. Expose the masked command, but keep
            // the full byte in the payload for the CC parser.
            CommandClasses::TransportService => {
                let cc_command = peek(map(be_u8, |b| b & 0xf8)).parse(i)?;
                (Some(cc_command), rest(i)?)
            }
            _ => {
                let cc_command = be_u8(i)?;
                (Some(cc_command), rest(i)?)
            }
        };

        Ok(Self {
            cc_id,
            cc_command,
            payload,
        })
    }
}

impl Serializable for CCRaw {
    fn serialize(&self, output: &mut BytesMut) {
        use serialize::bytes::{be_u8, slice};

        self.cc_id.serialize(output);
        match (self.cc_id, self.cc_command) {
            // See parse: the Transport Service command byte lives in the payload
            (CommandClasses::TransportService, _) | (_, None) => {}
            (_, Some(cc_command)) => be_u8(cc_command).serialize(output),
        }
        slice(&self.payload).serialize(output);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_binary_switch_set() {
        let mut input = Bytes::from_static(&[0x25, 0x01, 0xff]);
        let raw = CCRaw::parse(&mut input).unwrap();
        assert_eq!(raw.cc_id, CommandClasses::BinarySwitch);
        assert_eq!(raw.cc_command, Some(0x01));
        assert_eq!(&raw.payload[..], &[0xff]);
    }

    #[test]
    fn test_no_operation_has_no_command() {
        let mut input = Bytes::from_static(&[0x00]);
        let raw = CCRaw::parse(&mut input).unwrap();
        assert_eq!(raw.cc_id, CommandClasses::NoOperation);
        assert_eq!(raw.cc_command, None);
        assert_eq!(raw.as_bytes(), Bytes::from_static(&[0x00]));
    }

    #[test]
    fn test_transport_service_keeps_command_byte() {
        // First segment, datagram size 0x10a: command byte 0xc1
        let mut input = Bytes::from_static(&[0x55, 0xc1, 0x0a, 0x00]);
        let raw = CCRaw::parse(&mut input).unwrap();
        assert_eq!(raw.cc_id, CommandClasses::TransportService);
        assert_eq!(raw.cc_command, Some(0xc0));
        assert_eq!(&raw.payload[..], &[0xc1, 0x0a, 0x00]);
        assert_eq!(raw.as_bytes(), Bytes::from_static(&[0x55, 0xc1, 0x0a, 0x00]));
    }
}
