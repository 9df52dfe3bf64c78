use crate::commandclass_raw::CCRaw;
use crate::prelude::*;
use bytes::{Bytes, BytesMut};
use derive_try_from_primitive::*;
use zwh_core::checksum::crc16_incremental;
use zwh_core::parse::{
    Parser,
    bytes::{be_u16, complete::take},
    combinators::map_res,
    validate,
};
use zwh_core::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum Crc16CCCommand {
    CommandEncapsulation = 0x01,
}

/// Protects a command with a CRC16 checksum on links without a checksummed
/// transport
#[derive(Debug, Clone, PartialEq)]
pub struct Crc16CCCommandEncapsulation {
    pub encapsulated: Box<CC>,
}

impl Crc16CCCommandEncapsulation {
    pub fn new(encapsulated: CC) -> Self {
        Self {
            encapsulated: Box::new(encapsulated),
        }
    }
}

impl CCBase for Crc16CCCommandEncapsulation {
    fn expects_response(&self) -> bool {
        // The encapsulated CC decides whether a response is expected
        self.encapsulated.expects_response()
    }

    fn test_response(&self, response: &CC) -> bool {
        // The response may come CRC16-encapsulated or plain
        let inner = match response {
            CC::Crc16CCCommandEncapsulation(encap) => &encap.encapsulated,
            other => other,
        };
        self.encapsulated.test_response(inner)
    }
}

impl CCValues for Crc16CCCommandEncapsulation {}

impl CCId for Crc16CCCommandEncapsulation {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::CRC16Encapsulation
    }

    fn cc_command(&self) -> Option<u8> {
        Some(Crc16CCCommand::CommandEncapsulation as _)
    }
}

impl CCParsable for Crc16CCCommandEncapsulation {
    fn parse(i: &mut Bytes, ctx: &CCParsingContext) -> ParseResult<Self> {
        validate(i.len() >= 2, "CRC16 encapsulation is too short")?;
        let mut payload = take(i.len() - 2).parse(i)?;
        let checksum = be_u16(i)?;

        // The checksum covers the entire CRC16 CC
        let expected_checksum = crc16_incremental()
            .update(&[
                CommandClasses::CRC16Encapsulation as u8,
                Crc16CCCommand::CommandEncapsulation as u8,
            ])
            .update(&payload)
            .get();

        validate(
            checksum == expected_checksum,
            format!(
                "checksum mismatch: expected {:#06x}, got {:#06x}",
                expected_checksum, checksum
            ),
        )?;

        let encapsulated =
            map_res(CCRaw::parse, |raw| CC::try_from_raw(raw, ctx)).parse(&mut payload)?;

        Ok(Self {
            encapsulated: Box::new(encapsulated),
        })
    }
}

impl CCSerializable for Crc16CCCommandEncapsulation {
    fn serialize(&self, output: &mut BytesMut, ctx: &CCEncodingContext) {
        use serialize::bytes::{be_u16, slice};

        let payload = self.encapsulated.as_raw(ctx).as_bytes();

        let checksum = crc16_incremental()
            .update(&[
                self.cc_id() as u8,
                self.cc_command().expect("CRC16 encapsulation has a command"),
            ])
            .update(&payload)
            .get();

        slice(payload).serialize(output);
        be_u16(checksum).serialize(output);
    }
}

impl ToLogPayload for Crc16CCCommandEncapsulation {
    fn to_log_payload(&self) -> LogPayload {
        LogPayloadText::new("CRC16 encapsulation")
            .with_nested(self.encapsulated.to_log_payload())
            .into()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let inner = CC::from(BinarySwitchCCGet::default());
        let cc = CC::from(Crc16CCCommandEncapsulation::new(inner));
        let bytes = cc.as_raw(&CCEncodingContext::default()).as_bytes();
        assert_eq!(&bytes[..2], &[0x56, 0x01]);

        let mut input = bytes;
        let raw = CCRaw::parse(&mut input).unwrap();
        assert_eq!(CC::try_from_raw(raw, &CCParsingContext::default()).unwrap(), cc);
    }

    #[test]
    fn test_bad_checksum_is_rejected() {
        let inner = CC::from(BinarySwitchCCGet::default());
        let cc = CC::from(Crc16CCCommandEncapsulation::new(inner));
        let mut bytes = cc.as_raw(&CCEncodingContext::default()).as_bytes().to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;

        let mut input = Bytes::from(bytes);
        let raw = CCRaw::parse(&mut input).unwrap();
        assert!(CC::try_from_raw(raw, &CCParsingContext::default()).is_err());
    }
}
