use crate::cc_value;
use crate::prelude::*;
use bytes::{Bytes, BytesMut};
use derive_try_from_primitive::*;
use typed_builder::TypedBuilder;
use zwh_core::parse::bytes::be_u16;
use zwh_core::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum ManufacturerSpecificCCCommand {
    Get = 0x04,
    Report = 0x05,
}

pub struct ManufacturerSpecificCCValues;
impl ManufacturerSpecificCCValues {
    cc_value!(
        pub manufacturer_id,
        ManufacturerSpecific,
        0x00u8,
        ValueMetadata::readonly_number("Manufacturer ID")
    );

    cc_value!(
        pub product_type,
        ManufacturerSpecific,
        0x01u8,
        ValueMetadata::readonly_number("Product type")
    );

    cc_value!(
        pub product_id,
        ManufacturerSpecific,
        0x02u8,
        ValueMetadata::readonly_number("Product ID")
    );
}

#[derive(Default, Debug, Clone, PartialEq)]
pub struct ManufacturerSpecificCCGet {}

impl CCBase for ManufacturerSpecificCCGet {
    fn expects_response(&self) -> bool {
        true
    }

    fn test_response(&self, response: &CC) -> bool {
        matches!(response, CC::ManufacturerSpecificCCReport(_))
    }
}

impl CCValues for ManufacturerSpecificCCGet {}

impl CCId for ManufacturerSpecificCCGet {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::ManufacturerSpecific
    }

    fn cc_command(&self) -> Option<u8> {
        Some(ManufacturerSpecificCCCommand::Get as _)
    }
}

impl CCParsable for ManufacturerSpecificCCGet {
    fn parse(_i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        Ok(Self {})
    }
}

impl CCSerializable for ManufacturerSpecificCCGet {
    fn serialize(&self, _output: &mut BytesMut, _ctx: &CCEncodingContext) {
        // No payload
    }
}

impl ToLogPayload for ManufacturerSpecificCCGet {
    fn to_log_payload(&self) -> LogPayload {
        LogPayload::empty()
    }
}

#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct ManufacturerSpecificCCReport {
    pub manufacturer_id: u16,
    pub product_type: u16,
    pub product_id: u16,
}

impl CCBase for ManufacturerSpecificCCReport {}

impl CCValues for ManufacturerSpecificCCReport {
    fn to_values(&self) -> Vec<(ValueId, CacheValue)> {
        vec![
            (
                ManufacturerSpecificCCValues::manufacturer_id().id,
                CacheValue::UInt16(self.manufacturer_id),
            ),
            (
                ManufacturerSpecificCCValues::product_type().id,
                CacheValue::UInt16(self.product_type),
            ),
            (
                ManufacturerSpecificCCValues::product_id().id,
                CacheValue::UInt16(self.product_id),
            ),
        ]
    }

    fn to_metadata(&self) -> Vec<(ValueId, ValueMetadata)> {
        [
            ManufacturerSpecificCCValues::manufacturer_id(),
            ManufacturerSpecificCCValues::product_type(),
            ManufacturerSpecificCCValues::product_id(),
        ]
        .into_iter()
        .map(|v| (v.id, v.metadata))
        .collect()
    }
}

impl CCId for ManufacturerSpecificCCReport {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::ManufacturerSpecific
    }

    fn cc_command(&self) -> Option<u8> {
        Some(ManufacturerSpecificCCCommand::Report as _)
    }
}

impl CCParsable for ManufacturerSpecificCCReport {
    fn parse(i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        let manufacturer_id = be_u16(i)?;
        let product_type = be_u16(i)?;
        let product_id = be_u16(i)?;

        Ok(Self {
            manufacturer_id,
            product_type,
            product_id,
        })
    }
}

impl CCSerializable for ManufacturerSpecificCCReport {
    fn serialize(&self, output: &mut BytesMut, _ctx: &CCEncodingContext) {
        use serialize::bytes::be_u16;
        be_u16(self.manufacturer_id).serialize(output);
        be_u16(self.product_type).serialize(output);
        be_u16(self.product_id).serialize(output);
    }
}

impl ToLogPayload for ManufacturerSpecificCCReport {
    fn to_log_payload(&self) -> LogPayload {
        LogPayloadDict::new()
            .with_entry("manufacturer id", format!("{:#06x}", self.manufacturer_id))
            .with_entry("product type", format!("{:#06x}", self.product_type))
            .with_entry("product id", format!("{:#06x}", self.product_id))
            .into()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_get_serializes_to_command_only() {
        let cc = CC::from(ManufacturerSpecificCCGet::default());
        assert_eq!(
            cc.as_raw(&CCEncodingContext::default()).as_bytes(),
            Bytes::from_static(&[0x72, 0x04])
        );
    }

    #[test]
    fn test_report_roundtrip() {
        // Manufacturer 0x0147, product type 0x0003, product id 0x0001
        let mut input =
            Bytes::from_static(&[0x72, 0x05, 0x01, 0x47, 0x00, 0x03, 0x00, 0x01]);
        let raw = CCRaw::parse(&mut input).unwrap();
        let cc = CC::try_from_raw(raw, &CCParsingContext::default()).unwrap();
        let CC::ManufacturerSpecificCCReport(report) = &cc else {
            panic!("expected a ManufacturerSpecificCCReport");
        };
        assert_eq!(report.manufacturer_id, 0x0147);
        assert_eq!(report.product_type, 0x0003);
        assert_eq!(report.product_id, 0x0001);

        let raw = cc.as_raw(&CCEncodingContext::default());
        assert_eq!(
            raw.as_bytes(),
            Bytes::from_static(&[0x72, 0x05, 0x01, 0x47, 0x00, 0x03, 0x00, 0x01])
        );
    }

    #[test]
    fn test_get_matches_report() {
        let get = ManufacturerSpecificCCGet::default();
        let report = CC::from(
            ManufacturerSpecificCCReport::builder()
                .manufacturer_id(0x0147)
                .product_type(0x0003)
                .product_id(0x0001)
                .build(),
        );
        assert!(get.expects_response());
        assert!(get.test_response(&report));
        assert!(!get.test_response(&CC::from(ManufacturerSpecificCCGet::default())));
    }
}
