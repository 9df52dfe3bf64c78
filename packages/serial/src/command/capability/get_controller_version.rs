use crate::command::{
    CommandBase, CommandEncodingContext, CommandId, CommandParsable, CommandParsingContext,
    CommandRequest,
};
use bytes::{Bytes, BytesMut};
use derive_try_from_primitive::*;
use zwh_core::parse::bytes::rest;
use zwh_core::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum ZWaveLibraryType {
    Unknown = 0x00,
    StaticController = 0x01,
    Controller = 0x02,
    EnhancedSlave = 0x03,
    Slave = 0x04,
    Installer = 0x05,
    RoutingSlave = 0x06,
    BridgeController = 0x07,
    DeviceUnderTest = 0x08,
}

#[derive(Default, Debug, Clone, PartialEq)]
pub struct GetControllerVersionRequest {}

impl CommandId for GetControllerVersionRequest {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function_type(&self) -> FunctionType {
        FunctionType::GetControllerVersion
    }

    fn origin(&self) -> MessageOrigin {
        MessageOrigin::Host
    }
}

impl CommandBase for GetControllerVersionRequest {}

impl CommandRequest for GetControllerVersionRequest {
    fn expects_response(&self) -> bool {
        true
    }

    fn expects_callback(&self) -> bool {
        false
    }
}

impl SerializableWith<&CommandEncodingContext> for GetControllerVersionRequest {
    fn serialize(&self, _output: &mut BytesMut, _ctx: &CommandEncodingContext) {
        // No payload
    }
}

impl ToLogPayload for GetControllerVersionRequest {
    fn to_log_payload(&self) -> LogPayload {
        LogPayload::empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetControllerVersionResponse {
    pub library_version: String,
    pub library_type: ZWaveLibraryType,
}

impl CommandId for GetControllerVersionResponse {
    fn command_type(&self) -> CommandType {
        CommandType::Response
    }

    fn function_type(&self) -> FunctionType {
        FunctionType::GetControllerVersion
    }

    fn origin(&self) -> MessageOrigin {
        MessageOrigin::Controller
    }
}

impl CommandBase for GetControllerVersionResponse {}

impl CommandParsable for GetControllerVersionResponse {
    fn parse(i: &mut Bytes, _ctx: &CommandParsingContext) -> ParseResult<Self> {
        let payload = rest(i)?;
        validate(payload.len() >= 2, "version response is too short")?;

        // The version is a zero-terminated ASCII string, the final byte
        // identifies the library
        let library_type = ZWaveLibraryType::try_from(payload[payload.len() - 1])
            .unwrap_or(ZWaveLibraryType::Unknown);
        let version_bytes = &payload[..payload.len() - 1];
        let version_bytes = match version_bytes.iter().position(|b| *b == 0) {
            Some(terminator) => &version_bytes[..terminator],
            None => version_bytes,
        };
        let library_version = String::from_utf8_lossy(version_bytes).into_owned();

        Ok(Self {
            library_version,
            library_type,
        })
    }
}

impl SerializableWith<&CommandEncodingContext> for GetControllerVersionResponse {
    fn serialize(&self, output: &mut BytesMut, _ctx: &CommandEncodingContext) {
        use serialize::bytes::{be_u8, slice};
        slice(self.library_version.as_bytes()).serialize(output);
        be_u8(0).serialize(output);
        be_u8(self.library_type as u8).serialize(output);
    }
}

impl ToLogPayload for GetControllerVersionResponse {
    fn to_log_payload(&self) -> LogPayload {
        LogPayloadDict::new()
            .with_entry("library version", self.library_version.clone())
            .with_entry("library type", format!("{:?}", self.library_type))
            .into()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_response() {
        // "Z-Wave 7.17\0" + static controller
        let mut payload = b"Z-Wave 7.17\0".to_vec();
        payload.push(0x01);
        let mut input = Bytes::from(payload);

        let response =
            GetControllerVersionResponse::parse(&mut input, &CommandParsingContext::default())
                .unwrap();
        assert_eq!(response.library_version, "Z-Wave 7.17");
        assert_eq!(response.library_type, ZWaveLibraryType::StaticController);
    }
}
