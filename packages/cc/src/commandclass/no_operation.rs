use crate::prelude::*;
use bytes::{Bytes, BytesMut};
use zwh_core::prelude::*;

/// No Operation is used to ping nodes. It has no command byte and no
/// payload; reaching the node is the entire point.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct NoOperationCC {}

impl CCBase for NoOperationCC {}

impl CCValues for NoOperationCC {}

impl CCId for NoOperationCC {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::NoOperation
    }

    fn cc_command(&self) -> Option<u8> {
        None
    }
}

impl CCParsable for NoOperationCC {
    fn parse(_i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        // No payload
        Ok(Self {})
    }
}

impl CCSerializable for NoOperationCC {
    fn serialize(&self, _output: &mut BytesMut, _ctx: &CCEncodingContext) {
        // No payload
    }
}

impl ToLogPayload for NoOperationCC {
    fn to_log_payload(&self) -> LogPayload {
        LogPayload::empty()
    }
}
