pub use crate::definitions::*;
pub use crate::log::{
    LogPayload, LogPayloadDict, LogPayloadDictValue, LogPayloadText, ToLogPayload,
};
pub use crate::parse::{
    self, Parsable, ParseError, ParseResult, Parser, TryFromReprError, validate,
};
pub use crate::serialize::{self, Serializable, SerializableWith};
pub use crate::cache::{Cache, CacheValue};
pub use crate::value_id::{EndpointValueId, ValueId, ValueIdProperties, ValueMetadata, ValueType};
pub use crate::values::*;
