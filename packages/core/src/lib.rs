pub mod cache;
pub mod checksum;
pub mod definitions;
pub mod log;
pub mod parse;
pub mod prelude;
pub mod security;
pub mod serialize;
pub mod util;
pub mod value_id;
pub mod values;
pub mod wrapping_counter;

pub use crate::definitions::*;
pub use crate::log::{
    LogPayload, LogPayloadDict, LogPayloadDictValue, LogPayloadText, ToLogPayload,
};
pub use crate::values::*;
