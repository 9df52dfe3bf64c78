pub use crate::binding::SerialBinding;
pub use crate::command::*;
pub use crate::command_raw::CommandRaw;
pub use crate::error::{Error, Result};
pub use crate::frame::{ControlFlow, RawSerialFrame};
