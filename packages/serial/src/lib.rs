pub mod binding;
pub mod command;
pub mod command_raw;
pub mod error;
pub mod frame;
pub mod prelude;
pub mod serialport;

pub use crate::command::{
    AsCommandRaw, Command, CommandBase, CommandEncodingContext, CommandId, CommandParsable,
    CommandParsingContext, CommandRequest,
};
pub use crate::command_raw::CommandRaw;
