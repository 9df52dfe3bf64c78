mod driver;
pub use crate::driver::*;

pub mod error;

mod node;
pub use crate::node::*;

mod interview;
pub use crate::interview::*;

pub mod events;
pub mod options;
pub mod storage;
pub mod value_db;

pub(crate) mod awaited;
pub(crate) mod queue;
pub(crate) mod serial_api_machine;
pub(crate) mod transaction;

pub use crate::awaited::Predicate;
pub use crate::serial_api_machine::{
    SerialApiMachine, SerialApiMachineInput, SerialApiMachineResult, SerialApiMachineState,
};
pub use crate::transaction::{ExecutableCommand, Priority, TransactionResult};

#[cfg(test)]
mod tests;
