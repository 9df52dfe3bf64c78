use crate::error::{Error, Result};
use std::time::Duration;
use tokio::sync::oneshot;
use zwh_serial::command::{
    AsCommandRaw, Command, CommandRequest, SendDataRequest,
};
use zwh_core::prelude::*;

/// Scheduling priority. Lower discriminant wins; within one priority the
/// queue is FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Direct controller communication, preempts everything at the queue
    /// boundary
    Controller,
    /// Queries that drive a node interview
    NodeQuery,
    /// Verification polls after optimistic updates
    Poll,
    Normal,
    /// Housekeeping for sleeping nodes, sent right before they may doze off
    WakeUp,
}

pub const PRIORITY_COUNT: usize = 5;

impl Priority {
    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// A command the send queue can execute: any typed host request
pub trait ExecutableCommand: CommandRequest + AsCommandRaw + Send + Sync {}
impl<T> ExecutableCommand for T where T: CommandRequest + AsCommandRaw + Send + Sync {}

/// What a transaction sends: SendData is kept typed because the executor
/// treats its callbacks (transmit status, per-node retry rules) specially.
pub enum TransactionPayload {
    Controller(Box<dyn ExecutableCommand>),
    SendData(SendDataRequest),
}

impl TransactionPayload {
    pub fn command(&self) -> &dyn ExecutableCommand {
        match self {
            Self::Controller(cmd) => cmd.as_ref(),
            Self::SendData(cmd) => cmd,
        }
    }

    pub fn command_mut(&mut self) -> &mut dyn ExecutableCommand {
        match self {
            Self::Controller(cmd) => cmd.as_mut(),
            Self::SendData(cmd) => cmd,
        }
    }

    pub fn as_send_data_mut(&mut self) -> Option<&mut SendDataRequest> {
        match self {
            Self::SendData(cmd) => Some(cmd),
            _ => None,
        }
    }
}

/// What a completed transaction resolves with
#[derive(Debug, Default)]
pub struct TransactionResult {
    pub response: Option<Command>,
    pub callback: Option<Command>,
}

/// A queued send-and-wait unit. While pending it is owned by the queue;
/// completion hands the result to the originator through the oneshot.
pub struct Transaction {
    pub payload: TransactionPayload,
    pub priority: Priority,
    /// The destination node for node-addressed commands. Used for per-node
    /// serialization and wake-up parking.
    pub node_id: Option<NodeId>,
    pub attempts_left: u8,
    /// After this transaction completes, the target node is considered
    /// asleep again (used for the wake-up "no more information" command)
    pub puts_node_to_sleep: bool,
    pub promise: Option<oneshot::Sender<Result<TransactionResult>>>,
}

impl Transaction {
    pub fn controller_command<C>(
        command: C,
        priority: Priority,
        attempts: u8,
    ) -> (Self, oneshot::Receiver<Result<TransactionResult>>)
    where
        C: ExecutableCommand + 'static,
    {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                payload: TransactionPayload::Controller(Box::new(command)),
                priority,
                node_id: None,
                attempts_left: attempts,
                puts_node_to_sleep: false,
                promise: Some(tx),
            },
            rx,
        )
    }

    pub fn send_data(
        command: SendDataRequest,
        priority: Priority,
        attempts: u8,
    ) -> (Self, oneshot::Receiver<Result<TransactionResult>>) {
        let (tx, rx) = oneshot::channel();
        let node_id = command.node_id;
        (
            Self {
                payload: TransactionPayload::SendData(command),
                priority,
                node_id: Some(node_id),
                attempts_left: attempts,
                puts_node_to_sleep: false,
                promise: Some(tx),
            },
            rx,
        )
    }

    pub fn is_send_data(&self) -> bool {
        matches!(self.payload, TransactionPayload::SendData(_))
    }

    /// How long to wait for the terminal callback of this command
    pub fn callback_timeout(&self, timeouts: &crate::options::Timeouts) -> Duration {
        match self.payload {
            TransactionPayload::SendData(_) => timeouts.send_data_callback,
            TransactionPayload::Controller(_) => timeouts.send_data_callback,
        }
    }

    pub fn resolve(&mut self, result: Result<TransactionResult>) {
        if let Some(promise) = self.promise.take() {
            // The originator may have stopped listening; that's fine
            let _ = promise.send(result);
        }
    }

    pub fn cancel(&mut self) {
        self.resolve(Err(Error::Cancelled));
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        // A transaction dropped without completion counts as cancelled
        self.cancel();
    }
}
