use thiserror::Error;
use zwh_core::parse::ParseError;

/// The error kinds the driver distinguishes. Recoverable conditions are
/// handled at the layer that has enough context; of these, only
/// [Error::TransportClosed] ends the driver.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("The serial transport was closed")]
    TransportClosed,
    #[error("Timeout waiting for an ACK from the controller")]
    AckTimeout,
    #[error("The frame could not be transmitted after repeated CAN/NAK")]
    CanNak,
    #[error("Timeout waiting for a response from the controller")]
    ResponseTimeout,
    #[error("The controller response indicated an error")]
    ResponseNok,
    #[error("Timeout waiting for a callback from the controller")]
    CallbackTimeout,
    #[error("The controller callback indicated an error")]
    CallbackNok,
    #[error("The node did not acknowledge the command")]
    NodeTimeout,
    #[error("Timeout waiting for a message from a node")]
    Timeout,
    #[error("Malformed message: {0}")]
    MalformedMessage(String),
    #[error("Missing a security nonce for the target node")]
    SecurityNonceMissing,
    #[error("Message authentication failed")]
    SecurityMacFailed,
    #[error("The transaction was cancelled")]
    Cancelled,
    #[error("The driver is shutting down")]
    ShuttingDown,
    #[error("Internal channel error")]
    Internal,
}

impl From<ParseError> for Error {
    fn from(value: ParseError) -> Self {
        if value.is_security_failure() {
            Self::SecurityMacFailed
        } else {
            Self::MalformedMessage(value.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
