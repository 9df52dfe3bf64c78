use crate::command_raw::CommandRaw;
use bytes::Bytes;
use std::sync::Arc;
use typed_builder::TypedBuilder;
use zwh_core::prelude::*;
use zwh_core::security::{SecurityManager, SecurityManagerS2};
use zwh_core::submodule;

mod application;
mod capability;
mod misc;
mod network_mgmt;
mod transport;

pub use application::*;
pub use capability::*;
pub use misc::*;
pub use network_mgmt::*;
pub use transport::*;

submodule!(command_enum);

/// Resolves the security class a node was granted. The driver backs this
/// with its node storage; without one, nodes count as insecure.
pub type SecurityClassLookup = Arc<dyn Fn(NodeId) -> SecurityClass + Send + Sync>;

/// Context needed to interpret incoming commands
#[derive(Default, Clone, TypedBuilder)]
#[builder(field_defaults(default))]
pub struct CommandParsingContext {
    pub own_node_id: NodeId,
    pub home_id: u32,
    #[builder(setter(into))]
    pub security_manager: Option<SecurityManager>,
    #[builder(setter(into))]
    pub security_manager_s2: Option<SecurityManagerS2>,
    #[builder(setter(into))]
    pub security_class_lookup: Option<SecurityClassLookup>,
}

impl CommandParsingContext {
    /// The security class granted to the given node
    pub fn security_class(&self, node_id: NodeId) -> SecurityClass {
        self.security_class_lookup
            .as_ref()
            .map(|lookup| lookup(node_id))
            .unwrap_or_default()
    }
}

/// Context needed to serialize outgoing commands
#[derive(Default, Clone, TypedBuilder)]
#[builder(field_defaults(default))]
pub struct CommandEncodingContext {
    pub own_node_id: NodeId,
    pub home_id: u32,
    #[builder(setter(into))]
    pub security_manager: Option<SecurityManager>,
    #[builder(setter(into))]
    pub security_manager_s2: Option<SecurityManagerS2>,
}

/// Identifies a command: its direction, function and who creates it
pub trait CommandId {
    fn command_type(&self) -> CommandType;
    fn function_type(&self) -> FunctionType;
    fn origin(&self) -> MessageOrigin;
}

pub trait CommandBase: std::fmt::Debug + Sync + Send + ToLogPayload {
    /// The callback id carried by this command, if any. 0 means "none".
    fn callback_id(&self) -> Option<u8> {
        None
    }

    /// Whether this command reports success
    fn is_ok(&self) -> bool {
        true
    }
}

/// A command the host sends to the controller
pub trait CommandRequest: CommandId + CommandBase {
    /// Whether the controller answers this command with a response
    fn expects_response(&self) -> bool;

    /// Tests whether the given command is the response to this request.
    /// By default any response with the same function matches.
    fn test_response(&self, response: &Command) -> bool {
        response.command_type() == CommandType::Response
            && response.function() == self.function_type() as u8
    }

    /// Whether the controller delivers one or more callbacks for this
    /// command after the response
    fn expects_callback(&self) -> bool;

    /// Tests whether the given command is a callback for this request.
    /// Callbacks are matched by their callback id.
    fn test_callback(&self, callback: &Command) -> bool {
        if callback.command_type() != CommandType::Request
            || callback.function() != self.function_type() as u8
        {
            return false;
        }
        match (self.callback_id(), callback.callback_id()) {
            (Some(expected), Some(actual)) => expected == actual,
            _ => true,
        }
    }

    /// Whether this command needs a callback id assigned before sending
    fn needs_callback_id(&self) -> bool {
        false
    }

    /// Assigns the callback id. A no-op for commands without callbacks.
    fn set_callback_id(&mut self, callback_id: Option<u8>) {
        let _ = callback_id;
    }
}

pub trait CommandParsable
where
    Self: Sized + CommandBase,
{
    fn parse(i: &mut Bytes, ctx: &CommandParsingContext) -> ParseResult<Self>;
}

/// Conversion of a typed command into its framed raw form
pub trait AsCommandRaw {
    fn as_raw(&self, ctx: &CommandEncodingContext) -> CommandRaw;
}

impl<T> AsCommandRaw for T
where
    T: CommandId + for<'a> SerializableWith<&'a CommandEncodingContext>,
{
    fn as_raw(&self, ctx: &CommandEncodingContext) -> CommandRaw {
        CommandRaw {
            command_type: self.command_type(),
            function: self.function_type() as u8,
            payload: SerializableWith::as_bytes(self, ctx),
            // Computed during framing
            checksum: 0,
        }
    }
}
