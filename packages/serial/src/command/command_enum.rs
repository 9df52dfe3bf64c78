use super::*;
use crate::command_raw::CommandRaw;
use zwh_core::prelude::*;

/// The dispatch enum over every typed Serial API command. Raw commands the
/// driver has no parser for become [Command::NotImplemented] so they can be
/// acknowledged and logged instead of being dropped at the framing layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    GetControllerVersionRequest(GetControllerVersionRequest),
    GetControllerVersionResponse(GetControllerVersionResponse),
    GetControllerIdRequest(GetControllerIdRequest),
    GetControllerIdResponse(GetControllerIdResponse),
    GetSerialApiInitDataRequest(GetSerialApiInitDataRequest),
    GetSerialApiInitDataResponse(GetSerialApiInitDataResponse),
    GetNodeProtocolInfoRequest(GetNodeProtocolInfoRequest),
    GetNodeProtocolInfoResponse(GetNodeProtocolInfoResponse),
    RequestNodeInfoRequest(RequestNodeInfoRequest),
    RequestNodeInfoResponse(RequestNodeInfoResponse),
    ApplicationUpdateRequest(ApplicationUpdateRequest),
    ApplicationCommandRequest(ApplicationCommandRequest),
    SendDataRequest(SendDataRequest),
    SendDataResponse(SendDataResponse),
    SendDataCallback(SendDataCallback),
    SendDataAbortRequest(SendDataAbortRequest),
    SoftResetRequest(SoftResetRequest),
    NotImplemented(CommandRaw),
}

macro_rules! for_each_command {
    ($self:ident, $cmd:ident => $body:expr, $raw:ident => $raw_body:expr) => {
        match $self {
            Command::GetControllerVersionRequest($cmd) => $body,
            Command::GetControllerVersionResponse($cmd) => $body,
            Command::GetControllerIdRequest($cmd) => $body,
            Command::GetControllerIdResponse($cmd) => $body,
            Command::GetSerialApiInitDataRequest($cmd) => $body,
            Command::GetSerialApiInitDataResponse($cmd) => $body,
            Command::GetNodeProtocolInfoRequest($cmd) => $body,
            Command::GetNodeProtocolInfoResponse($cmd) => $body,
            Command::RequestNodeInfoRequest($cmd) => $body,
            Command::RequestNodeInfoResponse($cmd) => $body,
            Command::ApplicationUpdateRequest($cmd) => $body,
            Command::ApplicationCommandRequest($cmd) => $body,
            Command::SendDataRequest($cmd) => $body,
            Command::SendDataResponse($cmd) => $body,
            Command::SendDataCallback($cmd) => $body,
            Command::SendDataAbortRequest($cmd) => $body,
            Command::SoftResetRequest($cmd) => $body,
            Command::NotImplemented($raw) => $raw_body,
        }
    };
}

macro_rules! impl_from_commands {
    ($($variant:ident),+ $(,)?) => {
        $(
            impl From<$variant> for Command {
                fn from(val: $variant) -> Self {
                    Self::$variant(val)
                }
            }
        )+
    };
}

impl_from_commands!(
    GetControllerVersionRequest,
    GetControllerVersionResponse,
    GetControllerIdRequest,
    GetControllerIdResponse,
    GetSerialApiInitDataRequest,
    GetSerialApiInitDataResponse,
    GetNodeProtocolInfoRequest,
    GetNodeProtocolInfoResponse,
    RequestNodeInfoRequest,
    RequestNodeInfoResponse,
    ApplicationUpdateRequest,
    ApplicationCommandRequest,
    SendDataRequest,
    SendDataResponse,
    SendDataCallback,
    SendDataAbortRequest,
    SoftResetRequest,
);

impl Command {
    pub fn command_type(&self) -> CommandType {
        for_each_command!(self, cmd => cmd.command_type(), raw => raw.command_type)
    }

    /// The raw function id. Total, even for functions without a parser.
    pub fn function(&self) -> u8 {
        for_each_command!(self, cmd => cmd.function_type() as u8, raw => raw.function)
    }

    /// A readable name for logging; unknown functions print as hex
    pub fn function_name(&self) -> String {
        for_each_command!(
            self,
            cmd => format!("{:?}", cmd.function_type()),
            raw => format!("{:#04x}", raw.function)
        )
    }

    pub fn callback_id(&self) -> Option<u8> {
        for_each_command!(self, cmd => cmd.callback_id(), _raw => None)
    }

    pub fn is_ok(&self) -> bool {
        for_each_command!(self, cmd => cmd.is_ok(), _raw => true)
    }
}

impl ToLogPayload for Command {
    fn to_log_payload(&self) -> LogPayload {
        for_each_command!(
            self,
            cmd => cmd.to_log_payload(),
            raw => LogPayloadDict::new()
                .with_entry("function", format!("{:#04x}", raw.function))
                .with_entry("payload", format!("0x{}", hex::encode(&raw.payload)))
                .into()
        )
    }
}

impl Command {
    /// The registry lookup for incoming commands: resolves a raw command
    /// from the controller into its typed form. Unknown functions are kept
    /// as [Command::NotImplemented].
    pub fn try_from_raw(raw: CommandRaw, ctx: &CommandParsingContext) -> ParseResult<Command> {
        let Ok(function) = FunctionType::try_from(raw.function) else {
            return Ok(Command::NotImplemented(raw));
        };

        let mut i = raw.payload.clone();

        macro_rules! parse_command {
            ($t:ty) => {
                <$t>::parse(&mut i, ctx).map(Command::from)
            };
        }

        match (function, raw.command_type) {
            (FunctionType::GetControllerVersion, CommandType::Response) => {
                parse_command!(GetControllerVersionResponse)
            }
            (FunctionType::GetControllerId, CommandType::Response) => {
                parse_command!(GetControllerIdResponse)
            }
            (FunctionType::GetSerialApiInitData, CommandType::Response) => {
                parse_command!(GetSerialApiInitDataResponse)
            }
            (FunctionType::GetNodeProtocolInfo, CommandType::Response) => {
                parse_command!(GetNodeProtocolInfoResponse)
            }
            (FunctionType::RequestNodeInfo, CommandType::Response) => {
                parse_command!(RequestNodeInfoResponse)
            }
            (FunctionType::ApplicationUpdateRequest, CommandType::Request) => {
                parse_command!(ApplicationUpdateRequest)
            }
            (FunctionType::ApplicationCommand, CommandType::Request) => {
                parse_command!(ApplicationCommandRequest)
            }
            (FunctionType::SendData, CommandType::Response) => {
                parse_command!(SendDataResponse)
            }
            // A SendData request from the controller is the callback
            (FunctionType::SendData, CommandType::Request) => {
                parse_command!(SendDataCallback)
            }
            _ => Ok(Command::NotImplemented(raw)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_dispatch_response() {
        let raw = CommandRaw {
            command_type: CommandType::Response,
            function: FunctionType::SendData as u8,
            payload: Bytes::from_static(&[0x01]),
            checksum: 0,
        };
        let cmd = Command::try_from_raw(raw, &CommandParsingContext::default()).unwrap();
        assert!(matches!(cmd, Command::SendDataResponse(SendDataResponse { was_sent: true })));
    }

    #[test]
    fn test_unknown_function_is_kept_raw() {
        let raw = CommandRaw {
            command_type: CommandType::Request,
            function: 0x99,
            payload: Bytes::new(),
            checksum: 0,
        };
        let cmd = Command::try_from_raw(raw, &CommandParsingContext::default()).unwrap();
        assert!(matches!(cmd, Command::NotImplemented(_)));
    }
}
