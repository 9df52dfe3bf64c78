use crate::commandclass_raw::CCRaw;
use bytes::{Bytes, BytesMut};
use enum_dispatch::enum_dispatch;
use std::ops::{Deref, DerefMut};
use typed_builder::TypedBuilder;
use zwh_core::prelude::*;
use zwh_core::security::{SecurityManager, SecurityManagerS2};
use zwh_core::submodule;

submodule!(no_operation);
submodule!(binary_switch);
submodule!(multilevel_switch);
submodule!(version);
submodule!(manufacturer_specific);
submodule!(wake_up);
submodule!(multi_channel);
submodule!(supervision);
submodule!(crc16);
submodule!(security);
submodule!(security2);
submodule!(transport_service);

/// Context available while parsing a CC
#[derive(Default, TypedBuilder)]
#[builder(field_defaults(default))]
pub struct CCParsingContext {
    pub source_node_id: NodeId,
    pub own_node_id: NodeId,
    pub home_id: u32,
    /// The security class the source node was granted. Selects the network
    /// key that incoming encapsulations are decrypted with.
    pub security_class: SecurityClass,
    #[builder(setter(into))]
    pub frame_addressing: Option<FrameAddressing>,
    #[builder(setter(into))]
    pub security_manager: Option<SecurityManager>,
    #[builder(setter(into))]
    pub security_manager_s2: Option<SecurityManagerS2>,
}

/// Context available while serializing a CC
#[derive(Default, TypedBuilder)]
#[builder(field_defaults(default))]
pub struct CCEncodingContext {
    pub own_node_id: NodeId,
    pub node_id: NodeId,
    pub home_id: u32,
    #[builder(setter(into))]
    pub security_manager: Option<SecurityManager>,
    #[builder(setter(into))]
    pub security_manager_s2: Option<SecurityManagerS2>,
}

/// Command-specific functionality that may need to be implemented for each
/// command
#[enum_dispatch(CC)]
pub trait CCBase:
    CCValues + ToLogPayload + std::fmt::Debug + Sync + Send + Clone + PartialEq
{
    /// Whether this CC expects a response
    fn expects_response(&self) -> bool {
        false
    }

    /// If this CC expects a response, tests whether the given CC is it
    fn test_response(&self, response: &CC) -> bool {
        let _ = response;
        false
    }
}

/// Identifies a command class and its commands
#[enum_dispatch(CC)]
pub trait CCId: CCBase {
    /// The command class identifier
    fn cc_id(&self) -> CommandClasses;

    /// The subcommand identifier, if applicable
    fn cc_command(&self) -> Option<u8>;
}

/// The values a CC contributes to the ValueDB when it is received
#[enum_dispatch(CC)]
pub trait CCValues {
    /// CCs which carry values implement this. For all others it is a no-op.
    fn to_values(&self) -> Vec<(ValueId, CacheValue)> {
        vec![]
    }

    /// The metadata for the values this CC carries
    fn to_metadata(&self) -> Vec<(ValueId, ValueMetadata)> {
        vec![]
    }
}

pub trait CCParsable
where
    Self: Sized + CCBase,
{
    fn parse(i: &mut Bytes, ctx: &CCParsingContext) -> ParseResult<Self>;
}

/// Serializes the CC payload (everything after the CC id and command)
#[enum_dispatch(CC)]
pub trait CCSerializable {
    fn serialize(&self, output: &mut BytesMut, ctx: &CCEncodingContext);
}

/// Who a CC is addressed to
#[derive(Debug, Clone, PartialEq)]
pub enum Destination {
    Singlecast(NodeId),
    Multicast(Vec<NodeId>),
    Broadcast,
}

impl From<&Destination> for FrameAddressing {
    fn from(val: &Destination) -> Self {
        match val {
            Destination::Singlecast(_) => FrameAddressing::Singlecast,
            Destination::Multicast(_) => FrameAddressing::Multicast,
            Destination::Broadcast => FrameAddressing::Broadcast,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CCAddress {
    pub source_node_id: NodeId,
    pub destination: Destination,
    pub endpoint_index: EndpointIndex,
}

impl CCAddress {
    pub fn for_node(node_id: NodeId) -> Self {
        Self {
            source_node_id: NodeId::unspecified(),
            destination: Destination::Singlecast(node_id),
            endpoint_index: EndpointIndex::Root,
        }
    }
}

/// A CC (or similar) paired with the address it came from or goes to
#[derive(Debug, Clone, PartialEq)]
pub struct WithAddress<T> {
    address: CCAddress,
    command: T,
}

impl<T> WithAddress<T> {
    pub fn new(address: CCAddress, command: T) -> Self {
        Self { address, command }
    }

    pub fn address(&self) -> &CCAddress {
        &self.address
    }

    pub fn set_address(&mut self, address: CCAddress) {
        self.address = address;
    }

    pub fn with_destination(self, destination: Destination) -> Self {
        let mut address = self.address;
        address.destination = destination;
        Self { address, ..self }
    }

    pub fn with_endpoint_index(self, endpoint_index: EndpointIndex) -> Self {
        let mut address = self.address;
        address.endpoint_index = endpoint_index;
        Self { address, ..self }
    }

    pub fn unwrap(self) -> T {
        self.command
    }

    pub fn split(self) -> (CCAddress, T) {
        (self.address, self.command)
    }
}

impl<T> Deref for WithAddress<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.command
    }
}

impl<T> DerefMut for WithAddress<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.command
    }
}

impl<T> AsRef<T> for WithAddress<T> {
    fn as_ref(&self) -> &T {
        &self.command
    }
}

pub trait CCAddressable: Sized {
    fn with_address(self, address: CCAddress) -> WithAddress<Self> {
        WithAddress::new(address, self)
    }

    fn with_destination(self, destination: Destination) -> WithAddress<Self> {
        let mut address = CCAddress::for_node(NodeId::unspecified());
        address.destination = destination;
        WithAddress::new(address, self)
    }
}

impl<T: CCBase> CCAddressable for T {}

/// The dispatch enum over every implemented CC command
#[enum_dispatch]
#[derive(Debug, Clone, PartialEq)]
pub enum CC {
    NoOperationCC(NoOperationCC),
    // Binary Switch
    BinarySwitchCCSet(BinarySwitchCCSet),
    BinarySwitchCCGet(BinarySwitchCCGet),
    BinarySwitchCCReport(BinarySwitchCCReport),
    // Multilevel Switch
    MultilevelSwitchCCSet(MultilevelSwitchCCSet),
    MultilevelSwitchCCGet(MultilevelSwitchCCGet),
    MultilevelSwitchCCReport(MultilevelSwitchCCReport),
    MultilevelSwitchCCStartLevelChange(MultilevelSwitchCCStartLevelChange),
    MultilevelSwitchCCStopLevelChange(MultilevelSwitchCCStopLevelChange),
    MultilevelSwitchCCSupportedGet(MultilevelSwitchCCSupportedGet),
    MultilevelSwitchCCSupportedReport(MultilevelSwitchCCSupportedReport),
    // Version
    VersionCCGet(VersionCCGet),
    VersionCCReport(VersionCCReport),
    VersionCCCommandClassGet(VersionCCCommandClassGet),
    VersionCCCommandClassReport(VersionCCCommandClassReport),
    // Manufacturer Specific
    ManufacturerSpecificCCGet(ManufacturerSpecificCCGet),
    ManufacturerSpecificCCReport(ManufacturerSpecificCCReport),
    // Wake Up
    WakeUpCCIntervalSet(WakeUpCCIntervalSet),
    WakeUpCCIntervalGet(WakeUpCCIntervalGet),
    WakeUpCCIntervalReport(WakeUpCCIntervalReport),
    WakeUpCCNotification(WakeUpCCNotification),
    WakeUpCCNoMoreInformation(WakeUpCCNoMoreInformation),
    // Multi Channel
    MultiChannelCCEndPointGet(MultiChannelCCEndPointGet),
    MultiChannelCCEndPointReport(MultiChannelCCEndPointReport),
    MultiChannelCCCapabilityGet(MultiChannelCCCapabilityGet),
    MultiChannelCCCapabilityReport(MultiChannelCCCapabilityReport),
    MultiChannelCCCommandEncapsulation(MultiChannelCCCommandEncapsulation),
    // Supervision
    SupervisionCCGet(SupervisionCCGet),
    SupervisionCCReport(SupervisionCCReport),
    // CRC16
    Crc16CCCommandEncapsulation(Crc16CCCommandEncapsulation),
    // Security S0
    SecurityCCNonceGet(SecurityCCNonceGet),
    SecurityCCNonceReport(SecurityCCNonceReport),
    SecurityCCCommandEncapsulation(SecurityCCCommandEncapsulation),
    // Security S2
    Security2CCNonceGet(Security2CCNonceGet),
    Security2CCNonceReport(Security2CCNonceReport),
    Security2CCMessageEncapsulation(Security2CCMessageEncapsulation),
    // Transport Service
    TransportServiceCCFirstSegment(TransportServiceCCFirstSegment),
    TransportServiceCCSubsequentSegment(TransportServiceCCSubsequentSegment),
    TransportServiceCCSegmentComplete(TransportServiceCCSegmentComplete),
    TransportServiceCCSegmentRequest(TransportServiceCCSegmentRequest),
    TransportServiceCCSegmentWait(TransportServiceCCSegmentWait),
}

macro_rules! for_each_cc {
    ($self:ident, $cc:ident => $body:expr) => {
        match $self {
            CC::NoOperationCC($cc) => $body,
            CC::BinarySwitchCCSet($cc) => $body,
            CC::BinarySwitchCCGet($cc) => $body,
            CC::BinarySwitchCCReport($cc) => $body,
            CC::MultilevelSwitchCCSet($cc) => $body,
            CC::MultilevelSwitchCCGet($cc) => $body,
            CC::MultilevelSwitchCCReport($cc) => $body,
            CC::MultilevelSwitchCCStartLevelChange($cc) => $body,
            CC::MultilevelSwitchCCStopLevelChange($cc) => $body,
            CC::MultilevelSwitchCCSupportedGet($cc) => $body,
            CC::MultilevelSwitchCCSupportedReport($cc) => $body,
            CC::VersionCCGet($cc) => $body,
            CC::VersionCCReport($cc) => $body,
            CC::VersionCCCommandClassGet($cc) => $body,
            CC::VersionCCCommandClassReport($cc) => $body,
            CC::ManufacturerSpecificCCGet($cc) => $body,
            CC::ManufacturerSpecificCCReport($cc) => $body,
            CC::WakeUpCCIntervalSet($cc) => $body,
            CC::WakeUpCCIntervalGet($cc) => $body,
            CC::WakeUpCCIntervalReport($cc) => $body,
            CC::WakeUpCCNotification($cc) => $body,
            CC::WakeUpCCNoMoreInformation($cc) => $body,
            CC::MultiChannelCCEndPointGet($cc) => $body,
            CC::MultiChannelCCEndPointReport($cc) => $body,
            CC::MultiChannelCCCapabilityGet($cc) => $body,
            CC::MultiChannelCCCapabilityReport($cc) => $body,
            CC::MultiChannelCCCommandEncapsulation($cc) => $body,
            CC::SupervisionCCGet($cc) => $body,
            CC::SupervisionCCReport($cc) => $body,
            CC::Crc16CCCommandEncapsulation($cc) => $body,
            CC::SecurityCCNonceGet($cc) => $body,
            CC::SecurityCCNonceReport($cc) => $body,
            CC::SecurityCCCommandEncapsulation($cc) => $body,
            CC::Security2CCNonceGet($cc) => $body,
            CC::Security2CCNonceReport($cc) => $body,
            CC::Security2CCMessageEncapsulation($cc) => $body,
            CC::TransportServiceCCFirstSegment($cc) => $body,
            CC::TransportServiceCCSubsequentSegment($cc) => $body,
            CC::TransportServiceCCSegmentComplete($cc) => $body,
            CC::TransportServiceCCSegmentRequest($cc) => $body,
            CC::TransportServiceCCSegmentWait($cc) => $body,
        }
    };
}

impl ToLogPayload for CC {
    fn to_log_payload(&self) -> LogPayload {
        for_each_cc!(self, cc => cc.to_log_payload())
    }
}

impl CC {
    /// Serializes this CC into its raw form
    pub fn as_raw(&self, ctx: &CCEncodingContext) -> CCRaw {
        let mut payload = BytesMut::new();
        CCSerializable::serialize(self, &mut payload, ctx);
        CCRaw {
            cc_id: self.cc_id(),
            cc_command: self.cc_command(),
            payload: payload.freeze(),
        }
    }

    /// The registry lookup: resolves a raw CC into the typed command it
    /// encodes, recursing through encapsulations
    pub fn try_from_raw(raw: CCRaw, ctx: &CCParsingContext) -> ParseResult<CC> {
        let mut i = raw.payload.clone();
        let cc_command = raw.cc_command;

        macro_rules! parse_cc {
            ($t:ty) => {
                <$t>::parse(&mut i, ctx).map(CC::from)
            };
        }

        let expect_command = || -> ParseResult<u8> {
            cc_command.ok_or_else(|| ParseError::validation_failure("CC command is missing"))
        };

        match raw.cc_id {
            CommandClasses::NoOperation => Ok(NoOperationCC::default().into()),

            CommandClasses::BinarySwitch => {
                match BinarySwitchCCCommand::try_from(expect_command()?)? {
                    BinarySwitchCCCommand::Set => parse_cc!(BinarySwitchCCSet),
                    BinarySwitchCCCommand::Get => parse_cc!(BinarySwitchCCGet),
                    BinarySwitchCCCommand::Report => parse_cc!(BinarySwitchCCReport),
                }
            }

            CommandClasses::MultilevelSwitch => {
                match MultilevelSwitchCCCommand::try_from(expect_command()?)? {
                    MultilevelSwitchCCCommand::Set => parse_cc!(MultilevelSwitchCCSet),
                    MultilevelSwitchCCCommand::Get => parse_cc!(MultilevelSwitchCCGet),
                    MultilevelSwitchCCCommand::Report => parse_cc!(MultilevelSwitchCCReport),
                    MultilevelSwitchCCCommand::StartLevelChange => {
                        parse_cc!(MultilevelSwitchCCStartLevelChange)
                    }
                    MultilevelSwitchCCCommand::StopLevelChange => {
                        parse_cc!(MultilevelSwitchCCStopLevelChange)
                    }
                    MultilevelSwitchCCCommand::SupportedGet => {
                        parse_cc!(MultilevelSwitchCCSupportedGet)
                    }
                    MultilevelSwitchCCCommand::SupportedReport => {
                        parse_cc!(MultilevelSwitchCCSupportedReport)
                    }
                }
            }

            CommandClasses::Version => match VersionCCCommand::try_from(expect_command()?)? {
                VersionCCCommand::Get => parse_cc!(VersionCCGet),
                VersionCCCommand::Report => parse_cc!(VersionCCReport),
                VersionCCCommand::CommandClassGet => parse_cc!(VersionCCCommandClassGet),
                VersionCCCommand::CommandClassReport => parse_cc!(VersionCCCommandClassReport),
            },

            CommandClasses::ManufacturerSpecific => {
                match ManufacturerSpecificCCCommand::try_from(expect_command()?)? {
                    ManufacturerSpecificCCCommand::Get => parse_cc!(ManufacturerSpecificCCGet),
                    ManufacturerSpecificCCCommand::Report => {
                        parse_cc!(ManufacturerSpecificCCReport)
                    }
                }
            }

            CommandClasses::WakeUp => match WakeUpCCCommand::try_from(expect_command()?)? {
                WakeUpCCCommand::IntervalSet => parse_cc!(WakeUpCCIntervalSet),
                WakeUpCCCommand::IntervalGet => parse_cc!(WakeUpCCIntervalGet),
                WakeUpCCCommand::IntervalReport => parse_cc!(WakeUpCCIntervalReport),
                WakeUpCCCommand::Notification => parse_cc!(WakeUpCCNotification),
                WakeUpCCCommand::NoMoreInformation => parse_cc!(WakeUpCCNoMoreInformation),
            },

            CommandClasses::MultiChannel => {
                match MultiChannelCCCommand::try_from(expect_command()?)? {
                    MultiChannelCCCommand::EndPointGet => parse_cc!(MultiChannelCCEndPointGet),
                    MultiChannelCCCommand::EndPointReport => {
                        parse_cc!(MultiChannelCCEndPointReport)
                    }
                    MultiChannelCCCommand::CapabilityGet => parse_cc!(MultiChannelCCCapabilityGet),
                    MultiChannelCCCommand::CapabilityReport => {
                        parse_cc!(MultiChannelCCCapabilityReport)
                    }
                    MultiChannelCCCommand::CommandEncapsulation => {
                        parse_cc!(MultiChannelCCCommandEncapsulation)
                    }
                }
            }

            CommandClasses::Supervision => {
                match SupervisionCCCommand::try_from(expect_command()?)? {
                    SupervisionCCCommand::Get => parse_cc!(SupervisionCCGet),
                    SupervisionCCCommand::Report => parse_cc!(SupervisionCCReport),
                }
            }

            CommandClasses::CRC16Encapsulation => {
                match Crc16CCCommand::try_from(expect_command()?)? {
                    Crc16CCCommand::CommandEncapsulation => {
                        parse_cc!(Crc16CCCommandEncapsulation)
                    }
                }
            }

            CommandClasses::Security => match SecurityCCCommand::try_from(expect_command()?)? {
                SecurityCCCommand::NonceGet => parse_cc!(SecurityCCNonceGet),
                SecurityCCCommand::NonceReport => parse_cc!(SecurityCCNonceReport),
                SecurityCCCommand::CommandEncapsulation => {
                    parse_cc!(SecurityCCCommandEncapsulation)
                }
            },

            CommandClasses::Security2 => match Security2CCCommand::try_from(expect_command()?)? {
                Security2CCCommand::NonceGet => parse_cc!(Security2CCNonceGet),
                Security2CCCommand::NonceReport => parse_cc!(Security2CCNonceReport),
                Security2CCCommand::MessageEncapsulation => {
                    parse_cc!(Security2CCMessageEncapsulation)
                }
            },

            CommandClasses::TransportService => {
                match TransportServiceCCCommand::try_from(expect_command()?)? {
                    TransportServiceCCCommand::FirstSegment => {
                        parse_cc!(TransportServiceCCFirstSegment)
                    }
                    TransportServiceCCCommand::SubsequentSegment => {
                        parse_cc!(TransportServiceCCSubsequentSegment)
                    }
                    TransportServiceCCCommand::SegmentComplete => {
                        parse_cc!(TransportServiceCCSegmentComplete)
                    }
                    TransportServiceCCCommand::SegmentRequest => {
                        parse_cc!(TransportServiceCCSegmentRequest)
                    }
                    TransportServiceCCCommand::SegmentWait => {
                        parse_cc!(TransportServiceCCSegmentWait)
                    }
                }
            }

            other => Err(ParseError::validation_failure(format!(
                "CC {:?} is not implemented",
                other
            ))),
        }
    }

    /// Walks through the encapsulation stack and returns the innermost CC
    /// together with the CCs that wrapped it, outermost first
    pub fn unwrap_encapsulated(&self) -> (&CC, Vec<CommandClasses>) {
        let mut stack = Vec::new();
        let mut current = self;
        loop {
            let inner = match current {
                CC::Crc16CCCommandEncapsulation(cc) => &cc.encapsulated,
                CC::MultiChannelCCCommandEncapsulation(cc) => &cc.encapsulated,
                CC::SupervisionCCGet(cc) => &cc.encapsulated,
                CC::SecurityCCCommandEncapsulation(cc) => &cc.encapsulated,
                CC::Security2CCMessageEncapsulation(cc) => &cc.encapsulated,
                _ => return (current, stack),
            };
            stack.push(current.cc_id());
            current = inner;
        }
    }
}
