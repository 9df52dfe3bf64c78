use crate::interview::InterviewStage;
use zwh_core::prelude::*;

/// The event stream handed to applications. Value events carry only the id
/// and the previous/new value.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    /// The driver finished its startup sequence
    Ready,
    NodeAdded {
        node_id: NodeId,
    },
    NodeRemoved {
        node_id: NodeId,
    },
    InterviewStageChanged {
        node_id: NodeId,
        stage: InterviewStage,
    },
    /// The node failed its interview too often and will not be retried
    NodeDead {
        node_id: NodeId,
    },
    NodeAwake {
        node_id: NodeId,
    },
    NodeAsleep {
        node_id: NodeId,
    },
    ValueAdded {
        value_id: EndpointValueId,
        value: CacheValue,
    },
    ValueUpdated {
        value_id: EndpointValueId,
        prev_value: CacheValue,
        value: CacheValue,
    },
    ValueRemoved {
        value_id: EndpointValueId,
        prev_value: CacheValue,
    },
    /// A stateless, event-like value (e.g. a notification)
    ValueNotification {
        value_id: EndpointValueId,
        value: CacheValue,
    },
    MetadataUpdated {
        value_id: EndpointValueId,
        metadata: ValueMetadata,
    },
    /// A fatal driver error; the driver has stopped
    Error {
        message: String,
    },
}
