use super::EndpointStorage;
use crate::interview::InterviewStage;
use std::collections::BTreeMap;
use zwh_core::prelude::*;

/// Everything the driver tracks about one node. Kept in an arena keyed by
/// node id; anything referencing a node does so by id.
#[derive(Debug, Clone)]
pub struct NodeStorage {
    pub node_id: NodeId,
    pub protocol_data: Option<NodeProtocolData>,
    pub interview_stage: InterviewStage,
    /// Failed interview attempts across sessions
    pub interview_attempts: u8,
    pub security_class: SecurityClass,
    /// Only meaningful for non-listening nodes: whether the node is
    /// currently in its wake-up window
    pub awake: bool,
    /// Set when the interview gave up on this node
    pub dead: bool,
    endpoints: BTreeMap<EndpointIndex, EndpointStorage>,
}

impl NodeStorage {
    pub fn new(node_id: NodeId) -> Self {
        let mut endpoints = BTreeMap::new();
        endpoints.insert(EndpointIndex::Root, EndpointStorage::default());
        Self {
            node_id,
            protocol_data: None,
            interview_stage: InterviewStage::None,
            interview_attempts: 0,
            security_class: SecurityClass::None,
            awake: false,
            dead: false,
            endpoints,
        }
    }

    /// Whether the node is always-on or frequent listening. Unknown nodes
    /// count as listening until the protocol info says otherwise.
    pub fn is_listening(&self) -> bool {
        self.protocol_data.map(|d| !d.is_sleeping()).unwrap_or(true)
    }

    /// Whether commands to this node must wait for a wake-up notification
    pub fn is_asleep(&self) -> bool {
        !self.is_listening() && !self.awake
    }

    pub fn is_secure(&self) -> bool {
        self.security_class != SecurityClass::None
    }

    pub fn endpoint(&self, index: EndpointIndex) -> Option<&EndpointStorage> {
        self.endpoints.get(&index)
    }

    pub fn endpoint_mut(&mut self, index: EndpointIndex) -> &mut EndpointStorage {
        self.endpoints.entry(index).or_default()
    }

    pub fn root(&self) -> &EndpointStorage {
        self.endpoints
            .get(&EndpointIndex::Root)
            .expect("the root endpoint always exists")
    }

    pub fn root_mut(&mut self) -> &mut EndpointStorage {
        self.endpoint_mut(EndpointIndex::Root)
    }

    pub fn endpoint_indices(&self) -> Vec<EndpointIndex> {
        self.endpoints.keys().copied().collect()
    }

    pub fn supports_cc(&self, cc: CommandClasses) -> bool {
        self.root().supports_cc(cc)
    }
}
