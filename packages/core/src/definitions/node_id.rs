use crate::parse::{ParseResult, bytes::be_u8};
use crate::serialize::{self, Serializable};
use ::bytes::{Bytes, BytesMut};
use std::fmt::{Debug, Display};

/// The highest node id a classic Z-Wave network can assign. Some controller
/// firmwares report ids above this; they are accepted but flagged, see
/// [NodeId::is_extended].
pub const MAX_STANDARD_NODE_ID: u8 = 232;

#[derive(Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u8);

pub const NODE_ID_UNSPECIFIED: NodeId = NodeId(0);
pub const NODE_ID_BROADCAST: NodeId = NodeId(0xff);

impl NodeId {
    pub fn new(id: u8) -> Self {
        Self(id)
    }

    pub fn broadcast() -> Self {
        NODE_ID_BROADCAST
    }

    pub fn unspecified() -> Self {
        NODE_ID_UNSPECIFIED
    }

    /// Whether this id lies outside the classic 1..=232 range
    pub fn is_extended(&self) -> bool {
        self.0 > MAX_STANDARD_NODE_ID && *self != NODE_ID_BROADCAST
    }
}

impl Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:0>3}", self.0)
    }
}

impl From<u8> for NodeId {
    fn from(val: u8) -> Self {
        Self(val)
    }
}

impl From<NodeId> for u8 {
    fn from(val: NodeId) -> Self {
        val.0
    }
}

impl PartialEq<u8> for NodeId {
    fn eq(&self, other: &u8) -> bool {
        self.0 == *other
    }
}

impl crate::parse::Parsable for NodeId {
    fn parse(i: &mut Bytes) -> ParseResult<Self> {
        Ok(Self(be_u8(i)?))
    }
}

impl Serializable for NodeId {
    fn serialize(&self, output: &mut BytesMut) {
        serialize::bytes::be_u8(self.0).serialize(output);
    }
}
