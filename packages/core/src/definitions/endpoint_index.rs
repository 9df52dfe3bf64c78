use std::fmt::Display;

/// Addresses a sub-device of a node. Index 0 is the root device itself.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EndpointIndex {
    #[default]
    Root,
    Endpoint(u8),
}

impl EndpointIndex {
    pub fn new(index: u8) -> Self {
        match index {
            0 => Self::Root,
            _ => Self::Endpoint(index),
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, Self::Root)
    }
}

impl From<EndpointIndex> for u8 {
    fn from(val: EndpointIndex) -> Self {
        match val {
            EndpointIndex::Root => 0,
            EndpointIndex::Endpoint(index) => index,
        }
    }
}

impl From<u8> for EndpointIndex {
    fn from(val: u8) -> Self {
        Self::new(val)
    }
}

impl Display for EndpointIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Root => write!(f, "root"),
            Self::Endpoint(index) => write!(f, "{}", index),
        }
    }
}
