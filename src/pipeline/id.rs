//! Identity types for the pipeline graph.
//!
//! `NodeId` is the node's position in `Pipeline::nodes` and the `id` written
//! to the descriptor. `LinkId` counts link creation, which fixes connection
//! order in the descriptor.

use super::port::PortRef;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Node handle; also its index into `Pipeline::nodes`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Name a port of this node, e.g. `cam.port("preview")`
    pub fn port(self, name: impl Into<String>) -> PortRef {
        PortRef::new(self, name)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Resolved port: node index in the high bits, port slot in the low 12.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(u32);

impl PortId {
    pub(crate) const SLOT_BITS: u32 = 12;
    const SLOT_MASK: u32 = (1 << Self::SLOT_BITS) - 1;

    pub(crate) fn new(node: NodeId, slot: u16) -> Self {
        debug_assert!(u32::from(slot) <= Self::SLOT_MASK);
        Self((node.0 << Self::SLOT_BITS) | (u32::from(slot) & Self::SLOT_MASK))
    }

    pub fn node(self) -> NodeId {
        NodeId(self.0 >> Self::SLOT_BITS)
    }

    /// Position of the port in its node's port list
    pub fn port_index(self) -> u16 {
        (self.0 & Self::SLOT_MASK) as u16
    }
}

impl fmt::Debug for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PortId({}:{})", self.node().0, self.port_index())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub u32);
