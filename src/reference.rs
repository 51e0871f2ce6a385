//! Stable handles into the circuit arenas.
//!
//! Handles are plain indices. A handle stays valid for as long as the slot it
//! points to is occupied; slots are never reused, so a stale handle can be
//! detected (the slot is empty) but never aliases a different node.

use std::fmt::{self, Display};

/// Handle to a terminal or decision node.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw value.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns the index for arena access.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl From<usize> for NodeId {
    fn from(index: usize) -> Self {
        Self(index as u32)
    }
}

impl From<NodeId> for usize {
    fn from(id: NodeId) -> Self {
        id.index()
    }
}

/// Handle to an AND-element.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ElementId(u32);

impl ElementId {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

impl From<usize> for ElementId {
    fn from(index: usize) -> Self {
        Self(index as u32)
    }
}

impl From<ElementId> for usize {
    fn from(id: ElementId) -> Self {
        id.index()
    }
}
