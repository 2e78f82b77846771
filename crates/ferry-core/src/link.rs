//! Contacts between hosts and transfer outcomes

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::identity::NodeId;

/// Identifier of a contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkId(pub u64);

impl Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// A contact between two hosts
///
/// Links are undirected: either endpoint may send over them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub a: NodeId,
    pub b: NodeId,
    up: bool,
}

impl Link {
    /// Create a link in the up state
    pub fn new(id: LinkId, a: NodeId, b: NodeId) -> Self {
        Self { id, a, b, up: true }
    }

    pub fn is_up(&self) -> bool {
        self.up
    }

    pub fn set_up(&mut self, up: bool) {
        self.up = up;
    }

    /// The endpoint that is not `node`, if `node` is on this link
    pub fn other_endpoint(&self, node: NodeId) -> Option<NodeId> {
        if node == self.a {
            Some(self.b)
        } else if node == self.b {
            Some(self.a)
        } else {
            None
        }
    }

    pub fn connects(&self, node: NodeId) -> bool {
        node == self.a || node == self.b
    }
}

/// Why a receiver refused a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DenyReason {
    /// Already delivered to (or tombstoned at) the receiver
    Delivered,
    /// The receiver already holds a copy
    Old,
    /// Larger than the receiver's whole buffer
    NoSpace,
    /// The message expired before the transfer could start
    Expired,
}

impl DenyReason {
    /// The receiver has, or had, this message
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Delivered | Self::Old)
    }
}

impl Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Delivered => write!(f, "already delivered"),
            Self::Old => write!(f, "already held"),
            Self::NoSpace => write!(f, "no space"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// Outcome of asking the link layer to start a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// Transfer is in flight; completion or abort is reported later
    Started,
    /// The link cannot take a transfer right now
    Busy,
    /// The receiver refused the message
    Denied(DenyReason),
}

impl TransferStatus {
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started)
    }

    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Self::Denied(reason) => Some(*reason),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_other_endpoint() {
        let link = Link::new(LinkId(1), NodeId(0), NodeId(1));
        assert_eq!(link.other_endpoint(NodeId(0)), Some(NodeId(1)));
        assert_eq!(link.other_endpoint(NodeId(1)), Some(NodeId(0)));
        assert_eq!(link.other_endpoint(NodeId(5)), None);
        assert!(link.connects(NodeId(1)));
    }

    #[test]
    fn test_link_state() {
        let mut link = Link::new(LinkId(2), NodeId(3), NodeId(4));
        assert!(link.is_up());
        link.set_up(false);
        assert!(!link.is_up());
    }

    #[test]
    fn test_transfer_status() {
        assert!(TransferStatus::Started.is_started());
        assert_eq!(TransferStatus::Busy.deny_reason(), None);
        let denied = TransferStatus::Denied(DenyReason::Old);
        assert_eq!(denied.deny_reason(), Some(DenyReason::Old));
        assert!(DenyReason::Delivered.is_duplicate());
        assert!(!DenyReason::NoSpace.is_duplicate());
    }
}
