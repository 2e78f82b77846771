//! Messages carried through the network

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::identity::NodeId;
use crate::property::PropertyBag;
use crate::time::SimTime;

/// Unique identifier for a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "M{}", self.0)
    }
}

/// A message routed hop by hop towards its destination
///
/// Every host holds its own copy. The copy handed to a receiver is a clone
/// taken when the transfer starts, so per-copy state (receive time, hop
/// list, properties) diverges from that point on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub source: NodeId,
    pub destination: NodeId,
    /// Size in bytes
    pub size: u64,
    /// Time to live in seconds, counted from `created_at`
    pub ttl: f64,
    pub created_at: SimTime,
    /// When this copy arrived at its current holder
    pub received_at: SimTime,
    /// Hosts visited so far, source first
    pub hops: Vec<NodeId>,
    pub properties: PropertyBag,
}

impl Message {
    /// Create a message at its source
    pub fn new(
        id: MessageId,
        source: NodeId,
        destination: NodeId,
        size: u64,
        ttl: f64,
        now: SimTime,
    ) -> Self {
        Self {
            id,
            source,
            destination,
            size,
            ttl,
            created_at: now,
            received_at: now,
            hops: vec![source],
            properties: PropertyBag::new(),
        }
    }

    /// Set the time to live
    pub fn with_ttl(mut self, ttl: f64) -> Self {
        self.ttl = ttl;
        self
    }

    /// Absolute expiry time
    pub fn expires_at(&self) -> SimTime {
        self.created_at + self.ttl
    }

    /// Seconds left before expiry (negative once expired)
    pub fn remaining_ttl(&self, now: SimTime) -> f64 {
        self.expires_at().as_secs() - now.as_secs()
    }

    pub fn is_expired(&self, now: SimTime) -> bool {
        self.remaining_ttl(now) <= 0.0
    }

    /// Record arrival at `host`
    pub fn arrive(&mut self, host: NodeId, now: SimTime) {
        self.hops.push(host);
        self.received_at = now;
    }

    pub fn was_visited(&self, host: NodeId) -> bool {
        self.hops.contains(&host)
    }

    /// Number of hops travelled
    pub fn hop_count(&self) -> usize {
        self.hops.len().saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_message() -> Message {
        Message::new(
            MessageId(1),
            NodeId(0),
            NodeId(2),
            500,
            300.0,
            SimTime::from_secs(10.0),
        )
    }

    #[test]
    fn test_new_message() {
        let msg = make_message();
        assert_eq!(msg.hops, vec![NodeId(0)]);
        assert_eq!(msg.hop_count(), 0);
        assert_eq!(msg.received_at, msg.created_at);
        assert_eq!(msg.id.to_string(), "M1");
    }

    #[test]
    fn test_expiry() {
        let msg = make_message();
        assert_eq!(msg.expires_at(), SimTime::from_secs(310.0));
        assert!(!msg.is_expired(SimTime::from_secs(309.0)));
        assert!(msg.is_expired(SimTime::from_secs(310.0)));
        assert_eq!(msg.remaining_ttl(SimTime::from_secs(110.0)), 200.0);
    }

    #[test]
    fn test_arrive_records_hop() {
        let mut msg = make_message();
        msg.arrive(NodeId(1), SimTime::from_secs(15.0));
        assert_eq!(msg.hop_count(), 1);
        assert!(msg.was_visited(NodeId(1)));
        assert!(!msg.was_visited(NodeId(2)));
        assert_eq!(msg.received_at, SimTime::from_secs(15.0));
    }
}
