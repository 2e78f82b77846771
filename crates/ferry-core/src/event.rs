//! Router events
//!
//! Routers report what happened to messages through an [`EventSink`].
//! Statistics and reports consume these; routing never reads them back.

use serde::{Deserialize, Serialize};

use crate::identity::NodeId;
use crate::link::LinkId;
use crate::message::MessageId;
use crate::time::SimTime;

/// Events emitted by a host's router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RouterEvent {
    /// A message was accepted at its source
    MessageCreated {
        id: MessageId,
        at: NodeId,
        time: SimTime,
    },

    /// A transfer was handed to the link layer
    TransferStarted {
        id: MessageId,
        from: NodeId,
        to: NodeId,
        link: LinkId,
        time: SimTime,
    },

    /// A relay (non-destination) stored a received copy
    MessageRelayed {
        id: MessageId,
        from: NodeId,
        to: NodeId,
        time: SimTime,
    },

    /// First arrival of a message at its destination
    MessageDelivered {
        id: MessageId,
        from: NodeId,
        to: NodeId,
        hops: usize,
        latency: f64,
        time: SimTime,
    },

    /// A message was dropped without being forwarded
    MessageDropped {
        id: MessageId,
        at: NodeId,
        reason: DropReason,
        time: SimTime,
    },

    /// A message was removed by routing policy after being sent or refused
    MessageDeleted {
        id: MessageId,
        at: NodeId,
        time: SimTime,
    },

    /// An in-flight transfer was cut off
    TransferAborted {
        id: MessageId,
        from: NodeId,
        to: NodeId,
        time: SimTime,
    },
}

impl RouterEvent {
    /// Get the timestamp of this event
    pub fn time(&self) -> SimTime {
        match self {
            Self::MessageCreated { time, .. } => *time,
            Self::TransferStarted { time, .. } => *time,
            Self::MessageRelayed { time, .. } => *time,
            Self::MessageDelivered { time, .. } => *time,
            Self::MessageDropped { time, .. } => *time,
            Self::MessageDeleted { time, .. } => *time,
            Self::TransferAborted { time, .. } => *time,
        }
    }

    /// The message this event is about
    pub fn message(&self) -> MessageId {
        match self {
            Self::MessageCreated { id, .. }
            | Self::TransferStarted { id, .. }
            | Self::MessageRelayed { id, .. }
            | Self::MessageDelivered { id, .. }
            | Self::MessageDropped { id, .. }
            | Self::MessageDeleted { id, .. }
            | Self::TransferAborted { id, .. } => *id,
        }
    }

    /// Create a dropped event
    pub fn dropped(id: MessageId, at: NodeId, reason: DropReason, time: SimTime) -> Self {
        Self::MessageDropped {
            id,
            at,
            reason,
            time,
        }
    }
}

/// Reasons a message might be dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DropReason {
    /// TTL ran out while buffered
    Expired,
    /// Evicted to make room for another message
    Evicted,
    /// No room could be made for an arriving message
    BufferFull,
    /// Dropped after learning the message was delivered elsewhere
    Tombstoned,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Expired => write!(f, "TTL expired"),
            Self::Evicted => write!(f, "Evicted"),
            Self::BufferFull => write!(f, "Buffer full"),
            Self::Tombstoned => write!(f, "Tombstoned"),
        }
    }
}

/// Consumer of router events
pub trait EventSink {
    fn record(&mut self, event: RouterEvent);
}

impl EventSink for Vec<RouterEvent> {
    fn record(&mut self, event: RouterEvent) {
        self.push(event);
    }
}

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&mut self, _event: RouterEvent) {}
}
