//! Error types for Ferry

use thiserror::Error;

use crate::identity::NodeId;
use crate::link::LinkId;
use crate::message::MessageId;

/// Top-level error type for Ferry
#[derive(Debug, Error)]
pub enum FerryError {
    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Property error: {0}")]
    Property(#[from] PropertyError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised while routing
#[derive(Debug, Error)]
pub enum RoutingError {
    /// A peer runs a different decision engine than the one reading its state
    #[error("Engine mismatch: expected peer running {expected}, found {found}")]
    EngineMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Unknown peer: {0}")]
    UnknownPeer(NodeId),

    #[error("Unknown link: {0}")]
    UnknownLink(LinkId),

    /// No evictable message is left and the new one still does not fit
    #[error("Cannot make room: need {needed} bytes, {free} free")]
    EvictionExhausted { needed: u64, free: u64 },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Property error: {0}")]
    Property(#[from] PropertyError),
}

/// Errors related to the message buffer
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage capacity exceeded: need {needed} bytes, {free} free")]
    CapacityExceeded { needed: u64, free: u64 },

    #[error("Message already stored: {0}")]
    Duplicate(MessageId),
}

/// Errors related to message properties
#[derive(Debug, Error)]
pub enum PropertyError {
    #[error("Property already exists: {0}")]
    AlreadyExists(String),

    #[error("Property missing: {0}")]
    Missing(String),

    #[error("Property {key} has type {found}, expected {expected}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Errors in engine configuration, raised before a run starts
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown routing engine: {0}")]
    UnknownEngine(String),

    #[error("Unknown forwarding strategy: {0}")]
    UnknownForwardingStrategy(String),

    #[error("Unknown queueing policy: {0}")]
    UnknownQueueingPolicy(String),

    #[error("Unknown social edge policy: {0}")]
    UnknownEdgePolicy(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for routing operations
pub type RoutingResult<T> = Result<T, RoutingError>;

/// Result type alias for configuration
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type alias for Ferry operations
pub type FerryResult<T> = Result<T, FerryError>;
