//! # Ferry Routing
//!
//! Decision-engine routing for delay-tolerant network simulation.
//!
//! Hosts meet in short, unpredictable contacts. At every contact each host's
//! [`ForwardingEngine`] asks its [`DecisionEngine`] which messages to hand
//! over, which to keep and which to drop, and keeps a live list of sending
//! opportunities for the transfer scheduler.
//!
//! ## Engines
//!
//! - [`EpidemicEngine`]: flood every peer that lacks a message
//! - [`ProphetEngine`]: PRoPHET delivery predictability with aging,
//!   transitivity, forwarding strategies and queueing policies
//! - [`SprayAndWaitEngine`] / [`SprayAndFocusEngine`]: bounded copy spraying
//! - [`SocialRankEngine`]: PeopleRank over a contact-derived social graph
//! - [`CommunityEngine`]: BubbleRap community and centrality forwarding
//!
//! Engines are picked by name through the [`EngineRegistry`] and wrapped in
//! [`Engine`] so mixed configurations share one host type.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ferry_routing::{EngineRegistry, EngineSection, ForwardingConfig, ForwardingEngine, HostTable};
//!
//! let section = EngineSection::new("prophet").with("forwardingStrategy", "GRTRMax");
//! let engine = EngineRegistry::builtin().build(&section)?;
//! let prototype = ForwardingEngine::new(NodeId(0), engine, ForwardingConfig::default());
//! let hosts = HostTable::replicated(&prototype, 50);
//! ```

pub mod community;
pub mod config;
pub mod decision;
pub mod directory;
pub mod engine;
pub mod epidemic;
pub mod eviction;
pub mod forwarding;
pub mod prophet;
pub mod registry;
pub mod social;
pub mod spray;

// Re-export main types
pub use community::{CommunityConfig, CommunityEngine};
pub use config::EngineSection;
pub use decision::{DecisionEngine, PeerMut, PeerRef};
pub use directory::{HostTable, OtherHosts};
pub use engine::{Engine, EngineVariant};
pub use epidemic::EpidemicEngine;
pub use eviction::{EvictionStats, NoStats, QueueingPolicy};
pub use forwarding::{
    ForwardCandidate, ForwardingEngine, LinkLayer, OutgoingTransfer, PeerDirectory,
};
pub use prophet::{ForwardingStrategy, PredictabilityTable, ProphetConfig, ProphetEngine};
pub use registry::{EngineConstructor, EngineRegistry, RegistryEntry};
pub use social::{EdgePolicy, SocialGraph, SocialRankConfig, SocialRankEngine};
pub use spray::{SprayAndFocusEngine, SprayAndWaitEngine, SprayConfig};

use serde::{Deserialize, Serialize};

/// Buffer size given to hosts unless configured otherwise, in bytes
pub const DEFAULT_BUFFER_SIZE: u64 = 5_000_000;

/// Per-host forwarding policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ForwardingConfig {
    /// Message buffer capacity in bytes
    pub capacity: u64,
    /// Remember ids reported delivered and refuse them for the rest of the run
    pub tombstones: bool,
    /// Consult the engine about dropping a message a peer reports as
    /// delivered or already held
    pub delete_delivered: bool,
    /// Let the destination keep its own copy
    pub keep_delivered: bool,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_BUFFER_SIZE,
            tombstones: false,
            delete_delivered: false,
            keep_delivered: false,
        }
    }
}

impl ForwardingConfig {
    /// Unbounded buffers and no delivery feedback
    ///
    /// Every copy lives until its TTL runs out.
    pub fn epidemic_like() -> Self {
        Self {
            capacity: u64::MAX,
            ..Self::default()
        }
    }

    /// Delivered ids are tombstoned and duplicates cleaned up
    pub fn tombstoning() -> Self {
        Self {
            tombstones: true,
            delete_delivered: true,
            ..Self::default()
        }
    }

    /// A small buffer that leans on eviction and delivery feedback
    pub fn constrained(capacity: u64) -> Self {
        Self {
            capacity,
            delete_delivered: true,
            ..Self::default()
        }
    }

    /// Check for settings that are legal but probably unintended
    ///
    /// An empty list means nothing looks off.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.capacity == 0 {
            warnings.push(ConfigWarning::ZeroCapacity);
        }

        if self.capacity == u64::MAX && self.delete_delivered {
            warnings.push(ConfigWarning::UnboundedBufferWithDeletion);
        }

        // Kept copies at the destination are refused back, never re-offered
        if self.keep_delivered && self.tombstones {
            warnings.push(ConfigWarning::KeepDeliveredWithTombstones);
        }

        warnings
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}

/// Forwarding configuration warnings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigWarning {
    /// The buffer cannot hold any message
    ZeroCapacity,
    /// Deletion on delivery feedback is enabled with an unbounded buffer
    UnboundedBufferWithDeletion,
    /// Destinations keep copies that tombstones make useless to forward
    KeepDeliveredWithTombstones,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::ZeroCapacity => write!(f, "capacity is zero"),
            ConfigWarning::UnboundedBufferWithDeletion => {
                write!(f, "delete_delivered set on an unbounded buffer")
            }
            ConfigWarning::KeepDeliveredWithTombstones => {
                write!(f, "keep_delivered has no effect on forwarding with tombstones")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ForwardingConfig::default();
        assert_eq!(config.capacity, DEFAULT_BUFFER_SIZE);
        assert!(!config.tombstones);
        assert!(!config.delete_delivered);
    }

    #[test]
    fn test_presets() {
        assert_eq!(ForwardingConfig::epidemic_like().capacity, u64::MAX);
        assert!(ForwardingConfig::tombstoning().tombstones);
        let constrained = ForwardingConfig::constrained(1000);
        assert_eq!(constrained.capacity, 1000);
        assert!(constrained.delete_delivered);
    }

    #[test]
    fn test_preset_configs_are_valid() {
        assert!(ForwardingConfig::default().is_valid());
        assert!(ForwardingConfig::epidemic_like().is_valid());
        assert!(ForwardingConfig::tombstoning().is_valid());
        assert!(ForwardingConfig::constrained(1000).is_valid());
    }

    #[test]
    fn test_warnings_detected() {
        let config = ForwardingConfig {
            capacity: 0,
            keep_delivered: true,
            ..ForwardingConfig::tombstoning()
        };
        let warnings = config.validate();
        assert!(warnings.contains(&ConfigWarning::ZeroCapacity));
        assert!(warnings.contains(&ConfigWarning::KeepDeliveredWithTombstones));
    }

    #[test]
    fn test_config_from_json() {
        let config: ForwardingConfig =
            serde_json::from_str(r#"{"capacity": 2048, "deleteDelivered": true}"#).unwrap();
        assert_eq!(config.capacity, 2048);
        assert!(config.delete_delivered);
        assert!(!config.tombstones);
    }
}
