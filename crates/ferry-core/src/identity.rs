//! Host identities
//!
//! Simulated hosts are addressed by a small integer handle. The handle is
//! also the host's index in the simulation's host table.

use std::str::FromStr;

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Opaque handle to a simulated host
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display("n{_0}")]
pub struct NodeId(pub u32);

impl NodeId {
    /// Create a node id from its address
    pub const fn new(address: u32) -> Self {
        Self(address)
    }

    /// Generate ids `n0..n{count-1}`
    pub fn range(count: u32) -> Vec<Self> {
        (0..count).map(Self).collect()
    }

    /// The numeric address
    pub fn address(&self) -> u32 {
        self.0
    }

    /// Position in a host table
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl FromStr for NodeId {
    type Err = std::num::ParseIntError;

    /// Parse a host reference such as `3`, `n3` or `p3`.
    ///
    /// The trailing run of digits is the address, any alphabetic group
    /// prefix is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let prefix = s.trim_end_matches(|c: char| c.is_ascii_digit());
        s[prefix.len()..].parse().map(Self)
    }
}
