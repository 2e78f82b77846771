//! Contact history and the policy that turns it into social ties

use std::fmt;
use std::str::FromStr;

use ferry_core::{ConfigError, SimTime};

/// Accumulated contact history with one peer
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InteractionRecord {
    /// Sum of all completed contact durations, in seconds
    pub total_duration: f64,
    /// Number of completed contacts
    pub frequency: u32,
    /// Start of the most recent completed contact
    pub last_contact_start: Option<SimTime>,
}

impl InteractionRecord {
    /// Fold in a finished contact
    pub fn record_contact(&mut self, start: SimTime, end: SimTime) {
        self.total_duration += end.since(start);
        self.frequency += 1;
        self.last_contact_start = Some(start);
    }
}

/// When accumulated contact makes two hosts social neighbors
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdgePolicy {
    /// Total contact time reaches the threshold
    Duration { min: f64 },
    /// Number of contacts reaches the threshold
    Frequency { min: u32 },
    /// Either threshold is reached
    Either { duration: f64, frequency: u32 },
    /// Both thresholds are reached
    Both { duration: f64, frequency: u32 },
}

impl Default for EdgePolicy {
    fn default() -> Self {
        Self::Duration { min: 30.0 }
    }
}

impl EdgePolicy {
    pub fn is_met(&self, record: &InteractionRecord) -> bool {
        match *self {
            Self::Duration { min } => record.total_duration >= min,
            Self::Frequency { min } => record.frequency >= min,
            Self::Either {
                duration,
                frequency,
            } => record.total_duration >= duration || record.frequency >= frequency,
            Self::Both {
                duration,
                frequency,
            } => record.total_duration >= duration && record.frequency >= frequency,
        }
    }

    /// Build a policy of the given kind from both thresholds
    pub fn from_kind(kind: EdgePolicyKind, duration: f64, frequency: u32) -> Self {
        match kind {
            EdgePolicyKind::Duration => Self::Duration { min: duration },
            EdgePolicyKind::Frequency => Self::Frequency { min: frequency },
            EdgePolicyKind::Either => Self::Either {
                duration,
                frequency,
            },
            EdgePolicyKind::Both => Self::Both {
                duration,
                frequency,
            },
        }
    }
}

/// Name of an [`EdgePolicy`] as written in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgePolicyKind {
    Duration,
    Frequency,
    Either,
    Both,
}

impl fmt::Display for EdgePolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Duration => "duration",
            Self::Frequency => "frequency",
            Self::Either => "either",
            Self::Both => "both",
        };
        f.write_str(name)
    }
}

impl FromStr for EdgePolicyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "duration" => Ok(Self::Duration),
            "frequency" => Ok(Self::Frequency),
            "either" | "any" => Ok(Self::Either),
            "both" | "all" => Ok(Self::Both),
            _ => Err(ConfigError::UnknownEdgePolicy(s.to_string())),
        }
    }
}
