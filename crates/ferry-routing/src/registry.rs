//! Static engine registry
//!
//! Configuration names an engine by string; the registry maps that string to
//! a constructor. All names are fixed at startup, and a section can be
//! validated by running its constructor before any host is built.

use ferry_core::{ConfigError, ConfigResult};
use tracing::debug;

use crate::community::{CommunityConfig, CommunityEngine};
use crate::config::EngineSection;
use crate::engine::Engine;
use crate::epidemic::EpidemicEngine;
use crate::prophet::{ProphetConfig, ProphetEngine};
use crate::social::{SocialRankConfig, SocialRankEngine};
use crate::spray::{SprayAndFocusEngine, SprayAndWaitEngine, SprayConfig};

/// Builds an engine from its configuration section
pub type EngineConstructor = fn(&EngineSection) -> ConfigResult<Engine>;

/// One registered engine
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub summary: &'static str,
    pub build: EngineConstructor,
}

impl RegistryEntry {
    fn matches(&self, name: &str) -> bool {
        let wanted = normalize(name);
        normalize(self.name) == wanted || self.aliases.iter().any(|a| normalize(a) == wanted)
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace('_', "-")
}

/// Name → constructor table
#[derive(Debug, Clone, Default)]
pub struct EngineRegistry {
    entries: Vec<RegistryEntry>,
}

impl EngineRegistry {
    /// A registry with nothing in it
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry holding every built-in engine
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        let builtins = [
            RegistryEntry {
                name: "epidemic",
                aliases: &["EpidemicEngine"],
                summary: "flood every peer that lacks the message",
                build: |_| Ok(EpidemicEngine::new().into()),
            },
            RegistryEntry {
                name: "prophet",
                aliases: &["PredictabilityEngine"],
                summary: "forward along rising delivery predictability",
                build: |s| Ok(ProphetEngine::new(ProphetConfig::from_section(s)?).into()),
            },
            RegistryEntry {
                name: "spray-and-wait",
                aliases: &["SprayAndWait"],
                summary: "spread a fixed number of copies, then wait",
                build: |s| Ok(SprayAndWaitEngine::new(SprayConfig::from_section(s)?).into()),
            },
            RegistryEntry {
                name: "spray-and-focus",
                aliases: &["SprayAndFocus"],
                summary: "spread copies, then follow fresher encounters",
                build: |s| Ok(SprayAndFocusEngine::new(SprayConfig::from_section(s)?).into()),
            },
            RegistryEntry {
                name: "social-rank",
                aliases: &["SocialRankEngine", "PeopleRank"],
                summary: "climb the social rank gradient",
                build: |s| Ok(SocialRankEngine::new(SocialRankConfig::from_section(s)?).into()),
            },
            RegistryEntry {
                name: "bubble-rap",
                aliases: &["BubbleRap", "CommunityEngine"],
                summary: "bubble through centrality into the destination community",
                build: |s| Ok(CommunityEngine::new(CommunityConfig::from_section(s)?).into()),
            },
        ];
        for entry in builtins {
            registry.entries.push(entry);
        }
        registry
    }

    /// Add an engine. Names and aliases must not collide with existing ones.
    pub fn register(&mut self, entry: RegistryEntry) -> ConfigResult<()> {
        let taken = std::iter::once(entry.name)
            .chain(entry.aliases.iter().copied())
            .find(|name| self.lookup(name).is_some());
        if let Some(name) = taken {
            return Err(ConfigError::invalid("engine", format!("{name} is already registered")));
        }
        self.entries.push(entry);
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.iter().find(|e| e.matches(name))
    }

    /// Canonical name for `name` or one of its aliases
    pub fn resolve(&self, name: &str) -> ConfigResult<&'static str> {
        self.lookup(name)
            .map(|e| e.name)
            .ok_or_else(|| ConfigError::UnknownEngine(name.to_string()))
    }

    /// Construct the engine a section names
    pub fn build(&self, section: &EngineSection) -> ConfigResult<Engine> {
        let entry = self
            .lookup(&section.engine)
            .ok_or_else(|| ConfigError::UnknownEngine(section.engine.clone()))?;
        let engine = (entry.build)(section)?;
        debug!(engine = entry.name, "engine constructed");
        Ok(engine)
    }

    /// Check a section eagerly by constructing and discarding its engine
    pub fn validate(&self, section: &EngineSection) -> ConfigResult<()> {
        self.build(section).map(drop)
    }

    /// Canonical names, in registration order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.name)
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }
}
