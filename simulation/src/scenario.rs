//! Scenario files and the trace-driven run loop
//!
//! A scenario is a JSON document naming the host count, link timing, the
//! router section and a trace of contacts and message creations:
//!
//! ```json
//! {
//!   "hosts": 20,
//!   "transmitSpeed": 250000,
//!   "tickInterval": 1.0,
//!   "endTime": 43200,
//!   "messageTtl": 18000,
//!   "router": { "engine": "prophet", "forwardingStrategy": "GRTRMax" },
//!   "forwarding": { "capacity": 5000000 },
//!   "trace": "contacts.txt"
//! }
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use ferry_core::{EventSink, NodeId, SimTime};
use ferry_routing::{
    DecisionEngine, Engine, EngineRegistry, EngineSection, ForwardingConfig, ForwardingEngine,
    HostTable,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::network::{Network, NetworkConfig};
use crate::stats::SimStats;
use crate::trace::{self, TraceEvent};

/// Default message time to live, in seconds
pub const DEFAULT_MESSAGE_TTL: f64 = 18_000.0;

/// Scenario file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioConfig {
    pub hosts: u32,
    /// Bytes per second
    #[serde(default = "default_transmit_speed")]
    pub transmit_speed: f64,
    #[serde(default = "default_tick_interval")]
    pub tick_interval: f64,
    pub end_time: f64,
    #[serde(default = "default_message_ttl")]
    pub message_ttl: f64,
    pub router: EngineSection,
    #[serde(default)]
    pub forwarding: ForwardingConfig,
    /// Trace file, relative to the scenario file
    pub trace: PathBuf,
}

fn default_transmit_speed() -> f64 {
    NetworkConfig::default().transmit_speed
}

fn default_tick_interval() -> f64 {
    NetworkConfig::default().tick_interval
}

fn default_message_ttl() -> f64 {
    DEFAULT_MESSAGE_TTL
}

impl ScenarioConfig {
    /// Read a scenario, resolving its trace path against the file's directory
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        let mut config: Self = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse scenario {}", path.display()))?;
        if config.trace.is_relative()
            && let Some(dir) = path.parent()
        {
            config.trace = dir.join(&config.trace);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.hosts == 0 {
            bail!("hosts must be at least 1");
        }
        for (key, value) in [
            ("transmitSpeed", self.transmit_speed),
            ("tickInterval", self.tick_interval),
            ("messageTtl", self.message_ttl),
        ] {
            if !(value.is_finite() && value > 0.0) {
                bail!("{key} must be positive, got {value}");
            }
        }
        if !(self.end_time.is_finite() && self.end_time >= 0.0) {
            bail!("endTime must be a non-negative number");
        }
        for warning in self.forwarding.validate() {
            warn!(%warning, "forwarding configuration");
        }
        Ok(())
    }

    pub fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            transmit_speed: self.transmit_speed,
            tick_interval: self.tick_interval,
        }
    }

    /// Build the engine, read the trace and run to `end_time`
    pub fn run(&self, registry: &EngineRegistry) -> anyhow::Result<SimStats> {
        let engine = registry
            .build(&self.router)
            .context("invalid router section")?;
        let events = trace::read(&self.trace)
            .with_context(|| format!("failed to load trace {}", self.trace.display()))?;
        let mut network = self.network(engine);
        let mut stats = SimStats::new();
        replay(&mut network, &events, self.message_ttl, SimTime::from_secs(self.end_time), &mut stats)?;
        Ok(stats)
    }

    /// One host per id, each a replica of a prototype running `engine`
    pub fn network(&self, engine: Engine) -> Network<Engine> {
        let prototype = ForwardingEngine::new(NodeId(0), engine, self.forwarding.clone());
        Network::new(
            HostTable::replicated(&prototype, self.hosts),
            self.network_config(),
        )
    }
}

/// Feed `events` into `network` in order, then advance to `end`
pub fn replay<E, S>(
    network: &mut Network<E>,
    events: &[TraceEvent],
    message_ttl: f64,
    end: SimTime,
    sink: &mut S,
) -> anyhow::Result<()>
where
    E: DecisionEngine,
    S: EventSink,
{
    let started = std::time::Instant::now();
    for event in events {
        if event.time() > end {
            break;
        }
        network.advance_to(event.time(), sink)?;
        match *event {
            TraceEvent::Connection { a, b, up: true, .. } => {
                network
                    .link_up(a, b)
                    .with_context(|| format!("link {a} {b} up"))?;
            }
            TraceEvent::Connection { a, b, up: false, .. } => network.link_down(a, b, sink)?,
            TraceEvent::Create {
                id, from, to, size, ..
            } => {
                network
                    .create_message(id, from, to, size, message_ttl, sink)
                    .with_context(|| format!("create {id} at {from}"))?;
            }
        }
    }
    network.advance_to(end, sink)?;
    info!(
        events = events.len(),
        end = %end,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "run complete"
    );
    Ok(())
}

/// Random contact and message trace for quick demos
///
/// Every `contact_gap` seconds a random host pair meets for 10 to 120
/// seconds, and every `message_gap` seconds a random host creates a message
/// for another.
#[derive(Debug, Clone)]
pub struct RandomTrace {
    pub hosts: u32,
    pub duration: f64,
    pub contact_gap: f64,
    pub message_gap: f64,
    pub message_size: u64,
    pub seed: u64,
}

impl Default for RandomTrace {
    fn default() -> Self {
        Self {
            hosts: 20,
            duration: 3600.0,
            contact_gap: 5.0,
            message_gap: 30.0,
            message_size: 10_000,
            seed: 0,
        }
    }
}

impl RandomTrace {
    pub fn generate(&self) -> Vec<TraceEvent> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut events = Vec::new();
        if self.hosts < 2 {
            return events;
        }

        let mut t = 0.0;
        while t < self.duration {
            let (a, b) = self.pair(&mut rng);
            let length = rng.random_range(10.0..120.0);
            events.push(TraceEvent::Connection {
                time: SimTime::from_secs(t),
                a,
                b,
                up: true,
            });
            events.push(TraceEvent::Connection {
                time: SimTime::from_secs(t + length),
                a,
                b,
                up: false,
            });
            t += self.contact_gap;
        }

        let mut t = self.message_gap;
        let mut id = 1;
        while t < self.duration {
            let (from, to) = self.pair(&mut rng);
            events.push(TraceEvent::Create {
                time: SimTime::from_secs(t),
                id: ferry_core::MessageId(id),
                from,
                to,
                size: self.message_size,
            });
            id += 1;
            t += self.message_gap;
        }

        events.sort_by(|a, b| a.time().total_cmp(&b.time()));
        events
    }

    fn pair(&self, rng: &mut StdRng) -> (NodeId, NodeId) {
        let a = rng.random_range(0..self.hosts);
        let mut b = rng.random_range(0..self.hosts - 1);
        if b >= a {
            b += 1;
        }
        (NodeId(a), NodeId(b))
    }
}
