//! PRoPHET (Probabilistic Routing Protocol using History of Encounters)
//!
//! PRoPHET uses encounter history to estimate delivery probabilities.
//! Nodes that are frequently encountered are more likely to be good
//! intermediaries for message delivery.
//!
//! Key concepts:
//! - **Delivery Predictability (P)**: Likelihood that this node meets a destination
//! - **Encounter Updates**: When two nodes meet, their mutual predictability rises
//! - **Transitivity**: If A meets B often and B meets C often, A is a fair route to C
//! - **Aging**: Predictabilities decay with simulated time between encounters
//!
//! The table is aged lazily: every read first decays the stored values to
//! the read time. Reads through `&self` (a peer looking at our table)
//! compute the aged value without storing it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use ferry_core::{
    ConfigError, ConfigResult, Message, MessageId, MessageStore, NodeId, RoutingResult, SimTime,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use crate::config::{EngineSection, ensure_positive, ensure_range};
use crate::decision::{DecisionEngine, PeerMut, PeerRef};
use crate::eviction::{EvictionStats, QueueingPolicy};

/// Predictability given to a peer on each encounter (P_init)
pub const P_INIT: f64 = 0.75;
/// Aging constant applied once per time unit (gamma)
pub const GAMMA: f64 = 0.98;
/// Transitivity scaling constant (beta)
pub const DEFAULT_BETA: f64 = 0.25;

/// How a host decides whether, and in what order, to hand messages to a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForwardingStrategy {
    /// Forward when the peer's predictability for the destination beats ours
    #[default]
    Grtr,
    /// As GRTR, highest predictability gain first
    GrtrSort,
    /// As GRTR, highest peer predictability first
    GrtrMax,
    /// Forward with probability one half
    Coin,
}

impl ForwardingStrategy {
    pub const ALL: [ForwardingStrategy; 4] = [Self::Grtr, Self::GrtrSort, Self::GrtrMax, Self::Coin];
}

impl fmt::Display for ForwardingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Grtr => "GRTR",
            Self::GrtrSort => "GRTRSort",
            Self::GrtrMax => "GRTRMax",
            Self::Coin => "COIN",
        };
        f.write_str(name)
    }
}

impl FromStr for ForwardingStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GRTR" => Ok(Self::Grtr),
            "GRTRSORT" => Ok(Self::GrtrSort),
            "GRTRMAX" => Ok(Self::GrtrMax),
            "COIN" => Ok(Self::Coin),
            _ => Err(ConfigError::UnknownForwardingStrategy(s.to_string())),
        }
    }
}

/// PRoPHET protocol configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ProphetConfig {
    /// Simulated seconds per aging step
    /// Default: 30
    pub seconds_in_time_unit: f64,

    /// Predictability gained per encounter (P_init)
    /// Default: 0.75
    pub initial_probability: f64,

    /// Decay per time unit (gamma)
    /// Default: 0.98
    pub aging_constant: f64,

    /// Transitivity scaling factor (beta)
    /// Default: 0.25
    pub beta: f64,

    /// Ceiling that keeps predictabilities strictly below one
    /// Default: 0.99
    pub max_probability: f64,

    /// Entries decayed below this are forgotten
    /// Default: 0.0001
    pub min_probability: f64,

    /// Default: GRTR
    pub forwarding_strategy: ForwardingStrategy,

    /// Default: FIFO_DROP
    pub queueing_policy: QueueingPolicy,

    /// Seed for the COIN strategy's generator
    pub seed: u64,
}

impl Default for ProphetConfig {
    fn default() -> Self {
        Self {
            seconds_in_time_unit: 30.0,
            initial_probability: P_INIT,
            aging_constant: GAMMA,
            beta: DEFAULT_BETA,
            max_probability: 0.99,
            min_probability: 0.0001,
            forwarding_strategy: ForwardingStrategy::default(),
            queueing_policy: QueueingPolicy::default(),
            seed: 0,
        }
    }
}

impl ProphetConfig {
    /// Read a configuration section, falling back to defaults per key
    pub fn from_section(section: &EngineSection) -> ConfigResult<Self> {
        let defaults = Self::default();
        let config = Self {
            seconds_in_time_unit: section
                .f64("secondsInTimeUnit")?
                .unwrap_or(defaults.seconds_in_time_unit),
            initial_probability: section
                .f64("initialProbability")?
                .unwrap_or(defaults.initial_probability),
            aging_constant: section
                .f64("agingConstant")?
                .unwrap_or(defaults.aging_constant),
            beta: section.f64("beta")?.unwrap_or(defaults.beta),
            max_probability: section
                .f64("maxProbability")?
                .unwrap_or(defaults.max_probability),
            min_probability: section
                .f64("minProbability")?
                .unwrap_or(defaults.min_probability),
            forwarding_strategy: section
                .parsed("forwardingStrategy")?
                .unwrap_or(defaults.forwarding_strategy),
            queueing_policy: section
                .parsed("queueingPolicy")?
                .unwrap_or(defaults.queueing_policy),
            seed: section.u64("seed")?.unwrap_or(defaults.seed),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        ensure_positive("secondsInTimeUnit", self.seconds_in_time_unit)?;
        ensure_range("initialProbability", self.initial_probability, 0.0, 1.0)?;
        ensure_range("agingConstant", self.aging_constant, 0.0, 1.0)?;
        ensure_range("beta", self.beta, 0.0, 1.0)?;
        ensure_range("maxProbability", self.max_probability, 0.0, 1.0)?;
        if self.max_probability >= 1.0 {
            return Err(ConfigError::invalid("maxProbability", "must be below 1"));
        }
        ensure_range("minProbability", self.min_probability, 0.0, self.max_probability)?;
        Ok(())
    }
}

/// Delivery predictabilities for one host, aged lazily
#[derive(Debug, Clone)]
pub struct PredictabilityTable {
    preds: BTreeMap<NodeId, f64>,
    last_aged: SimTime,
    seconds_in_time_unit: f64,
    aging_constant: f64,
    max_probability: f64,
    min_probability: f64,
}

impl PredictabilityTable {
    pub fn new(config: &ProphetConfig) -> Self {
        Self {
            preds: BTreeMap::new(),
            last_aged: SimTime::ZERO,
            seconds_in_time_unit: config.seconds_in_time_unit,
            aging_constant: config.aging_constant,
            max_probability: config.max_probability,
            min_probability: config.min_probability,
        }
    }

    fn decay_factor(&self, now: SimTime) -> f64 {
        let units = now.since(self.last_aged) / self.seconds_in_time_unit;
        self.aging_constant.powf(units)
    }

    /// Decay every entry up to `now`
    ///
    /// A call with no elapsed time, or with a time before the last aging,
    /// changes nothing.
    pub fn age_to(&mut self, now: SimTime) {
        if now <= self.last_aged {
            return;
        }
        let factor = self.decay_factor(now);
        let min = self.min_probability;
        self.preds.retain(|_, p| {
            *p *= factor;
            *p >= min
        });
        self.last_aged = now;
    }

    /// Aged predictability for `node`, committing the aging
    pub fn get(&mut self, node: NodeId, now: SimTime) -> f64 {
        self.age_to(now);
        self.preds.get(&node).copied().unwrap_or(0.0)
    }

    /// Aged predictability for `node`, leaving the table untouched
    pub fn peek(&self, node: NodeId, now: SimTime) -> f64 {
        self.preds
            .get(&node)
            .map(|p| p * self.decay_factor(now))
            .unwrap_or(0.0)
    }

    /// Direct encounter: `P = P_old + (1 - P_old) * P_init`
    pub fn encounter(&mut self, peer: NodeId, initial_probability: f64) {
        let p_old = self.preds.get(&peer).copied().unwrap_or(0.0);
        let p_new = p_old + (1.0 - p_old) * initial_probability;
        self.preds.insert(peer, p_new.min(self.max_probability));
    }

    /// Transitive update through `via`
    ///
    /// For each destination C in `via_preds` except `this_host`:
    ///   P(C) = P_old(C) + (1 - P_old(C)) * P(via) * P_via(C) * beta
    pub fn transitive(
        &mut self,
        this_host: NodeId,
        via: NodeId,
        via_preds: &BTreeMap<NodeId, f64>,
        beta: f64,
    ) {
        let p_via = self.preds.get(&via).copied().unwrap_or(0.0);
        if p_via <= 0.0 {
            return;
        }
        for (&dest, &p_via_dest) in via_preds {
            if dest == this_host || dest == via {
                continue;
            }
            let p_old = self.preds.get(&dest).copied().unwrap_or(0.0);
            let p_new = p_old + (1.0 - p_old) * p_via * p_via_dest * beta;
            self.preds.insert(dest, p_new.min(self.max_probability));
        }
    }

    /// Overwrite an entry, aged to `now` first
    pub fn set(&mut self, node: NodeId, probability: f64, now: SimTime) {
        self.age_to(now);
        self.preds
            .insert(node, probability.clamp(0.0, self.max_probability));
    }

    /// Stored (not re-aged) entries
    pub fn entries(&self) -> &BTreeMap<NodeId, f64> {
        &self.preds
    }

    pub fn last_aged(&self) -> SimTime {
        self.last_aged
    }

    pub fn len(&self) -> usize {
        self.preds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.preds.is_empty()
    }
}

/// PRoPHET decision engine
#[derive(Debug, Clone)]
pub struct ProphetEngine {
    config: ProphetConfig,
    table: PredictabilityTable,
    forward_counts: BTreeMap<MessageId, u32>,
    forward_progress: BTreeMap<MessageId, f64>,
    rng: StdRng,
}

impl ProphetEngine {
    pub fn new(config: ProphetConfig) -> Self {
        Self {
            table: PredictabilityTable::new(&config),
            rng: StdRng::seed_from_u64(config.seed),
            forward_counts: BTreeMap::new(),
            forward_progress: BTreeMap::new(),
            config,
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(ProphetConfig::default())
    }

    pub fn config(&self) -> &ProphetConfig {
        &self.config
    }

    pub fn table(&self) -> &PredictabilityTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut PredictabilityTable {
        &mut self.table
    }

    /// Read-only predictability for `dest` as seen at `now`
    pub fn predictability(&self, dest: NodeId, now: SimTime) -> f64 {
        self.table.peek(dest, now)
    }

    pub fn forward_count(&self, id: MessageId) -> u32 {
        self.forward_counts.get(&id).copied().unwrap_or(0)
    }

    pub fn forward_progress(&self, id: MessageId) -> f64 {
        self.forward_progress.get(&id).copied().unwrap_or(0.0)
    }
}

/// Eviction statistics backed by an engine's counters
struct EvictionView<'a> {
    engine: &'a ProphetEngine,
    now: SimTime,
}

impl EvictionStats for EvictionView<'_> {
    fn forward_count(&self, id: MessageId) -> u32 {
        self.engine.forward_count(id)
    }

    fn forward_progress(&self, id: MessageId) -> f64 {
        self.engine.forward_progress(id)
    }

    fn own_predictability(&self, destination: NodeId) -> f64 {
        self.engine.predictability(destination, self.now)
    }
}

impl DecisionEngine for ProphetEngine {
    const NAME: &'static str = "prophet";

    fn exchange_on_new_connection(
        &mut self,
        this_host: NodeId,
        mut peer: PeerMut<'_, Self>,
        now: SimTime,
    ) -> RoutingResult<()> {
        let peer_id = peer.id();
        let other = peer.engine_mut()?;

        // Both sides compute from the tables as they were before the contact
        self.table.age_to(now);
        other.table.age_to(now);
        let ours = self.table.entries().clone();
        let theirs = other.table.entries().clone();

        self.table.encounter(peer_id, self.config.initial_probability);
        other.table.encounter(this_host, other.config.initial_probability);
        self.table.transitive(this_host, peer_id, &theirs, self.config.beta);
        other.table.transitive(peer_id, this_host, &ours, other.config.beta);

        debug!(
            host = %this_host,
            peer = %peer_id,
            p_peer = self.table.peek(peer_id, now),
            "predictabilities exchanged"
        );
        Ok(())
    }

    fn new_message(&mut self, _msg: &mut Message, _now: SimTime) -> RoutingResult<bool> {
        Ok(true)
    }

    fn should_save_received_message(
        &mut self,
        msg: &mut Message,
        this_host: NodeId,
        _now: SimTime,
    ) -> RoutingResult<bool> {
        Ok(!self.is_final_dest(msg, this_host))
    }

    fn should_send_message_to_host(
        &mut self,
        msg: &Message,
        peer: &PeerRef<'_, Self>,
        now: SimTime,
    ) -> RoutingResult<bool> {
        if peer.id() == msg.destination {
            return Ok(true);
        }
        if peer.has_message(&msg.id) {
            return Ok(false);
        }
        let send = match self.config.forwarding_strategy {
            ForwardingStrategy::Coin => self.rng.random_bool(0.5),
            ForwardingStrategy::Grtr | ForwardingStrategy::GrtrSort | ForwardingStrategy::GrtrMax => {
                let theirs = peer.engine()?.predictability(msg.destination, now);
                let ours = self.table.get(msg.destination, now);
                theirs > ours
            }
        };
        trace!(msg = %msg.id, peer = %peer.id(), send, "prophet send decision");
        Ok(send)
    }

    fn should_delete_sent_message(
        &mut self,
        msg: &mut Message,
        peer: &PeerRef<'_, Self>,
        _now: SimTime,
    ) -> RoutingResult<bool> {
        Ok(peer.id() == msg.destination)
    }

    fn should_delete_old_message(
        &mut self,
        msg: &Message,
        reporter: &PeerRef<'_, Self>,
        _now: SimTime,
    ) -> RoutingResult<bool> {
        Ok(reporter.id() == msg.destination)
    }

    fn periodic_update(&mut self, _this_host: NodeId, now: SimTime) {
        self.table.age_to(now);
    }

    fn clone_for_replication(&self) -> Self {
        Self::new(self.config.clone())
    }

    fn message_forwarded(
        &mut self,
        msg: &Message,
        receiver: &PeerRef<'_, Self>,
        now: SimTime,
    ) -> RoutingResult<()> {
        *self.forward_counts.entry(msg.id).or_insert(0) += 1;
        let gained = receiver.engine()?.predictability(msg.destination, now);
        *self.forward_progress.entry(msg.id).or_insert(0.0) += gained;
        Ok(())
    }

    fn message_removed(&mut self, id: MessageId) {
        self.forward_counts.remove(&id);
        self.forward_progress.remove(&id);
    }

    fn select_eviction_victim(
        &mut self,
        store: &MessageStore,
        excluded: &BTreeSet<MessageId>,
        now: SimTime,
    ) -> Option<MessageId> {
        self.table.age_to(now);
        let view = EvictionView { engine: self, now };
        self.config.queueing_policy.select_victim(
            store.iter().filter(|m| !excluded.contains(&m.id)),
            &view,
            now,
        )
    }

    /// Send-order key for `msg` towards `peer`, higher first
    ///
    /// A peer that is the message's destination gets `f64::INFINITY` under
    /// every strategy but COIN, so direct deliveries jump the queue even
    /// under plain GRTR. Other GRTR candidates all get `0.0` and keep their
    /// queue order. COIN returns `None` and leaves the queue untouched.
    fn forwarding_priority(
        &mut self,
        msg: &Message,
        peer: &PeerRef<'_, Self>,
        now: SimTime,
    ) -> RoutingResult<Option<f64>> {
        if self.config.forwarding_strategy == ForwardingStrategy::Coin {
            return Ok(None);
        }
        if peer.id() == msg.destination {
            return Ok(Some(f64::INFINITY));
        }
        let theirs = peer.engine()?.predictability(msg.destination, now);
        let priority = match self.config.forwarding_strategy {
            ForwardingStrategy::GrtrSort => theirs - self.table.get(msg.destination, now),
            ForwardingStrategy::GrtrMax => theirs,
            _ => 0.0,
        };
        Ok(Some(priority))
    }
}
