//! PeopleRank-style routing over a contact-derived social graph
//!
//! Each host keeps a rank that is relaxed by gossip: on every contact the two
//! hosts swap `(rank, neighbor count)` snapshots, and the local rank is
//! recomputed from the snapshots of current social neighbors:
//!
//! ```text
//! rank = (1 - d) + d * Σ rank(n) / neighbors(n)
//! ```
//!
//! Messages climb the rank gradient: a host hands a message to a social
//! neighbor whose rank is at least its own.

use std::collections::BTreeMap;

use ferry_core::{ConfigResult, Message, NodeId, RoutingResult, SimTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use super::graph::SocialGraph;
use super::interaction::{EdgePolicy, EdgePolicyKind, InteractionRecord};
use crate::config::{EngineSection, ensure_positive, ensure_range};
use crate::decision::{DecisionEngine, PeerMut, PeerRef};

/// Default damping factor (d)
pub const DEFAULT_DAMPING: f64 = 0.5;
/// Default contact seconds before two hosts become neighbors
pub const DEFAULT_DURATION_THRESHOLD: f64 = 30.0;
/// Default contacts before two hosts become neighbors
pub const DEFAULT_FREQUENCY_THRESHOLD: u32 = 3;

/// Social rank configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SocialRankConfig {
    /// Default: 0.5
    pub damping_factor: f64,

    /// Default: `Duration(30.0)`
    pub edge_policy: EdgePolicy,

    /// Divide the neighbor sum by the number of neighbors counted
    /// Default: false
    pub rank_normalization: bool,

    /// Require buffer headroom and roll against the rank gap before sending
    /// Default: false
    pub probabilistic_gating: bool,

    pub seed: u64,
}

impl Default for SocialRankConfig {
    fn default() -> Self {
        Self {
            damping_factor: DEFAULT_DAMPING,
            edge_policy: EdgePolicy::default(),
            rank_normalization: false,
            probabilistic_gating: false,
            seed: 0,
        }
    }
}

impl SocialRankConfig {
    /// Read a configuration section
    ///
    /// Without an explicit `edgePolicy`, a section that only names
    /// `frequencyThreshold` selects the frequency policy; naming both
    /// thresholds selects `either`.
    pub fn from_section(section: &EngineSection) -> ConfigResult<Self> {
        let defaults = Self::default();
        let duration = section.f64("durationThreshold")?;
        let frequency = section
            .u64("frequencyThreshold")?
            .map(|f| u32::try_from(f).unwrap_or(u32::MAX));
        let kind = match section.parsed::<EdgePolicyKind>("edgePolicy")? {
            Some(kind) => kind,
            None => match (duration, frequency) {
                (None, Some(_)) => EdgePolicyKind::Frequency,
                (Some(_), Some(_)) => EdgePolicyKind::Either,
                _ => EdgePolicyKind::Duration,
            },
        };
        let config = Self {
            damping_factor: section
                .f64("dampingFactor")?
                .unwrap_or(defaults.damping_factor),
            edge_policy: EdgePolicy::from_kind(
                kind,
                duration.unwrap_or(DEFAULT_DURATION_THRESHOLD),
                frequency.unwrap_or(DEFAULT_FREQUENCY_THRESHOLD),
            ),
            rank_normalization: section
                .bool("rankNormalization")?
                .unwrap_or(defaults.rank_normalization),
            probabilistic_gating: section
                .bool("probabilisticGating")?
                .unwrap_or(defaults.probabilistic_gating),
            seed: section.u64("seed")?.unwrap_or(defaults.seed),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        ensure_range("dampingFactor", self.damping_factor, 0.0, 1.0)?;
        match self.edge_policy {
            EdgePolicy::Duration { min } => ensure_positive("durationThreshold", min),
            EdgePolicy::Frequency { .. } => Ok(()),
            EdgePolicy::Either { duration, .. } | EdgePolicy::Both { duration, .. } => {
                ensure_positive("durationThreshold", duration)
            }
        }
    }
}

/// What a peer told us about itself at the last exchange
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankSnapshot {
    pub rank: f64,
    pub neighbor_count: usize,
}

/// PeopleRank decision engine
#[derive(Debug, Clone)]
pub struct SocialRankEngine {
    config: SocialRankConfig,
    host: Option<NodeId>,
    rank: f64,
    graph: SocialGraph,
    snapshots: BTreeMap<NodeId, RankSnapshot>,
    interactions: BTreeMap<NodeId, InteractionRecord>,
    contact_starts: BTreeMap<NodeId, SimTime>,
    rng: StdRng,
}

impl SocialRankEngine {
    pub fn new(config: SocialRankConfig) -> Self {
        Self::with_graph(config, SocialGraph::new())
    }

    pub fn with_defaults() -> Self {
        Self::new(SocialRankConfig::default())
    }

    fn with_graph(config: SocialRankConfig, graph: SocialGraph) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            host: None,
            rank: 0.0,
            graph,
            snapshots: BTreeMap::new(),
            interactions: BTreeMap::new(),
            contact_starts: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &SocialRankConfig {
        &self.config
    }

    pub fn rank(&self) -> f64 {
        self.rank
    }

    /// Number of social neighbors of the host running this engine
    pub fn neighbor_count(&self) -> usize {
        self.host.map_or(0, |h| self.graph.neighbor_count(h))
    }

    pub fn graph(&self) -> &SocialGraph {
        &self.graph
    }

    pub fn interaction(&self, peer: NodeId) -> Option<&InteractionRecord> {
        self.interactions.get(&peer)
    }

    pub fn snapshot(&self, peer: NodeId) -> Option<RankSnapshot> {
        self.snapshots.get(&peer).copied()
    }

    /// Whether `peer` is currently a social neighbor
    pub fn is_neighbor(&self, peer: NodeId) -> bool {
        self.host.is_some_and(|h| self.graph.has_edge(h, peer))
    }

    fn bind(&mut self, this_host: NodeId) {
        self.host = Some(this_host);
    }

    fn own_snapshot(&self) -> RankSnapshot {
        RankSnapshot {
            rank: self.rank,
            neighbor_count: self.neighbor_count(),
        }
    }

    /// Add or drop the edge to `peer` according to the edge policy
    fn reevaluate_edge(&mut self, this_host: NodeId, peer: NodeId) {
        let met = self
            .interactions
            .get(&peer)
            .is_some_and(|record| self.config.edge_policy.is_met(record));
        let changed = if met {
            self.graph.add_edge(this_host, peer)
        } else {
            self.graph.remove_edge(this_host, peer)
        };
        if changed {
            debug!(host = %this_host, %peer, neighbor = met, "social edge changed");
        }
    }

    /// One relaxation step from the stored snapshots
    fn recompute_rank(&mut self, this_host: NodeId) {
        let d = self.config.damping_factor;
        let mut sum = 0.0;
        let mut counted = 0usize;
        for neighbor in self.graph.neighbors(this_host) {
            let Some(snapshot) = self.snapshots.get(&neighbor) else {
                continue;
            };
            if snapshot.neighbor_count == 0 {
                continue;
            }
            sum += snapshot.rank / snapshot.neighbor_count as f64;
            counted += 1;
        }
        if self.config.rank_normalization && counted > 0 {
            sum /= counted as f64;
        }
        self.rank = (1.0 - d) + d * sum;
    }
}

impl DecisionEngine for SocialRankEngine {
    const NAME: &'static str = "social-rank";

    fn connection_up(&mut self, this_host: NodeId, peer: NodeId, now: SimTime) {
        self.bind(this_host);
        self.interactions.entry(peer).or_default();
        self.contact_starts.insert(peer, now);
    }

    fn connection_down(&mut self, this_host: NodeId, peer: NodeId, now: SimTime) {
        self.bind(this_host);
        if let Some(start) = self.contact_starts.remove(&peer) {
            self.interactions
                .entry(peer)
                .or_default()
                .record_contact(start, now);
        }
        self.reevaluate_edge(this_host, peer);
    }

    fn exchange_on_new_connection(
        &mut self,
        this_host: NodeId,
        mut peer: PeerMut<'_, Self>,
        _now: SimTime,
    ) -> RoutingResult<()> {
        let peer_id = peer.id();
        let other = peer.engine_mut()?;
        self.bind(this_host);
        other.bind(peer_id);

        let ours = self.own_snapshot();
        let theirs = other.own_snapshot();
        self.snapshots.insert(peer_id, theirs);
        other.snapshots.insert(this_host, ours);

        self.reevaluate_edge(this_host, peer_id);
        other.reevaluate_edge(peer_id, this_host);
        self.recompute_rank(this_host);
        other.recompute_rank(peer_id);
        trace!(
            host = %this_host,
            peer = %peer_id,
            rank = self.rank,
            peer_rank = other.rank,
            "ranks exchanged"
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
        _now: SimTime,
    ) -> RoutingResult<bool> {
        if peer.id() == msg.destination {
            return Ok(true);
        }
        if peer.has_message(&msg.id) || !self.is_neighbor(peer.id()) {
            return Ok(false);
        }
        let their_rank = peer.engine()?.rank();
        if their_rank < self.rank {
            return Ok(false);
        }
        if !self.config.probabilistic_gating {
            return Ok(true);
        }
        if peer.store().free_space() < msg.size {
            trace!(msg = %msg.id, peer = %peer.id(), "peer lacks buffer headroom");
            return Ok(false);
        }
        let p = (2.0 * (their_rank - self.rank)).clamp(0.0, 1.0);
        Ok(self.rng.random_bool(p))
    }

    fn should_delete_sent_message(
        &mut self,
        _msg: &mut Message,
        _peer: &PeerRef<'_, Self>,
        _now: SimTime,
    ) -> RoutingResult<bool> {
        Ok(false)
    }

    fn should_delete_old_message(
        &mut self,
        _msg: &Message,
        _reporter: &PeerRef<'_, Self>,
        _now: SimTime,
    ) -> RoutingResult<bool> {
        Ok(true)
    }

    fn periodic_update(&mut self, this_host: NodeId, _now: SimTime) {
        self.bind(this_host);
        let peers: Vec<NodeId> = self.interactions.keys().copied().collect();
        for peer in peers {
            if peer != this_host {
                self.reevaluate_edge(this_host, peer);
            }
        }
        self.recompute_rank(this_host);
    }

    fn clone_for_replication(&self) -> Self {
        Self::with_graph(self.config.clone(), self.graph.clone())
    }
}
