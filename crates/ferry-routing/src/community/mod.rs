//! BubbleRap-style community routing
//!
//! Hosts learn a local community from long-lived contacts and rank
//! themselves by windowed degree centrality. A message first bubbles up
//! through globally central hosts until it reaches a member of the
//! destination's community, then climbs local centrality inside it.

mod centrality;

use std::collections::{BTreeMap, BTreeSet};

use ferry_core::{ConfigError, ConfigResult, Message, NodeId, RoutingResult, SimTime};
use tracing::{debug, trace};

use crate::config::{EngineSection, ensure_positive, ensure_range};
use crate::decision::{DecisionEngine, PeerMut, PeerRef};

pub use centrality::{ContactHistory, ContactInterval, WindowCentrality};

/// Community detection and centrality configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CommunityConfig {
    /// Cumulative contact seconds before a peer is familiar
    /// Default: 700
    pub familiar_threshold: f64,

    /// Fraction of a peer's familiar set that must already be in our
    /// community before we merge with it
    /// Default: 0.6
    pub lambda: f64,

    /// Seconds per centrality epoch
    /// Default: 21600
    pub time_window: f64,

    /// Epochs averaged into centrality
    /// Default: 5
    pub epoch_count: usize,
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            familiar_threshold: 700.0,
            lambda: 0.6,
            time_window: 21600.0,
            epoch_count: 5,
        }
    }
}

impl CommunityConfig {
    pub fn from_section(section: &EngineSection) -> ConfigResult<Self> {
        let defaults = Self::default();
        let epoch_count = match section.u64("epochCount")? {
            Some(n) => usize::try_from(n)
                .map_err(|_| ConfigError::invalid("epochCount", "out of range"))?,
            None => defaults.epoch_count,
        };
        let config = Self {
            familiar_threshold: section
                .f64("familiarThreshold")?
                .unwrap_or(defaults.familiar_threshold),
            lambda: section.f64("lambda")?.unwrap_or(defaults.lambda),
            time_window: section.f64("timeWindow")?.unwrap_or(defaults.time_window),
            epoch_count,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        ensure_positive("familiarThreshold", self.familiar_threshold)?;
        ensure_range("lambda", self.lambda, 0.0, 1.0)?;
        ensure_positive("timeWindow", self.time_window)?;
        if self.epoch_count == 0 {
            return Err(ConfigError::invalid("epochCount", "must be at least 1"));
        }
        Ok(())
    }

    fn centrality(&self) -> WindowCentrality {
        WindowCentrality {
            time_window: self.time_window,
            epoch_count: self.epoch_count,
        }
    }
}

/// BubbleRap decision engine
#[derive(Debug, Clone)]
pub struct CommunityEngine {
    config: CommunityConfig,
    host: Option<NodeId>,
    familiar: BTreeSet<NodeId>,
    community: BTreeSet<NodeId>,
    contact_starts: BTreeMap<NodeId, SimTime>,
    contact_totals: BTreeMap<NodeId, f64>,
    history: ContactHistory,
}

impl CommunityEngine {
    pub fn new(config: CommunityConfig) -> Self {
        Self {
            config,
            host: None,
            familiar: BTreeSet::new(),
            community: BTreeSet::new(),
            contact_starts: BTreeMap::new(),
            contact_totals: BTreeMap::new(),
            history: ContactHistory::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CommunityConfig::default())
    }

    pub fn config(&self) -> &CommunityConfig {
        &self.config
    }

    /// Peers with enough cumulative contact time
    pub fn familiar_set(&self) -> &BTreeSet<NodeId> {
        &self.familiar
    }

    /// Learned community, not counting the host itself
    pub fn local_community(&self) -> &BTreeSet<NodeId> {
        &self.community
    }

    /// Whether `node` belongs to this host's community
    ///
    /// A host always belongs to its own community.
    pub fn in_community(&self, node: NodeId) -> bool {
        self.host == Some(node) || self.community.contains(&node)
    }

    /// Contacts recent enough to count towards centrality
    pub fn history(&self) -> &ContactHistory {
        &self.history
    }

    pub fn global_centrality(&self, now: SimTime) -> f64 {
        self.config.centrality().global(&self.history, now)
    }

    pub fn local_centrality(&self, now: SimTime) -> f64 {
        self.config
            .centrality()
            .local(&self.history, |n| self.community.contains(&n), now)
    }

    /// Cumulative contact time with `peer`, including pruned contacts
    pub fn total_contact(&self, peer: NodeId) -> f64 {
        self.contact_totals.get(&peer).copied().unwrap_or(0.0)
    }

    /// Merge `peer`'s community into ours if enough of its familiar set is
    /// already ours. An empty familiar set never qualifies.
    fn consider_merge(
        &mut self,
        this_host: NodeId,
        peer: NodeId,
        peer_familiar: &BTreeSet<NodeId>,
        peer_community: &BTreeSet<NodeId>,
    ) {
        if peer_familiar.is_empty() || self.community.contains(&peer) {
            return;
        }
        let overlap = peer_familiar
            .iter()
            .filter(|&&n| self.in_community(n))
            .count();
        if (overlap as f64) < self.config.lambda * peer_familiar.len() as f64 {
            return;
        }
        self.community.insert(peer);
        self.community
            .extend(peer_community.iter().copied().filter(|&n| n != this_host));
        debug!(
            host = %this_host,
            %peer,
            size = self.community.len(),
            "merged peer community"
        );
    }
}

impl DecisionEngine for CommunityEngine {
    const NAME: &'static str = "bubble-rap";

    fn connection_up(&mut self, this_host: NodeId, peer: NodeId, now: SimTime) {
        self.host = Some(this_host);
        self.contact_starts.insert(peer, now);
    }

    fn connection_down(&mut self, this_host: NodeId, peer: NodeId, now: SimTime) {
        self.host = Some(this_host);
        let Some(start) = self.contact_starts.remove(&peer) else {
            return;
        };
        if now > start {
            let contact = ContactInterval { start, end: now };
            *self.contact_totals.entry(peer).or_insert(0.0) += contact.duration();
            self.history.entry(peer).or_default().push(contact);
        }
        self.config.centrality().prune(&mut self.history, now);
        if !self.familiar.contains(&peer)
            && self.total_contact(peer) >= self.config.familiar_threshold
        {
            self.familiar.insert(peer);
            self.community.insert(peer);
            debug!(host = %this_host, %peer, "peer became familiar");
        }
    }

    fn exchange_on_new_connection(
        &mut self,
        this_host: NodeId,
        mut peer: PeerMut<'_, Self>,
        _now: SimTime,
    ) -> RoutingResult<()> {
        let peer_id = peer.id();
        let other = peer.engine_mut()?;
        self.host = Some(this_host);
        other.host = Some(peer_id);

        let (our_familiar, our_community) = (self.familiar.clone(), self.community.clone());
        let (their_familiar, their_community) = (other.familiar.clone(), other.community.clone());
        self.consider_merge(this_host, peer_id, &their_familiar, &their_community);
        other.consider_merge(peer_id, this_host, &our_familiar, &our_community);
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
        let other = peer.engine()?;
        let dest = msg.destination;
        let send = match (other.in_community(dest), self.in_community(dest)) {
            (true, false) => true,
            (false, true) => false,
            (true, true) => other.local_centrality(now) > self.local_centrality(now),
            (false, false) => other.global_centrality(now) > self.global_centrality(now),
        };
        trace!(msg = %msg.id, peer = %peer.id(), send, "bubble decision");
        Ok(send)
    }

    fn should_delete_sent_message(
        &mut self,
        msg: &mut Message,
        peer: &PeerRef<'_, Self>,
        _now: SimTime,
    ) -> RoutingResult<bool> {
        let other = peer.engine()?;
        Ok(other.in_community(msg.destination) && !self.in_community(msg.destination))
    }

    fn should_delete_old_message(
        &mut self,
        msg: &Message,
        reporter: &PeerRef<'_, Self>,
        _now: SimTime,
    ) -> RoutingResult<bool> {
        let other = reporter.engine()?;
        Ok(other.in_community(msg.destination) && !self.in_community(msg.destination))
    }

    fn clone_for_replication(&self) -> Self {
        Self::new(self.config.clone())
    }
}
