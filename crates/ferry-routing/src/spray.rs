//! Spray-and-wait and spray-and-focus routing
//!
//! Both protocols start a message with a fixed budget of copies stored in
//! the message's property bag. Every relay splits its budget with the
//! receiver. A host left with a single copy stops spraying:
//!
//! - **Spray-and-wait** holds it until it meets the destination.
//! - **Spray-and-focus** hands it to a peer that has seen the destination
//!   more recently than itself.
//!
//! In binary mode, a host holding `n` copies gives `ceil(n/2)` to the
//! receiver and keeps `ceil(n/2)` itself, so a source with seven copies
//! goes 7, 4, 2, 1 over successive relays.

use std::collections::BTreeMap;

use ferry_core::{
    ConfigError, ConfigResult, Message, NodeId, PropertyValue, RoutingResult, SimTime,
};
use tracing::{debug, trace};

use crate::config::{EngineSection, ensure_positive};
use crate::decision::{DecisionEngine, PeerMut, PeerRef};

/// Property key holding a message's remaining copy budget
pub const COPIES_KEY: &str = "SprayAndWait.copies";

/// Configuration shared by the spray protocols
#[derive(Debug, Clone, PartialEq)]
pub struct SprayConfig {
    /// Copies a new message starts with
    /// Default: 2
    pub initial_copies: u32,

    /// Split copies in half on each relay, rather than handing out one
    /// Default: true
    pub binary: bool,

    /// Focus phase: how much more recently (seconds) a peer must have seen
    /// the destination before it gets our last copy
    /// Default: 1.0
    pub transitivity_timer_threshold: f64,

    /// Focus phase: assumed travel time (seconds) between two encounter
    /// points, used to discount encounter times learnt second-hand
    /// Default: 300.0
    pub default_time_diff: f64,
}

impl Default for SprayConfig {
    fn default() -> Self {
        Self {
            initial_copies: 2,
            binary: true,
            transitivity_timer_threshold: 1.0,
            default_time_diff: 300.0,
        }
    }
}

impl SprayConfig {
    pub fn from_section(section: &EngineSection) -> ConfigResult<Self> {
        let defaults = Self::default();
        let initial_copies = match section.u64("nrofCopies")? {
            Some(n) => u32::try_from(n)
                .map_err(|_| ConfigError::invalid("nrofCopies", format!("{n} is too large")))?,
            None => defaults.initial_copies,
        };
        let config = Self {
            initial_copies,
            binary: section.bool("binaryMode")?.unwrap_or(defaults.binary),
            transitivity_timer_threshold: section
                .f64("transitivityTimerThreshold")?
                .unwrap_or(defaults.transitivity_timer_threshold),
            default_time_diff: section
                .f64("defaultTimeDiff")?
                .unwrap_or(defaults.default_time_diff),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.initial_copies == 0 {
            return Err(ConfigError::invalid("nrofCopies", "must be at least 1"));
        }
        if !(self.transitivity_timer_threshold.is_finite() && self.transitivity_timer_threshold >= 0.0) {
            return Err(ConfigError::invalid(
                "transitivityTimerThreshold",
                "must be a non-negative number",
            ));
        }
        ensure_positive("defaultTimeDiff", self.default_time_diff)
    }

    /// Copies a receiver gets out of `n`
    fn receiver_share(&self, n: u32) -> u32 {
        if self.binary { n.div_ceil(2) } else { 1 }
    }

    /// Copies a sender keeps out of `n`
    fn sender_share(&self, n: u32) -> u32 {
        if self.binary { n - n / 2 } else { n.saturating_sub(1) }
    }
}

/// Remaining copy budget of `msg`
///
/// A message that never went through a spray origin counts as one copy.
pub fn copies(msg: &Message) -> RoutingResult<u32> {
    let n = msg.properties.get_int(COPIES_KEY)?.unwrap_or(1);
    Ok(u32::try_from(n.max(1)).unwrap_or(u32::MAX))
}

fn set_copies(msg: &mut Message, n: u32) -> RoutingResult<()> {
    let value = PropertyValue::Int(i64::from(n));
    if msg.properties.contains(COPIES_KEY) {
        msg.properties.update(COPIES_KEY, value)?;
    } else {
        msg.properties.add(COPIES_KEY, value)?;
    }
    Ok(())
}

/// Copy accounting common to both protocols
#[derive(Debug, Clone, PartialEq)]
struct Spray {
    config: SprayConfig,
}

impl Spray {
    fn stamp(&self, msg: &mut Message) -> RoutingResult<()> {
        msg.properties
            .add(COPIES_KEY, PropertyValue::Int(i64::from(self.config.initial_copies)))?;
        Ok(())
    }

    /// Receiver side of a relay
    fn take_share(&self, msg: &mut Message) -> RoutingResult<()> {
        let n = copies(msg)?;
        set_copies(msg, self.config.receiver_share(n))
    }

    /// Sender side of a relay. Returns whether the local copy should go.
    fn give_share(&self, msg: &mut Message, peer: NodeId) -> RoutingResult<bool> {
        if peer == msg.destination {
            return Ok(true);
        }
        let n = copies(msg)?;
        if n <= 1 {
            return Ok(true);
        }
        let kept = self.config.sender_share(n).max(1);
        set_copies(msg, kept)?;
        trace!(msg = %msg.id, before = n, kept, "copies split");
        Ok(false)
    }
}

/// Spray-and-wait decision engine
#[derive(Debug, Clone, PartialEq)]
pub struct SprayAndWaitEngine {
    spray: Spray,
}

impl SprayAndWaitEngine {
    pub fn new(config: SprayConfig) -> Self {
        Self {
            spray: Spray { config },
        }
    }

    pub fn config(&self) -> &SprayConfig {
        &self.spray.config
    }
}

impl Default for SprayAndWaitEngine {
    fn default() -> Self {
        Self::new(SprayConfig::default())
    }
}

impl DecisionEngine for SprayAndWaitEngine {
    const NAME: &'static str = "spray-and-wait";

    fn exchange_on_new_connection(
        &mut self,
        _this_host: NodeId,
        _peer: PeerMut<'_, Self>,
        _now: SimTime,
    ) -> RoutingResult<()> {
        Ok(())
    }

    fn new_message(&mut self, msg: &mut Message, _now: SimTime) -> RoutingResult<bool> {
        self.spray.stamp(msg)?;
        Ok(true)
    }

    fn should_save_received_message(
        &mut self,
        msg: &mut Message,
        this_host: NodeId,
        _now: SimTime,
    ) -> RoutingResult<bool> {
        if self.is_final_dest(msg, this_host) {
            return Ok(false);
        }
        self.spray.take_share(msg)?;
        Ok(true)
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
        if peer.has_message(&msg.id) {
            return Ok(false);
        }
        Ok(copies(msg)? > 1)
    }

    fn should_delete_sent_message(
        &mut self,
        msg: &mut Message,
        peer: &PeerRef<'_, Self>,
        _now: SimTime,
    ) -> RoutingResult<bool> {
        self.spray.give_share(msg, peer.id())
    }

    fn should_delete_old_message(
        &mut self,
        _msg: &Message,
        _reporter: &PeerRef<'_, Self>,
        _now: SimTime,
    ) -> RoutingResult<bool> {
        Ok(false)
    }

    fn clone_for_replication(&self) -> Self {
        self.clone()
    }
}

/// Spray-and-focus decision engine
#[derive(Debug, Clone)]
pub struct SprayAndFocusEngine {
    spray: Spray,
    /// Last time each host was seen, directly or through a peer
    recent_encounters: BTreeMap<NodeId, SimTime>,
}

impl SprayAndFocusEngine {
    pub fn new(config: SprayConfig) -> Self {
        Self {
            spray: Spray { config },
            recent_encounters: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &SprayConfig {
        &self.spray.config
    }

    /// When `node` was last seen, if ever
    pub fn last_encounter(&self, node: NodeId) -> Option<SimTime> {
        self.recent_encounters.get(&node).copied()
    }

    /// Adopt encounter times from `theirs` that beat ours by more than the
    /// travel-time allowance, discounted by that allowance
    fn merge_encounters(&mut self, this_host: NodeId, theirs: &BTreeMap<NodeId, SimTime>) {
        let diff = self.spray.config.default_time_diff;
        for (&node, &their_time) in theirs {
            if node == this_host {
                continue;
            }
            let stale = match self.recent_encounters.get(&node) {
                None => true,
                Some(mine) => mine.as_secs() + diff < their_time.as_secs(),
            };
            if stale {
                self.recent_encounters
                    .insert(node, SimTime::from_secs(their_time.as_secs() - diff));
            }
        }
    }
}

impl Default for SprayAndFocusEngine {
    fn default() -> Self {
        Self::new(SprayConfig::default())
    }
}

impl DecisionEngine for SprayAndFocusEngine {
    const NAME: &'static str = "spray-and-focus";

    fn connection_up(&mut self, _this_host: NodeId, peer: NodeId, now: SimTime) {
        self.recent_encounters.insert(peer, now);
    }

    fn connection_down(&mut self, _this_host: NodeId, peer: NodeId, now: SimTime) {
        self.recent_encounters.insert(peer, now);
    }

    fn exchange_on_new_connection(
        &mut self,
        this_host: NodeId,
        mut peer: PeerMut<'_, Self>,
        now: SimTime,
    ) -> RoutingResult<()> {
        let peer_id = peer.id();
        let other = peer.engine_mut()?;

        self.recent_encounters.insert(peer_id, now);
        other.recent_encounters.insert(this_host, now);

        let ours = self.recent_encounters.clone();
        let theirs = other.recent_encounters.clone();
        self.merge_encounters(this_host, &theirs);
        other.merge_encounters(peer_id, &ours);

        debug!(
            host = %this_host,
            peer = %peer_id,
            known = self.recent_encounters.len(),
            "encounter tables merged"
        );
        Ok(())
    }

    fn new_message(&mut self, msg: &mut Message, _now: SimTime) -> RoutingResult<bool> {
        self.spray.stamp(msg)?;
        Ok(true)
    }

    fn should_save_received_message(
        &mut self,
        msg: &mut Message,
        this_host: NodeId,
        _now: SimTime,
    ) -> RoutingResult<bool> {
        if self.is_final_dest(msg, this_host) {
            return Ok(false);
        }
        self.spray.take_share(msg)?;
        Ok(true)
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
        if peer.has_message(&msg.id) {
            return Ok(false);
        }
        if copies(msg)? > 1 {
            return Ok(true);
        }

        let Some(theirs) = peer.engine()?.last_encounter(msg.destination) else {
            return Ok(false);
        };
        Ok(match self.last_encounter(msg.destination) {
            None => true,
            Some(mine) => {
                theirs.as_secs() > mine.as_secs() + self.spray.config.transitivity_timer_threshold
            }
        })
    }

    fn should_delete_sent_message(
        &mut self,
        msg: &mut Message,
        peer: &PeerRef<'_, Self>,
        _now: SimTime,
    ) -> RoutingResult<bool> {
        self.spray.give_share(msg, peer.id())
    }

    fn should_delete_old_message(
        &mut self,
        _msg: &Message,
        _reporter: &PeerRef<'_, Self>,
        _now: SimTime,
    ) -> RoutingResult<bool> {
        Ok(true)
    }

    fn clone_for_replication(&self) -> Self {
        Self::new(self.spray.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::{MessageId, MessageStore};

    fn make_id(n: u32) -> NodeId {
        NodeId(n)
    }

    fn make_msg(dest: u32) -> Message {
        Message::new(MessageId(1), make_id(0), make_id(dest), 10, 600.0, SimTime::ZERO)
    }

    fn sprayer(copies: u32) -> SprayAndWaitEngine {
        SprayAndWaitEngine::new(SprayConfig {
            initial_copies: copies,
            ..Default::default()
        })
    }

    /// Relay `msg` from `sender` to `receiver_id`, returning the receiver's copy
    /// and whether the sender dropped its own
    fn relay(
        sender: &mut SprayAndWaitEngine,
        receiver: &mut SprayAndWaitEngine,
        msg: &mut Message,
        receiver_id: NodeId,
    ) -> (Message, bool) {
        let mut received = msg.clone();
        assert!(
            receiver
                .should_save_received_message(&mut received, receiver_id, SimTime::ZERO)
                .unwrap()
        );
        let store = MessageStore::new(100);
        let peer = PeerRef::new(receiver_id, &*receiver, &store);
        let deleted = sender
            .should_delete_sent_message(msg, &peer, SimTime::ZERO)
            .unwrap();
        (received, deleted)
    }

    #[test]
    fn test_new_message_gets_copy_budget() {
        let mut engine = sprayer(7);
        let mut msg = make_msg(9);
        assert!(engine.new_message(&mut msg, SimTime::ZERO).unwrap());
        assert_eq!(copies(&msg).unwrap(), 7);
    }

    #[test]
    fn test_binary_halving_chain() {
        let (mut a, mut b, mut c, mut d) = (sprayer(7), sprayer(7), sprayer(7), sprayer(7));
        let mut at_a = make_msg(9);
        a.new_message(&mut at_a, SimTime::ZERO).unwrap();

        let (mut at_b, deleted) = relay(&mut a, &mut b, &mut at_a, make_id(1));
        assert_eq!(copies(&at_b).unwrap(), 4);
        assert_eq!(copies(&at_a).unwrap(), 4);
        assert!(!deleted);

        let (mut at_c, deleted) = relay(&mut b, &mut c, &mut at_b, make_id(2));
        assert_eq!(copies(&at_c).unwrap(), 2);
        assert_eq!(copies(&at_b).unwrap(), 2);
        assert!(!deleted);

        let (mut at_d, deleted) = relay(&mut c, &mut d, &mut at_c, make_id(3));
        assert_eq!(copies(&at_d).unwrap(), 1);
        assert_eq!(copies(&at_c).unwrap(), 1);
        assert!(!deleted);

        // The last copy waits for the destination and goes once handed over
        let store = MessageStore::new(100);
        let other = sprayer(7);
        let relay_peer = PeerRef::new(make_id(4), &other, &store);
        assert!(!d.should_send_message_to_host(&at_d, &relay_peer, SimTime::ZERO).unwrap());
        let dest_peer = PeerRef::new(make_id(9), &other, &store);
        assert!(d.should_send_message_to_host(&at_d, &dest_peer, SimTime::ZERO).unwrap());
        assert!(d.should_delete_sent_message(&mut at_d, &dest_peer, SimTime::ZERO).unwrap());
    }

    #[test]
    fn test_source_keeps_rounded_up_half() {
        let mut source = sprayer(7);
        let mut msg = make_msg(9);
        source.new_message(&mut msg, SimTime::ZERO).unwrap();

        let mut remaining = vec![copies(&msg).unwrap()];
        for peer in 1..=3 {
            let mut fresh = sprayer(7);
            let (_, deleted) = relay(&mut source, &mut fresh, &mut msg, make_id(peer));
            assert!(!deleted);
            remaining.push(copies(&msg).unwrap());
        }
        assert_eq!(remaining, vec![7, 4, 2, 1]);
    }

    #[test]
    fn test_wait_phase_only_direct_delivery() {
        let mut engine = sprayer(2);
        let peer_engine = sprayer(2);
        let store = MessageStore::new(100);
        let mut msg = make_msg(9);
        set_copies(&mut msg, 1).unwrap();

        let relay_peer = PeerRef::new(make_id(1), &peer_engine, &store);
        assert!(!engine.should_send_message_to_host(&msg, &relay_peer, SimTime::ZERO).unwrap());

        let dest_peer = PeerRef::new(make_id(9), &peer_engine, &store);
        assert!(engine.should_send_message_to_host(&msg, &dest_peer, SimTime::ZERO).unwrap());
        assert!(engine.should_delete_sent_message(&mut msg, &dest_peer, SimTime::ZERO).unwrap());
    }

    #[test]
    fn test_standard_mode_hands_out_one_copy() {
        let mut sender = SprayAndWaitEngine::new(SprayConfig {
            initial_copies: 4,
            binary: false,
            ..Default::default()
        });
        let mut receiver = sender.clone();
        let mut msg = make_msg(9);
        sender.new_message(&mut msg, SimTime::ZERO).unwrap();

        let (received, deleted) = relay(&mut sender, &mut receiver, &mut msg, make_id(1));
        assert_eq!(copies(&received).unwrap(), 1);
        assert_eq!(copies(&msg).unwrap(), 3);
        assert!(!deleted);
    }

    #[test]
    fn test_copies_default_to_one_without_property() {
        assert_eq!(copies(&make_msg(9)).unwrap(), 1);
    }

    #[test]
    fn test_focus_forwards_to_fresher_peer() {
        let mut me = SprayAndFocusEngine::default();
        let mut peer_engine = SprayAndFocusEngine::default();
        me.recent_encounters.insert(make_id(9), SimTime::from_secs(10.0));
        peer_engine
            .recent_encounters
            .insert(make_id(9), SimTime::from_secs(50.0));
        let store = MessageStore::new(100);
        let msg = make_msg(9);

        let peer = PeerRef::new(make_id(1), &peer_engine, &store);
        assert!(me.should_send_message_to_host(&msg, &peer, SimTime::from_secs(60.0)).unwrap());

        // Not fresher by more than the threshold
        peer_engine
            .recent_encounters
            .insert(make_id(9), SimTime::from_secs(10.5));
        let peer = PeerRef::new(make_id(1), &peer_engine, &store);
        assert!(!me.should_send_message_to_host(&msg, &peer, SimTime::from_secs(60.0)).unwrap());
    }

    #[test]
    fn test_focus_without_peer_knowledge_holds() {
        let mut me = SprayAndFocusEngine::default();
        let peer_engine = SprayAndFocusEngine::default();
        let store = MessageStore::new(100);
        let peer = PeerRef::new(make_id(1), &peer_engine, &store);
        assert!(!me.should_send_message_to_host(&make_msg(9), &peer, SimTime::ZERO).unwrap());
    }

    #[test]
    fn test_exchange_merges_discounted_encounters() {
        let mut a = SprayAndFocusEngine::default();
        let mut b = SprayAndFocusEngine::default();
        b.recent_encounters.insert(make_id(9), SimTime::from_secs(1000.0));
        a.recent_encounters.insert(make_id(8), SimTime::from_secs(900.0));

        a.exchange_on_new_connection(make_id(0), PeerMut::new(make_id(1), &mut b), SimTime::from_secs(1200.0))
            .unwrap();

        assert_eq!(a.last_encounter(make_id(1)), Some(SimTime::from_secs(1200.0)));
        assert_eq!(b.last_encounter(make_id(0)), Some(SimTime::from_secs(1200.0)));
        assert_eq!(a.last_encounter(make_id(9)), Some(SimTime::from_secs(700.0)));
        assert_eq!(b.last_encounter(make_id(8)), Some(SimTime::from_secs(600.0)));
        // Own entries are never overwritten with second-hand ones
        assert_eq!(a.last_encounter(make_id(0)), None);
    }

    #[test]
    fn test_config_from_section() {
        let section = EngineSection::new("spray-and-wait")
            .with("nrofCopies", 8)
            .with("binaryMode", false);
        let config = SprayConfig::from_section(&section).unwrap();
        assert_eq!(config.initial_copies, 8);
        assert!(!config.binary);

        let section = EngineSection::new("spray-and-wait").with("nrofCopies", 0);
        assert!(SprayConfig::from_section(&section).is_err());
    }
}
