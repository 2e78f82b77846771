//! Runtime engine selection
//!
//! [`Engine`] wraps every built-in algorithm so that hosts configured by
//! name can share one [`ForwardingEngine`](crate::ForwardingEngine) type.
//! Peer views are narrowed to the concrete algorithm before each call, so an
//! engine meeting a host that runs something else sees a foreign peer and
//! gets [`RoutingError::EngineMismatch`](ferry_core::RoutingError) if it asks
//! for that peer's state.

use std::collections::BTreeSet;

use ferry_core::{Message, MessageId, MessageStore, NodeId, RoutingResult, SimTime};

use crate::community::CommunityEngine;
use crate::decision::{DecisionEngine, PeerMut, PeerRef};
use crate::epidemic::EpidemicEngine;
use crate::prophet::ProphetEngine;
use crate::social::SocialRankEngine;
use crate::spray::{SprayAndFocusEngine, SprayAndWaitEngine};

/// Any built-in decision engine
#[derive(Debug, Clone)]
pub enum Engine {
    Epidemic(EpidemicEngine),
    Prophet(ProphetEngine),
    SprayAndWait(SprayAndWaitEngine),
    SprayAndFocus(SprayAndFocusEngine),
    SocialRank(SocialRankEngine),
    Community(CommunityEngine),
}

/// A concrete engine that can be found inside an [`Engine`]
pub trait EngineVariant: DecisionEngine {
    fn from_engine(engine: &Engine) -> Option<&Self>;
    fn from_engine_mut(engine: &mut Engine) -> Option<&mut Self>;
}

macro_rules! engine_variant {
    ($variant:ident, $ty:ty) => {
        impl EngineVariant for $ty {
            fn from_engine(engine: &Engine) -> Option<&Self> {
                match engine {
                    Engine::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            fn from_engine_mut(engine: &mut Engine) -> Option<&mut Self> {
                match engine {
                    Engine::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Engine {
            fn from(inner: $ty) -> Self {
                Engine::$variant(inner)
            }
        }
    };
}

engine_variant!(Epidemic, EpidemicEngine);
engine_variant!(Prophet, ProphetEngine);
engine_variant!(SprayAndWait, SprayAndWaitEngine);
engine_variant!(SprayAndFocus, SprayAndFocusEngine);
engine_variant!(SocialRank, SocialRankEngine);
engine_variant!(Community, CommunityEngine);

/// Run `$body` against the wrapped engine, with `$t` naming its type
macro_rules! dispatch {
    ($engine:expr, $inner:ident: $t:ident => $body:expr) => {
        match $engine {
            Engine::Epidemic($inner) => {
                type $t = EpidemicEngine;
                $body
            }
            Engine::Prophet($inner) => {
                type $t = ProphetEngine;
                $body
            }
            Engine::SprayAndWait($inner) => {
                type $t = SprayAndWaitEngine;
                $body
            }
            Engine::SprayAndFocus($inner) => {
                type $t = SprayAndFocusEngine;
                $body
            }
            Engine::SocialRank($inner) => {
                type $t = SocialRankEngine;
                $body
            }
            Engine::Community($inner) => {
                type $t = CommunityEngine;
                $body
            }
        }
    };
}

impl Engine {
    /// The wrapped engine, if it is an `E`
    pub fn as_variant<E: EngineVariant>(&self) -> Option<&E> {
        E::from_engine(self)
    }

    pub fn as_variant_mut<E: EngineVariant>(&mut self) -> Option<&mut E> {
        E::from_engine_mut(self)
    }
}

impl DecisionEngine for Engine {
    const NAME: &'static str = "engine";

    fn kind(&self) -> &'static str {
        dispatch!(self, e: _E => e.kind())
    }

    fn connection_up(&mut self, this_host: NodeId, peer: NodeId, now: SimTime) {
        dispatch!(self, e: _E => e.connection_up(this_host, peer, now))
    }

    fn connection_down(&mut self, this_host: NodeId, peer: NodeId, now: SimTime) {
        dispatch!(self, e: _E => e.connection_down(this_host, peer, now))
    }

    fn exchange_on_new_connection(
        &mut self,
        this_host: NodeId,
        peer: PeerMut<'_, Self>,
        now: SimTime,
    ) -> RoutingResult<()> {
        dispatch!(self, e: E => e.exchange_on_new_connection(
            this_host,
            peer.project(<E as EngineVariant>::from_engine_mut),
            now,
        ))
    }

    fn new_message(&mut self, msg: &mut Message, now: SimTime) -> RoutingResult<bool> {
        dispatch!(self, e: _E => e.new_message(msg, now))
    }

    fn is_final_dest(&self, msg: &Message, host: NodeId) -> bool {
        dispatch!(self, e: _E => e.is_final_dest(msg, host))
    }

    fn should_save_received_message(
        &mut self,
        msg: &mut Message,
        this_host: NodeId,
        now: SimTime,
    ) -> RoutingResult<bool> {
        dispatch!(self, e: _E => e.should_save_received_message(msg, this_host, now))
    }

    fn should_send_message_to_host(
        &mut self,
        msg: &Message,
        peer: &PeerRef<'_, Self>,
        now: SimTime,
    ) -> RoutingResult<bool> {
        dispatch!(self, e: E => e.should_send_message_to_host(
            msg,
            &peer.project(<E as EngineVariant>::from_engine),
            now,
        ))
    }

    fn should_delete_sent_message(
        &mut self,
        msg: &mut Message,
        peer: &PeerRef<'_, Self>,
        now: SimTime,
    ) -> RoutingResult<bool> {
        dispatch!(self, e: E => e.should_delete_sent_message(
            msg,
            &peer.project(<E as EngineVariant>::from_engine),
            now,
        ))
    }

    fn should_delete_old_message(
        &mut self,
        msg: &Message,
        reporter: &PeerRef<'_, Self>,
        now: SimTime,
    ) -> RoutingResult<bool> {
        dispatch!(self, e: E => e.should_delete_old_message(
            msg,
            &reporter.project(<E as EngineVariant>::from_engine),
            now,
        ))
    }

    fn periodic_update(&mut self, this_host: NodeId, now: SimTime) {
        dispatch!(self, e: _E => e.periodic_update(this_host, now))
    }

    fn clone_for_replication(&self) -> Self {
        dispatch!(self, e: _E => Engine::from(e.clone_for_replication()))
    }

    fn message_forwarded(
        &mut self,
        msg: &Message,
        receiver: &PeerRef<'_, Self>,
        now: SimTime,
    ) -> RoutingResult<()> {
        dispatch!(self, e: E => e.message_forwarded(
            msg,
            &receiver.project(<E as EngineVariant>::from_engine),
            now,
        ))
    }

    fn message_removed(&mut self, id: MessageId) {
        dispatch!(self, e: _E => e.message_removed(id))
    }

    fn select_eviction_victim(
        &mut self,
        store: &MessageStore,
        excluded: &BTreeSet<MessageId>,
        now: SimTime,
    ) -> Option<MessageId> {
        dispatch!(self, e: _E => e.select_eviction_victim(store, excluded, now))
    }

    fn forwarding_priority(
        &mut self,
        msg: &Message,
        peer: &PeerRef<'_, Self>,
        now: SimTime,
    ) -> RoutingResult<Option<f64>> {
        dispatch!(self, e: E => e.forwarding_priority(
            msg,
            &peer.project(<E as EngineVariant>::from_engine),
            now,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prophet::ProphetConfig;
    use ferry_core::RoutingError;

    fn make_id(n: u32) -> NodeId {
        NodeId(n)
    }

    fn make_msg(dest: u32) -> Message {
        Message::new(MessageId(1), make_id(0), make_id(dest), 10, 60.0, SimTime::ZERO)
    }

    #[test]
    fn test_kind_reports_inner_engine() {
        assert_eq!(Engine::from(EpidemicEngine::new()).kind(), "epidemic");
        assert_eq!(Engine::from(ProphetEngine::with_defaults()).kind(), "prophet");
        assert_eq!(Engine::from(CommunityEngine::with_defaults()).kind(), "bubble-rap");
    }

    #[test]
    fn test_exchange_reaches_peer_of_same_kind() {
        let mut a = Engine::from(ProphetEngine::with_defaults());
        let mut b = Engine::from(ProphetEngine::with_defaults());
        a.exchange_on_new_connection(make_id(0), PeerMut::new(make_id(1), &mut b), SimTime::ZERO)
            .unwrap();

        let b = b.as_variant::<ProphetEngine>().unwrap();
        assert!(b.predictability(make_id(0), SimTime::ZERO) > 0.0);
    }

    #[test]
    fn test_mixed_engines_fail_at_access() {
        let mut a = Engine::from(ProphetEngine::with_defaults());
        let mut b = Engine::from(EpidemicEngine::new());

        let err = a
            .exchange_on_new_connection(make_id(0), PeerMut::new(make_id(1), &mut b), SimTime::ZERO)
            .unwrap_err();
        assert!(matches!(
            err,
            RoutingError::EngineMismatch { expected: "prophet", found: "epidemic" }
        ));

        // Epidemic never looks at peer state, so the reverse direction works
        let store = MessageStore::new(100);
        let peer_a = PeerRef::new(make_id(0), &a, &store);
        assert!(b.should_send_message_to_host(&make_msg(5), &peer_a, SimTime::ZERO).unwrap());
    }

    #[test]
    fn test_destination_short_circuits_before_peer_access() {
        let mut a = Engine::from(ProphetEngine::new(ProphetConfig::default()));
        let b = Engine::from(EpidemicEngine::new());
        let store = MessageStore::new(100);
        let peer_b = PeerRef::new(make_id(1), &b, &store);
        assert!(a.should_send_message_to_host(&make_msg(1), &peer_b, SimTime::ZERO).unwrap());
    }

    #[test]
    fn test_replication_keeps_variant() {
        let engine = Engine::from(SocialRankEngine::with_defaults());
        let replica = engine.clone_for_replication();
        assert!(replica.as_variant::<SocialRankEngine>().is_some());
        assert!(replica.as_variant::<ProphetEngine>().is_none());
    }
}
