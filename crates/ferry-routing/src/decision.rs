//! The decision-engine contract
//!
//! A [`DecisionEngine`] is the routing algorithm a host runs. The
//! [`ForwardingEngine`](crate::ForwardingEngine) owns one per host and asks
//! it yes/no questions as contacts come and go and messages arrive.
//!
//! Engines read each other's state only through [`PeerRef`] (read-only) and
//! [`PeerMut`] (during the once-per-contact exchange). Both carry the peer's
//! engine only when it runs the same algorithm; an engine that needs peer
//! state and finds a different algorithm gets
//! [`RoutingError::EngineMismatch`] from [`PeerRef::engine`].

use std::collections::BTreeSet;

use ferry_core::{
    Message, MessageId, MessageStore, NodeId, RoutingError, RoutingResult, SimTime,
};

use crate::eviction::{NoStats, QueueingPolicy};

/// Read-only view of a peer host
pub struct PeerRef<'a, E> {
    id: NodeId,
    engine: Option<&'a E>,
    kind: &'static str,
    store: &'a MessageStore,
}

impl<E> Clone for PeerRef<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for PeerRef<'_, E> {}

impl<'a, E: DecisionEngine> PeerRef<'a, E> {
    /// View of a peer running `engine`
    pub fn new(id: NodeId, engine: &'a E, store: &'a MessageStore) -> Self {
        Self {
            id,
            engine: Some(engine),
            kind: engine.kind(),
            store,
        }
    }

    /// The peer's engine, if it runs the same algorithm as the caller
    pub fn engine(&self) -> RoutingResult<&'a E> {
        self.engine.ok_or(RoutingError::EngineMismatch {
            expected: E::NAME,
            found: self.kind,
        })
    }
}

impl<'a, E> PeerRef<'a, E> {
    /// View of a peer whose engine is not visible to the caller
    pub fn foreign(id: NodeId, kind: &'static str, store: &'a MessageStore) -> Self {
        Self {
            id,
            engine: None,
            kind,
            store,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Name of the algorithm the peer runs
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn store(&self) -> &'a MessageStore {
        self.store
    }

    pub fn has_message(&self, id: &MessageId) -> bool {
        self.store.contains(id)
    }

    /// Re-type the view, keeping the engine only if `pick` recognises it
    pub fn project<T>(&self, pick: impl FnOnce(&'a E) -> Option<&'a T>) -> PeerRef<'a, T> {
        PeerRef {
            id: self.id,
            engine: self.engine.and_then(pick),
            kind: self.kind,
            store: self.store,
        }
    }
}

/// Mutable view of a peer, handed out only during the connection exchange
pub struct PeerMut<'a, E> {
    id: NodeId,
    engine: Option<&'a mut E>,
    kind: &'static str,
}

impl<'a, E: DecisionEngine> PeerMut<'a, E> {
    pub fn new(id: NodeId, engine: &'a mut E) -> Self {
        let kind = engine.kind();
        Self {
            id,
            engine: Some(engine),
            kind,
        }
    }

    /// The peer's engine, if it runs the same algorithm as the caller
    pub fn engine_mut(&mut self) -> RoutingResult<&mut E> {
        let kind = self.kind;
        self.engine.as_deref_mut().ok_or(RoutingError::EngineMismatch {
            expected: E::NAME,
            found: kind,
        })
    }
}

impl<'a, E> PeerMut<'a, E> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Re-type the view, keeping the engine only if `pick` recognises it
    pub fn project<T>(self, pick: impl FnOnce(&'a mut E) -> Option<&'a mut T>) -> PeerMut<'a, T> {
        PeerMut {
            id: self.id,
            engine: self.engine.and_then(pick),
            kind: self.kind,
        }
    }
}

/// Capability set every routing algorithm implements
///
/// All callbacks run synchronously inside the simulation event that
/// triggered them. Time is passed in explicitly; engines never read a clock.
pub trait DecisionEngine: Sized {
    /// Registry name of the algorithm
    const NAME: &'static str;

    /// Name of the algorithm this instance runs
    fn kind(&self) -> &'static str {
        Self::NAME
    }

    /// A contact with `peer` came up
    fn connection_up(&mut self, _this_host: NodeId, _peer: NodeId, _now: SimTime) {}

    /// A contact with `peer` went down
    fn connection_down(&mut self, _this_host: NodeId, _peer: NodeId, _now: SimTime) {}

    /// Exchange routing state with a newly connected peer
    ///
    /// Called exactly once per contact, on one endpoint only. The
    /// implementation updates both itself and `peer`.
    fn exchange_on_new_connection(
        &mut self,
        this_host: NodeId,
        peer: PeerMut<'_, Self>,
        now: SimTime,
    ) -> RoutingResult<()>;

    /// A message is being created at this host. `false` rejects it.
    fn new_message(&mut self, msg: &mut Message, now: SimTime) -> RoutingResult<bool>;

    /// Whether `host` is the final recipient of `msg`
    fn is_final_dest(&self, msg: &Message, host: NodeId) -> bool {
        msg.destination == host
    }

    /// Whether to keep a copy of a received message
    fn should_save_received_message(
        &mut self,
        msg: &mut Message,
        this_host: NodeId,
        now: SimTime,
    ) -> RoutingResult<bool>;

    /// Whether `msg` should be offered to `peer`
    fn should_send_message_to_host(
        &mut self,
        msg: &Message,
        peer: &PeerRef<'_, Self>,
        now: SimTime,
    ) -> RoutingResult<bool>;

    /// Whether to drop our copy after sending it to `peer`
    fn should_delete_sent_message(
        &mut self,
        msg: &mut Message,
        peer: &PeerRef<'_, Self>,
        now: SimTime,
    ) -> RoutingResult<bool>;

    /// Whether to drop our copy after `reporter` refused it as delivered or
    /// already held
    fn should_delete_old_message(
        &mut self,
        msg: &Message,
        reporter: &PeerRef<'_, Self>,
        now: SimTime,
    ) -> RoutingResult<bool>;

    /// Periodic housekeeping, run once per host tick
    fn periodic_update(&mut self, _this_host: NodeId, _now: SimTime) {}

    /// A fresh instance for another host, sharing configuration
    fn clone_for_replication(&self) -> Self;

    /// `msg` was handed over to `receiver`, before the delete decision
    fn message_forwarded(
        &mut self,
        _msg: &Message,
        _receiver: &PeerRef<'_, Self>,
        _now: SimTime,
    ) -> RoutingResult<()> {
        Ok(())
    }

    /// `id` left the local buffer
    fn message_removed(&mut self, _id: MessageId) {}

    /// Pick the message to evict when the buffer is full
    ///
    /// Messages in `excluded` are mid-transfer and must not be chosen.
    fn select_eviction_victim(
        &mut self,
        store: &MessageStore,
        excluded: &BTreeSet<MessageId>,
        now: SimTime,
    ) -> Option<MessageId> {
        QueueingPolicy::FifoDrop.select_victim(
            store.iter().filter(|m| !excluded.contains(&m.id)),
            &NoStats,
            now,
        )
    }

    /// Sort key for candidate `(msg, peer)`, higher goes first
    ///
    /// `None` everywhere leaves the candidate list in insertion order.
    fn forwarding_priority(
        &mut self,
        _msg: &Message,
        _peer: &PeerRef<'_, Self>,
        _now: SimTime,
    ) -> RoutingResult<Option<f64>> {
        Ok(None)
    }
}
