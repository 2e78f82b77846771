//! Per-host forwarding state
//!
//! [`ForwardingEngine`] turns contact and message events into a live list of
//! `(message, link)` sending opportunities, asking the host's
//! [`DecisionEngine`] at each step. Candidates are added and removed as
//! events arrive; the list is never rebuilt from scratch.
//!
//! The engine never owns other hosts. Peer state comes from a
//! [`PeerDirectory`], and transfers are handed to a [`LinkLayer`].

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use ferry_core::{
    DenyReason, DropReason, EventSink, Link, LinkId, Message, MessageId, MessageStore, NodeId,
    RouterEvent, RoutingError, RoutingResult, SimTime, TransferStatus,
};
use tracing::{debug, info, trace, warn};

use crate::ForwardingConfig;
use crate::decision::{DecisionEngine, PeerMut, PeerRef};
use crate::eviction::compare_queue_order;

/// Lookup of other hosts' forwarding state
pub trait PeerDirectory<E> {
    fn host(&self, id: NodeId) -> Option<&ForwardingEngine<E>>;
    fn host_mut(&mut self, id: NodeId) -> Option<&mut ForwardingEngine<E>>;
}

/// The transfer machinery a host sends through
pub trait LinkLayer {
    /// Whether `link` can start a transfer now
    fn is_ready_for_transfer(&self, link: LinkId) -> bool;

    /// Start sending `msg` over `link`
    ///
    /// Returns [`TransferStatus::Busy`] if the link cannot take it.
    fn start_transfer(
        &mut self,
        link: LinkId,
        from: NodeId,
        to: NodeId,
        msg: Message,
        now: SimTime,
    ) -> TransferStatus;
}

/// A message that could be sent over a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardCandidate {
    pub message: MessageId,
    pub link: LinkId,
    pub peer: NodeId,
}

/// The one transfer a host may have in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutgoingTransfer {
    pub message: MessageId,
    pub link: LinkId,
    pub peer: NodeId,
}

/// Forwarding state for one host
#[derive(Debug, Clone)]
pub struct ForwardingEngine<E> {
    host: NodeId,
    engine: E,
    store: MessageStore,
    config: ForwardingConfig,
    /// Open links and the peer at their far end
    links: BTreeMap<LinkId, NodeId>,
    /// Links whose paired exchange already ran
    exchanged: BTreeSet<LinkId>,
    candidates: Vec<ForwardCandidate>,
    tombstones: BTreeSet<MessageId>,
    /// Messages delivered here, as final destination
    delivered: BTreeSet<MessageId>,
    sending: Option<OutgoingTransfer>,
}

impl<E: DecisionEngine> ForwardingEngine<E> {
    pub fn new(host: NodeId, engine: E, config: ForwardingConfig) -> Self {
        Self {
            host,
            engine,
            store: MessageStore::new(config.capacity),
            config,
            links: BTreeMap::new(),
            exchanged: BTreeSet::new(),
            candidates: Vec::new(),
            tombstones: BTreeSet::new(),
            delivered: BTreeSet::new(),
            sending: None,
        }
    }

    /// A fresh host with this host's engine configuration and no state
    pub fn replicate(&self, host: NodeId) -> Self {
        Self::new(host, self.engine.clone_for_replication(), self.config.clone())
    }

    pub fn host(&self) -> NodeId {
        self.host
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn config(&self) -> &ForwardingConfig {
        &self.config
    }

    pub fn candidates(&self) -> &[ForwardCandidate] {
        &self.candidates
    }

    pub fn sending(&self) -> Option<OutgoingTransfer> {
        self.sending
    }

    pub fn is_tombstoned(&self, id: MessageId) -> bool {
        self.tombstones.contains(&id)
    }

    pub fn tombstones(&self) -> &BTreeSet<MessageId> {
        &self.tombstones
    }

    pub fn has_delivered(&self, id: MessageId) -> bool {
        self.delivered.contains(&id)
    }

    pub fn has_exchanged(&self, link: LinkId) -> bool {
        self.exchanged.contains(&link)
    }

    /// Open links and their peers
    pub fn links(&self) -> impl Iterator<Item = (LinkId, NodeId)> + '_ {
        self.links.iter().map(|(&l, &p)| (l, p))
    }

    /// Read-only view of this host for other hosts' engines
    pub fn peer_view(&self) -> PeerRef<'_, E> {
        PeerRef::new(self.host, &self.engine, &self.store)
    }

    /// Accept a message created at this host
    ///
    /// Returns `Ok(false)` if the engine rejected it.
    pub fn on_local_message_created<P, S>(
        &mut self,
        mut msg: Message,
        peers: &P,
        sink: &mut S,
        now: SimTime,
    ) -> RoutingResult<bool>
    where
        P: PeerDirectory<E>,
        S: EventSink,
    {
        if !self.engine.new_message(&mut msg, now)? {
            debug!(host = %self.host, msg = %msg.id, "engine rejected new message");
            return Ok(false);
        }
        self.make_room(msg.size, sink, now)?;
        let id = msg.id;
        self.store.insert(msg)?;
        sink.record(RouterEvent::MessageCreated {
            id,
            at: self.host,
            time: now,
        });

        let links: Vec<_> = self.links().collect();
        for (link, peer) in links {
            self.offer(id, link, peer, peers, now)?;
        }
        Ok(true)
    }

    /// A link touching this host came up
    pub fn on_link_up<P: PeerDirectory<E>>(
        &mut self,
        link: &Link,
        peers: &mut P,
        now: SimTime,
    ) -> RoutingResult<()> {
        let peer = link
            .other_endpoint(self.host)
            .ok_or(RoutingError::UnknownLink(link.id))?;
        self.links.insert(link.id, peer);
        self.engine.connection_up(self.host, peer, now);

        if !self.exchanged.contains(&link.id) {
            let other = peers.host_mut(peer).ok_or(RoutingError::UnknownPeer(peer))?;
            self.engine
                .exchange_on_new_connection(self.host, PeerMut::new(peer, &mut other.engine), now)?;
            other.exchanged.insert(link.id);
            self.exchanged.insert(link.id);
            debug!(host = %self.host, %peer, link = %link.id, "paired exchange done");
        }

        for id in self.store.ids() {
            self.offer(id, link.id, peer, &*peers, now)?;
        }
        Ok(())
    }

    /// A link touching this host went down
    pub fn on_link_down(&mut self, link: LinkId, now: SimTime) {
        let Some(peer) = self.links.remove(&link) else {
            return;
        };
        self.engine.connection_down(self.host, peer, now);
        self.exchanged.remove(&link);
        self.candidates.retain(|c| c.link != link);
        if self.sending.is_some_and(|t| t.link == link) {
            self.sending = None;
        }
        trace!(host = %self.host, %peer, %link, "link down");
    }

    /// How this host answers an offer of `msg`
    pub fn check_incoming(&self, msg: &Message, now: SimTime) -> TransferStatus {
        let denied = if self.delivered.contains(&msg.id) || self.tombstones.contains(&msg.id) {
            Some(DenyReason::Delivered)
        } else if self.store.contains(&msg.id) {
            Some(DenyReason::Old)
        } else if msg.is_expired(now) {
            Some(DenyReason::Expired)
        } else if msg.size > self.store.capacity() {
            Some(DenyReason::NoSpace)
        } else {
            None
        };
        denied.map_or(TransferStatus::Started, TransferStatus::Denied)
    }

    /// A transfer to this host completed
    pub fn on_message_received<P, S>(
        &mut self,
        mut msg: Message,
        from_link: LinkId,
        peers: &P,
        sink: &mut S,
        now: SimTime,
    ) -> RoutingResult<()>
    where
        P: PeerDirectory<E>,
        S: EventSink,
    {
        let from = msg.hops.last().copied().unwrap_or(msg.source);
        msg.arrive(self.host, now);
        let id = msg.id;
        let is_final = self.engine.is_final_dest(&msg, self.host);

        if is_final && self.delivered.insert(id) {
            let latency = now.since(msg.created_at);
            info!(host = %self.host, msg = %id, hops = msg.hop_count(), latency, "delivered");
            sink.record(RouterEvent::MessageDelivered {
                id,
                from,
                to: self.host,
                hops: msg.hop_count(),
                latency,
                time: now,
            });
        }

        let keep = (!is_final || self.config.keep_delivered)
            && self
                .engine
                .should_save_received_message(&mut msg, self.host, now)?;
        if !keep || self.store.contains(&id) {
            return Ok(());
        }

        if let Err(err) = self.make_room(msg.size, sink, now) {
            warn!(host = %self.host, msg = %id, %err, "no room for received message");
            sink.record(RouterEvent::dropped(id, self.host, DropReason::BufferFull, now));
            return Ok(());
        }
        self.store.insert(msg)?;
        if !is_final {
            sink.record(RouterEvent::MessageRelayed {
                id,
                from,
                to: self.host,
                time: now,
            });
        }

        let links: Vec<_> = self.links().filter(|&(l, _)| l != from_link).collect();
        for (link, peer) in links {
            self.offer(id, link, peer, peers, now)?;
        }
        Ok(())
    }

    /// The receiver on `link` refused `id`
    pub fn on_transfer_denied<P, S>(
        &mut self,
        id: MessageId,
        link: LinkId,
        reason: DenyReason,
        peers: &P,
        sink: &mut S,
        now: SimTime,
    ) -> RoutingResult<()>
    where
        P: PeerDirectory<E>,
        S: EventSink,
    {
        self.candidates
            .retain(|c| !(c.message == id && c.link == link));
        trace!(host = %self.host, msg = %id, %link, %reason, "transfer denied");

        if self.config.tombstones && reason == DenyReason::Delivered {
            self.tombstones.insert(id);
            if self.remove_message(id) {
                sink.record(RouterEvent::dropped(id, self.host, DropReason::Tombstoned, now));
            }
            return Ok(());
        }
        if !self.config.delete_delivered || !reason.is_duplicate() {
            return Ok(());
        }
        let Some(&peer) = self.links.get(&link) else {
            return Ok(());
        };
        let Some(msg) = self.store.get(&id) else {
            return Ok(());
        };
        let reporter = peers.host(peer).ok_or(RoutingError::UnknownPeer(peer))?;
        if self
            .engine
            .should_delete_old_message(msg, &reporter.peer_view(), now)?
        {
            self.delete_message(id, sink, now);
        }
        Ok(())
    }

    /// The in-flight transfer on `link` completed
    ///
    /// Call after the receiver has processed the message.
    pub fn on_transfer_done<P, S>(
        &mut self,
        link: LinkId,
        peers: &P,
        sink: &mut S,
        now: SimTime,
    ) -> RoutingResult<()>
    where
        P: PeerDirectory<E>,
        S: EventSink,
    {
        let Some(transfer) = self.sending.take_if(|t| t.link == link) else {
            return Ok(());
        };
        let id = transfer.message;
        self.candidates
            .retain(|c| !(c.message == id && c.link == link));

        let receiver = peers
            .host(transfer.peer)
            .ok_or(RoutingError::UnknownPeer(transfer.peer))?;
        let view = receiver.peer_view();
        let Some(msg) = self.store.get_mut(&id) else {
            return Ok(());
        };
        self.engine.message_forwarded(msg, &view, now)?;
        if self.engine.should_delete_sent_message(msg, &view, now)? {
            self.delete_message(id, sink, now);
        }
        Ok(())
    }

    /// The in-flight transfer on `link` was cut off
    pub fn on_transfer_aborted<S: EventSink>(&mut self, link: LinkId, sink: &mut S, now: SimTime) {
        let Some(transfer) = self.sending.take_if(|t| t.link == link) else {
            return;
        };
        debug!(host = %self.host, msg = %transfer.message, %link, "transfer aborted");
        sink.record(RouterEvent::TransferAborted {
            id: transfer.message,
            from: self.host,
            to: transfer.peer,
            time: now,
        });
    }

    /// Periodic work: expiry, engine upkeep, and at most one new transfer
    pub fn on_tick<P, L, S>(
        &mut self,
        peers: &P,
        links: &mut L,
        sink: &mut S,
        now: SimTime,
    ) -> RoutingResult<Option<OutgoingTransfer>>
    where
        P: PeerDirectory<E>,
        L: LinkLayer,
        S: EventSink,
    {
        self.drop_expired(sink, now);
        self.engine.periodic_update(self.host, now);
        let store = &self.store;
        self.candidates.retain(|c| store.contains(&c.message));

        if self.sending.is_some() || self.candidates.is_empty() {
            return Ok(None);
        }
        self.order_candidates(peers, now)?;

        // Denials may delete messages, so walk a snapshot of the order
        let order = self.candidates.clone();
        for candidate in order {
            if !self.candidates.contains(&candidate)
                || !links.is_ready_for_transfer(candidate.link)
            {
                continue;
            }
            let Some(msg) = self.store.get(&candidate.message) else {
                continue;
            };
            let receiver = peers
                .host(candidate.peer)
                .ok_or(RoutingError::UnknownPeer(candidate.peer))?;
            if let TransferStatus::Denied(reason) = receiver.check_incoming(msg, now) {
                self.on_transfer_denied(candidate.message, candidate.link, reason, peers, sink, now)?;
                continue;
            }
            let status = links.start_transfer(
                candidate.link,
                self.host,
                candidate.peer,
                msg.clone(),
                now,
            );
            if status.is_started() {
                let transfer = OutgoingTransfer {
                    message: candidate.message,
                    link: candidate.link,
                    peer: candidate.peer,
                };
                self.sending = Some(transfer);
                sink.record(RouterEvent::TransferStarted {
                    id: candidate.message,
                    from: self.host,
                    to: candidate.peer,
                    link: candidate.link,
                    time: now,
                });
                trace!(host = %self.host, msg = %candidate.message, peer = %candidate.peer, "transfer started");
                return Ok(Some(transfer));
            }
        }
        Ok(None)
    }

    /// Evict until `size` bytes are free
    ///
    /// The message in flight is never chosen. Fails without evicting anything
    /// if `size` exceeds the whole buffer.
    pub fn make_room<S: EventSink>(
        &mut self,
        size: u64,
        sink: &mut S,
        now: SimTime,
    ) -> RoutingResult<()> {
        if size > self.store.capacity() {
            return Err(RoutingError::EvictionExhausted {
                needed: size,
                free: self.store.free_space(),
            });
        }
        let excluded: BTreeSet<MessageId> = self.sending.iter().map(|t| t.message).collect();
        while self.store.free_space() < size {
            let Some(victim) = self
                .engine
                .select_eviction_victim(&self.store, &excluded, now)
            else {
                warn!(host = %self.host, needed = size, free = self.store.free_space(), "eviction exhausted");
                return Err(RoutingError::EvictionExhausted {
                    needed: size,
                    free: self.store.free_space(),
                });
            };
            debug!(host = %self.host, msg = %victim, "evicting");
            self.remove_message(victim);
            sink.record(RouterEvent::dropped(victim, self.host, DropReason::Evicted, now));
        }
        Ok(())
    }

    /// Remove `id` by routing policy
    pub fn delete_message<S: EventSink>(&mut self, id: MessageId, sink: &mut S, now: SimTime) {
        if self.remove_message(id) {
            debug!(host = %self.host, msg = %id, "message deleted");
            sink.record(RouterEvent::MessageDeleted {
                id,
                at: self.host,
                time: now,
            });
        }
    }

    /// Drop every message whose TTL ran out
    pub fn drop_expired<S: EventSink>(&mut self, sink: &mut S, now: SimTime) {
        let expired: Vec<MessageId> = self
            .store
            .iter()
            .filter(|m| m.is_expired(now))
            .map(|m| m.id)
            .collect();
        for id in expired {
            self.remove_message(id);
            sink.record(RouterEvent::dropped(id, self.host, DropReason::Expired, now));
        }
    }

    fn remove_message(&mut self, id: MessageId) -> bool {
        if self.store.remove(&id).is_none() {
            return false;
        }
        self.candidates.retain(|c| c.message != id);
        self.engine.message_removed(id);
        true
    }

    /// Ask the engine whether `id` should go to `peer` over `link`
    fn offer<P: PeerDirectory<E>>(
        &mut self,
        id: MessageId,
        link: LinkId,
        peer: NodeId,
        peers: &P,
        now: SimTime,
    ) -> RoutingResult<()> {
        let Some(msg) = self.store.get(&id) else {
            return Ok(());
        };
        if self
            .candidates
            .iter()
            .any(|c| c.message == id && c.link == link)
        {
            return Ok(());
        }
        let other = peers.host(peer).ok_or(RoutingError::UnknownPeer(peer))?;
        if self
            .engine
            .should_send_message_to_host(msg, &other.peer_view(), now)?
        {
            trace!(host = %self.host, msg = %id, %peer, "candidate added");
            self.candidates.push(ForwardCandidate {
                message: id,
                link,
                peer,
            });
        }
        Ok(())
    }

    /// Stable-sort candidates by engine priority, then queue order
    ///
    /// Engines that report no priority leave the list as it is.
    fn order_candidates<P: PeerDirectory<E>>(&mut self, peers: &P, now: SimTime) -> RoutingResult<()> {
        let mut keyed = Vec::with_capacity(self.candidates.len());
        let mut any_priority = false;
        for candidate in &self.candidates {
            let (Some(msg), Some(other)) =
                (self.store.get(&candidate.message), peers.host(candidate.peer))
            else {
                keyed.push((None, *candidate));
                continue;
            };
            let priority = self
                .engine
                .forwarding_priority(msg, &other.peer_view(), now)?;
            any_priority |= priority.is_some();
            keyed.push((priority, *candidate));
        }
        if !any_priority {
            return Ok(());
        }

        let store = &self.store;
        keyed.sort_by(|(pa, a), (pb, b)| {
            let by_priority = match (pa, pb) {
                (Some(x), Some(y)) => y.total_cmp(x),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            by_priority.then_with(|| match (store.get(&a.message), store.get(&b.message)) {
                (Some(ma), Some(mb)) => compare_queue_order(ma, mb),
                _ => Ordering::Equal,
            })
        });
        self.candidates = keyed.into_iter().map(|(_, c)| c).collect();
        Ok(())
    }
}
