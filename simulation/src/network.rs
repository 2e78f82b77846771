//! Contact network with timed transfers
//!
//! Drives a [`HostTable`] through time:
//! - Links come and go between host pairs
//! - Each link carries at most one transfer, taking `size / transmit_speed`
//! - Every host ticks once per `tick_interval`
//!
//! Transfers that complete and ticks that fall due at the same instant are
//! processed completions first, then ticks in host id order.

use std::collections::BTreeMap;

use ferry_core::{
    Clock, EventSink, Link, LinkId, ManualClock, Message, MessageId, NodeId, RoutingError,
    RoutingResult, SimTime, TransferStatus,
};
use ferry_routing::{DecisionEngine, HostTable, LinkLayer};
use tracing::{debug, trace};

/// Timing parameters of the contact network
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkConfig {
    /// Bytes per second on every link
    pub transmit_speed: f64,
    /// Seconds between host ticks
    pub tick_interval: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            transmit_speed: 250_000.0,
            tick_interval: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
struct InFlight {
    from: NodeId,
    to: NodeId,
    msg: Message,
    done_at: SimTime,
}

#[derive(Debug, Clone)]
struct LinkState {
    link: Link,
    transfer: Option<InFlight>,
}

/// The link table, lent to hosts as their [`LinkLayer`]
#[derive(Debug, Clone)]
pub struct LinkTable {
    links: BTreeMap<LinkId, LinkState>,
    transmit_speed: f64,
}

impl LinkTable {
    fn new(transmit_speed: f64) -> Self {
        Self {
            links: BTreeMap::new(),
            transmit_speed,
        }
    }

    /// The open link between `a` and `b`, if any
    pub fn between(&self, a: NodeId, b: NodeId) -> Option<&Link> {
        self.links
            .values()
            .map(|s| &s.link)
            .find(|l| l.connects(a) && l.connects(b))
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Id of the message in flight on `link`
    pub fn in_flight(&self, link: LinkId) -> Option<MessageId> {
        self.links.get(&link)?.transfer.as_ref().map(|t| t.msg.id)
    }

    /// Earliest pending completion
    fn next_completion(&self) -> Option<(SimTime, LinkId)> {
        self.links
            .iter()
            .filter_map(|(&id, s)| s.transfer.as_ref().map(|t| (t.done_at, id)))
            .min_by(|(ta, la), (tb, lb)| ta.total_cmp(tb).then(la.cmp(lb)))
    }
}

impl LinkLayer for LinkTable {
    fn is_ready_for_transfer(&self, link: LinkId) -> bool {
        self.links.get(&link).is_some_and(|s| s.transfer.is_none())
    }

    fn start_transfer(
        &mut self,
        link: LinkId,
        from: NodeId,
        to: NodeId,
        msg: Message,
        now: SimTime,
    ) -> TransferStatus {
        let speed = self.transmit_speed;
        let Some(state) = self.links.get_mut(&link) else {
            return TransferStatus::Busy;
        };
        if state.transfer.is_some() {
            return TransferStatus::Busy;
        }
        let done_at = now + msg.size as f64 / speed;
        trace!(%link, %from, %to, msg = %msg.id, %done_at, "transfer scheduled");
        state.transfer = Some(InFlight {
            from,
            to,
            msg,
            done_at,
        });
        TransferStatus::Started
    }
}

/// Hosts and the links between them
#[derive(Debug)]
pub struct Network<E> {
    hosts: HostTable<E>,
    links: LinkTable,
    config: NetworkConfig,
    clock: ManualClock,
    next_tick: SimTime,
    next_link: u64,
}

impl<E: DecisionEngine> Network<E> {
    pub fn new(hosts: HostTable<E>, config: NetworkConfig) -> Self {
        Self {
            hosts,
            links: LinkTable::new(config.transmit_speed),
            config,
            clock: ManualClock::new(),
            next_tick: SimTime::ZERO,
            next_link: 1,
        }
    }

    pub fn now(&self) -> SimTime {
        self.clock.now()
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn hosts(&self) -> &HostTable<E> {
        &self.hosts
    }

    pub fn hosts_mut(&mut self) -> &mut HostTable<E> {
        &mut self.hosts
    }

    pub fn links(&self) -> &LinkTable {
        &self.links
    }

    /// Create a message at `from`
    ///
    /// Returns `Ok(false)` if the host's engine rejected it.
    pub fn create_message<S: EventSink>(
        &mut self,
        id: MessageId,
        from: NodeId,
        to: NodeId,
        size: u64,
        ttl: f64,
        sink: &mut S,
    ) -> RoutingResult<bool> {
        let now = self.clock.now();
        let msg = Message::new(id, from, to, size, ttl, now);
        self.hosts
            .with_host(from, |host, others| {
                host.on_local_message_created(msg, &*others, sink, now)
            })?
    }

    /// Bring up a link between `a` and `b`
    ///
    /// An already open pair keeps its link.
    pub fn link_up(&mut self, a: NodeId, b: NodeId) -> RoutingResult<LinkId> {
        if let Some(link) = self.links.between(a, b) {
            return Ok(link.id);
        }
        for end in [a, b] {
            if !self.hosts.contains(end) {
                return Err(RoutingError::UnknownPeer(end));
            }
        }

        let link = Link::new(LinkId(self.next_link), a, b);
        self.next_link += 1;
        self.links.links.insert(
            link.id,
            LinkState {
                link,
                transfer: None,
            },
        );
        let now = self.clock.now();
        for end in [a, b] {
            self.hosts
                .with_host(end, |host, others| host.on_link_up(&link, others, now))??;
        }
        debug!(link = %link.id, %a, %b, %now, "link up");
        Ok(link.id)
    }

    /// Tear down the link between `a` and `b`, aborting its transfer
    pub fn link_down<S: EventSink>(&mut self, a: NodeId, b: NodeId, sink: &mut S) -> RoutingResult<()> {
        let Some(id) = self.links.between(a, b).map(|l| l.id) else {
            return Ok(());
        };
        let Some(state) = self.links.links.remove(&id) else {
            return Ok(());
        };
        let now = self.clock.now();
        if let Some(transfer) = state.transfer {
            self.hosts
                .with_host(transfer.from, |host, _| host.on_transfer_aborted(id, sink, now))?;
        }
        for end in [state.link.a, state.link.b] {
            self.hosts.with_host(end, |host, _| host.on_link_down(id, now))?;
        }
        debug!(link = %id, %a, %b, %now, "link down");
        Ok(())
    }

    /// Run completions and ticks up to and including `t`
    pub fn advance_to<S: EventSink>(&mut self, t: SimTime, sink: &mut S) -> RoutingResult<()> {
        loop {
            match self.links.next_completion() {
                Some((done_at, link)) if done_at <= self.next_tick && done_at <= t => {
                    self.clock.advance_to(done_at);
                    self.complete(link, sink)?;
                }
                _ if self.next_tick <= t => {
                    self.clock.advance_to(self.next_tick);
                    self.tick_all(sink)?;
                    self.next_tick = self.next_tick + self.config.tick_interval;
                }
                _ => break,
            }
        }
        self.clock.advance_to(t);
        Ok(())
    }

    /// Tick every host once at the current time
    fn tick_all<S: EventSink>(&mut self, sink: &mut S) -> RoutingResult<()> {
        let now = self.clock.now();
        let ids: Vec<NodeId> = self.hosts.ids().collect();
        let links = &mut self.links;
        for id in ids {
            self.hosts
                .with_host(id, |host, others| host.on_tick(&*others, links, sink, now))??;
        }
        Ok(())
    }

    fn complete<S: EventSink>(&mut self, link: LinkId, sink: &mut S) -> RoutingResult<()> {
        let Some(transfer) = self
            .links
            .links
            .get_mut(&link)
            .and_then(|s| s.transfer.take())
        else {
            return Ok(());
        };
        let now = self.clock.now();
        let InFlight { from, to, msg, .. } = transfer;
        trace!(%link, %from, %to, msg = %msg.id, %now, "transfer complete");

        self.hosts.with_host(to, |host, others| {
            host.on_message_received(msg, link, &*others, sink, now)
        })??;
        self.hosts
            .with_host(from, |host, others| host.on_transfer_done(link, &*others, sink, now))??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::RouterEvent;
    use ferry_routing::{EpidemicEngine, ForwardingConfig, ForwardingEngine};

    fn make_id(n: u32) -> NodeId {
        NodeId(n)
    }

    fn at(secs: f64) -> SimTime {
        SimTime::from_secs(secs)
    }

    fn network(count: u32) -> Network<EpidemicEngine> {
        let proto = ForwardingEngine::new(make_id(0), EpidemicEngine::new(), ForwardingConfig::default());
        Network::new(
            HostTable::replicated(&proto, count),
            NetworkConfig {
                transmit_speed: 100.0,
                tick_interval: 1.0,
            },
        )
    }

    #[test]
    fn test_transfer_takes_size_over_speed() {
        let mut net = network(2);
        let mut events = Vec::new();
        net.create_message(MessageId(1), make_id(0), make_id(1), 300, 600.0, &mut events)
            .unwrap();
        let link = net.link_up(make_id(0), make_id(1)).unwrap();

        net.advance_to(at(2.0), &mut events).unwrap();
        assert_eq!(net.links().in_flight(link), Some(MessageId(1)));
        assert!(!net.hosts().get(make_id(1)).unwrap().has_delivered(MessageId(1)));

        net.advance_to(at(3.0), &mut events).unwrap();
        assert_eq!(net.links().in_flight(link), None);
        assert!(net.hosts().get(make_id(1)).unwrap().has_delivered(MessageId(1)));
    }

    #[test]
    fn test_link_down_aborts_transfer() {
        let mut net = network(3);
        let mut events = Vec::new();
        net.create_message(MessageId(1), make_id(0), make_id(2), 1000, 600.0, &mut events)
            .unwrap();
        net.link_up(make_id(0), make_id(1)).unwrap();
        net.advance_to(at(4.0), &mut events).unwrap();

        net.link_down(make_id(0), make_id(1), &mut events).unwrap();
        assert!(net.links().is_empty());
        assert!(events
            .iter()
            .any(|e| matches!(e, RouterEvent::TransferAborted { .. })));
        assert!(!net.hosts().get(make_id(1)).unwrap().store().contains(&MessageId(1)));
        assert!(net.hosts().get(make_id(0)).unwrap().sending().is_none());
    }

    #[test]
    fn test_link_up_is_idempotent() {
        let mut net = network(2);
        let first = net.link_up(make_id(0), make_id(1)).unwrap();
        let second = net.link_up(make_id(1), make_id(0)).unwrap();
        assert_eq!(first, second);
        assert_eq!(net.links().len(), 1);
    }

    #[test]
    fn test_unknown_host_rejected() {
        let mut net = network(2);
        assert!(matches!(
            net.link_up(make_id(0), make_id(9)),
            Err(RoutingError::UnknownPeer(_))
        ));
        assert!(net.links().is_empty());
    }

    #[test]
    fn test_relay_through_middle_host() {
        let mut net = network(3);
        let mut events = Vec::new();
        net.create_message(MessageId(1), make_id(0), make_id(2), 100, 600.0, &mut events)
            .unwrap();
        net.link_up(make_id(0), make_id(1)).unwrap();
        net.advance_to(at(2.0), &mut events).unwrap();
        net.link_down(make_id(0), make_id(1), &mut events).unwrap();

        net.advance_to(at(10.0), &mut events).unwrap();
        net.link_up(make_id(1), make_id(2)).unwrap();
        net.advance_to(at(12.0), &mut events).unwrap();

        assert!(net.hosts().get(make_id(2)).unwrap().has_delivered(MessageId(1)));
        let delivered = events.iter().find_map(|e| match e {
            RouterEvent::MessageDelivered { hops, .. } => Some(*hops),
            _ => None,
        });
        assert_eq!(delivered, Some(2));
    }
}
