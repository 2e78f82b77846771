//! Host table and split borrowing
//!
//! Every host's [`ForwardingEngine`] lives in one [`HostTable`]. To run an
//! event at one host while it reads or updates its peers, the table lends
//! out that host mutably together with an [`OtherHosts`] view of the rest.

use std::collections::BTreeMap;

use ferry_core::{NodeId, RoutingError, RoutingResult};

use crate::decision::DecisionEngine;
use crate::forwarding::{ForwardingEngine, PeerDirectory};

/// All hosts in a run, by id
#[derive(Debug, Clone)]
pub struct HostTable<E> {
    hosts: BTreeMap<NodeId, ForwardingEngine<E>>,
}

impl<E> Default for HostTable<E> {
    fn default() -> Self {
        Self {
            hosts: BTreeMap::new(),
        }
    }
}

impl<E: DecisionEngine> HostTable<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build `count` hosts `n0..` by replicating `prototype`
    pub fn replicated(prototype: &ForwardingEngine<E>, count: u32) -> Self {
        let mut table = Self::new();
        for id in NodeId::range(count) {
            table.insert(prototype.replicate(id));
        }
        table
    }

    /// Add a host, replacing any with the same id
    pub fn insert(&mut self, host: ForwardingEngine<E>) -> Option<ForwardingEngine<E>> {
        self.hosts.insert(host.host(), host)
    }

    pub fn get(&self, id: NodeId) -> Option<&ForwardingEngine<E>> {
        self.hosts.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut ForwardingEngine<E>> {
        self.hosts.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.hosts.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.hosts.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ForwardingEngine<E>> {
        self.hosts.values()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Run `f` on host `id` with every other host reachable as peers
    pub fn with_host<R>(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut ForwardingEngine<E>, &mut OtherHosts<'_, E>) -> R,
    ) -> RoutingResult<R> {
        let mut host = self.hosts.remove(&id).ok_or(RoutingError::UnknownPeer(id))?;
        let result = f(&mut host, &mut OtherHosts { hosts: &mut self.hosts });
        self.hosts.insert(id, host);
        Ok(result)
    }
}

impl<E> PeerDirectory<E> for HostTable<E> {
    fn host(&self, id: NodeId) -> Option<&ForwardingEngine<E>> {
        self.hosts.get(&id)
    }

    fn host_mut(&mut self, id: NodeId) -> Option<&mut ForwardingEngine<E>> {
        self.hosts.get_mut(&id)
    }
}

/// Every host except the one currently lent out
pub struct OtherHosts<'a, E> {
    hosts: &'a mut BTreeMap<NodeId, ForwardingEngine<E>>,
}

impl<E> PeerDirectory<E> for OtherHosts<'_, E> {
    fn host(&self, id: NodeId) -> Option<&ForwardingEngine<E>> {
        self.hosts.get(&id)
    }

    fn host_mut(&mut self, id: NodeId) -> Option<&mut ForwardingEngine<E>> {
        self.hosts.get_mut(&id)
    }
}
