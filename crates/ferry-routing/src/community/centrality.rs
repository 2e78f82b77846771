//! Windowed degree centrality

use std::collections::{BTreeMap, BTreeSet};

use ferry_core::{NodeId, SimTime};

/// One finished contact
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactInterval {
    pub start: SimTime,
    pub end: SimTime,
}

impl ContactInterval {
    pub fn duration(&self) -> f64 {
        self.end.since(self.start)
    }
}

/// Finished contacts per peer, oldest first
pub type ContactHistory = BTreeMap<NodeId, Vec<ContactInterval>>;

/// Average number of distinct peers met per epoch
///
/// Time before `now` is cut into `epoch_count` epochs of `time_window`
/// seconds. A contact counts towards the epoch its end falls in, and each
/// peer counts at most once per epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowCentrality {
    pub time_window: f64,
    pub epoch_count: usize,
}

impl WindowCentrality {
    pub fn global(&self, history: &ContactHistory, now: SimTime) -> f64 {
        self.compute(history, |_| true, now)
    }

    /// Centrality counting only peers for which `member` holds
    pub fn local(
        &self,
        history: &ContactHistory,
        member: impl Fn(NodeId) -> bool,
        now: SimTime,
    ) -> f64 {
        self.compute(history, member, now)
    }

    /// Seconds before `now` that still count towards some epoch
    pub fn span(&self) -> f64 {
        self.time_window * self.epoch_count as f64
    }

    /// Drop contacts that ended too long ago to land in any epoch
    pub fn prune(&self, history: &mut ContactHistory, now: SimTime) {
        let span = self.span();
        history.retain(|_, contacts| {
            contacts.retain(|c| now.since(c.end) < span);
            !contacts.is_empty()
        });
    }

    fn compute(
        &self,
        history: &ContactHistory,
        include: impl Fn(NodeId) -> bool,
        now: SimTime,
    ) -> f64 {
        if self.epoch_count == 0 {
            return 0.0;
        }
        let mut counted: Vec<BTreeSet<NodeId>> = vec![BTreeSet::new(); self.epoch_count];
        for (&peer, contacts) in history {
            if !include(peer) {
                continue;
            }
            for contact in contacts {
                let elapsed = now.as_secs() - contact.end.as_secs();
                if elapsed < 0.0 {
                    continue;
                }
                let epoch = (elapsed / self.time_window).floor() as usize;
                if let Some(seen) = counted.get_mut(epoch) {
                    seen.insert(peer);
                }
            }
        }
        let total: usize = counted.iter().map(BTreeSet::len).sum();
        total as f64 / self.epoch_count as f64
    }
}
