//! Run statistics
//!
//! [`SimStats`] is an [`EventSink`] that folds router events into the usual
//! delivery report: ratios, latency and hop counts.

use std::collections::BTreeMap;
use std::fmt;

use ferry_core::{DropReason, EventSink, RouterEvent};
use serde::Serialize;

/// Counters collected over one run
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimStats {
    pub created: u64,
    pub started: u64,
    pub relayed: u64,
    pub delivered: u64,
    pub deleted: u64,
    pub aborted: u64,
    /// Drops by reason, keyed by the reason's display name
    pub dropped: BTreeMap<String, u64>,
    total_latency: f64,
    total_hops: u64,
}

impl SimStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped.values().sum()
    }

    pub fn dropped_for(&self, reason: DropReason) -> u64 {
        self.dropped.get(&reason.to_string()).copied().unwrap_or(0)
    }

    /// Delivered over created
    pub fn delivery_ratio(&self) -> f64 {
        if self.created == 0 {
            return 0.0;
        }
        self.delivered as f64 / self.created as f64
    }

    /// Relay copies stored per delivered message, beyond the delivery itself
    pub fn overhead_ratio(&self) -> Option<f64> {
        if self.delivered == 0 {
            return None;
        }
        Some((self.relayed as f64 - self.delivered as f64) / self.delivered as f64)
    }

    pub fn mean_latency(&self) -> Option<f64> {
        (self.delivered > 0).then(|| self.total_latency / self.delivered as f64)
    }

    pub fn mean_hops(&self) -> Option<f64> {
        (self.delivered > 0).then(|| self.total_hops as f64 / self.delivered as f64)
    }

    /// The report as JSON, with the derived ratios included
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "created": self.created,
            "started": self.started,
            "relayed": self.relayed,
            "delivered": self.delivered,
            "deleted": self.deleted,
            "aborted": self.aborted,
            "dropped": self.dropped,
            "deliveryRatio": self.delivery_ratio(),
            "overheadRatio": self.overhead_ratio(),
            "meanLatency": self.mean_latency(),
            "meanHops": self.mean_hops(),
        })
    }
}

impl EventSink for SimStats {
    fn record(&mut self, event: RouterEvent) {
        match event {
            RouterEvent::MessageCreated { .. } => self.created += 1,
            RouterEvent::TransferStarted { .. } => self.started += 1,
            RouterEvent::MessageRelayed { .. } => self.relayed += 1,
            RouterEvent::MessageDelivered { hops, latency, .. } => {
                self.delivered += 1;
                self.total_latency += latency;
                self.total_hops += hops as u64;
            }
            RouterEvent::MessageDropped { reason, .. } => {
                *self.dropped.entry(reason.to_string()).or_insert(0) += 1;
            }
            RouterEvent::MessageDeleted { .. } => self.deleted += 1,
            RouterEvent::TransferAborted { .. } => self.aborted += 1,
        }
    }
}

fn or_dash(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.3}"))
}

impl fmt::Display for SimStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "created:        {}", self.created)?;
        writeln!(f, "started:        {}", self.started)?;
        writeln!(f, "relayed:        {}", self.relayed)?;
        writeln!(f, "delivered:      {}", self.delivered)?;
        writeln!(f, "deleted:        {}", self.deleted)?;
        writeln!(f, "aborted:        {}", self.aborted)?;
        writeln!(f, "dropped:        {}", self.dropped_total())?;
        for (reason, count) in &self.dropped {
            writeln!(f, "  {reason}: {count}")?;
        }
        writeln!(f, "delivery ratio: {:.3}", self.delivery_ratio())?;
        writeln!(f, "overhead ratio: {}", or_dash(self.overhead_ratio()))?;
        writeln!(f, "mean latency:   {}", or_dash(self.mean_latency()))?;
        write!(f, "mean hops:      {}", or_dash(self.mean_hops()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::{MessageId, NodeId, SimTime};

    fn delivered(id: u64, hops: usize, latency: f64) -> RouterEvent {
        RouterEvent::MessageDelivered {
            id: MessageId(id),
            from: NodeId(1),
            to: NodeId(2),
            hops,
            latency,
            time: SimTime::from_secs(latency),
        }
    }

    fn created(id: u64) -> RouterEvent {
        RouterEvent::MessageCreated {
            id: MessageId(id),
            at: NodeId(0),
            time: SimTime::ZERO,
        }
    }

    #[test]
    fn test_empty_stats() {
        let stats = SimStats::new();
        assert_eq!(stats.delivery_ratio(), 0.0);
        assert_eq!(stats.overhead_ratio(), None);
        assert_eq!(stats.mean_latency(), None);
    }

    #[test]
    fn test_ratios_and_means() {
        let mut stats = SimStats::new();
        for id in 0..4 {
            stats.record(created(id));
        }
        for _ in 0..5 {
            stats.record(RouterEvent::MessageRelayed {
                id: MessageId(0),
                from: NodeId(0),
                to: NodeId(1),
                time: SimTime::ZERO,
            });
        }
        stats.record(delivered(0, 2, 10.0));
        stats.record(delivered(1, 4, 30.0));

        assert_eq!(stats.delivery_ratio(), 0.5);
        assert_eq!(stats.overhead_ratio(), Some(1.5));
        assert_eq!(stats.mean_latency(), Some(20.0));
        assert_eq!(stats.mean_hops(), Some(3.0));
    }

    #[test]
    fn test_drops_by_reason() {
        let mut stats = SimStats::new();
        let at = SimTime::ZERO;
        stats.record(RouterEvent::dropped(MessageId(1), NodeId(0), DropReason::Expired, at));
        stats.record(RouterEvent::dropped(MessageId(2), NodeId(0), DropReason::Expired, at));
        stats.record(RouterEvent::dropped(MessageId(3), NodeId(0), DropReason::Evicted, at));

        assert_eq!(stats.dropped_total(), 3);
        assert_eq!(stats.dropped_for(DropReason::Expired), 2);
        assert_eq!(stats.dropped_for(DropReason::BufferFull), 0);
        assert!(stats.to_string().contains("TTL expired: 2"));
        assert_eq!(stats.to_json()["dropped"]["Evicted"], 1);
    }
}
