//! Buffer eviction policies
//!
//! Each policy is a total order over resident messages: the minimum is the
//! victim. Ties on the policy's own key fall back to queue order (earliest
//! receive time, then lowest message id), so the victim is always unique
//! for a given buffer.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use ferry_core::{ConfigError, Message, MessageId, NodeId, SimTime};

/// Eviction policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueingPolicy {
    /// Oldest arrival first
    #[default]
    FifoDrop,
    /// Most forwarded first
    Mofo,
    /// Shortest remaining lifetime first
    Shli,
    /// Lowest own delivery predictability first
    Lepr,
    /// Most accumulated forward progress first
    Mopr,
}

/// Per-message statistics a policy may rank by
pub trait EvictionStats {
    fn forward_count(&self, _id: MessageId) -> u32 {
        0
    }

    fn forward_progress(&self, _id: MessageId) -> f64 {
        0.0
    }

    fn own_predictability(&self, _destination: NodeId) -> f64 {
        0.0
    }
}

/// Statistics source for engines that keep none
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStats;

impl EvictionStats for NoStats {}

/// Queue order: earliest receive time, then lowest id
pub fn compare_queue_order(a: &Message, b: &Message) -> Ordering {
    a.received_at
        .total_cmp(&b.received_at)
        .then_with(|| a.id.cmp(&b.id))
}

impl QueueingPolicy {
    pub const ALL: [QueueingPolicy; 5] = [
        Self::FifoDrop,
        Self::Mofo,
        Self::Shli,
        Self::Lepr,
        Self::Mopr,
    ];

    /// `Less` means `a` is evicted before `b`
    pub fn compare<S: EvictionStats>(
        &self,
        a: &Message,
        b: &Message,
        stats: &S,
        now: SimTime,
    ) -> Ordering {
        let primary = match self {
            Self::FifoDrop => Ordering::Equal,
            Self::Mofo => stats.forward_count(b.id).cmp(&stats.forward_count(a.id)),
            Self::Shli => a.remaining_ttl(now).total_cmp(&b.remaining_ttl(now)),
            Self::Lepr => stats
                .own_predictability(a.destination)
                .total_cmp(&stats.own_predictability(b.destination)),
            Self::Mopr => stats
                .forward_progress(b.id)
                .total_cmp(&stats.forward_progress(a.id)),
        };
        primary.then_with(|| compare_queue_order(a, b))
    }

    /// The first message to evict among `candidates`
    pub fn select_victim<'m, S: EvictionStats>(
        &self,
        candidates: impl IntoIterator<Item = &'m Message>,
        stats: &S,
        now: SimTime,
    ) -> Option<MessageId> {
        candidates
            .into_iter()
            .min_by(|a, b| self.compare(a, b, stats, now))
            .map(|m| m.id)
    }
}

impl fmt::Display for QueueingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FifoDrop => "FIFO_DROP",
            Self::Mofo => "MOFO",
            Self::Shli => "SHLI",
            Self::Lepr => "LEPR",
            Self::Mopr => "MOPR",
        };
        f.write_str(name)
    }
}

impl FromStr for QueueingPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "FIFO_DROP" | "FIFO" => Ok(Self::FifoDrop),
            "MOFO" => Ok(Self::Mofo),
            "SHLI" => Ok(Self::Shli),
            "LEPR" => Ok(Self::Lepr),
            "MOPR" => Ok(Self::Mopr),
            _ => Err(ConfigError::UnknownQueueingPolicy(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct TestStats {
        counts: BTreeMap<MessageId, u32>,
        progress: BTreeMap<MessageId, f64>,
        preds: BTreeMap<NodeId, f64>,
    }

    impl EvictionStats for TestStats {
        fn forward_count(&self, id: MessageId) -> u32 {
            self.counts.get(&id).copied().unwrap_or(0)
        }

        fn forward_progress(&self, id: MessageId) -> f64 {
            self.progress.get(&id).copied().unwrap_or(0.0)
        }

        fn own_predictability(&self, destination: NodeId) -> f64 {
            self.preds.get(&destination).copied().unwrap_or(0.0)
        }
    }

    fn make_msg(id: u64, dest: u32, received: f64, ttl: f64) -> Message {
        let mut msg = Message::new(
            MessageId(id),
            NodeId(0),
            NodeId(dest),
            100,
            ttl,
            SimTime::ZERO,
        );
        msg.received_at = SimTime::from_secs(received);
        msg
    }

    #[test]
    fn test_fifo_picks_oldest_arrival() {
        let msgs = [make_msg(1, 5, 20.0, 100.0), make_msg(2, 5, 10.0, 100.0)];
        let victim = QueueingPolicy::FifoDrop.select_victim(&msgs, &NoStats, SimTime::ZERO);
        assert_eq!(victim, Some(MessageId(2)));
    }

    #[test]
    fn test_mofo_prefers_most_forwarded() {
        // Newer arrival but forwarded more often
        let msgs = [make_msg(1, 5, 10.0, 100.0), make_msg(2, 5, 20.0, 100.0)];
        let mut stats = TestStats::default();
        stats.counts.insert(MessageId(1), 2);
        stats.counts.insert(MessageId(2), 5);

        let victim = QueueingPolicy::Mofo.select_victim(&msgs, &stats, SimTime::ZERO);
        assert_eq!(victim, Some(MessageId(2)));
    }

    #[test]
    fn test_shli_picks_shortest_remaining_lifetime() {
        let msgs = [make_msg(1, 5, 0.0, 300.0), make_msg(2, 5, 50.0, 60.0)];
        let victim =
            QueueingPolicy::Shli.select_victim(&msgs, &NoStats, SimTime::from_secs(30.0));
        assert_eq!(victim, Some(MessageId(2)));
    }

    #[test]
    fn test_lepr_picks_least_likely_destination() {
        let msgs = [make_msg(1, 5, 0.0, 100.0), make_msg(2, 6, 5.0, 100.0)];
        let mut stats = TestStats::default();
        stats.preds.insert(NodeId(5), 0.6);
        stats.preds.insert(NodeId(6), 0.2);

        let victim = QueueingPolicy::Lepr.select_victim(&msgs, &stats, SimTime::ZERO);
        assert_eq!(victim, Some(MessageId(2)));
    }

    #[test]
    fn test_mopr_picks_most_progress() {
        let msgs = [make_msg(1, 5, 0.0, 100.0), make_msg(2, 5, 5.0, 100.0)];
        let mut stats = TestStats::default();
        stats.progress.insert(MessageId(1), 0.4);
        stats.progress.insert(MessageId(2), 1.3);

        let victim = QueueingPolicy::Mopr.select_victim(&msgs, &stats, SimTime::ZERO);
        assert_eq!(victim, Some(MessageId(2)));
    }

    #[test]
    fn test_ties_break_by_queue_order_then_id() {
        let msgs = [
            make_msg(9, 5, 10.0, 100.0),
            make_msg(3, 5, 10.0, 100.0),
            make_msg(4, 5, 10.0, 100.0),
        ];
        for policy in QueueingPolicy::ALL {
            let victim = policy.select_victim(&msgs, &NoStats, SimTime::ZERO);
            assert_eq!(victim, Some(MessageId(3)), "policy {}", policy);
        }
    }

    #[test]
    fn test_selection_is_order_independent() {
        let mut msgs = vec![
            make_msg(1, 5, 3.0, 100.0),
            make_msg(2, 6, 1.0, 50.0),
            make_msg(3, 7, 2.0, 80.0),
        ];
        let mut stats = TestStats::default();
        stats.counts.insert(MessageId(1), 1);
        stats.counts.insert(MessageId(3), 1);

        let first = QueueingPolicy::Mofo.select_victim(&msgs, &stats, SimTime::ZERO);
        msgs.reverse();
        let second = QueueingPolicy::Mofo.select_victim(&msgs, &stats, SimTime::ZERO);
        assert_eq!(first, second);
        assert_eq!(first, Some(MessageId(3)));
    }

    #[test]
    fn test_empty_buffer_has_no_victim() {
        let msgs: Vec<Message> = Vec::new();
        assert_eq!(
            QueueingPolicy::Mofo.select_victim(&msgs, &NoStats, SimTime::ZERO),
            None
        );
    }

    #[test]
    fn test_parse_policy() {
        assert_eq!("FIFO_DROP".parse::<QueueingPolicy>().unwrap(), QueueingPolicy::FifoDrop);
        assert_eq!("mofo".parse::<QueueingPolicy>().unwrap(), QueueingPolicy::Mofo);
        assert_eq!("fifo-drop".parse::<QueueingPolicy>().unwrap(), QueueingPolicy::FifoDrop);
        assert!(matches!(
            "LIFO".parse::<QueueingPolicy>(),
            Err(ConfigError::UnknownQueueingPolicy(_))
        ));
        for policy in QueueingPolicy::ALL {
            assert_eq!(policy.to_string().parse::<QueueingPolicy>().unwrap(), policy);
        }
    }
}
