//! Eviction victim selection
//!
//! Victims depend only on buffer contents and statistics, never on the order
//! messages were inserted in.

use std::collections::{BTreeMap, BTreeSet};

use ferry_core::{
    DropReason, Message, MessageId, MessageStore, NodeId, RouterEvent, SimTime,
};
use ferry_routing::{
    DecisionEngine, EvictionStats, ForwardingConfig, ForwardingEngine, HostTable, PeerRef,
    PredictabilityTable, ProphetConfig, ProphetEngine, QueueingPolicy,
};
use proptest::prelude::*;

// ============================================================================
// Helper Functions
// ============================================================================

fn make_id(n: u32) -> NodeId {
    NodeId(n)
}

fn at(secs: f64) -> SimTime {
    SimTime::from_secs(secs)
}

fn make_msg(id: u64, dest: u32, received: f64) -> Message {
    let mut msg = Message::new(MessageId(id), make_id(0), make_id(dest), 100, 5000.0, SimTime::ZERO);
    msg.received_at = at(received);
    msg
}

fn mofo_engine() -> ProphetEngine {
    ProphetEngine::new(ProphetConfig {
        queueing_policy: QueueingPolicy::Mofo,
        ..ProphetConfig::default()
    })
}

/// Tell `engine` that `msg` was handed over `times` times
fn forward(engine: &mut ProphetEngine, msg: &Message, times: u32) {
    let peer_engine = ProphetEngine::with_defaults();
    let peer_store = MessageStore::new(u64::MAX);
    let peer = PeerRef::new(make_id(9), &peer_engine, &peer_store);
    for _ in 0..times {
        engine.message_forwarded(msg, &peer, SimTime::ZERO).unwrap();
    }
}

struct FixedStats {
    counts: BTreeMap<MessageId, u32>,
    preds: BTreeMap<NodeId, f64>,
}

impl EvictionStats for FixedStats {
    fn forward_count(&self, id: MessageId) -> u32 {
        self.counts.get(&id).copied().unwrap_or(0)
    }

    fn forward_progress(&self, id: MessageId) -> f64 {
        f64::from(self.forward_count(id)) * 0.1
    }

    fn own_predictability(&self, destination: NodeId) -> f64 {
        self.preds.get(&destination).copied().unwrap_or(0.0)
    }
}

// ============================================================================
// MOFO
// ============================================================================

#[test]
fn test_mofo_evicts_most_forwarded() {
    let mut engine = mofo_engine();
    let mut store = MessageStore::new(u64::MAX);
    let busy = make_msg(1, 3, 0.0);
    let quiet = make_msg(2, 3, 0.0);
    forward(&mut engine, &busy, 5);
    forward(&mut engine, &quiet, 2);
    store.insert(busy).unwrap();
    store.insert(quiet).unwrap();

    let victim = engine.select_eviction_victim(&store, &BTreeSet::new(), at(10.0));
    assert_eq!(victim, Some(MessageId(1)));

    // Excluding the busy message moves eviction to the next one
    let excluded = BTreeSet::from([MessageId(1)]);
    let victim = engine.select_eviction_victim(&store, &excluded, at(10.0));
    assert_eq!(victim, Some(MessageId(2)));
}

#[test]
fn test_mofo_through_forwarding_engine() {
    let config = ForwardingConfig::constrained(300);
    let proto = ForwardingEngine::new(make_id(0), mofo_engine(), config);
    let mut hosts = HostTable::replicated(&proto, 2);
    let mut events = Vec::new();

    let accepted = hosts
        .with_host(make_id(0), |host, others| {
            for (id, t) in [(1, 0.0), (2, 1.0), (3, 2.0)] {
                let msg = Message::new(MessageId(id), make_id(0), make_id(1), 100, 5000.0, at(t));
                assert!(host
                    .on_local_message_created(msg, &*others, &mut events, at(t))
                    .unwrap());
            }

            let counted = [(MessageId(2), 5), (MessageId(1), 2)];
            for (id, times) in counted {
                let msg = host.store().get(&id).cloned().unwrap();
                forward(host.engine_mut(), &msg, times);
            }

            let msg = Message::new(MessageId(4), make_id(0), make_id(1), 100, 5000.0, at(3.0));
            host.on_local_message_created(msg, &*others, &mut events, at(3.0))
                .unwrap()
        })
        .unwrap();
    assert!(accepted);

    let host = hosts.get(make_id(0)).unwrap();
    assert!(!host.store().contains(&MessageId(2)));
    assert!(host.store().contains(&MessageId(1)));
    assert!(host.store().contains(&MessageId(4)));
    assert!(events.iter().any(|e| matches!(
        e,
        RouterEvent::MessageDropped { id, reason: DropReason::Evicted, .. } if *id == MessageId(2)
    )));
    // Counters of the evicted message are gone
    assert_eq!(host.engine().forward_count(MessageId(2)), 0);
    assert_eq!(host.engine().forward_count(MessageId(1)), 2);
}

#[test]
fn test_fifo_tie_breaks_on_id() {
    let msgs = [make_msg(7, 1, 5.0), make_msg(3, 1, 5.0), make_msg(9, 1, 6.0)];
    let stats = FixedStats {
        counts: BTreeMap::new(),
        preds: BTreeMap::new(),
    };
    let victim = QueueingPolicy::FifoDrop.select_victim(msgs.iter(), &stats, at(10.0));
    assert_eq!(victim, Some(MessageId(3)));
}

// ============================================================================
// Properties
// ============================================================================

fn buffer_strategy() -> impl Strategy<Value = Vec<(u32, u32, u32)>> {
    // (receive second, forward count, destination)
    prop::collection::vec((0u32..20, 0u32..4, 1u32..5), 1..30)
}

#[derive(Debug, Clone)]
enum TableOp {
    Encounter(u32),
    Transitive(u32, Vec<(u32, f64)>),
    Age(f64),
}

fn table_op_strategy() -> impl Strategy<Value = TableOp> {
    prop_oneof![
        (1u32..8).prop_map(TableOp::Encounter),
        (
            1u32..8,
            prop::collection::vec((0u32..8, 0.0f64..1.0), 0..8)
        )
            .prop_map(|(via, preds)| TableOp::Transitive(via, preds)),
        (0.0f64..600.0).prop_map(TableOp::Age),
    ]
}

proptest! {
    #[test]
    fn test_victim_is_independent_of_insertion_order(entries in buffer_strategy()) {
        let msgs: Vec<Message> = entries
            .iter()
            .enumerate()
            .map(|(i, &(received, _, dest))| make_msg(i as u64, dest, f64::from(received)))
            .collect();
        let stats = FixedStats {
            counts: entries
                .iter()
                .enumerate()
                .map(|(i, &(_, count, _))| (MessageId(i as u64), count))
                .collect(),
            preds: (1..5).map(|d| (make_id(d), f64::from(d % 3) * 0.2)).collect(),
        };
        let now = at(100.0);

        for policy in QueueingPolicy::ALL {
            let forward = policy.select_victim(msgs.iter(), &stats, now);
            let backward = policy.select_victim(msgs.iter().rev(), &stats, now);
            prop_assert!(forward.is_some());
            prop_assert_eq!(forward, backward);
        }
    }

    #[test]
    fn test_predictabilities_stay_below_one(ops in prop::collection::vec(table_op_strategy(), 0..60)) {
        let config = ProphetConfig::default();
        let mut table = PredictabilityTable::new(&config);
        let mut now = 0.0;

        for op in ops {
            match op {
                TableOp::Encounter(peer) => table.encounter(make_id(peer), config.initial_probability),
                TableOp::Transitive(via, preds) => {
                    let via_preds: BTreeMap<NodeId, f64> =
                        preds.into_iter().map(|(n, p)| (make_id(n), p)).collect();
                    table.transitive(make_id(0), make_id(via), &via_preds, config.beta);
                }
                TableOp::Age(dt) => {
                    now += dt;
                    table.age_to(at(now));
                }
            }
            for (&node, &p) in table.entries() {
                prop_assert!((0.0..1.0).contains(&p), "P({}) = {}", node, p);
                prop_assert!(p <= config.max_probability);
            }
        }
    }
}
