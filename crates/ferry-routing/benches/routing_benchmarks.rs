//! Routing performance benchmarks
//!
//! Benchmarks for the hot paths of a simulation tick:
//! - Eviction victim selection under each queueing policy
//! - Predictability encounter, transitivity and aging
//! - Candidate generation on link-up
//!
//! Run with: cargo bench -p ferry-routing

use std::collections::{BTreeMap, BTreeSet};

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use ferry_core::{Link, LinkId, Message, MessageId, MessageStore, NodeId, SimTime};
use ferry_routing::{
    DecisionEngine, EpidemicEngine, EvictionStats, ForwardingConfig, ForwardingEngine, HostTable,
    PredictabilityTable, ProphetConfig, QueueingPolicy,
};

// ============================================================================
// Helper Functions
// ============================================================================

fn make_id(n: u32) -> NodeId {
    NodeId(n)
}

fn make_msg(id: u64, dest: u32, created: f64) -> Message {
    Message::new(
        MessageId(id),
        make_id(0),
        make_id(dest),
        100,
        3600.0,
        SimTime::from_secs(created),
    )
}

fn full_store(count: u64) -> MessageStore {
    let mut store = MessageStore::new(u64::MAX);
    for i in 0..count {
        store
            .insert(make_msg(i, (i % 50) as u32 + 1, i as f64))
            .expect("fresh id");
    }
    store
}

struct BenchStats {
    counts: BTreeMap<MessageId, u32>,
}

impl EvictionStats for BenchStats {
    fn forward_count(&self, id: MessageId) -> u32 {
        self.counts.get(&id).copied().unwrap_or(0)
    }

    fn own_predictability(&self, destination: NodeId) -> f64 {
        f64::from(destination.0 % 7) / 10.0
    }
}

// ============================================================================
// Eviction Benchmarks
// ============================================================================

fn bench_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("eviction");

    let store = full_store(1000);
    let stats = BenchStats {
        counts: (0..1000).map(|i| (MessageId(i), (i % 13) as u32)).collect(),
    };
    let now = SimTime::from_secs(2000.0);

    for policy in QueueingPolicy::ALL {
        group.bench_function(format!("select_victim_1000_{policy}"), |b| {
            b.iter(|| policy.select_victim(black_box(store.iter()), &stats, now))
        });
    }

    group.finish();
}

// ============================================================================
// PRoPHET Benchmarks
// ============================================================================

fn bench_predictability(c: &mut Criterion) {
    let mut group = c.benchmark_group("prophet");

    let config = ProphetConfig::default();

    group.bench_function("encounter", |b| {
        let mut table = PredictabilityTable::new(&config);
        b.iter(|| table.encounter(black_box(make_id(1)), config.initial_probability))
    });

    group.bench_function("transitive_update_50_destinations", |b| {
        let mut table = PredictabilityTable::new(&config);
        table.encounter(make_id(1), config.initial_probability);
        let via: BTreeMap<NodeId, f64> = (2..52)
            .map(|i| (make_id(i), 0.5 + f64::from(i) * 0.005))
            .collect();
        b.iter(|| table.transitive(make_id(0), make_id(1), black_box(&via), config.beta))
    });

    group.bench_function("age_100_entries", |b| {
        let mut t = 0.0;
        let mut table = PredictabilityTable::new(&config);
        for i in 1..=100 {
            table.encounter(make_id(i), config.initial_probability);
        }
        b.iter(|| {
            t += 1.0;
            table.age_to(SimTime::from_secs(t));
        })
    });

    group.finish();
}

// ============================================================================
// Forwarding Benchmarks
// ============================================================================

fn bench_link_up(c: &mut Criterion) {
    let mut group = c.benchmark_group("forwarding");

    group.bench_function("link_up_rescan_500_messages", |b| {
        let proto = ForwardingEngine::new(
            make_id(0),
            EpidemicEngine::new(),
            ForwardingConfig::epidemic_like(),
        );
        let mut hosts = HostTable::replicated(&proto, 2);
        let mut sink = Vec::new();
        hosts
            .with_host(make_id(0), |host, others| {
                for i in 0..500 {
                    host.on_local_message_created(make_msg(i, 1, 0.0), &*others, &mut sink, SimTime::ZERO)
                        .expect("buffer is unbounded");
                }
            })
            .expect("host exists");

        let link = Link::new(LinkId(1), make_id(0), make_id(1));
        b.iter(|| {
            hosts
                .with_host(make_id(0), |host, others| {
                    host.on_link_up(&link, others, SimTime::ZERO).expect("same engine");
                    let offered = host.candidates().len();
                    host.on_link_down(link.id, SimTime::ZERO);
                    offered
                })
                .expect("host exists")
        })
    });

    group.bench_function("epidemic_offer_decision", |b| {
        let mut engine = EpidemicEngine::new();
        let peer_engine = EpidemicEngine::new();
        let store = full_store(200);
        let peer = ferry_routing::PeerRef::new(make_id(1), &peer_engine, &store);
        let msg = make_msg(10_000, 1, 0.0);
        b.iter(|| engine.should_send_message_to_host(black_box(&msg), &peer, SimTime::ZERO))
    });

    group.finish();
}

fn bench_excluded_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("eviction_excluded");
    let store = full_store(1000);
    let excluded: BTreeSet<MessageId> = (0..500).map(MessageId).collect();
    let mut engine = EpidemicEngine::new();

    group.bench_function("fifo_default_half_excluded", |b| {
        b.iter(|| engine.select_eviction_victim(&store, black_box(&excluded), SimTime::ZERO))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_eviction,
    bench_predictability,
    bench_link_up,
    bench_excluded_eviction,
);

criterion_main!(benches);
