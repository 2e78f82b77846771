//! Social-graph routing

mod graph;
mod interaction;
mod rank;

pub use graph::SocialGraph;
pub use interaction::{EdgePolicy, EdgePolicyKind, InteractionRecord};
pub use rank::{
    DEFAULT_DAMPING, DEFAULT_DURATION_THRESHOLD, DEFAULT_FREQUENCY_THRESHOLD, RankSnapshot,
    SocialRankConfig, SocialRankEngine,
};
