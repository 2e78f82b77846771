//! # Ferry Simulation
//!
//! A small discrete-event harness around the Ferry routing layer.
//!
//! ## Overview
//!
//! Hosts meet and part as a contact trace dictates. The harness owns the
//! pieces the routing layer treats as external:
//!
//! - **Network** (`network.rs`): link table, transfer timing, host ticks
//! - **Trace** (`trace.rs`): the `CONN` / `C` external events format
//! - **Stats** (`stats.rs`): delivery ratio, overhead, latency, hops
//! - **Scenario** (`scenario.rs`): JSON scenario files and the replay loop
//!
//! ## Example
//!
//! ```rust,ignore
//! use ferry_simulation::*;
//!
//! let scenario = ScenarioConfig::load(Path::new("scenario.json"))?;
//! let stats = scenario.run(&EngineRegistry::builtin())?;
//! println!("{stats}");
//! ```

pub mod network;
pub mod scenario;
pub mod stats;
pub mod trace;

// Re-export main types
pub use network::{LinkTable, Network, NetworkConfig};
pub use scenario::{RandomTrace, ScenarioConfig, replay};
pub use stats::SimStats;
pub use trace::{TraceError, TraceEvent};

pub use ferry_routing::EngineRegistry;
