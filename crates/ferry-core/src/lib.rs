//! # Ferry Core
//!
//! Core types, traits, and errors shared by the Ferry routing layer and the
//! simulation harness that drives it.
//!
//! Everything here is plain single-process data: hosts are addressed by
//! [`NodeId`], time is simulated ([`SimTime`]), and messages live in a
//! capacity-bounded [`MessageStore`] owned by each host.
//!
//! ## Key Types
//!
//! - [`Message`]: A routed message with its hop list and [`PropertyBag`]
//! - [`Link`]: A contact between two hosts
//! - [`MessageStore`]: Per-host buffer with byte capacity accounting
//! - [`RouterEvent`]: Events emitted towards external statistics sinks
//!
//! ## Key Traits
//!
//! - [`Clock`]: Monotonic simulated time source
//! - [`EventSink`]: Consumer of [`RouterEvent`]s

pub mod error;
pub mod event;
pub mod identity;
pub mod link;
pub mod message;
pub mod property;
pub mod store;
pub mod time;

// Re-export main types
pub use error::*;
pub use event::*;
pub use identity::*;
pub use link::*;
pub use message::*;
pub use property::*;
pub use store::*;
pub use time::*;
