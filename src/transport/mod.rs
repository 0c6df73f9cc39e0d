//! Transport adapters.
//!
//! The core only talks to the [`Transport`](crate::core::Transport) trait.
//! The in-memory adapter here connects endpoints inside one process; a
//! platform adapter (e.g. a Wear OS data-layer bridge) implements the same
//! trait outside this crate.

mod memory;

pub use memory::{MemoryNetwork, MemoryTransport, SentFrame};
