//! Error types for wearlink.
//!
//! Only transport and precondition failures are errors. A peer that is
//! absent or silent is reported through ordinary return values.

use thiserror::Error;

/// A single node's send failure, kept for the aggregate error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFailure {
    /// Node the frame was addressed to.
    pub node_id: String,
    /// Adapter-reported reason.
    pub reason: String,
}

impl std::fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.node_id, self.reason)
    }
}

/// Top-level wearlink errors.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Transport precondition not satisfied (e.g. radio disabled).
    #[error("transport unavailable")]
    TransportUnavailable,

    /// No candidate peer node to address.
    #[error("no connected peer node")]
    NoPeerNode,

    /// Every candidate node rejected the send.
    #[error("send failed on all {attempted} candidate node(s): {}", join_failures(.failures))]
    SendFailed {
        /// Number of nodes attempted.
        attempted: usize,
        /// Per-node failures.
        failures: Vec<NodeFailure>,
    },

    /// Adapter failure outside of a per-node send (e.g. node listing).
    #[error("transport error: {0}")]
    Transport(String),

    /// Mailbox storage failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Mailbox record encoding failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The endpoint has been shut down.
    #[error("endpoint shut down")]
    Shutdown,
}

fn join_failures(failures: &[NodeFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result alias used throughout the crate.
pub type LinkResult<T> = Result<T, LinkError>;
