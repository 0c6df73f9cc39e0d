//! Events surfaced at the UI boundary.

use crate::core::{ConnectionState, PendingMessage};

/// Something the foreground application may want to react to.
///
/// Handshake and liveness traffic never appears here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A connection check or status probe completed.
    ConnectionChanged(ConnectionState),
    /// A user message arrived, live or drained from the mailbox.
    MessageReceived(PendingMessage),
    /// A user send completed.
    MessageSent {
        /// Whether any candidate node accepted the message.
        success: bool,
        /// The message text.
        payload: String,
    },
    /// The connected node set was re-read.
    NodesChanged {
        /// Connected node count.
        count: usize,
        /// Whether at least one node is connected.
        reachable: bool,
    },
}

impl LinkEvent {
    /// Short name, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionChanged(_) => "connection-changed",
            Self::MessageReceived(_) => "message-received",
            Self::MessageSent { .. } => "message-sent",
            Self::NodesChanged { .. } => "nodes-changed",
        }
    }
}
