//! Data-model types shared by every component.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::constants::{HANDHELD_TO_WEARABLE_PATH, WEARABLE_TO_HANDHELD_PATH};

/// Milliseconds since the Unix epoch, saturating to zero on a pre-epoch clock.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Which side of the pair this endpoint is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// The phone.
    Handheld,
    /// The watch.
    Wearable,
}

impl Role {
    /// Path this role sends user messages on.
    pub fn outbound_path(self) -> &'static str {
        match self {
            Self::Handheld => HANDHELD_TO_WEARABLE_PATH,
            Self::Wearable => WEARABLE_TO_HANDHELD_PATH,
        }
    }

    /// Path the peer sends user messages on.
    pub fn inbound_path(self) -> &'static str {
        self.peer().outbound_path()
    }

    /// The other side.
    pub fn peer(self) -> Self {
        match self {
            Self::Handheld => Self::Wearable,
            Self::Wearable => Self::Handheld,
        }
    }
}

/// An addressable peer endpoint exposed by the transport.
///
/// Node lists are snapshots: the core re-queries them for every operation
/// and never caches one across calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Opaque node identifier.
    pub id: String,
    /// Human-readable name.
    pub display_name: String,
    /// Whether the node is directly reachable (e.g. over Bluetooth).
    pub is_nearby: bool,
}

impl Node {
    /// Create a node description.
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, is_nearby: bool) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            is_nearby,
        }
    }
}

/// A frame received from the transport. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Routing path.
    pub path: String,
    /// Raw payload.
    pub payload: Vec<u8>,
    /// Node the frame came from.
    pub source_node_id: String,
    /// Receive time, ms since the Unix epoch.
    pub received_at: u64,
}

impl Frame {
    /// Create a frame stamped with the current time.
    pub fn new(
        path: impl Into<String>,
        payload: impl Into<Vec<u8>>,
        source_node_id: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            payload: payload.into(),
            source_node_id: source_node_id.into(),
            received_at: unix_millis(),
        }
    }

    /// Payload decoded as text. Invalid UTF-8 sequences are replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// An inbound user message, as retained by the mailbox and surfaced to
/// the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMessage {
    /// Path the message arrived on.
    pub path: String,
    /// Message text.
    pub payload: String,
    /// Sending node.
    pub source_node_id: String,
    /// Receive time, ms since the Unix epoch.
    pub received_at: u64,
}

impl From<&Frame> for PendingMessage {
    fn from(frame: &Frame) -> Self {
        Self {
            path: frame.path.clone(),
            payload: frame.text(),
            source_node_id: frame.source_node_id.clone(),
            received_at: frame.received_at,
        }
    }
}

/// Last reported connection status.
///
/// Recomputed by every check; only the most recent value is kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    /// A candidate peer node was listed.
    pub node_present: bool,
    /// The peer application answered.
    pub ack_received: bool,
}

impl ConnectionState {
    /// Peer node listed and peer application answered.
    pub fn is_connected(&self) -> bool {
        self.node_present && self.ack_received
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_text_is_lossy() {
        let frame = Frame::new("/p", vec![b'h', 0xff, b'i'], "n1");
        assert_eq!(frame.text(), "h\u{fffd}i");
    }

    #[test]
    fn test_pending_message_from_frame() {
        let frame = Frame::new("/message-item-received", "hello", "watch");
        let msg = PendingMessage::from(&frame);
        assert_eq!(msg.payload, "hello");
        assert_eq!(msg.source_node_id, "watch");
        assert_eq!(msg.received_at, frame.received_at);
    }

    #[test]
    fn test_role_paths_are_mirrored() {
        assert_eq!(Role::Handheld.outbound_path(), Role::Wearable.inbound_path());
        assert_eq!(Role::Wearable.outbound_path(), Role::Handheld.inbound_path());
        assert_ne!(Role::Handheld.outbound_path(), Role::Handheld.inbound_path());
    }

    #[test]
    fn test_connection_state_requires_both_flags() {
        let mut state = ConnectionState::default();
        assert!(!state.is_connected());
        state.node_present = true;
        assert!(!state.is_connected());
        state.ack_received = true;
        assert!(state.is_connected());
    }
}
