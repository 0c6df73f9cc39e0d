//! Collaborator interfaces.
//!
//! The core never talks to a radio directly. Hosts implement [`Transport`]
//! over their platform's node/message API and hand inbound frames to the
//! [`FrameSink`] the core registers with them.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::LinkResult;
use super::types::{Frame, Node};

/// Ingestion handle for inbound frames.
///
/// Cheap to clone and safe to call from any thread: frames are queued and
/// processed in arrival order by the endpoint's router task.
#[derive(Debug, Clone)]
pub struct FrameSink {
    tx: mpsc::UnboundedSender<Frame>,
}

impl FrameSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Frame>) -> Self {
        Self { tx }
    }

    /// Queue a received frame. Returns `false` once the endpoint has shut down.
    pub fn deliver(&self, frame: Frame) -> bool {
        self.tx.send(frame).is_ok()
    }

    /// Whether the receiving endpoint is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Best-effort, unordered, at-most-once frame transport between nodes.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Fresh snapshot of connected nodes. May be empty.
    async fn list_connected_nodes(&self) -> LinkResult<Vec<Node>>;

    /// Send one frame to one node. Each call is independent.
    async fn send(&self, node_id: &str, path: &str, payload: &[u8]) -> LinkResult<()>;

    /// Register the ingestion point for inbound frames, replacing any
    /// previous registration.
    fn on_frame(&self, sink: FrameSink);

    /// Whether the transport precondition holds (e.g. radio enabled).
    fn is_available(&self) -> bool {
        true
    }
}

/// Observer of [`LinkEvent`](crate::events::LinkEvent)s.
///
/// Called synchronously from the publishing context; implementations should
/// hand work off rather than block. A panicking listener is isolated and
/// does not affect delivery to other listeners.
pub trait EventListener: Send + Sync {
    /// Handle one event.
    fn on_event(&self, event: &crate::events::LinkEvent);
}

impl<F> EventListener for F
where
    F: Fn(&crate::events::LinkEvent) + Send + Sync,
{
    fn on_event(&self, event: &crate::events::LinkEvent) {
        self(event)
    }
}
