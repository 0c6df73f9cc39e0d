//! In-process transport adapter.
//!
//! A [`MemoryNetwork`] routes frames between [`MemoryTransport`]s by node id.
//! Each transport keeps its own view of which peers are connected, so tests
//! can list a node whose application is not running (no sink registered),
//! switch the radio off, or make sends to one node fail.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tracing::trace;

use crate::core::{Frame, FrameSink, LinkError, LinkResult, Node, Transport};

/// Shared broker: node id to the frame sink registered for it.
#[derive(Clone, Debug, Default)]
pub struct MemoryNetwork {
    sinks: Arc<Mutex<HashMap<String, FrameSink>>>,
}

impl MemoryNetwork {
    /// An empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport owned by the node `local`. It lists no peers until
    /// [`MemoryTransport::add_peer`] is called.
    pub fn transport(&self, local: Node) -> Arc<MemoryTransport> {
        Arc::new(MemoryTransport {
            local,
            network: self.clone(),
            state: Mutex::new(TransportState {
                available: true,
                ..TransportState::default()
            }),
        })
    }

    /// A handheld and a wearable that list each other as nearby.
    pub fn pair(&self) -> (Arc<MemoryTransport>, Arc<MemoryTransport>) {
        let phone_node = Node::new("phone", "Phone", true);
        let watch_node = Node::new("watch", "Watch", true);
        let phone = self.transport(phone_node.clone());
        let watch = self.transport(watch_node.clone());
        phone.add_peer(watch_node);
        watch.add_peer(phone_node);
        (phone, watch)
    }

    fn sinks(&self) -> MutexGuard<'_, HashMap<String, FrameSink>> {
        self.sinks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn register(&self, node_id: &str, sink: FrameSink) {
        self.sinks().insert(node_id.to_string(), sink);
    }

    fn sink_for(&self, node_id: &str) -> Option<FrameSink> {
        self.sinks().get(node_id).cloned()
    }
}

/// A frame handed to [`Transport::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    /// Addressed node.
    pub node_id: String,
    /// Routing path.
    pub path: String,
    /// Payload, decoded as text.
    pub payload: String,
}

#[derive(Debug, Default)]
struct TransportState {
    peers: Vec<Node>,
    available: bool,
    failing: HashMap<String, String>,
    delays: HashMap<String, Duration>,
    listing_failure: Option<String>,
    sent: Vec<SentFrame>,
}

/// One endpoint's adapter on a [`MemoryNetwork`].
#[derive(Debug)]
pub struct MemoryTransport {
    local: Node,
    network: MemoryNetwork,
    state: Mutex<TransportState>,
}

impl MemoryTransport {
    fn state(&self) -> MutexGuard<'_, TransportState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The node this transport sends as.
    pub fn local_node(&self) -> &Node {
        &self.local
    }

    /// List `node` as connected. Replaces an entry with the same id.
    pub fn add_peer(&self, node: Node) {
        let mut state = self.state();
        state.peers.retain(|n| n.id != node.id);
        state.peers.push(node);
    }

    /// Stop listing the node with `node_id`.
    pub fn remove_peer(&self, node_id: &str) {
        self.state().peers.retain(|n| n.id != node_id);
    }

    /// Flip the radio precondition.
    pub fn set_available(&self, available: bool) {
        self.state().available = available;
    }

    /// Make every send to `node_id` fail with `reason`.
    pub fn fail_sends_to(&self, node_id: &str, reason: &str) {
        self.state()
            .failing
            .insert(node_id.to_string(), reason.to_string());
    }

    /// Undo [`fail_sends_to`](Self::fail_sends_to).
    pub fn clear_failure(&self, node_id: &str) {
        self.state().failing.remove(node_id);
    }

    /// Delay every send to `node_id`, success or failure, by `delay`.
    pub fn set_send_delay(&self, node_id: &str, delay: Duration) {
        self.state().delays.insert(node_id.to_string(), delay);
    }

    /// Make node listing fail with `reason`.
    pub fn fail_listing(&self, reason: &str) {
        self.state().listing_failure = Some(reason.to_string());
    }

    /// Every frame passed to `send`, in call order, including failed ones.
    pub fn sent_frames(&self) -> Vec<SentFrame> {
        self.state().sent.clone()
    }

    /// Frames sent on `path`.
    pub fn sent_on(&self, path: &str) -> Vec<SentFrame> {
        self.state()
            .sent
            .iter()
            .filter(|f| f.path == path)
            .cloned()
            .collect()
    }

    /// Forget the sent-frame log.
    pub fn clear_sent(&self) {
        self.state().sent.clear();
    }

    /// Deliver `frame` to this transport's own sink, as if it had arrived
    /// from the radio. Returns false if nothing is registered.
    pub fn inject(&self, frame: Frame) -> bool {
        self.network
            .sink_for(&self.local.id)
            .is_some_and(|sink| sink.deliver(frame))
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn list_connected_nodes(&self) -> LinkResult<Vec<Node>> {
        let state = self.state();
        if let Some(reason) = &state.listing_failure {
            return Err(LinkError::Transport(reason.clone()));
        }
        Ok(state.peers.clone())
    }

    async fn send(&self, node_id: &str, path: &str, payload: &[u8]) -> LinkResult<()> {
        let (delay, failure) = {
            let mut state = self.state();
            state.sent.push(SentFrame {
                node_id: node_id.to_string(),
                path: path.to_string(),
                payload: String::from_utf8_lossy(payload).into_owned(),
            });
            (
                state.delays.get(node_id).copied(),
                state.failing.get(node_id).cloned(),
            )
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = failure {
            return Err(LinkError::Transport(reason));
        }

        // A listed node with no registered sink accepts the frame and drops
        // it, like a watch whose app is not running.
        match self.network.sink_for(node_id) {
            Some(sink) => {
                let delivered = sink.deliver(Frame::new(path, payload, self.local.id.as_str()));
                trace!(from = %self.local.id, to = %node_id, path = %path, delivered, "memory frame");
            }
            None => trace!(to = %node_id, path = %path, "no receiver, frame dropped"),
        }
        Ok(())
    }

    fn on_frame(&self, sink: FrameSink) {
        self.network.register(&self.local.id, sink);
    }

    fn is_available(&self) -> bool {
        self.state().available
    }
}
