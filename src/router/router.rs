//! Inbound dispatch and outbound user sends.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error, info, warn};

use super::classify::{FrameKind, classify, encode_ack};
use super::fanout::{SendReport, dispatch, first_success, select_candidates};
use crate::core::{
    CandidatePolicy, Frame, HANDSHAKE_PATH, LIVENESS_PATH, LinkError, LinkResult, Node, PONG_TOKEN,
    PendingMessage, Role, Transport,
};
use crate::events::{EventBus, LinkEvent};
use crate::handshake::HandshakeCoordinator;
use crate::liveness::LivenessProber;
use crate::mailbox::PendingMailbox;

/// Routes every inbound frame to exactly one consumer and sends user
/// messages out.
///
/// The foreground gate decides whether a user message goes straight to the
/// event bus or into the mailbox. It counts attached consumers; messages go
/// to the bus while at least one is attached. Changing the count and
/// draining the mailbox happen under the same lock as the per-message
/// decision, so a message can never land in the mailbox after the drain
/// that should have emitted it.
///
/// Probe and ping replies are sent from their own tasks, so a slow reply
/// never holds up the frames queued behind it.
pub struct FrameRouter {
    role: Role,
    policy: CandidatePolicy,
    transport: Arc<dyn Transport>,
    handshake: Arc<HandshakeCoordinator>,
    liveness: Arc<LivenessProber>,
    mailbox: Arc<PendingMailbox>,
    bus: EventBus,
    foreground: Mutex<usize>,
}

impl std::fmt::Debug for FrameRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameRouter")
            .field("role", &self.role)
            .field("policy", &self.policy)
            .field("foreground", &self.is_foreground_attached())
            .finish_non_exhaustive()
    }
}

impl FrameRouter {
    /// Wire a router to its consumers.
    pub fn new(
        role: Role,
        policy: CandidatePolicy,
        transport: Arc<dyn Transport>,
        handshake: Arc<HandshakeCoordinator>,
        liveness: Arc<LivenessProber>,
        mailbox: Arc<PendingMailbox>,
        bus: EventBus,
    ) -> Self {
        Self {
            role,
            policy,
            transport,
            handshake,
            liveness,
            mailbox,
            bus,
            foreground: Mutex::new(0),
        }
    }

    fn gate(&self) -> MutexGuard<'_, usize> {
        self.foreground.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Classify one frame and hand it to its consumer.
    ///
    /// Never fails and never waits: replies are handed to a send task, and
    /// reply failures and mailbox errors are logged. Must be called from
    /// within a tokio runtime.
    pub fn on_frame_received(&self, frame: Frame) -> FrameKind {
        let kind = classify(&frame);
        let source = frame.source_node_id.as_str();

        match &kind {
            FrameKind::Probe { nonce } => {
                debug!(node = %source, nonce = ?nonce, "handshake probe, replying");
                let ack = encode_ack(nonce.as_deref());
                self.reply(source, HANDSHAKE_PATH, ack.into_bytes());
            }
            FrameKind::HandshakeAck { payload } => {
                self.handshake.on_ack(payload);
            }
            FrameKind::Ping => {
                debug!(node = %source, "ping, replying");
                self.reply(source, LIVENESS_PATH, PONG_TOKEN.as_bytes().to_vec());
            }
            FrameKind::Pong => {
                self.liveness.on_ack();
            }
            FrameKind::User => {
                self.deliver_user(PendingMessage::from(&frame));
            }
            FrameKind::Unknown => {
                warn!(path = %frame.path, node = %source, "dropping unrecognized frame");
            }
        }

        kind
    }

    fn reply(&self, node_id: &str, path: &'static str, payload: Vec<u8>) {
        let transport = Arc::clone(&self.transport);
        let node_id = node_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = transport.send(&node_id, path, &payload).await {
                warn!(node = %node_id, path = %path, error = %e, "reply failed");
            }
        });
    }

    fn deliver_user(&self, message: PendingMessage) {
        let attached = self.gate();
        if *attached > 0 {
            drop(attached);
            self.bus.publish(&LinkEvent::MessageReceived(message));
            return;
        }

        let path = message.path.clone();
        match self.mailbox.append(message) {
            Ok(()) => debug!(path = %path, "no foreground consumer, message stored"),
            Err(e) => error!(path = %path, error = %e, "failed to store pending message"),
        }
    }

    /// Send a user message to every candidate node; the first success wins.
    pub async fn send_user_message(&self, payload: &str) -> LinkResult<SendReport> {
        if !self.transport.is_available() {
            return Err(LinkError::TransportUnavailable);
        }

        let nodes = self.transport.list_connected_nodes().await?;
        let candidates = select_candidates(nodes, self.policy);
        if candidates.is_empty() {
            return Err(LinkError::NoPeerNode);
        }

        self.send_to_candidates(&candidates, payload).await
    }

    /// Send a user message to one connected node, chosen by id.
    ///
    /// The candidate policy is not applied; a node that is not currently
    /// listed is [`LinkError::NoPeerNode`].
    pub async fn send_user_message_to(&self, node_id: &str, payload: &str) -> LinkResult<SendReport> {
        if !self.transport.is_available() {
            return Err(LinkError::TransportUnavailable);
        }

        let target: Vec<_> = self
            .transport
            .list_connected_nodes()
            .await?
            .into_iter()
            .filter(|n| n.id == node_id)
            .take(1)
            .collect();
        if target.is_empty() {
            debug!(node = %node_id, "target node not connected");
            return Err(LinkError::NoPeerNode);
        }

        self.send_to_candidates(&target, payload).await
    }

    async fn send_to_candidates(&self, candidates: &[Node], payload: &str) -> LinkResult<SendReport> {
        let path = self.role.outbound_path();
        debug!(nodes = candidates.len(), path = %path, "sending user message");
        let results = dispatch(&self.transport, candidates, path, payload.as_bytes());
        let report = first_success(results, candidates).await?;
        info!(node = %report.delivered_via, "user message sent");
        Ok(report)
    }

    /// Register one more foreground consumer and emit everything the
    /// mailbox holds. Returns the number of messages emitted.
    ///
    /// If the drain fails the consumer is not registered. Listeners run
    /// under the foreground lock here and must not attach or detach from
    /// inside their callback.
    pub fn attach_foreground(&self) -> LinkResult<usize> {
        let mut attached = self.gate();

        let drained = self
            .mailbox
            .drain_all(|message| self.bus.publish(&LinkEvent::MessageReceived(message.clone())))?;
        *attached += 1;
        if !drained.is_empty() {
            info!(count = drained.len(), "emitted pending messages");
        }
        Ok(drained.len())
    }

    /// Release one foreground consumer. Once none is left, later messages
    /// are stored.
    pub fn detach_foreground(&self) {
        let mut attached = self.gate();
        *attached = attached.saturating_sub(1);
    }

    /// Release every foreground consumer at once.
    pub fn detach_all(&self) {
        *self.gate() = 0;
    }

    /// Whether user messages currently go straight to the bus.
    pub fn is_foreground_attached(&self) -> bool {
        *self.gate() > 0
    }

    /// Number of attached foreground consumers.
    pub fn foreground_count(&self) -> usize {
        *self.gate()
    }

    /// Role this router sends as.
    pub fn role(&self) -> Role {
        self.role
    }
}
