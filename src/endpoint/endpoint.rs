//! The endpoint facade.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::builder::EndpointBuilder;
use super::session::ForegroundSession;
use crate::core::{
    ConnectionState, EventListener, Frame, FrameSink, LinkConfig, LinkError, LinkResult, Node,
    Role, Transport,
};
use crate::events::{EventBus, EventStream, LinkEvent, Subscription};
use crate::handshake::{HandshakeCoordinator, HandshakeOutcome};
use crate::liveness::{LivenessProber, PingOutcome};
use crate::mailbox::PendingMailbox;
use crate::router::{FrameRouter, SendReport, select_candidates};

/// Drain inbound frames into the router until shutdown.
pub(super) async fn run_inbound(
    router: Arc<FrameRouter>,
    mut frames: mpsc::UnboundedReceiver<Frame>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => break,
            frame = frames.recv() => match frame {
                Some(frame) => {
                    router.on_frame_received(frame);
                }
                None => break,
            },
        }
    }
    debug!("inbound frame loop stopped");
}

/// One side of a handheld/wearable pair.
///
/// Owns the handshake coordinator, liveness prober, frame router, pending
/// mailbox and event bus for a single transport. Dropping the endpoint stops
/// its inbound loop but keeps the mailbox; [`shutdown`](Self::shutdown)
/// also clears it.
pub struct Endpoint {
    role: Role,
    config: LinkConfig,
    transport: Arc<dyn Transport>,
    router: Arc<FrameRouter>,
    handshake: Arc<HandshakeCoordinator>,
    liveness: Arc<LivenessProber>,
    mailbox: Arc<PendingMailbox>,
    bus: EventBus,
    sink: FrameSink,
    state: Mutex<ConnectionState>,
    closed: AtomicBool,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("role", &self.role)
            .field("state", &self.connection_state())
            .field("closed", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

impl Endpoint {
    /// Start building an endpoint for `role`.
    pub fn builder(role: Role) -> EndpointBuilder {
        EndpointBuilder::new(role)
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn assemble(
        role: Role,
        config: LinkConfig,
        transport: Arc<dyn Transport>,
        router: Arc<FrameRouter>,
        handshake: Arc<HandshakeCoordinator>,
        liveness: Arc<LivenessProber>,
        mailbox: Arc<PendingMailbox>,
        bus: EventBus,
        sink: FrameSink,
        shutdown_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            role,
            config,
            transport,
            router,
            handshake,
            liveness,
            mailbox,
            bus,
            sink,
            state: Mutex::new(ConnectionState::default()),
            closed: AtomicBool::new(false),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
        }
    }

    fn ensure_open(&self) -> LinkResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(LinkError::Shutdown);
        }
        Ok(())
    }

    fn state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn report(&self, state: ConnectionState) {
        *self.state() = state;
        self.bus.publish(&LinkEvent::ConnectionChanged(state));
    }

    /// Which side of the pair this is.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Active configuration.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    // =========================================================================
    // Connection status
    // =========================================================================

    /// Run a handshake and report whether the peer application answered.
    ///
    /// Peer absence and silence are `Ok(false)`. A check superseded by a
    /// newer one also returns `Ok(false)` and leaves the reported state to
    /// the newer check.
    pub async fn check_connection(&self) -> LinkResult<bool> {
        Ok(self.check_connection_outcome().await?.is_connected())
    }

    /// Like [`check_connection`](Self::check_connection), with the reason.
    pub async fn check_connection_outcome(&self) -> LinkResult<HandshakeOutcome> {
        self.ensure_open()?;
        let outcome = self.handshake.check_connection().await?;

        let node_present = match outcome {
            HandshakeOutcome::Superseded | HandshakeOutcome::Cancelled => return Ok(outcome),
            HandshakeOutcome::NoPeer | HandshakeOutcome::TransportUnavailable => false,
            HandshakeOutcome::Confirmed | HandshakeOutcome::TimedOut => true,
        };
        self.report(ConnectionState {
            node_present,
            ack_received: outcome.is_connected(),
        });
        Ok(outcome)
    }

    /// One ping/ack round trip.
    pub async fn ping(&self) -> LinkResult<PingOutcome> {
        self.ensure_open()?;
        self.liveness.ping().await
    }

    /// Node presence from a fresh listing plus a ping round trip. The result
    /// becomes the reported state.
    pub async fn check_liveness(&self) -> LinkResult<ConnectionState> {
        self.ensure_open()?;

        let node_present = self.transport.is_available()
            && !select_candidates(
                self.transport.list_connected_nodes().await?,
                self.config.candidate_policy,
            )
            .is_empty();
        let ack_received = node_present && self.liveness.ping().await?.ack_received;

        let state = ConnectionState {
            node_present,
            ack_received,
        };
        self.report(state);
        Ok(state)
    }

    /// Last reported connection state. No I/O.
    pub fn connection_state(&self) -> ConnectionState {
        *self.state()
    }

    /// Smoothed ping round trip, once a ping has been answered.
    pub fn smoothed_rtt(&self) -> Option<Duration> {
        self.liveness.smoothed_rtt()
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    /// Fresh snapshot of connected nodes.
    pub async fn connected_nodes(&self) -> LinkResult<Vec<Node>> {
        self.ensure_open()?;
        self.transport.list_connected_nodes().await
    }

    /// Re-read the node set and publish [`LinkEvent::NodesChanged`].
    pub async fn refresh_nodes(&self) -> LinkResult<Vec<Node>> {
        let nodes = self.connected_nodes().await?;
        self.bus.publish(&LinkEvent::NodesChanged {
            count: nodes.len(),
            reachable: !nodes.is_empty(),
        });
        Ok(nodes)
    }

    // =========================================================================
    // Messages
    // =========================================================================

    /// Send a user message to the peer and publish
    /// [`LinkEvent::MessageSent`] with the result.
    pub async fn send_message(&self, text: &str) -> LinkResult<SendReport> {
        self.ensure_open()?;
        let result = self.router.send_user_message(text).await;
        self.report_sent(text, result)
    }

    /// Send a user message to one connected node by id, bypassing the
    /// candidate policy. Publishes [`LinkEvent::MessageSent`] like
    /// [`send_message`](Self::send_message).
    pub async fn send_to(&self, node_id: &str, text: &str) -> LinkResult<SendReport> {
        self.ensure_open()?;
        let result = self.router.send_user_message_to(node_id, text).await;
        self.report_sent(text, result)
    }

    fn report_sent(&self, text: &str, result: LinkResult<SendReport>) -> LinkResult<SendReport> {
        if let Err(e) = &result {
            warn!(error = %e, "user message not sent");
        }
        self.bus.publish(&LinkEvent::MessageSent {
            success: result.is_ok(),
            payload: text.to_string(),
        });
        result
    }

    /// Attach a foreground consumer: everything stored in the mailbox is
    /// published now, and later user messages go straight to the bus until
    /// the returned session is dropped.
    pub fn attach_foreground(&self) -> LinkResult<ForegroundSession> {
        self.ensure_open()?;
        let drained = self.router.attach_foreground()?;
        Ok(ForegroundSession::new(Arc::clone(&self.router), drained))
    }

    /// Whether at least one foreground session is attached.
    pub fn is_foreground_attached(&self) -> bool {
        self.router.is_foreground_attached()
    }

    /// Messages waiting in the mailbox.
    pub fn pending_count(&self) -> LinkResult<usize> {
        self.mailbox.len()
    }

    // =========================================================================
    // Events and ingestion
    // =========================================================================

    /// Register a listener until the subscription is dropped.
    pub fn subscribe(&self, listener: Arc<dyn EventListener>) -> Subscription {
        self.bus.subscribe(listener)
    }

    /// Channel-backed event subscription.
    pub fn events(&self) -> EventStream {
        self.bus.stream()
    }

    /// The endpoint's event bus.
    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    /// Handle for feeding inbound frames from a host thread.
    pub fn frame_sink(&self) -> FrameSink {
        self.sink.clone()
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Stop the inbound loop, resolve any pending check as cancelled, and
    /// clear the mailbox and every flag. Later operations fail with
    /// [`LinkError::Shutdown`]. Calling it twice is harmless.
    pub fn shutdown(&self) -> LinkResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if let Some(tx) = self
            .shutdown_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            let _ = tx.send(());
        }

        self.handshake.cancel();
        self.liveness.reset();
        self.router.detach_all();
        *self.state() = ConnectionState::default();
        self.mailbox.clear()?;

        info!(role = ?self.role, "endpoint shut down");
        Ok(())
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        if let Some(tx) = self
            .shutdown_tx
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            let _ = tx.send(());
        }
        self.handshake.cancel();
    }
}
