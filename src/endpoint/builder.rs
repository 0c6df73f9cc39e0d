//! Endpoint construction.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::endpoint::{Endpoint, run_inbound};
use crate::core::{FrameSink, LinkConfig, LinkError, LinkResult, Role, Transport};
use crate::events::EventBus;
use crate::handshake::HandshakeCoordinator;
use crate::liveness::LivenessProber;
use crate::mailbox::{FileStore, MailboxStore, MemoryStore, PendingMailbox};
use crate::router::FrameRouter;

/// Builder for [`Endpoint`].
///
/// Without [`mailbox_dir`](Self::mailbox_dir) or
/// [`mailbox_store`](Self::mailbox_store) the mailbox lives in memory and
/// does not survive a restart.
pub struct EndpointBuilder {
    role: Role,
    config: LinkConfig,
    store: Option<Box<dyn MailboxStore>>,
    mailbox_dir: Option<PathBuf>,
}

impl std::fmt::Debug for EndpointBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointBuilder")
            .field("role", &self.role)
            .field("config", &self.config)
            .field("mailbox_dir", &self.mailbox_dir)
            .finish_non_exhaustive()
    }
}

impl EndpointBuilder {
    pub(crate) fn new(role: Role) -> Self {
        Self {
            role,
            config: LinkConfig::default(),
            store: None,
            mailbox_dir: None,
        }
    }

    /// Timing and policy settings.
    pub fn config(mut self, config: LinkConfig) -> Self {
        self.config = config;
        self
    }

    /// Keep the mailbox in `<dir>/<mailbox_key>.json`.
    pub fn mailbox_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.mailbox_dir = Some(dir.into());
        self
    }

    /// Use a custom mailbox store. Takes precedence over
    /// [`mailbox_dir`](Self::mailbox_dir).
    pub fn mailbox_store(mut self, store: impl MailboxStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Register with `transport` and start the inbound frame loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(self, transport: Arc<dyn Transport>) -> LinkResult<Endpoint> {
        self.config.validate()?;
        let runtime = Handle::try_current().map_err(|_| {
            LinkError::Config("endpoint must be started inside a Tokio runtime".into())
        })?;

        let store: Box<dyn MailboxStore> = match (self.store, &self.mailbox_dir) {
            (Some(store), _) => store,
            (None, Some(dir)) => Box::new(FileStore::new(dir, &self.config.mailbox_key)),
            (None, None) => {
                debug!("no mailbox location configured, pending messages stay in memory");
                Box::new(MemoryStore::new())
            }
        };

        let config = self.config;
        let bus = EventBus::new();
        let mailbox = Arc::new(PendingMailbox::from_boxed(store));
        let handshake = Arc::new(HandshakeCoordinator::new(
            Arc::clone(&transport),
            config.candidate_policy,
            config.attempt_timeout,
            config.max_attempts,
        ));
        let liveness = Arc::new(LivenessProber::new(
            Arc::clone(&transport),
            config.candidate_policy,
            config.ping_budget,
            config.ping_resend_interval,
        ));
        let router = Arc::new(FrameRouter::new(
            self.role,
            config.candidate_policy,
            Arc::clone(&transport),
            Arc::clone(&handshake),
            Arc::clone(&liveness),
            Arc::clone(&mailbox),
            bus.clone(),
        ));

        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let sink = FrameSink::new(frame_tx);
        transport.on_frame(sink.clone());
        runtime.spawn(run_inbound(Arc::clone(&router), frame_rx, shutdown_rx));

        info!(role = ?self.role, policy = ?config.candidate_policy, "endpoint started");

        Ok(Endpoint::assemble(
            self.role,
            config,
            transport,
            router,
            handshake,
            liveness,
            mailbox,
            bus,
            sink,
            shutdown_tx,
        ))
    }
}
