//! # wearlink
//!
//! Reliable messaging between a handheld device and its paired wearable
//! over a best-effort, node-based frame transport.
//!
//! The transport is assumed to lose, reorder and delay frames, and the peer
//! application may not be running at all. On top of it this crate provides:
//!
//! - **Handshake**: "is the peer app answering?" with nonce-qualified
//!   probes, bounded retries and a fast path on the first matching ACK
//! - **Liveness**: a short ping/ack round trip with timed resends
//! - **Routing**: path-based classification of every inbound frame and
//!   first-success fan-out for outbound user messages
//! - **Store-and-forward**: a durable mailbox for user messages that arrive
//!   while no foreground consumer is attached
//! - **Events**: an observer bus with scoped subscriptions
//!
//! ## Feature Flags
//!
//! - `memory` (default): in-process transport adapter for tests and demos
//!
//! ## Modules
//!
//! - [`core`]: constants, errors, configuration, shared types and the
//!   [`Transport`](core::Transport) trait
//! - [`router`]: frame classification and the [`FrameRouter`]
//! - [`handshake`]: the [`HandshakeCoordinator`]
//! - [`liveness`]: the [`LivenessProber`]
//! - [`mailbox`]: the [`PendingMailbox`] and its stores
//! - [`events`]: the [`EventBus`]
//! - [`endpoint`]: the [`Endpoint`] facade tying it all together
//! - [`transport`]: in-memory adapter (requires `memory` feature)
//!
//! ## Example Usage
//!
//! ```rust
//! use wearlink::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> LinkResult<()> {
//! let network = MemoryNetwork::new();
//! let (phone_link, watch_link) = network.pair();
//!
//! let phone = Endpoint::builder(Role::Handheld).start(phone_link)?;
//! let watch = Endpoint::builder(Role::Wearable).start(watch_link)?;
//!
//! assert!(phone.check_connection().await?);
//!
//! let session = watch.attach_foreground()?;
//! let mut inbox = watch.events();
//! phone.send_message("hello").await?;
//! # drop(session);
//! # let _ = inbox.try_recv();
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

pub mod endpoint;
pub mod events;
pub mod handshake;
pub mod liveness;
pub mod mailbox;
pub mod router;

// In-memory transport (feature-gated)
#[cfg(feature = "memory")]
#[cfg_attr(docsrs, doc(cfg(feature = "memory")))]
pub mod transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::*;

    pub use crate::endpoint::{Endpoint, EndpointBuilder, ForegroundSession};
    pub use crate::events::{EventBus, EventStream, LinkEvent, Subscription};
    pub use crate::handshake::HandshakeOutcome;
    pub use crate::liveness::PingOutcome;
    pub use crate::mailbox::{FileStore, MailboxStore, MemoryStore};
    pub use crate::router::SendReport;

    #[cfg(feature = "memory")]
    pub use crate::transport::{MemoryNetwork, MemoryTransport};
}

// Re-export commonly used items at crate root
pub use crate::core::{
    ConnectionState, Frame, FrameSink, LinkConfig, LinkError, LinkResult, Node, PendingMessage,
    Role, Transport,
};
pub use crate::endpoint::{Endpoint, EndpointBuilder, ForegroundSession};
pub use crate::events::{EventBus, LinkEvent};
pub use crate::handshake::{HandshakeCoordinator, HandshakeOutcome};
pub use crate::liveness::{LivenessProber, PingOutcome};
pub use crate::mailbox::PendingMailbox;
pub use crate::router::FrameRouter;
