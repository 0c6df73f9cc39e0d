//! Handshake coordinator: does the peer application answer?

mod coordinator;
mod nonce;

pub use coordinator::{HandshakeAttempt, HandshakeCoordinator, HandshakeOutcome};
pub use nonce::NonceSource;
