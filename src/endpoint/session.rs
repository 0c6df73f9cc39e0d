//! Scoped foreground attachment.

use std::sync::Arc;

use crate::router::FrameRouter;

/// A foreground consumer's claim on live user messages.
///
/// While the session is alive, user messages are published to the event bus
/// as they arrive. Sessions are counted; once the last one is dropped, later
/// messages go back to the mailbox.
#[must_use = "dropping the session detaches the foreground consumer"]
#[derive(Debug)]
pub struct ForegroundSession {
    router: Arc<FrameRouter>,
    drained: usize,
}

impl ForegroundSession {
    pub(super) fn new(router: Arc<FrameRouter>, drained: usize) -> Self {
        Self { router, drained }
    }

    /// Messages emitted from the mailbox when the session attached.
    pub fn drained(&self) -> usize {
        self.drained
    }

    /// Detach now.
    pub fn detach(self) {}
}

impl Drop for ForegroundSession {
    fn drop(&mut self) {
        self.router.detach_foreground();
    }
}
