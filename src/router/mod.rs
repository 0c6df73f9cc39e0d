//! Frame router: classification, inbound dispatch, outbound fan-out.

mod classify;
mod fanout;
#[allow(clippy::module_inception)]
mod router;

pub use classify::{FrameKind, classify, encode_ack, encode_probe, split_token};
pub use fanout::{SendReport, select_candidates};
pub(crate) use fanout::dispatch;
pub use router::FrameRouter;
