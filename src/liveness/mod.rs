//! Liveness prober: a short ping/ack round trip with resends.

mod prober;
mod rtt;

pub use prober::{LivenessProber, PingOutcome};
pub use rtt::RttEstimator;
