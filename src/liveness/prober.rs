//! Ping/ack round trips with timed resends.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::time::{Instant, interval_at, sleep};
use tracing::{debug, info};

use super::rtt::RttEstimator;
use crate::core::{CandidatePolicy, LIVENESS_PATH, LinkResult, Node, PING_TOKEN, Transport};
use crate::router::{dispatch, select_candidates};

/// Result of one ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingOutcome {
    /// The peer answered within the budget.
    pub ack_received: bool,
    /// Time to the ack, or the time spent waiting when none came.
    pub round_trip: Duration,
    /// Ping frames sent, counting resends.
    pub pings_sent: u32,
}

impl PingOutcome {
    fn unanswered(round_trip: Duration, pings_sent: u32) -> Self {
        Self {
            ack_received: false,
            round_trip,
            pings_sent,
        }
    }

    /// Round trip in whole milliseconds.
    pub fn round_trip_ms(&self) -> u64 {
        self.round_trip.as_millis() as u64
    }
}

/// Sends `ping` and waits for `ack`, resending on a fixed interval until
/// the budget runs out.
///
/// Pings from one prober never overlap; a second caller waits for the first
/// round trip to finish.
pub struct LivenessProber {
    transport: Arc<dyn Transport>,
    policy: CandidatePolicy,
    budget: Duration,
    resend_interval: Duration,
    acks: watch::Sender<u64>,
    in_flight: AsyncMutex<()>,
    rtt: Mutex<RttEstimator>,
}

impl std::fmt::Debug for LivenessProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivenessProber")
            .field("policy", &self.policy)
            .field("budget", &self.budget)
            .field("resend_interval", &self.resend_interval)
            .finish_non_exhaustive()
    }
}

impl LivenessProber {
    /// Create a prober.
    pub fn new(
        transport: Arc<dyn Transport>,
        policy: CandidatePolicy,
        budget: Duration,
        resend_interval: Duration,
    ) -> Self {
        let (acks, _) = watch::channel(0);
        Self {
            transport,
            policy,
            budget,
            resend_interval,
            acks,
            in_flight: AsyncMutex::new(()),
            rtt: Mutex::new(RttEstimator::new()),
        }
    }

    fn rtt(&self) -> MutexGuard<'_, RttEstimator> {
        self.rtt.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// One round trip. Transport unavailability and an empty node list are
    /// unanswered outcomes with zero pings sent; only a failed node listing
    /// is an error.
    pub async fn ping(&self) -> LinkResult<PingOutcome> {
        let _in_flight = self.in_flight.lock().await;

        if !self.transport.is_available() {
            debug!("transport unavailable, skipping ping");
            return Ok(PingOutcome::unanswered(Duration::ZERO, 0));
        }

        let nodes = self.transport.list_connected_nodes().await?;
        let candidates = select_candidates(nodes, self.policy);
        if candidates.is_empty() {
            debug!("no peer node, skipping ping");
            return Ok(PingOutcome::unanswered(Duration::ZERO, 0));
        }

        // Acks observed before this point belong to an earlier ping.
        let mut acks = self.acks.subscribe();
        let _ = acks.borrow_and_update();

        let started = Instant::now();
        self.send_ping(&candidates);
        let mut pings_sent = 1;

        let deadline = sleep(self.budget);
        tokio::pin!(deadline);
        let mut resend = interval_at(started + self.resend_interval, self.resend_interval);

        loop {
            tokio::select! {
                biased;

                changed = acks.changed() => {
                    if changed.is_err() {
                        return Ok(PingOutcome::unanswered(started.elapsed(), pings_sent));
                    }
                    let round_trip = started.elapsed();
                    self.rtt().record(round_trip);
                    debug!(rtt_ms = round_trip.as_millis() as u64, pings = pings_sent, "ping answered");
                    return Ok(PingOutcome {
                        ack_received: true,
                        round_trip,
                        pings_sent,
                    });
                }
                _ = &mut deadline => {
                    info!(pings = pings_sent, "ping unanswered within budget");
                    return Ok(PingOutcome::unanswered(started.elapsed(), pings_sent));
                }
                _ = resend.tick() => {
                    self.send_ping(&candidates);
                    pings_sent += 1;
                }
            }
        }
    }

    fn send_ping(&self, candidates: &[Node]) {
        drop(dispatch(
            &self.transport,
            candidates,
            LIVENESS_PATH,
            PING_TOKEN.as_bytes(),
        ));
    }

    /// Record an `ack` from the peer. Wakes the ping in flight, if any.
    pub fn on_ack(&self) {
        self.acks.send_modify(|seen| *seen = seen.wrapping_add(1));
    }

    /// Smoothed round trip over every answered ping.
    pub fn smoothed_rtt(&self) -> Option<Duration> {
        self.rtt().smoothed()
    }

    /// Snapshot of the round-trip statistics.
    pub fn rtt_stats(&self) -> RttEstimator {
        self.rtt().clone()
    }

    /// Forget round-trip history.
    pub fn reset(&self) {
        self.rtt().reset();
    }
}
