//! Nonce-qualified connection checks with bounded retries.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use super::nonce::NonceSource;
use crate::core::{CandidatePolicy, HANDSHAKE_PATH, LinkResult, Transport};
use crate::router::{dispatch, encode_ack, encode_probe, select_candidates};

/// How a connection check ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeOutcome {
    /// The peer echoed the current attempt's nonce.
    Confirmed,
    /// Every attempt ran out of time without a matching ACK.
    TimedOut,
    /// A newer check replaced this one.
    Superseded,
    /// The coordinator was shut down while the check was pending.
    Cancelled,
    /// No candidate node was listed; no probe was sent.
    NoPeer,
    /// The transport precondition was false; no probe was sent.
    TransportUnavailable,
}

impl HandshakeOutcome {
    /// Only a confirmed check counts as connected.
    pub fn is_connected(self) -> bool {
        self == Self::Confirmed
    }
}

/// One probe of a check.
#[derive(Debug, Clone)]
pub struct HandshakeAttempt {
    /// Nonce carried by the probe.
    pub nonce: String,
    /// The only ACK payload that confirms this attempt.
    pub expected_ack: String,
    /// Zero-based attempt number.
    pub attempt_index: u32,
    /// Attempts allowed for the check.
    pub max_attempts: u32,
    /// When this attempt gives up.
    pub deadline: Instant,
}

/// The single outstanding check. Resolved exactly once, by whichever of
/// the ACK path, the timer path, a newer check or shutdown gets there first.
#[derive(Debug)]
struct PendingCheck {
    id: u64,
    attempt: Mutex<Option<HandshakeAttempt>>,
    resolved: AtomicBool,
    tx: Mutex<Option<oneshot::Sender<HandshakeOutcome>>>,
}

impl PendingCheck {
    fn new(id: u64, tx: oneshot::Sender<HandshakeOutcome>) -> Self {
        Self {
            id,
            attempt: Mutex::new(None),
            resolved: AtomicBool::new(false),
            tx: Mutex::new(Some(tx)),
        }
    }

    fn attempt(&self) -> MutexGuard<'_, Option<HandshakeAttempt>> {
        self.attempt.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns false if another path already resolved the check.
    fn resolve(&self, outcome: HandshakeOutcome) -> bool {
        if self
            .resolved
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let tx = self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(tx) = tx {
            let _ = tx.send(outcome);
        }
        true
    }

    fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::Acquire)
    }
}

/// Clears a check from the slot when its `check_connection` call ends,
/// including when the caller drops the future mid-wait.
struct Release<'a> {
    coordinator: &'a HandshakeCoordinator,
    check: Arc<PendingCheck>,
}

impl Drop for Release<'_> {
    fn drop(&mut self) {
        if self.check.resolve(HandshakeOutcome::Cancelled) {
            debug!(check = self.check.id, "handshake abandoned by caller");
        }
        self.coordinator.release(&self.check);
    }
}

/// Runs connection checks against the peer application.
///
/// At most one check is pending at a time. Starting a new check resolves
/// the previous one as [`HandshakeOutcome::Superseded`], and an ACK is only
/// ever compared against the current attempt of the current check.
pub struct HandshakeCoordinator {
    transport: Arc<dyn Transport>,
    policy: CandidatePolicy,
    attempt_timeout: Duration,
    max_attempts: u32,
    nonces: NonceSource,
    next_check: AtomicU64,
    pending: Mutex<Option<Arc<PendingCheck>>>,
}

impl std::fmt::Debug for HandshakeCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeCoordinator")
            .field("policy", &self.policy)
            .field("attempt_timeout", &self.attempt_timeout)
            .field("max_attempts", &self.max_attempts)
            .field("pending", &self.has_pending_check())
            .finish_non_exhaustive()
    }
}

impl HandshakeCoordinator {
    /// Create a coordinator. `max_attempts` below one is treated as one.
    pub fn new(
        transport: Arc<dyn Transport>,
        policy: CandidatePolicy,
        attempt_timeout: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            transport,
            policy,
            attempt_timeout,
            max_attempts: max_attempts.max(1),
            nonces: NonceSource::new(),
            next_check: AtomicU64::new(1),
            pending: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<PendingCheck>>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether a check is waiting for an ACK or a timer.
    pub fn has_pending_check(&self) -> bool {
        self.slot().is_some()
    }

    /// Probe the peer application until it answers or every attempt times
    /// out.
    ///
    /// Returns an error only when the transport fails to list nodes; an
    /// absent or silent peer is an outcome.
    pub async fn check_connection(&self) -> LinkResult<HandshakeOutcome> {
        if !self.transport.is_available() {
            debug!("transport unavailable, skipping handshake");
            return Ok(HandshakeOutcome::TransportUnavailable);
        }

        let nodes = self.transport.list_connected_nodes().await?;
        let candidates = select_candidates(nodes, self.policy);
        if candidates.is_empty() {
            debug!("no peer node, skipping handshake");
            return Ok(HandshakeOutcome::NoPeer);
        }

        let (tx, mut rx) = oneshot::channel();
        let check = Arc::new(PendingCheck::new(
            self.next_check.fetch_add(1, Ordering::Relaxed),
            tx,
        ));
        self.install(Arc::clone(&check));
        let _release = Release {
            coordinator: self,
            check: Arc::clone(&check),
        };

        for attempt_index in 0..self.max_attempts {
            let nonce = self.nonces.next_nonce();
            let probe = encode_probe(&nonce);
            let deadline = Instant::now() + self.attempt_timeout;
            {
                let mut current = check.attempt();
                if check.is_resolved() {
                    break;
                }
                *current = Some(HandshakeAttempt {
                    expected_ack: encode_ack(Some(&nonce)),
                    nonce: nonce.clone(),
                    attempt_index,
                    max_attempts: self.max_attempts,
                    deadline,
                });
            }

            debug!(
                check = check.id,
                attempt = attempt_index + 1,
                nonce = %nonce,
                nodes = candidates.len(),
                "sending handshake probe"
            );
            // Per-node send failures are logged by the send tasks; a lost
            // probe is covered by the attempt timer.
            drop(dispatch(
                &self.transport,
                &candidates,
                HANDSHAKE_PATH,
                probe.as_bytes(),
            ));

            tokio::select! {
                outcome = &mut rx => {
                    let outcome = outcome.unwrap_or(HandshakeOutcome::Cancelled);
                    return Ok(outcome);
                }
                _ = sleep_until(deadline) => {
                    debug!(check = check.id, attempt = attempt_index + 1, "handshake attempt timed out");
                }
            }
        }

        if check.resolve(HandshakeOutcome::TimedOut) {
            info!(check = check.id, attempts = self.max_attempts, "peer did not answer handshake");
            return Ok(HandshakeOutcome::TimedOut);
        }

        // Another path won the race with the last timer.
        Ok(rx.await.unwrap_or(HandshakeOutcome::Cancelled))
    }

    fn install(&self, check: Arc<PendingCheck>) {
        let previous = self.slot().replace(check);
        if let Some(previous) = previous {
            if previous.resolve(HandshakeOutcome::Superseded) {
                debug!(check = previous.id, "pending handshake superseded");
            }
        }
    }

    fn release(&self, check: &Arc<PendingCheck>) {
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, check)) {
            *slot = None;
        }
    }

    /// Offer a handshake ACK payload to the pending check.
    ///
    /// Returns true iff the payload matched the current attempt byte for
    /// byte and this call resolved the check.
    pub fn on_ack(&self, payload: &str) -> bool {
        let Some(check) = self.slot().clone() else {
            debug!(payload = %payload, "handshake ack with no pending check, ignoring");
            return false;
        };

        let matched = check
            .attempt()
            .as_ref()
            .is_some_and(|attempt| attempt.expected_ack == payload);
        if !matched {
            warn!(check = check.id, payload = %payload, "stale or mismatched handshake ack ignored");
            return false;
        }

        let resolved = check.resolve(HandshakeOutcome::Confirmed);
        if resolved {
            info!(check = check.id, "handshake confirmed");
        }
        resolved
    }

    /// Resolve any pending check as cancelled and clear the slot.
    pub fn cancel(&self) {
        let pending = self.slot().take();
        if let Some(check) = pending {
            if check.resolve(HandshakeOutcome::Cancelled) {
                debug!(check = check.id, "pending handshake cancelled");
            }
        }
    }

    /// Snapshot of the current attempt, if a check is pending.
    pub fn current_attempt(&self) -> Option<HandshakeAttempt> {
        let check = self.slot().clone()?;
        check.attempt().clone()
    }
}
