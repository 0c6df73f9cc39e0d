//! Candidate selection and per-node send fan-out.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::core::{CandidatePolicy, LinkError, LinkResult, Node, NodeFailure, Transport};

/// Pick the nodes an outbound frame is addressed to.
pub fn select_candidates(nodes: Vec<Node>, policy: CandidatePolicy) -> Vec<Node> {
    match policy {
        CandidatePolicy::All => nodes,
        CandidatePolicy::NearbyOnly => nodes.into_iter().filter(|n| n.is_nearby).collect(),
        CandidatePolicy::NearbyFirst => {
            if nodes.iter().any(|n| n.is_nearby) {
                nodes.into_iter().filter(|n| n.is_nearby).collect()
            } else {
                nodes
            }
        }
    }
}

/// Result of a successful user send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    /// First node that accepted the message.
    pub delivered_via: String,
    /// Every node the message was sent to.
    pub attempted: Vec<String>,
}

type SendResults = mpsc::UnboundedReceiver<(String, LinkResult<()>)>;

/// Send one frame to every node, each on its own task.
///
/// Sends keep running after the returned receiver is dropped; failures are
/// logged by the task that observed them.
pub(crate) fn dispatch(
    transport: &Arc<dyn Transport>,
    nodes: &[Node],
    path: &str,
    payload: &[u8],
) -> SendResults {
    let (tx, rx) = mpsc::unbounded_channel();

    for node in nodes {
        let transport = Arc::clone(transport);
        let tx = tx.clone();
        let node_id = node.id.clone();
        let path = path.to_string();
        let payload = payload.to_vec();

        tokio::spawn(async move {
            let result = transport.send(&node_id, &path, &payload).await;
            match &result {
                Ok(()) => debug!(node = %node_id, path = %path, "frame sent"),
                Err(e) => warn!(node = %node_id, path = %path, error = %e, "send failed"),
            }
            let _ = tx.send((node_id, result));
        });
    }

    rx
}

/// Resolve on the first successful send, or fail once every node failed.
pub(crate) async fn first_success(mut results: SendResults, nodes: &[Node]) -> LinkResult<SendReport> {
    let attempted: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
    let mut failures = Vec::new();

    while let Some((node_id, result)) = results.recv().await {
        match result {
            Ok(()) => {
                return Ok(SendReport {
                    delivered_via: node_id,
                    attempted,
                });
            }
            Err(e) => failures.push(NodeFailure {
                node_id,
                reason: e.to_string(),
            }),
        }
    }

    Err(LinkError::SendFailed {
        attempted: attempted.len(),
        failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes() -> Vec<Node> {
        vec![
            Node::new("cloud", "Cloud relay", false),
            Node::new("watch", "Pixel Watch", true),
        ]
    }

    #[test]
    fn test_nearby_first_prefers_nearby() {
        let picked = select_candidates(nodes(), CandidatePolicy::NearbyFirst);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id, "watch");
    }

    #[test]
    fn test_nearby_first_falls_back_to_all() {
        let far = vec![Node::new("a", "A", false), Node::new("b", "B", false)];
        let picked = select_candidates(far, CandidatePolicy::NearbyFirst);
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn test_nearby_only_can_be_empty() {
        let far = vec![Node::new("a", "A", false)];
        assert!(select_candidates(far, CandidatePolicy::NearbyOnly).is_empty());
    }

    #[test]
    fn test_all_keeps_everything() {
        assert_eq!(select_candidates(nodes(), CandidatePolicy::All).len(), 2);
    }
}
