//! Path-based frame classification and the handshake payload codec.
//!
//! Classification is exhaustive and exclusive: every frame maps to exactly
//! one [`FrameKind`], and only [`FrameKind::User`] ever reaches the event
//! bus or the mailbox.

use crate::core::{
    ACK_TOKEN, Frame, HANDSHAKE_PATH, LIVENESS_PATH, NONCE_SEPARATOR, PING_TOKEN, PONG_TOKEN,
    PROBE_TOKEN, USER_MESSAGE_PATHS,
};

/// What an inbound frame is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// Handshake probe from the peer; answered with an ACK.
    Probe {
        /// Nonce to echo, if the probe carried one.
        nonce: Option<String>,
    },
    /// Handshake ACK; offered to the pending connection check.
    HandshakeAck {
        /// Full payload, compared byte-for-byte with the expected ACK.
        payload: String,
    },
    /// Liveness request; answered with a pong.
    Ping,
    /// Liveness reply; consumed by the prober.
    Pong,
    /// User message.
    User,
    /// Unrecognized path or payload; dropped.
    Unknown,
}

/// Split a handshake payload into its token and optional nonce.
///
/// An empty nonce (`"TOKEN:"`) counts as absent.
pub fn split_token(payload: &str) -> (&str, Option<&str>) {
    match payload.split_once(NONCE_SEPARATOR) {
        Some((head, nonce)) if !nonce.is_empty() => (head, Some(nonce)),
        Some((head, _)) => (head, None),
        None => (payload, None),
    }
}

/// Encode a probe carrying `nonce`.
pub fn encode_probe(nonce: &str) -> String {
    format!("{PROBE_TOKEN}{NONCE_SEPARATOR}{nonce}")
}

/// Encode the ACK for a probe. A bare probe gets a bare ACK.
pub fn encode_ack(nonce: Option<&str>) -> String {
    match nonce {
        Some(nonce) => format!("{ACK_TOKEN}{NONCE_SEPARATOR}{nonce}"),
        None => ACK_TOKEN.to_string(),
    }
}

/// Classify a frame by path, then by payload.
pub fn classify(frame: &Frame) -> FrameKind {
    let path = frame.path.as_str();

    if path == HANDSHAKE_PATH {
        let text = frame.text();
        // Exact token comparison: ACK_TOKEN starts with PROBE_TOKEN.
        let (head, nonce) = split_token(&text);
        if head == ACK_TOKEN {
            return FrameKind::HandshakeAck {
                payload: text.clone(),
            };
        }
        if head == PROBE_TOKEN {
            return FrameKind::Probe {
                nonce: nonce.map(str::to_string),
            };
        }
        return FrameKind::Unknown;
    }

    if path == LIVENESS_PATH {
        let text = frame.text();
        let token = text.trim();
        if token.eq_ignore_ascii_case(PING_TOKEN) {
            return FrameKind::Ping;
        }
        if token == PONG_TOKEN {
            return FrameKind::Pong;
        }
        return FrameKind::Unknown;
    }

    if USER_MESSAGE_PATHS.contains(&path) {
        return FrameKind::User;
    }

    FrameKind::Unknown
}
