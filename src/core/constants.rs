//! Wire constants and timing defaults.
//!
//! Paths and tokens are shared with the peer application and MUST NOT be
//! changed without changing both endpoints.

use std::time::Duration;

// =============================================================================
// FRAME PATHS
// =============================================================================

/// Handshake probe/ACK exchange.
pub const HANDSHAKE_PATH: &str = "/APP_OPEN_WEARABLE_PAYLOAD";

/// Liveness ping/ack round trip.
pub const LIVENESS_PATH: &str = "/wear-liveness";

/// User messages sent by the handheld, received by the wearable.
pub const HANDHELD_TO_WEARABLE_PATH: &str = "/message-item-received";

/// User messages sent by the wearable, received by the handheld.
pub const WEARABLE_TO_HANDHELD_PATH: &str = "/wear-message-to-phone";

/// Every path that carries user payloads.
pub const USER_MESSAGE_PATHS: [&str; 2] = [HANDHELD_TO_WEARABLE_PATH, WEARABLE_TO_HANDHELD_PATH];

// =============================================================================
// PAYLOAD TOKENS
// =============================================================================

/// Handshake probe token. Sent as `PROBE_TOKEN:<nonce>`.
pub const PROBE_TOKEN: &str = "AppOpenWearable";

/// Handshake reply token. Sent as `ACK_TOKEN:<nonce>`, echoing the probe nonce.
pub const ACK_TOKEN: &str = "AppOpenWearableACK";

/// Separator between a token and its nonce.
pub const NONCE_SEPARATOR: char = ':';

/// Liveness request token.
pub const PING_TOKEN: &str = "ping";

/// Liveness reply token.
pub const PONG_TOKEN: &str = "ack";

// =============================================================================
// TIMING DEFAULTS
// =============================================================================

/// Time allowed for one handshake attempt before the next probe goes out.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Handshake probes sent per connection check.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Total time a ping waits for its reply.
pub const DEFAULT_PING_BUDGET: Duration = Duration::from_secs(3);

/// Interval between ping resends while waiting.
pub const DEFAULT_PING_RESEND_INTERVAL: Duration = Duration::from_millis(500);

// =============================================================================
// MAILBOX
// =============================================================================

/// Store identifier of the pending mailbox.
pub const DEFAULT_MAILBOX_KEY: &str = "wearlink_pending";

/// File extension of a file-backed mailbox.
pub const MAILBOX_FILE_EXTENSION: &str = "json";
