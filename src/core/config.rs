//! Endpoint configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants::{
    DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_MAILBOX_KEY, DEFAULT_MAX_ATTEMPTS, DEFAULT_PING_BUDGET,
    DEFAULT_PING_RESEND_INTERVAL,
};
use super::error::{LinkError, LinkResult};

/// Environment variable prefix read by [`LinkConfig::from_env`].
pub const ENV_PREFIX: &str = "WEARLINK_";

/// Which connected nodes an outbound frame is addressed to.
///
/// One policy is applied to probes, pings and user messages alike.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CandidatePolicy {
    /// Nearby nodes; all connected nodes when none is nearby.
    #[default]
    NearbyFirst,
    /// Nearby nodes only.
    NearbyOnly,
    /// Every connected node.
    All,
}

impl std::str::FromStr for CandidatePolicy {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nearby-first" => Ok(Self::NearbyFirst),
            "nearby-only" => Ok(Self::NearbyOnly),
            "all" => Ok(Self::All),
            other => Err(LinkError::Config(format!("unknown candidate policy: {other}"))),
        }
    }
}

/// Endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Time allowed per handshake attempt.
    pub attempt_timeout: Duration,
    /// Handshake attempts per connection check.
    pub max_attempts: u32,
    /// Total time a ping waits for its reply.
    pub ping_budget: Duration,
    /// Interval between ping resends.
    pub ping_resend_interval: Duration,
    /// Outbound node selection.
    pub candidate_policy: CandidatePolicy,
    /// Store identifier of the pending mailbox.
    pub mailbox_key: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            ping_budget: DEFAULT_PING_BUDGET,
            ping_resend_interval: DEFAULT_PING_RESEND_INTERVAL,
            candidate_policy: CandidatePolicy::default(),
            mailbox_key: DEFAULT_MAILBOX_KEY.to_string(),
        }
    }
}

impl LinkConfig {
    /// Start a builder from the defaults.
    pub fn builder() -> LinkConfigBuilder {
        LinkConfigBuilder::new()
    }

    /// Read overrides from `WEARLINK_*` environment variables.
    ///
    /// - `WEARLINK_ATTEMPT_TIMEOUT_MS`
    /// - `WEARLINK_MAX_ATTEMPTS`
    /// - `WEARLINK_PING_BUDGET_MS`
    /// - `WEARLINK_PING_RESEND_MS`
    /// - `WEARLINK_CANDIDATES`: `nearby-first` | `nearby-only` | `all`
    /// - `WEARLINK_MAILBOX_KEY`
    pub fn from_env() -> LinkResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> LinkResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let mut builder = Self::builder();

        if let Some(v) = var("ATTEMPT_TIMEOUT_MS") {
            builder = builder.attempt_timeout(Duration::from_millis(parse_num(&v, "ATTEMPT_TIMEOUT_MS")?));
        }
        if let Some(v) = var("MAX_ATTEMPTS") {
            let attempts = u32::try_from(parse_num(&v, "MAX_ATTEMPTS")?)
                .map_err(|_| LinkError::Config(format!("{ENV_PREFIX}MAX_ATTEMPTS={v:?}: too large")))?;
            builder = builder.max_attempts(attempts);
        }
        if let Some(v) = var("PING_BUDGET_MS") {
            builder = builder.ping_budget(Duration::from_millis(parse_num(&v, "PING_BUDGET_MS")?));
        }
        if let Some(v) = var("PING_RESEND_MS") {
            builder = builder.ping_resend_interval(Duration::from_millis(parse_num(&v, "PING_RESEND_MS")?));
        }
        if let Some(v) = var("CANDIDATES") {
            builder = builder.candidate_policy(v.parse()?);
        }
        if let Some(v) = var("MAILBOX_KEY") {
            builder = builder.mailbox_key(v);
        }

        builder.build()
    }

    /// Check invariants between fields.
    pub fn validate(&self) -> LinkResult<()> {
        if self.max_attempts == 0 {
            return Err(LinkError::Config("max_attempts must be at least 1".into()));
        }
        if self.attempt_timeout.is_zero() {
            return Err(LinkError::Config("attempt_timeout must be non-zero".into()));
        }
        if self.ping_budget.is_zero() || self.ping_resend_interval.is_zero() {
            return Err(LinkError::Config("ping timings must be non-zero".into()));
        }
        if self.ping_resend_interval > self.ping_budget {
            return Err(LinkError::Config(
                "ping_resend_interval must not exceed ping_budget".into(),
            ));
        }
        let key_ok = !self.mailbox_key.is_empty()
            && self
                .mailbox_key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !key_ok {
            return Err(LinkError::Config(format!(
                "mailbox_key must be a non-empty [A-Za-z0-9_-] identifier, got {:?}",
                self.mailbox_key
            )));
        }
        Ok(())
    }
}

fn parse_num(value: &str, name: &str) -> LinkResult<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|e| LinkError::Config(format!("{ENV_PREFIX}{name}={value:?}: {e}")))
}

/// Builder for [`LinkConfig`].
#[derive(Debug, Clone, Default)]
pub struct LinkConfigBuilder {
    config: LinkConfig,
}

impl LinkConfigBuilder {
    /// Create a builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-attempt handshake timeout.
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.config.attempt_timeout = timeout;
        self
    }

    /// Set the number of handshake attempts.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    /// Set the total ping wait.
    pub fn ping_budget(mut self, budget: Duration) -> Self {
        self.config.ping_budget = budget;
        self
    }

    /// Set the ping resend interval.
    pub fn ping_resend_interval(mut self, interval: Duration) -> Self {
        self.config.ping_resend_interval = interval;
        self
    }

    /// Set the outbound node selection policy.
    pub fn candidate_policy(mut self, policy: CandidatePolicy) -> Self {
        self.config.candidate_policy = policy;
        self
    }

    /// Set the mailbox store identifier.
    pub fn mailbox_key(mut self, key: impl Into<String>) -> Self {
        self.config.mailbox_key = key.into();
        self
    }

    /// Validate and build.
    pub fn build(self) -> LinkResult<LinkConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = LinkConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.attempt_timeout, Duration::from_secs(10));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.candidate_policy, CandidatePolicy::NearbyFirst);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = LinkConfig::from_lookup(lookup(&[
            ("WEARLINK_ATTEMPT_TIMEOUT_MS", "2500"),
            ("WEARLINK_MAX_ATTEMPTS", "5"),
            ("WEARLINK_CANDIDATES", "all"),
            ("WEARLINK_MAILBOX_KEY", "watch_inbox"),
        ]))
        .unwrap();
        assert_eq!(config.attempt_timeout, Duration::from_millis(2500));
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.candidate_policy, CandidatePolicy::All);
        assert_eq!(config.mailbox_key, "watch_inbox");
        assert_eq!(config.ping_budget, DEFAULT_PING_BUDGET);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = LinkConfig::from_lookup(lookup(&[("WEARLINK_MAX_ATTEMPTS", "three")]));
        assert!(matches!(err, Err(LinkError::Config(_))));

        let err = LinkConfig::from_lookup(lookup(&[("WEARLINK_CANDIDATES", "closest")]));
        assert!(matches!(err, Err(LinkError::Config(_))));
    }

    #[test]
    fn test_validation() {
        assert!(LinkConfig::builder().max_attempts(0).build().is_err());
        assert!(LinkConfig::builder()
            .ping_budget(Duration::from_millis(100))
            .ping_resend_interval(Duration::from_millis(200))
            .build()
            .is_err());
        assert!(LinkConfig::builder().mailbox_key("../escape").build().is_err());
        assert!(LinkConfig::builder().mailbox_key("").build().is_err());
    }
}
