//! Handshake nonce generation.

use std::sync::atomic::{AtomicU64, Ordering};

/// Produces nonces of the form `<sequence hex>-<random hex>`.
///
/// The sequence makes every nonce from one source distinct; the random half
/// keeps a restarted process from reusing an earlier run's nonces.
#[derive(Debug, Default)]
pub struct NonceSource {
    next: AtomicU64,
}

impl NonceSource {
    /// Create a source starting at sequence zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Next nonce. Never contains the `:` separator.
    pub fn next_nonce(&self) -> String {
        let seq = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{seq:x}-{:08x}", rand::random::<u32>())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_nonces_are_unique() {
        let source = NonceSource::new();
        let nonces: HashSet<String> = (0..1000).map(|_| source.next_nonce()).collect();
        assert_eq!(nonces.len(), 1000);
    }

    #[test]
    fn test_nonce_has_no_separator() {
        let source = NonceSource::new();
        let nonce = source.next_nonce();
        assert!(!nonce.contains(':'));
        assert!(nonce.starts_with("0-"));
        assert_eq!(nonce.len(), "0-".len() + 8);
    }
}
