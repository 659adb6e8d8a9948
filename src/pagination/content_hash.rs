//! Duplicate-content detection via content fingerprints
//!
//! Navigation that loops (a "next" button that reloads the same page, an
//! infinite scroll that stops producing new content) is detected by
//! fingerprinting the page text after each action and checking the result
//! against a bounded lookback history. SHA-256 is used for collision
//! resistance and fixed-size comparison, not for secrecy.

use sha2::{Digest, Sha256};
use std::collections::VecDeque;

/// Default lookback capacity
pub const DEFAULT_LOOKBACK: usize = 10;

/// Compute the hex SHA-256 fingerprint of page content
#[must_use]
pub fn fingerprint(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Fixed-capacity FIFO of recent content fingerprints
#[derive(Debug, Clone)]
pub struct ContentHasher {
    history: VecDeque<String>,
    capacity: usize,
}

impl ContentHasher {
    /// Create a hasher with the given lookback capacity (minimum 1)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Pure membership test against the lookback history
    #[must_use]
    pub fn is_duplicate(&self, hash: &str) -> bool {
        self.history.iter().any(|h| h == hash)
    }

    /// Record a fingerprint, evicting the oldest entry when over
    /// capacity. Idempotent: a hash already in the history is not
    /// inserted twice.
    pub fn add_hash(&mut self, hash: String) {
        if self.is_duplicate(&hash) {
            return;
        }
        if self.history.len() >= self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(hash);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.history.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new(DEFAULT_LOOKBACK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_and_distinct() {
        assert_eq!(fingerprint("page one"), fingerprint("page one"));
        assert_ne!(fingerprint("page one"), fingerprint("page two"));
        assert_eq!(fingerprint("").len(), 64);
    }

    #[test]
    fn detects_revisited_content() {
        let mut hasher = ContentHasher::new(5);
        let a = fingerprint("A");
        let b = fingerprint("B");
        hasher.add_hash(a.clone());
        hasher.add_hash(b);
        assert!(hasher.is_duplicate(&a));
        assert!(!hasher.is_duplicate(&fingerprint("C")));
    }

    #[test]
    fn add_hash_is_idempotent() {
        let mut hasher = ContentHasher::new(3);
        let a = fingerprint("A");
        hasher.add_hash(a.clone());
        hasher.add_hash(a);
        assert_eq!(hasher.len(), 1);
    }

    #[test]
    fn oldest_entry_is_evicted_first() {
        let mut hasher = ContentHasher::new(3);
        let hashes: Vec<String> = (0..4).map(|i| fingerprint(&format!("page {i}"))).collect();
        for h in &hashes {
            hasher.add_hash(h.clone());
        }
        assert_eq!(hasher.len(), 3);
        // Capacity + 1 inserts: the first fingerprint is gone
        assert!(!hasher.is_duplicate(&hashes[0]));
        assert!(hasher.is_duplicate(&hashes[1]));
        assert!(hasher.is_duplicate(&hashes[3]));
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut hasher = ContentHasher::new(0);
        hasher.add_hash(fingerprint("A"));
        assert_eq!(hasher.len(), 1);
    }
}
