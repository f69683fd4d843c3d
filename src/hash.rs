// src/hash.rs

//! SHA-256 helpers for repository checksums and cache keys
//!
//! Checksums and cache keys are lowercase hex SHA-256 digests. Structured
//! inputs are hashed over their JSON serialization, so two values hash the
//! same exactly when they serialize the same.

use crate::error::Result;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Incremental SHA-256 over several pieces of input
///
/// Each piece is length-prefixed so `["ab", "c"]` and `["a", "bc"]` hash
/// differently.
#[derive(Default)]
pub struct Hasher {
    inner: Sha256,
}

impl Hasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one piece of input
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update((data.len() as u64).to_le_bytes());
        self.inner.update(data);
    }

    /// Feed the JSON serialization of a value
    pub fn update_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.update(&bytes);
        Ok(())
    }

    /// Finalize into a hex digest
    pub fn finalize(self) -> String {
        format!("{:x}", self.inner.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hasher_pieces_are_delimited() {
        let mut a = Hasher::new();
        a.update(b"ab");
        a.update(b"c");

        let mut b = Hasher::new();
        b.update(b"a");
        b.update(b"bc");

        assert_ne!(a.finalize(), b.finalize());
    }

    #[test]
    fn test_update_json_is_stable() {
        let mut first = Hasher::new();
        first.update_json(&vec!["app/foo", "app/bar"]).unwrap();
        let mut second = Hasher::new();
        second.update_json(&vec!["app/foo", "app/bar"]).unwrap();

        let digest = first.finalize();
        assert_eq!(digest, second.finalize());
        assert_eq!(digest.len(), 64);
    }
}
