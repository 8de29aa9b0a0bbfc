//! Session id generation.

use rand::RngCore;

/// Default number of random bytes in a generated id (32 hex characters).
pub const DEFAULT_ID_BYTES: usize = 16;

/// Produces candidate session ids.
///
/// Generators only need to be collision resistant. Uniqueness against live
/// sessions is checked by the registry before an id is handed out.
pub trait SessionIdGenerator: Send + Sync {
    /// Produce a new candidate id.
    fn generate(&self) -> String;
}

/// Generator backed by the thread-local CSPRNG, hex encoded.
#[derive(Debug, Clone)]
pub struct SecureRandomIdGenerator {
    length: usize,
}

impl SecureRandomIdGenerator {
    /// Create a generator producing [`DEFAULT_ID_BYTES`] random bytes per id.
    pub fn new() -> Self {
        Self {
            length: DEFAULT_ID_BYTES,
        }
    }

    /// Set the number of random bytes per id. Values below the default are raised to it.
    pub fn with_length(mut self, length: usize) -> Self {
        self.length = length.max(DEFAULT_ID_BYTES);
        self
    }

    /// Number of random bytes per id.
    pub fn length(&self) -> usize {
        self.length
    }
}

impl Default for SecureRandomIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionIdGenerator for SecureRandomIdGenerator {
    fn generate(&self) -> String {
        let mut bytes = vec![0u8; self.length];
        rand::rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_fixed_length_hex() {
        let id = SecureRandomIdGenerator::new().generate();
        assert_eq!(id.len(), DEFAULT_ID_BYTES * 2);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_length_has_a_floor() {
        let generator = SecureRandomIdGenerator::new().with_length(4);
        assert_eq!(generator.length(), DEFAULT_ID_BYTES);

        let generator = SecureRandomIdGenerator::new().with_length(24);
        assert_eq!(generator.generate().len(), 48);
    }

    #[test]
    fn test_ids_do_not_repeat() {
        let generator = SecureRandomIdGenerator::new();
        let ids: HashSet<String> = (0..1000).map(|_| generator.generate()).collect();
        assert_eq!(ids.len(), 1000);
    }
}
