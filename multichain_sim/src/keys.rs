//! Deterministic identity keys for synthetic ledgers.

use ed25519_dalek::SigningKey;
use multichain_env::Identity;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;

/// Provides deterministic Ed25519 keys for synthetic participants.
///
/// Keys are:
/// - Deterministic: the same seed always produces the same keys
/// - Unique: each participant index gets its own key
/// - Isolated: asking for more participants never changes earlier keys
pub struct DeterministicKeyProvider {
    /// Master seed
    master_seed: u64,

    /// Cache of generated keys by participant index
    key_cache: HashMap<u64, SigningKey>,
}

impl DeterministicKeyProvider {
    /// Creates a new key provider with the given master seed.
    pub fn new(master_seed: u64) -> Self {
        Self {
            master_seed,
            key_cache: HashMap::new(),
        }
    }

    /// Generates or retrieves the signing key of a participant.
    ///
    /// Derived from `master_seed * golden + index * prime`.
    pub fn signing_key(&mut self, index: u64) -> SigningKey {
        if let Some(key) = self.key_cache.get(&index) {
            return key.clone();
        }

        let participant_seed = self
            .master_seed
            .wrapping_mul(0x9e3779b97f4a7c15)
            .wrapping_add(index.wrapping_mul(0x517cc1b727220a95));

        let mut rng = ChaCha8Rng::seed_from_u64(participant_seed);
        let key = SigningKey::generate(&mut rng);

        self.key_cache.insert(index, key.clone());
        key
    }

    /// Public identity of a participant.
    pub fn identity(&mut self, index: u64) -> Identity {
        Identity::from(&self.signing_key(index).verifying_key())
    }

    /// Identities of participants `0..count`.
    pub fn identities(&mut self, count: usize) -> Vec<Identity> {
        (0..count as u64).map(|index| self.identity(index)).collect()
    }
}
