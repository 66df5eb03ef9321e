//! Common types shared by the ledger boundary, the protocol and the simulator.

use ed25519_dalek::VerifyingKey;
use hex::FromHex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Public key of a multichain participant.
///
/// The all-zero key is reserved for the bootstrap node and never belongs
/// to a ledger author. Serialized as a 64-character lowercase hex string
/// so identities can key JSON maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identity(pub [u8; 32]);

impl Identity {
    /// Sentinel identity of the bootstrap node.
    pub const BOOTSTRAP: Identity = Identity([0u8; 32]);

    /// Creates an identity from raw public key bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Creates a deterministic identity from a seed (for tests and fixtures).
    ///
    /// The last byte is always set, so no seed maps onto the bootstrap sentinel.
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        bytes[31] = 0xff;
        Self(bytes)
    }

    /// Returns true for the bootstrap sentinel.
    pub fn is_bootstrap(&self) -> bool {
        *self == Self::BOOTSTRAP
    }

    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Full lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a 64-character hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        <[u8; 32]>::from_hex(s).ok().map(Self)
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Identity::from_hex(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid identity: {}", s)))
    }
}

impl From<&VerifyingKey> for Identity {
    fn from(key: &VerifyingKey) -> Self {
        Self(key.to_bytes())
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_bootstrap() {
            return write!(f, "bootstrap");
        }
        // Short hex prefix for readability
        write!(f, "{}", hex::encode(&self.0[..4]))
    }
}

/// Unique key of a block: its author and position in the author's chain.
pub type BlockId = (Identity, u64);

/// One half of a bilateral interaction record.
///
/// Each interaction between two participants produces two blocks, one in
/// each participant's chain, pointing at each other via `link_public_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Author of the block (owner of the chain it belongs to)
    pub public_key: Identity,

    /// Position of this block in the author's chain, starting at 1
    pub sequence_number: u64,

    /// Counterparty of the interaction
    pub link_public_key: Identity,

    /// Units the author gave to the counterparty
    pub up: u64,

    /// Units the author received from the counterparty
    pub down: u64,
}

impl Block {
    /// Creates a new block.
    pub fn new(
        public_key: Identity,
        sequence_number: u64,
        link_public_key: Identity,
        up: u64,
        down: u64,
    ) -> Self {
        Self {
            public_key,
            sequence_number,
            link_public_key,
            up,
            down,
        }
    }

    /// Returns the unique key of this block.
    pub fn id(&self) -> BlockId {
        (self.public_key, self.sequence_number)
    }

    /// Total volume exchanged in this interaction.
    pub fn volume(&self) -> u64 {
        self.up.saturating_add(self.down)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_identity_never_bootstrap() {
        for seed in 0..64 {
            assert!(!Identity::from_seed(seed).is_bootstrap());
        }
        assert_ne!(Identity::from_seed(1), Identity::from_seed(2));
    }

    #[test]
    fn test_identity_display() {
        assert_eq!(Identity::BOOTSTRAP.to_string(), "bootstrap");
        assert_eq!(Identity::from_seed(1).to_string(), "01000000");
    }

    #[test]
    fn test_identity_hex_round_trip() {
        let id = Identity::from_seed(77);
        assert_eq!(Identity::from_hex(&id.to_hex()), Some(id));
        assert_eq!(Identity::from_hex("zz"), None);
        assert_eq!(Identity::from_hex(&id.to_hex()[..62]), None);
        assert_eq!(&Identity::from_seed(1).to_hex()[..8], "01000000");

        let json = serde_json::to_string(&std::collections::BTreeMap::from([(id, 3u64)])).unwrap();
        assert!(json.contains(&id.to_hex()));
        let back: std::collections::BTreeMap<Identity, u64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(&id), Some(&3));
        assert!(serde_json::from_str::<Identity>("\"not-hex\"").is_err());
    }

    #[test]
    fn test_block_id_and_volume() {
        let a = Identity::from_seed(1);
        let b = Identity::from_seed(2);
        let block = Block::new(a, 3, b, 10, 4);
        assert_eq!(block.id(), (a, 3));
        assert_eq!(block.volume(), 14);
    }
}
