use borsh::{BorshDeserialize, BorshSerialize};
use std::fmt;
use std::str::FromStr;

use super::{HashWriter, TypesError, sha256};

const CHECKSUM_LEN: usize = 6;

/// Hash of an unlock template. Rendered as 32 bytes of hash followed by a
/// 6-byte checksum, all hex.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, BorshSerialize, BorshDeserialize,
)]
pub struct Address(pub [u8; 32]);

impl Address {
    /// Unspendable burn destination, tracked only as an aggregate.
    pub const VOID: Self = Self([0u8; 32]);

    pub fn is_void(&self) -> bool {
        *self == Self::VOID
    }

    fn checksum(&self) -> [u8; CHECKSUM_LEN] {
        let digest = sha256(&self.0);
        let mut out = [0u8; CHECKSUM_LEN];
        out.copy_from_slice(&digest[..CHECKSUM_LEN]);
        out
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", hex::encode(self.0), hex::encode(self.checksum()))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| TypesError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 + CHECKSUM_LEN {
            return Err(TypesError::InvalidLength { expected: 32 + CHECKSUM_LEN, got: bytes.len() });
        }
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[..32]);
        let addr = Address(hash);
        if addr.checksum()[..] != bytes[32..] {
            return Err(TypesError::BadChecksum);
        }
        Ok(addr)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum SignatureAlgorithm {
    Ed25519,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct PublicKey {
    pub algorithm: SignatureAlgorithm,
    pub key: Vec<u8>,
}

impl PublicKey {
    pub fn ed25519(key: impl Into<Vec<u8>>) -> Self {
        Self { algorithm: SignatureAlgorithm::Ed25519, key: key.into() }
    }
}

/// Spend template: who may spend an output and from which height.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct UnlockConditions {
    pub timelock: u64,
    pub public_keys: Vec<PublicKey>,
    pub signatures_required: u64,
}

impl UnlockConditions {
    /// The canonical single-signature template: one ed25519 key, no timelock.
    pub fn standard(key: impl Into<Vec<u8>>) -> Self {
        Self { timelock: 0, public_keys: vec![PublicKey::ed25519(key)], signatures_required: 1 }
    }

    pub fn unlock_hash(&self) -> Address {
        Address(HashWriter::new(b"unlock conditions").put(self).finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_string_round_trips() {
        let addr = UnlockConditions::standard([9u8; 32]).unlock_hash();
        let s = addr.to_string();
        assert_eq!(s.len(), 76);
        assert_eq!(s.parse::<Address>().unwrap(), addr);
    }

    #[test]
    fn checksum_is_verified() {
        let mut s = UnlockConditions::standard([9u8; 32]).unlock_hash().to_string();
        let last = if s.ends_with('0') { "1" } else { "0" };
        s.replace_range(75..76, last);
        assert_eq!(s.parse::<Address>(), Err(TypesError::BadChecksum));
    }

    #[test]
    fn void_is_all_zero() {
        assert!(Address::VOID.is_void());
        assert!(Address::VOID.to_string().starts_with(&"0".repeat(64)));
    }

    #[test]
    fn different_keys_give_different_addresses() {
        let a = UnlockConditions::standard([1u8; 32]).unlock_hash();
        let b = UnlockConditions::standard([2u8; 32]).unlock_hash();
        assert_ne!(a, b);
    }
}
