//! Chain primitives: identifiers, addresses, currency, transactions and blocks.
//!
//! Everything that is hashed goes through [`HashWriter`], which streams the
//! borsh encoding of each part into a domain-separated SHA-256.

pub mod address;
pub mod block;
pub mod currency;
pub mod transaction;

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io;
use std::str::FromStr;
use thiserror::Error;

pub use address::{Address, PublicKey, SignatureAlgorithm, UnlockConditions};
pub use block::{Block, miner_payout_id};
pub use currency::Currency;
pub use transaction::{CoveredFields, Output, Transaction, TransactionInput, TransactionSignature};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    #[error("invalid length: expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },
    #[error("address checksum mismatch")]
    BadChecksum,
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Streams borsh-encoded values into a SHA-256 digest.
pub struct HashWriter(Sha256);

impl HashWriter {
    pub fn new(domain: &[u8]) -> Self {
        let mut h = Sha256::new();
        h.update(domain);
        Self(h)
    }

    pub fn put<T: BorshSerialize + ?Sized>(&mut self, value: &T) -> &mut Self {
        // the sink is infallible
        let _ = value.serialize(self);
        self
    }

    pub fn put_raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.0.update(bytes);
        self
    }

    pub fn finish(&mut self) -> [u8; 32] {
        std::mem::take(&mut self.0).finalize().into()
    }
}

impl io::Write for HashWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

pub(crate) fn decode_hash_hex(s: &str) -> Result<[u8; 32], TypesError> {
    let bytes = hex::decode(s).map_err(|e| TypesError::InvalidHex(e.to_string()))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| TypesError::InvalidLength { expected: 32, got: bytes.len() })
}

macro_rules! hash_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
            BorshSerialize, BorshDeserialize,
        )]
        pub struct $name(pub [u8; 32]);

        impl $name {
            pub const ZERO: Self = Self([0u8; 32]);

            #[inline]
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = TypesError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                decode_hash_hex(s).map(Self)
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }
    };
}

hash_id!(
    /// Identifier of a spendable output.
    OutputId
);
hash_id!(BlockId);
hash_id!(TransactionId);
