//! # Account Addresses
//!
//! An [`Address`] is the 32-byte identity of an account on the execution
//! substrate. Callers, name owners, reservation holders and the payment
//! recipient are all addresses.
//!
//! Addresses are usually derived from an Ed25519 public key:
//!
//! ```text
//! public_key (32 bytes)
//!     -> BLAKE3.derive_key("nomina address v1", public_key)
//!     -> Address (32 bytes, shown as 0x-prefixed hex)
//! ```
//!
//! The registrar never needs the key behind an address: the substrate
//! authenticates the caller before a call reaches the registrar.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::crypto::hash::domain_separated_hash;
use crate::crypto::keys::NominaPublicKey;

/// Domain tag for public-key-to-address derivation.
const ADDRESS_DERIVATION_CONTEXT: &str = "nomina address v1";

/// Errors from parsing an address string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid hex in address: {0}")]
    InvalidHex(String),

    #[error("invalid address length: expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// A 32-byte account address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; 32]);

impl Address {
    /// The all-zero address. Never a valid owner.
    pub const ZERO: Self = Self([0u8; 32]);

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derives the address controlled by an Ed25519 public key.
    pub fn from_public_key(public_key: &NominaPublicKey) -> Self {
        Self(domain_separated_hash(
            ADDRESS_DERIVATION_CONTEXT,
            public_key.as_bytes(),
        ))
    }

    /// Deterministic address for tests, fixtures and devnet accounts.
    /// `Address::from_label("alice")` is the same on every machine.
    pub fn from_label(label: &str) -> Self {
        Self(domain_separated_hash("nomina fixture address v1", label.as_bytes()))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// `0x`-prefixed lowercase hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parses hex with or without the `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, AddressError> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| AddressError::InvalidLength(bytes.len()))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Eight bytes are plenty to tell accounts apart in logs.
        write!(f, "Address(0x{}..)", hex::encode(&self.0[..8]))
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Self::from_hex(&s).map_err(serde::de::Error::custom)
        } else {
            <[u8; 32]>::deserialize(deserializer).map(Self)
        }
    }
}
