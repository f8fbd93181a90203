//! # Hashing Utilities
//!
//! BLAKE3 is the only hash function in Nomina. It backs name identifiers,
//! allowlist leaves and tree nodes, typed-data digests, and address
//! derivation.
//!
//! Distinct uses are kept apart with BLAKE3's `derive_key` mode
//! ([`domain_separated_hash`]) rather than ad-hoc prefixes, so a label hash
//! can never be confused with an allowlist leaf even on identical input.

/// A 32-byte digest.
pub type Hash32 = [u8; 32];

/// The all-zero digest. Used as the root of the name hierarchy.
pub const ZERO_HASH: Hash32 = [0u8; 32];

/// Plain BLAKE3.
///
/// # Example
///
/// ```
/// use nomina_protocol::crypto::blake3_hash;
///
/// let hash = blake3_hash(b"alice");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn blake3_hash(data: &[u8]) -> Hash32 {
    *blake3::hash(data).as_bytes()
}

/// Hash several byte slices as if concatenated, without allocating.
pub fn blake3_hash_multi(parts: &[&[u8]]) -> Hash32 {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// BLAKE3 in `derive_key` mode under `context`.
///
/// Two different contexts never collide on the same data: the context
/// selects a different internal IV.
pub fn domain_separated_hash(context: &str, data: &[u8]) -> Hash32 {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(data);
    *hasher.finalize().as_bytes()
}

/// Domain-separated hash over multiple parts.
pub fn domain_separated_hash_multi(context: &str, parts: &[&[u8]]) -> Hash32 {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// Hex rendering of a digest with `0x` prefix.
pub fn to_hex(hash: &Hash32) -> String {
    format!("0x{}", hex::encode(hash))
}

/// Parses a 32-byte hex digest with or without `0x`.
pub fn from_hex(s: &str) -> Option<Hash32> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(stripped).ok()?.as_slice().try_into().ok()
}
