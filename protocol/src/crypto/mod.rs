//! # Cryptographic Primitives for Nomina
//!
//! Everything security-related in the registrar flows through here:
//!
//! - **Ed25519** for voucher signatures.
//! - **BLAKE3** for name identifiers, allowlist trees, typed-data digests.
//! - **Merkle proofs** for one-time allowlist eligibility.
//!
//! Everything here is a thin, type-safe wrapper around audited
//! implementations. We don't roll our own curves.

pub mod hash;
pub mod keys;
pub mod merkle;
pub mod signatures;
pub mod typed_data;

pub use hash::{blake3_hash, domain_separated_hash, Hash32, ZERO_HASH};
pub use keys::{KeyError, NominaKeypair, NominaPublicKey, NominaSignature};
pub use merkle::{allowlist_leaf, verify_proof, MerkleTree};
pub use signatures::{sign, sign_digest, verify, verify_digest, SignatureError};
pub use typed_data::{typed_digest, FieldEncoder, TypedDataDomain, TypedStruct};
