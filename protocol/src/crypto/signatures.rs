//! # Digital Signatures
//!
//! Ed25519 signing and verification for registration vouchers.
//!
//! Vouchers are never signed as raw bytes: callers sign a 32-byte typed-data
//! digest (see [`super::typed_data`]) so a signature for one registrar
//! deployment, chain, or message type can't be replayed against another.
//!
//! Verification is strict (`verify_strict`): small-order keys and
//! non-canonical signatures are rejected.

use thiserror::Error;

use super::keys::{NominaKeypair, NominaPublicKey, NominaSignature};

/// Errors during signature operations.
///
/// Intentionally vague — we don't tell attackers why verification failed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature verification failed")]
    VerificationFailed,
}

/// Sign a 32-byte digest.
pub fn sign_digest(keypair: &NominaKeypair, digest: &[u8; 32]) -> NominaSignature {
    keypair.sign(digest)
}

/// Sign arbitrary bytes.
pub fn sign(keypair: &NominaKeypair, message: &[u8]) -> NominaSignature {
    keypair.sign(message)
}

/// Boolean verification. See [`NominaPublicKey::verify`].
pub fn verify(public_key: &NominaPublicKey, message: &[u8], signature: &NominaSignature) -> bool {
    public_key.verify(message, signature)
}

/// `Result`-flavoured digest verification for `?`-heavy call sites.
pub fn verify_digest(
    public_key: &NominaPublicKey,
    digest: &[u8; 32],
    signature: &NominaSignature,
) -> Result<(), SignatureError> {
    if public_key.verify(digest, signature) {
        Ok(())
    } else {
        Err(SignatureError::VerificationFailed)
    }
}
