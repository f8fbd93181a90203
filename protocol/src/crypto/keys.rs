//! # Key Management
//!
//! Ed25519 keypairs for the registrar's signer role.
//!
//! The controller trusts exactly one public key at a time: vouchers signed by
//! the matching secret key authorize self-service registrations. The key is
//! administratively rotatable, so it is stored as a plain
//! [`NominaPublicKey`] in the controller configuration.
//!
//! ## Security considerations
//!
//! - Secret keys are zeroized on drop (ed25519-dalek does this for us).
//! - Key generation uses `OsRng`.
//! - Key bytes are never logged. `Debug` prints the public half only.

use ed25519_dalek::{
    Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey, SECRET_KEY_LENGTH,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Errors that can occur during key operations.
///
/// Deliberately vague about *why* something failed.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key bytes: wrong length or not a valid scalar")]
    InvalidSecretKey,

    #[error("invalid public key bytes: not a valid Ed25519 point")]
    InvalidPublicKey,

    #[error("invalid signature bytes: expected 64 bytes")]
    InvalidSignature,
}

/// An Ed25519 keypair.
///
/// Does NOT implement `Serialize`. Exporting a secret key is an explicit
/// `to_bytes()` / `to_hex()` call, never a side effect of serializing a
/// struct that happens to hold one.
pub struct NominaKeypair {
    signing_key: SigningKey,
}

/// The public half of a keypair. Safe to share, store, and log.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct NominaPublicKey {
    bytes: [u8; 32],
}

/// A 64-byte Ed25519 signature.
///
/// Stored as a `Vec<u8>` so malformed input coming off the wire can still be
/// represented; a wrong-length signature simply fails verification.
#[derive(Clone, PartialEq, Eq)]
pub struct NominaSignature {
    bytes: Vec<u8>,
}

impl NominaKeypair {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic keypair from a 32-byte seed. In Ed25519 the seed *is*
    /// the secret key.
    pub fn from_seed(seed: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Reconstruct a keypair from a hex-encoded secret key, as stored in the
    /// node's key file.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|_| KeyError::InvalidSecretKey)?;
        let arr: [u8; SECRET_KEY_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self::from_seed(&arr))
    }

    pub fn public_key(&self) -> NominaPublicKey {
        NominaPublicKey {
            bytes: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// Deterministic Ed25519 signature over `message` (RFC 8032).
    pub fn sign(&self, message: &[u8]) -> NominaSignature {
        NominaSignature {
            bytes: self.signing_key.sign(message).to_bytes().to_vec(),
        }
    }

    pub fn verify(&self, message: &[u8], signature: &NominaSignature) -> bool {
        self.public_key().verify(message, signature)
    }

    /// Exports the raw secret key. Handle with care.
    pub fn to_bytes(&self) -> [u8; SECRET_KEY_LENGTH] {
        self.signing_key.to_bytes()
    }

    /// Hex-encoded secret key, for writing key files.
    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}

impl Clone for NominaKeypair {
    fn clone(&self) -> Self {
        Self::from_seed(&self.signing_key.to_bytes())
    }
}

impl fmt::Debug for NominaKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NominaKeypair(pub={})", self.public_key().to_hex())
    }
}

// ---------------------------------------------------------------------------
// NominaPublicKey
// ---------------------------------------------------------------------------

impl NominaPublicKey {
    /// Validates that the bytes are an Ed25519 point before accepting them.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, KeyError> {
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// `true` iff `signature` is a valid strict Ed25519 signature over
    /// `message` by this key. No error oracle: every failure is `false`.
    pub fn verify(&self, message: &[u8], signature: &NominaSignature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let Some(sig) = signature.to_dalek_signature() else {
            return false;
        };
        verifying_key.verify_strict(message, &sig).is_ok()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s.trim()).map_err(|_| KeyError::InvalidPublicKey)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidPublicKey)?;
        Self::from_bytes(arr)
    }
}

impl Hash for NominaPublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl fmt::Display for NominaPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for NominaPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NominaPublicKey({})", &self.to_hex()[..16])
    }
}

impl Serialize for NominaPublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.bytes.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for NominaPublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Self::from_hex(&s).map_err(serde::de::Error::custom)
        } else {
            let bytes = <[u8; 32]>::deserialize(deserializer)?;
            Self::from_bytes(bytes).map_err(serde::de::Error::custom)
        }
    }
}

// ---------------------------------------------------------------------------
// NominaSignature
// ---------------------------------------------------------------------------

impl NominaSignature {
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// `None` unless the stored bytes are exactly 64 long.
    pub fn to_dalek_signature(&self) -> Option<DalekSignature> {
        let arr: [u8; 64] = self.bytes.as_slice().try_into().ok()?;
        Some(DalekSignature::from_bytes(&arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let stripped = s.trim().strip_prefix("0x").unwrap_or(s.trim());
        let bytes = hex::decode(stripped).map_err(|_| KeyError::InvalidSignature)?;
        if bytes.len() != 64 {
            return Err(KeyError::InvalidSignature);
        }
        Ok(Self { bytes })
    }
}

impl fmt::Display for NominaSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for NominaSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_str = self.to_hex();
        if hex_str.len() >= 128 {
            write!(f, "NominaSignature({}...{})", &hex_str[..8], &hex_str[120..])
        } else {
            write!(f, "NominaSignature({})", hex_str)
        }
    }
}

impl Serialize for NominaSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.bytes.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for NominaSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Self::from_hex(&s).map_err(serde::de::Error::custom)
        } else {
            Ok(Self {
                bytes: Vec::<u8>::deserialize(deserializer)?,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keypair_sign_verify_roundtrip() {
        let kp = NominaKeypair::generate();
        let msg = b"register alice.nom";
        let sig = kp.sign(msg);
        assert!(kp.verify(msg, &sig));
    }

    #[test]
    fn wrong_message_fails_verification() {
        let kp = NominaKeypair::generate();
        let sig = kp.sign(b"correct message");
        assert!(!kp.verify(b"wrong message", &sig));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let kp1 = NominaKeypair::generate();
        let kp2 = NominaKeypair::generate();
        let sig = kp1.sign(b"message");
        assert!(!kp2.verify(b"message", &sig));
    }

    #[test]
    fn test_roundtrip_hex() {
        let kp = NominaKeypair::generate();
        let restored = NominaKeypair::from_hex(&kp.secret_key_hex()).unwrap();
        assert_eq!(kp.public_key(), restored.public_key());
    }

    #[test]
    fn test_invalid_secret_hex_rejected() {
        assert!(NominaKeypair::from_hex("deadbeef").is_err());
        assert!(NominaKeypair::from_hex("not-hex-at-all").is_err());
    }

    #[test]
    fn public_key_hex_roundtrip() {
        let pk = NominaKeypair::generate().public_key();
        assert_eq!(NominaPublicKey::from_hex(&pk.to_hex()).unwrap(), pk);
    }

    #[test]
    fn public_key_rejects_wrong_length() {
        assert!(NominaPublicKey::from_hex("abcd").is_err());
    }

    #[test]
    fn deterministic_from_seed() {
        let seed = [42u8; 32];
        assert_eq!(
            NominaKeypair::from_seed(&seed).public_key(),
            NominaKeypair::from_seed(&seed).public_key()
        );
    }

    #[test]
    fn test_deterministic_signatures() {
        let kp = NominaKeypair::generate();
        assert_eq!(kp.sign(b"same").as_bytes(), kp.sign(b"same").as_bytes());
    }

    #[test]
    fn test_signature_hex_roundtrip() {
        let kp = NominaKeypair::generate();
        let sig = kp.sign(b"test");
        assert_eq!(NominaSignature::from_hex(&sig.to_hex()).unwrap(), sig);
        assert_eq!(
            NominaSignature::from_hex(&format!("0x{}", sig.to_hex())).unwrap(),
            sig
        );
    }

    #[test]
    fn short_signature_never_verifies() {
        let kp = NominaKeypair::generate();
        let truncated = NominaSignature {
            bytes: kp.sign(b"m").as_bytes()[..32].to_vec(),
        };
        assert!(!kp.verify(b"m", &truncated));
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let kp = NominaKeypair::generate();
        let debug_str = format!("{:?}", kp);
        assert!(debug_str.starts_with("NominaKeypair(pub="));
        assert!(!debug_str.contains(&kp.secret_key_hex()));
    }

    #[test]
    fn public_key_json_is_hex() {
        let pk = NominaKeypair::from_seed(&[7u8; 32]).public_key();
        let json = serde_json::to_string(&pk).unwrap();
        let back: NominaPublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pk);
    }
}
