//! # Name Identifiers
//!
//! Every name maps to a 32-byte [`NameId`] computed from the name alone:
//!
//! ```text
//! label_hash(l)      = H_label(l)
//! namehash(p, l)     = H_node(p || label_hash(l))
//! base_node(tld)     = namehash(ROOT, tld)
//! id("alice")        = namehash(base_node, "alice")
//! id("pay.alice")    = namehash(id("alice"), "pay")
//! ```
//!
//! Identifiers are never stored as the source of truth for the name; they
//! are always recomputable, which is what makes the registry's
//! name ↔ identifier lookup bidirectional.
//!
//! ## Labels
//!
//! A label is one dot-free component. It must be non-empty, at most
//! [`MAX_LABEL_LENGTH`] characters, lowercase, and free of whitespace and
//! control characters. Length is counted in Unicode scalar values, which is
//! also what the pricing tiers count.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use nomina_protocol::config::{LABEL_SEPARATOR, MAX_LABEL_LENGTH};
use nomina_protocol::crypto::hash::{
    domain_separated_hash, domain_separated_hash_multi, Hash32, ZERO_HASH,
};

use crate::error::RegistrarError;

const LABEL_CONTEXT: &str = "nomina label v1";
const NODE_CONTEXT: &str = "nomina namehash v1";

/// Identifier of a name record.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NameId(Hash32);

impl NameId {
    /// Parent of every top-level domain.
    pub const ROOT: Self = Self(ZERO_HASH);

    pub const fn from_bytes(bytes: Hash32) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &Hash32 {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).ok()?;
        let arr: Hash32 = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl fmt::Display for NameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for NameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NameId(0x{}..)", hex::encode(&self.0[..8]))
    }
}

impl FromStr for NameId {
    type Err = RegistrarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s).ok_or_else(|| RegistrarError::UnknownName(s.to_string()))
    }
}

impl Serialize for NameId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for NameId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Self::from_hex(&s).ok_or_else(|| serde::de::Error::custom("invalid name id"))
        } else {
            Hash32::deserialize(deserializer).map(Self)
        }
    }
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

pub fn label_hash(label: &str) -> Hash32 {
    domain_separated_hash(LABEL_CONTEXT, label.as_bytes())
}

/// Identifier of `label` directly under `parent`.
pub fn namehash(parent: &NameId, label: &str) -> NameId {
    let lh = label_hash(label);
    NameId(domain_separated_hash_multi(
        NODE_CONTEXT,
        &[parent.as_bytes().as_slice(), lh.as_slice()],
    ))
}

/// The node every top-level registration hangs off.
pub fn base_node(tld: &str) -> NameId {
    namehash(&NameId::ROOT, tld)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Character count used for tier selection.
pub fn char_count(label: &str) -> usize {
    label.chars().count()
}

pub fn validate_label(label: &str) -> Result<(), RegistrarError> {
    let invalid = |reason: &str| RegistrarError::InvalidName {
        name: label.to_string(),
        reason: reason.to_string(),
    };

    if label.is_empty() {
        return Err(RegistrarError::EmptyName);
    }
    if char_count(label) > MAX_LABEL_LENGTH {
        return Err(invalid("label too long"));
    }
    for c in label.chars() {
        if c == LABEL_SEPARATOR {
            return Err(invalid("label contains a separator"));
        }
        if c.is_whitespace() || c.is_control() {
            return Err(invalid("label contains whitespace or control characters"));
        }
        if c.is_uppercase() {
            return Err(invalid("label must be lowercase"));
        }
    }
    Ok(())
}

/// Splits a dotted name into labels, most specific first, dropping a
/// trailing `.tld` if present. `"pay.alice.nom"` → `["pay", "alice"]`.
pub fn split_name<'a>(name: &'a str, tld: &str) -> Result<Vec<&'a str>, RegistrarError> {
    if name.is_empty() {
        return Err(RegistrarError::EmptyName);
    }
    let mut labels: Vec<&str> = name.split(LABEL_SEPARATOR).collect();
    if labels.len() > 1 && labels.last() == Some(&tld) {
        labels.pop();
    }
    for label in &labels {
        validate_label(label)?;
    }
    Ok(labels)
}

/// Identifier of a (possibly dotted) name under `base`.
pub fn resolve(base: &NameId, name: &str, tld: &str) -> Result<NameId, RegistrarError> {
    let labels = split_name(name, tld)?;
    Ok(labels
        .iter()
        .rev()
        .fold(*base, |parent, label| namehash(&parent, label)))
}

/// Validates a top-level name and returns its single label.
pub fn top_level_label<'a>(name: &'a str, tld: &str) -> Result<&'a str, RegistrarError> {
    let labels = split_name(name, tld)?;
    match labels.as_slice() {
        [label] => Ok(*label),
        _ => Err(RegistrarError::InvalidName {
            name: name.to_string(),
            reason: "expected a single label".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namehash_is_deterministic_and_hierarchical() {
        let base = base_node("nom");
        let alice = namehash(&base, "alice");
        assert_eq!(alice, namehash(&base, "alice"));
        assert_ne!(alice, namehash(&base, "bob"));
        assert_ne!(alice, base);

        let pay = namehash(&alice, "pay");
        assert_eq!(resolve(&base, "pay.alice", "nom").unwrap(), pay);
        assert_eq!(resolve(&base, "pay.alice.nom", "nom").unwrap(), pay);
    }

    #[test]
    fn test_tld_changes_every_identifier() {
        assert_ne!(
            namehash(&base_node("nom"), "alice"),
            namehash(&base_node("test"), "alice")
        );
    }

    #[test]
    fn test_label_rules() {
        assert_eq!(validate_label(""), Err(RegistrarError::EmptyName));
        assert!(validate_label("abc").is_ok());
        assert!(validate_label("ünï").is_ok());
        assert!(validate_label("has space").is_err());
        assert!(validate_label("a.b").is_err());
        assert!(validate_label("Alice").is_err());
        assert!(validate_label(&"x".repeat(MAX_LABEL_LENGTH)).is_ok());
        assert!(validate_label(&"x".repeat(MAX_LABEL_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_char_count_counts_scalars() {
        assert_eq!(char_count("abcd"), 4);
        assert_eq!(char_count("ñandú"), 5);
        assert_eq!(char_count("🦀"), 1);
    }

    #[test]
    fn test_top_level_label() {
        assert_eq!(top_level_label("alice", "nom").unwrap(), "alice");
        assert_eq!(top_level_label("alice.nom", "nom").unwrap(), "alice");
        assert!(top_level_label("pay.alice", "nom").is_err());
        assert_eq!(top_level_label("", "nom"), Err(RegistrarError::EmptyName));
        assert!(top_level_label("alice.", "nom").is_err());
    }

    #[test]
    fn test_name_id_hex_round_trip() {
        let id = namehash(&base_node("nom"), "alice");
        assert_eq!(NameId::from_hex(&id.to_hex()), Some(id));
        assert_eq!(id.to_hex().parse::<NameId>().unwrap(), id);
        assert!(NameId::from_hex("0x1234").is_none());
    }
}
