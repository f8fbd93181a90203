//! # Allowlist Merkle Trees
//!
//! The registrar stores a single 32-byte commitment root for its allowlist.
//! An address proves membership with a list of sibling hashes; the
//! controller recomputes the root and compares.
//!
//! ## Construction
//!
//! - Leaves are `H_leaf(address)` — a domain-separated hash, so an interior
//!   node can never be passed off as a leaf (second-preimage defence).
//! - Interior nodes hash their two children in **sorted** order. Proofs are
//!   then just a list of siblings; no left/right flags to get wrong.
//! - An odd node at the end of a level is promoted unchanged to the next
//!   level. We don't duplicate it the way Bitcoin does, which avoids the
//!   CVE-2012-2459 family of ambiguities entirely.
//!
//! The tree builder exists for tooling (the node's `allowlist` subcommand)
//! and tests; the registrar itself only ever calls [`verify_proof`].

use serde::{Deserialize, Serialize};

use super::hash::{domain_separated_hash, domain_separated_hash_multi, Hash32, ZERO_HASH};
use crate::identity::Address;

const LEAF_CONTEXT: &str = "nomina allowlist leaf v1";
const NODE_CONTEXT: &str = "nomina allowlist node v1";

/// The leaf hash committed for an address.
pub fn allowlist_leaf(address: &Address) -> Hash32 {
    domain_separated_hash(LEAF_CONTEXT, address.as_bytes())
}

/// Hash of two sibling nodes, order-independent.
pub fn hash_pair(a: &Hash32, b: &Hash32) -> Hash32 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    domain_separated_hash_multi(NODE_CONTEXT, &[lo.as_slice(), hi.as_slice()])
}

/// Folds `proof` onto `leaf` and compares with `root`.
///
/// An empty proof verifies only a single-leaf tree (where root == leaf).
pub fn verify_proof(root: &Hash32, leaf: &Hash32, proof: &[Hash32]) -> bool {
    let computed = proof
        .iter()
        .fold(*leaf, |acc, sibling| hash_pair(&acc, sibling));
    &computed == root
}

/// A fully materialized allowlist tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleTree {
    /// `levels[0]` are the leaves, the last level holds the root.
    levels: Vec<Vec<Hash32>>,
}

impl MerkleTree {
    /// Builds a tree over the given addresses, in the given order.
    pub fn from_addresses(addresses: &[Address]) -> Self {
        let leaves = addresses.iter().map(allowlist_leaf).collect();
        Self::from_leaves(leaves)
    }

    /// Builds a tree from precomputed leaf hashes.
    pub fn from_leaves(leaves: Vec<Hash32>) -> Self {
        let mut levels = vec![leaves];
        while levels.last().map_or(false, |level| level.len() > 1) {
            let current = &levels[levels.len() - 1];
            let next = current
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_pair(left, right),
                    [single] => *single,
                    _ => unreachable!("chunks(2) yields one or two items"),
                })
                .collect();
            levels.push(next);
        }
        Self { levels }
    }

    /// The commitment root. All zeros for an empty tree, which no proof can
    /// ever satisfy.
    pub fn root(&self) -> Hash32 {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or(ZERO_HASH)
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    /// Sibling path for the leaf at `index`, bottom-up.
    pub fn proof(&self, index: usize) -> Option<Vec<Hash32>> {
        if index >= self.leaf_count() {
            return None;
        }
        let mut proof = Vec::new();
        let mut idx = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = idx ^ 1;
            // A promoted odd node has no sibling on this level.
            if sibling < level.len() {
                proof.push(level[sibling]);
            }
            idx /= 2;
        }
        Some(proof)
    }

    /// Proof for a specific address, if it is in the tree.
    pub fn proof_for(&self, address: &Address) -> Option<Vec<Hash32>> {
        let leaf = allowlist_leaf(address);
        let index = self.levels.first()?.iter().position(|l| *l == leaf)?;
        self.proof(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs(n: usize) -> Vec<Address> {
        (0..n)
            .map(|i| Address::from_label(&format!("member-{i}")))
            .collect()
    }

    #[test]
    fn test_every_member_verifies() {
        for size in [1usize, 2, 3, 5, 8, 13] {
            let members = addrs(size);
            let tree = MerkleTree::from_addresses(&members);
            for member in &members {
                let proof = tree.proof_for(member).unwrap();
                assert!(
                    verify_proof(&tree.root(), &allowlist_leaf(member), &proof),
                    "member of a {size}-leaf tree failed to verify"
                );
            }
        }
    }

    #[test]
    fn test_outsider_does_not_verify() {
        let members = addrs(4);
        let tree = MerkleTree::from_addresses(&members);
        let outsider = Address::from_label("outsider");
        assert!(tree.proof_for(&outsider).is_none());
        let borrowed = tree.proof_for(&members[0]).unwrap();
        assert!(!verify_proof(&tree.root(), &allowlist_leaf(&outsider), &borrowed));
    }

    #[test]
    fn test_single_leaf_root_is_leaf() {
        let members = addrs(1);
        let tree = MerkleTree::from_addresses(&members);
        assert_eq!(tree.root(), allowlist_leaf(&members[0]));
        assert!(tree.proof(0).unwrap().is_empty());
    }

    #[test]
    fn test_empty_tree_has_zero_root() {
        let tree = MerkleTree::from_addresses(&[]);
        assert_eq!(tree.root(), ZERO_HASH);
        assert!(tree.proof(0).is_none());
    }

    #[test]
    fn test_interior_node_is_not_a_leaf() {
        let members = addrs(4);
        let tree = MerkleTree::from_addresses(&members);
        // The parent of leaves 0 and 1 with the remaining sibling would hash
        // to the root, but it was never committed as a leaf.
        let interior = hash_pair(
            &allowlist_leaf(&members[0]),
            &allowlist_leaf(&members[1]),
        );
        let proof = vec![hash_pair(
            &allowlist_leaf(&members[2]),
            &allowlist_leaf(&members[3]),
        )];
        assert!(verify_proof(&tree.root(), &interior, &proof));
        // ...which is why leaves are derived from addresses under their own
        // domain: no address hashes to `interior`.
        assert_ne!(allowlist_leaf(&members[0]), interior);
    }

    #[test]
    fn test_hash_pair_is_symmetric() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        assert_eq!(hash_pair(&a, &b), hash_pair(&b, &a));
    }
}
