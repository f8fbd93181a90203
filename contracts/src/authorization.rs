//! # Authorization Strategies
//!
//! A name can be claimed through several doors:
//!
//! | Path              | Credential                          | One-shot effect        |
//! |-------------------|-------------------------------------|------------------------|
//! | Signature         | voucher signed by the signer key    | `nonce[owner] += 1`    |
//! | AuctionSignature  | auction voucher, same signer/nonce  | `nonce[owner] += 1`    |
//! | Allowlist         | Merkle proof of the caller          | caller's flag set      |
//! | Reservation       | caller is the reserved address      | (reservation cleared)  |
//! | AuctionPurchase   | none, pays the auction price        | none                   |
//!
//! Each strategy only **authorizes**: it reads state, checks its
//! credential, and returns an [`AuthorizedClaim`] describing what to
//! register and which effect to apply on success. It never mutates
//! anything. The controller's shared commit does availability, auctions,
//! pricing, payment, and the registry write for every path the same way,
//! so no door can skip a rule another door enforces.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::warn;

use nomina_protocol::amount::NativeAmount;
use nomina_protocol::crypto::hash::Hash32;
use nomina_protocol::crypto::keys::NominaSignature;
use nomina_protocol::crypto::merkle::{allowlist_leaf, verify_proof};
use nomina_protocol::crypto::signatures::verify_digest;
use nomina_protocol::crypto::typed_data::{typed_digest, FieldEncoder, TypedDataDomain, TypedStruct};
use nomina_protocol::identity::Address;

use crate::config::ControllerConfig;
use crate::error::RegistrarError;
use crate::namehash::NameId;

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

/// Which door a claim came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClaimPath {
    Signature,
    AuctionSignature,
    Allowlist,
    Reservation,
    AuctionPurchase,
}

impl ClaimPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimPath::Signature => "signature",
            ClaimPath::AuctionSignature => "auction_signature",
            ClaimPath::Allowlist => "allowlist",
            ClaimPath::Reservation => "reservation",
            ClaimPath::AuctionPurchase => "auction_purchase",
        }
    }

    /// How this path treats auction-bound names.
    pub fn auction_policy(&self) -> AuctionPolicy {
        match self {
            ClaimPath::Signature => AuctionPolicy::RejectInWindow,
            ClaimPath::Allowlist | ClaimPath::Reservation => AuctionPolicy::ChargePremiumInWindow,
            ClaimPath::AuctionSignature | ClaimPath::AuctionPurchase => AuctionPolicy::AuctionOnly,
        }
    }
}

impl std::fmt::Display for ClaimPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a path does with a name that belongs to an auction batch. Once the
/// window has elapsed every policy charges the base price alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuctionPolicy {
    /// Inside the window: fail with `InAuction`.
    RejectInWindow,
    /// Inside the window: charge base + current auction price.
    ChargePremiumInWindow,
    /// The name must be auction-bound; inside the window charge base +
    /// current auction price.
    AuctionOnly,
}

/// Applied by the shared commit after the registry write succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimEffect {
    None,
    /// Store `next` as the owner's nonce. Precomputed so applying it
    /// cannot fail.
    ConsumeNonce { owner: Address, used: u64, next: u64 },
    MarkAllowlistUsed(Address),
}

/// A claim that passed its path's credential checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedClaim {
    pub path: ClaimPath,
    pub name: String,
    pub owner: Address,
    pub duration: u64,
    pub price_ceiling: Option<NativeAmount>,
    pub effect: ClaimEffect,
}

// ---------------------------------------------------------------------------
// Vouchers
// ---------------------------------------------------------------------------

/// An off-chain authorization to register `name` for `owner`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationVoucher {
    pub name: String,
    pub owner: Address,
    pub duration: u64,
    pub price_ceiling: NativeAmount,
    pub deadline: i64,
    pub nonce: u64,
}

impl RegistrationVoucher {
    fn encode(&self, enc: &mut FieldEncoder) {
        enc.string(&self.name)
            .address(&self.owner)
            .u64(self.duration)
            .u128(self.price_ceiling.raw())
            .i64(self.deadline)
            .u64(self.nonce);
    }

    /// Digest the signer signs for the ordinary signature path.
    pub fn digest(&self, domain: &TypedDataDomain) -> Hash32 {
        typed_digest(domain, self)
    }

    /// Digest for the auction signature path. Distinct from
    /// [`digest`](Self::digest) so one signature can't be replayed across
    /// paths.
    pub fn auction_digest(&self, domain: &TypedDataDomain) -> Hash32 {
        typed_digest(domain, &AuctionVoucher(self))
    }
}

impl TypedStruct for RegistrationVoucher {
    fn type_signature(&self) -> &'static str {
        "Registration(string name,address owner,uint64 duration,uint128 priceCeiling,int64 deadline,uint64 nonce)"
    }

    fn encode_fields(&self, encoder: &mut FieldEncoder) {
        self.encode(encoder);
    }
}

struct AuctionVoucher<'a>(&'a RegistrationVoucher);

impl TypedStruct for AuctionVoucher<'_> {
    fn type_signature(&self) -> &'static str {
        "AuctionRegistration(string name,address owner,uint64 duration,uint128 priceCeiling,int64 deadline,uint64 nonce)"
    }

    fn encode_fields(&self, encoder: &mut FieldEncoder) {
        self.0.encode(encoder);
    }
}

// ---------------------------------------------------------------------------
// Authorization state
// ---------------------------------------------------------------------------

/// Per-account and per-name state the strategies consult.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorizationState {
    nonces: HashMap<Address, u64>,
    allowlist_used: HashSet<Address>,
    reservations: HashMap<NameId, Address>,
}

impl AuthorizationState {
    pub fn nonce_of(&self, owner: &Address) -> u64 {
        self.nonces.get(owner).copied().unwrap_or(0)
    }

    pub fn allowlist_used(&self, account: &Address) -> bool {
        self.allowlist_used.contains(account)
    }

    pub fn reservation_for(&self, id: &NameId) -> Option<Address> {
        self.reservations.get(id).copied()
    }

    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }

    pub(crate) fn set_reservation(&mut self, id: NameId, holder: Option<Address>) {
        match holder {
            Some(holder) => {
                self.reservations.insert(id, holder);
            }
            None => {
                self.reservations.remove(&id);
            }
        }
    }

    pub(crate) fn apply(&mut self, effect: ClaimEffect) {
        match effect {
            ClaimEffect::None => {}
            ClaimEffect::ConsumeNonce { owner, next, .. } => {
                self.nonces.insert(owner, next);
            }
            ClaimEffect::MarkAllowlistUsed(account) => {
                self.allowlist_used.insert(account);
            }
        }
    }
}

/// Everything a strategy may read.
pub struct AuthorizationEnv<'a> {
    pub config: &'a ControllerConfig,
    pub state: &'a AuthorizationState,
    pub domain: &'a TypedDataDomain,
    pub caller: Address,
    pub now: i64,
    /// Resolves a top-level name to its identifier.
    pub resolve: &'a dyn Fn(&str) -> Result<NameId, RegistrarError>,
}

/// One way of proving the right to claim a name.
pub trait AuthorizationStrategy {
    fn authorize(&self, env: &AuthorizationEnv<'_>) -> Result<AuthorizedClaim, RegistrarError>;
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// A voucher plus the signer's signature over its digest.
pub struct SignedVoucher<'a> {
    pub voucher: &'a RegistrationVoucher,
    pub signature: &'a NominaSignature,
    /// `true` for the auction variant.
    pub auction: bool,
}

impl AuthorizationStrategy for SignedVoucher<'_> {
    fn authorize(&self, env: &AuthorizationEnv<'_>) -> Result<AuthorizedClaim, RegistrarError> {
        let v = self.voucher;
        if env.now > v.deadline {
            return Err(RegistrarError::SignatureExpired {
                deadline: v.deadline,
                now: env.now,
            });
        }
        if v.owner.is_zero() {
            return Err(RegistrarError::ZeroAddress);
        }
        let signer = env
            .config
            .signer
            .ok_or(RegistrarError::SignerNotConfigured)?;

        let expected = env.state.nonce_of(&v.owner);
        if v.nonce != expected {
            warn!(owner = %v.owner, expected, got = v.nonce, "stale voucher nonce");
            return Err(RegistrarError::StaleNonce {
                owner: v.owner,
                expected,
                got: v.nonce,
            });
        }

        let digest = if self.auction {
            v.auction_digest(env.domain)
        } else {
            v.digest(env.domain)
        };
        if verify_digest(&signer, &digest, self.signature).is_err() {
            warn!(name = %v.name, owner = %v.owner, "voucher signature rejected");
            return Err(RegistrarError::InvalidSignature);
        }

        let next = expected.checked_add(1).ok_or(RegistrarError::Overflow)?;
        Ok(AuthorizedClaim {
            path: if self.auction {
                ClaimPath::AuctionSignature
            } else {
                ClaimPath::Signature
            },
            name: v.name.clone(),
            owner: v.owner,
            duration: v.duration,
            price_ceiling: Some(v.price_ceiling),
            effect: ClaimEffect::ConsumeNonce {
                owner: v.owner,
                used: expected,
                next,
            },
        })
    }
}

/// Membership proof for the caller's address.
pub struct AllowlistProof<'a> {
    pub name: &'a str,
    pub duration: u64,
    pub proof: &'a [Hash32],
}

impl AuthorizationStrategy for AllowlistProof<'_> {
    fn authorize(&self, env: &AuthorizationEnv<'_>) -> Result<AuthorizedClaim, RegistrarError> {
        if env.state.allowlist_used(&env.caller) {
            return Err(RegistrarError::AllowlistAlreadyUsed(env.caller));
        }
        let root = env.config.allowlist_root.ok_or(RegistrarError::InvalidProof)?;
        if !verify_proof(&root, &allowlist_leaf(&env.caller), self.proof) {
            warn!(caller = %env.caller, "allowlist proof rejected");
            return Err(RegistrarError::InvalidProof);
        }
        Ok(AuthorizedClaim {
            path: ClaimPath::Allowlist,
            name: self.name.to_string(),
            owner: env.caller,
            duration: self.duration,
            price_ceiling: None,
            effect: ClaimEffect::MarkAllowlistUsed(env.caller),
        })
    }
}

/// The caller claims a name reserved for them.
pub struct ReservedClaim<'a> {
    pub name: &'a str,
    pub duration: u64,
}

impl AuthorizationStrategy for ReservedClaim<'_> {
    fn authorize(&self, env: &AuthorizationEnv<'_>) -> Result<AuthorizedClaim, RegistrarError> {
        let id = (env.resolve)(self.name)?;
        if env.state.reservation_for(&id) != Some(env.caller) {
            warn!(caller = %env.caller, name = self.name, "claim of unreserved name");
            return Err(RegistrarError::NotReserved {
                name: self.name.to_string(),
            });
        }
        Ok(AuthorizedClaim {
            path: ClaimPath::Reservation,
            name: self.name.to_string(),
            owner: env.caller,
            duration: self.duration,
            price_ceiling: None,
            effect: ClaimEffect::None,
        })
    }
}

/// Direct purchase of an auction-bound name at the current auction price.
pub struct AuctionPurchase<'a> {
    pub name: &'a str,
    pub duration: u64,
    pub price_ceiling: NativeAmount,
}

impl AuthorizationStrategy for AuctionPurchase<'_> {
    fn authorize(&self, env: &AuthorizationEnv<'_>) -> Result<AuthorizedClaim, RegistrarError> {
        Ok(AuthorizedClaim {
            path: ClaimPath::AuctionPurchase,
            name: self.name.to_string(),
            owner: env.caller,
            duration: self.duration,
            price_ceiling: Some(self.price_ceiling),
            effect: ClaimEffect::None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nomina_protocol::crypto::keys::NominaKeypair;
    use nomina_protocol::crypto::merkle::MerkleTree;
    use nomina_protocol::crypto::signatures::sign_digest;

    use crate::namehash::{base_node, namehash};

    const NOW: i64 = 1_000;

    fn addr(label: &str) -> Address {
        Address::from_label(label)
    }

    fn voucher(nonce: u64) -> RegistrationVoucher {
        RegistrationVoucher {
            name: "alpha".into(),
            owner: addr("alice"),
            duration: 1,
            price_ceiling: NativeAmount::from_units(100).unwrap(),
            deadline: NOW + 60,
            nonce,
        }
    }

    struct Fixture {
        signer: NominaKeypair,
        config: ControllerConfig,
        state: AuthorizationState,
        domain: TypedDataDomain,
    }

    impl Fixture {
        fn new() -> Self {
            let signer = NominaKeypair::from_seed(&[7u8; 32]);
            let config = ControllerConfig::new(addr("admin"), addr("treasury"), 1, addr("controller"))
                .with_signer(signer.public_key());
            let domain = config.typed_data_domain();
            Self {
                signer,
                config,
                state: AuthorizationState::default(),
                domain,
            }
        }

        fn run<S: AuthorizationStrategy>(
            &self,
            caller: Address,
            strategy: &S,
        ) -> Result<AuthorizedClaim, RegistrarError> {
            let base = base_node("nom");
            let resolve = move |name: &str| -> Result<NameId, RegistrarError> {
                Ok(namehash(&base, name))
            };
            let env = AuthorizationEnv {
                config: &self.config,
                state: &self.state,
                domain: &self.domain,
                caller,
                now: NOW,
                resolve: &resolve,
            };
            strategy.authorize(&env)
        }
    }

    #[test]
    fn test_valid_voucher_authorizes_and_bumps_nonce() {
        let f = Fixture::new();
        let v = voucher(0);
        let sig = sign_digest(&f.signer, &v.digest(&f.domain));
        let claim = f
            .run(addr("relayer"), &SignedVoucher { voucher: &v, signature: &sig, auction: false })
            .unwrap();
        assert_eq!(claim.owner, addr("alice"));
        assert_eq!(claim.path, ClaimPath::Signature);
        assert_eq!(
            claim.effect,
            ClaimEffect::ConsumeNonce { owner: addr("alice"), used: 0, next: 1 }
        );
    }

    #[test]
    fn test_voucher_checks() {
        let mut f = Fixture::new();
        let v = voucher(0);
        let sig = sign_digest(&f.signer, &v.digest(&f.domain));

        // Tampered field.
        let mut tampered = v.clone();
        tampered.duration += 1;
        assert_eq!(
            f.run(addr("r"), &SignedVoucher { voucher: &tampered, signature: &sig, auction: false }),
            Err(RegistrarError::InvalidSignature)
        );

        // Cross-path replay.
        assert_eq!(
            f.run(addr("r"), &SignedVoucher { voucher: &v, signature: &sig, auction: true }),
            Err(RegistrarError::InvalidSignature)
        );

        // Past deadline.
        let mut late = v.clone();
        late.deadline = NOW - 1;
        let late_sig = sign_digest(&f.signer, &late.digest(&f.domain));
        assert!(matches!(
            f.run(addr("r"), &SignedVoucher { voucher: &late, signature: &late_sig, auction: false }),
            Err(RegistrarError::SignatureExpired { .. })
        ));

        // Nonce already consumed.
        f.state.apply(ClaimEffect::ConsumeNonce { owner: addr("alice"), used: 0, next: 1 });
        assert!(matches!(
            f.run(addr("r"), &SignedVoucher { voucher: &v, signature: &sig, auction: false }),
            Err(RegistrarError::StaleNonce { expected: 1, got: 0, .. })
        ));
    }

    #[test]
    fn test_other_signer_rejected() {
        let f = Fixture::new();
        let v = voucher(0);
        let imposter = NominaKeypair::from_seed(&[8u8; 32]);
        let sig = sign_digest(&imposter, &v.digest(&f.domain));
        assert_eq!(
            f.run(addr("r"), &SignedVoucher { voucher: &v, signature: &sig, auction: false }),
            Err(RegistrarError::InvalidSignature)
        );
    }

    #[test]
    fn test_allowlist_proof() {
        let mut f = Fixture::new();
        let members = [addr("alice"), addr("bob"), addr("carol")];
        let tree = MerkleTree::from_addresses(&members);
        f.config.allowlist_root = Some(tree.root());

        let proof = tree.proof_for(&addr("bob")).unwrap();
        let strategy = AllowlistProof { name: "bobby", duration: 1, proof: &proof };
        let claim = f.run(addr("bob"), &strategy).unwrap();
        assert_eq!(claim.effect, ClaimEffect::MarkAllowlistUsed(addr("bob")));

        // Someone else replaying bob's proof.
        assert_eq!(f.run(addr("mallory"), &strategy), Err(RegistrarError::InvalidProof));

        f.state.apply(claim.effect);
        assert_eq!(
            f.run(addr("bob"), &strategy),
            Err(RegistrarError::AllowlistAlreadyUsed(addr("bob")))
        );
    }

    #[test]
    fn test_reservation() {
        let mut f = Fixture::new();
        let id = namehash(&base_node("nom"), "vip");
        f.state.set_reservation(id, Some(addr("alice")));
        let strategy = ReservedClaim { name: "vip", duration: 1 };
        assert!(f.run(addr("alice"), &strategy).is_ok());
        assert!(matches!(
            f.run(addr("bob"), &strategy),
            Err(RegistrarError::NotReserved { .. })
        ));
    }
}
