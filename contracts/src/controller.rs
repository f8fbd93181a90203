//! # Registrar Controller
//!
//! The controller decides whether a name may be claimed, by whom, and at
//! what price, then drives the registry. It is the registry's only trusted
//! caller.
//!
//! ## One commit for every path
//!
//! ```text
//!   register_with_signature ─┐
//!   register_with_merkle_proof ─┤  authorize()   ┌──────────── commit ─────────────┐
//!   register_reserved ───────┤ ─────────────▶ │ availability, reservation rule, │
//!   purchase_auction ────────┤  (read-only)   │ auction phase, price, ceiling,  │
//!   register_auction_with_signature ─┘                │ payment ─▶ registry.register │
//!                                             │ ─▶ effects ─▶ credits ─▶ events │
//!                                             └─────────────────────────────────┘
//! ```
//!
//! Every check happens before the first write, and the registry write is
//! the last step that can fail. Whatever follows it (nonce bump, allowlist
//! flag, reservation clear, proceeds and refund credits) is infallible, so
//! a failed call leaves no trace.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use nomina_protocol::amount::{NativeAmount, ReferenceAmount};
use nomina_protocol::config::PRICE_TIER_COUNT;
use nomina_protocol::crypto::hash::{self, Hash32};
use nomina_protocol::crypto::keys::{NominaPublicKey, NominaSignature};
use nomina_protocol::crypto::typed_data::TypedDataDomain;
use nomina_protocol::identity::Address;
use nomina_protocol::oracle::PriceFeed;

use crate::auction::{AuctionBook, BatchId};
use crate::authorization::{
    AllowlistProof, AuctionPolicy, AuthorizationEnv, AuthorizationState, AuthorizationStrategy,
    AuthorizedClaim, ClaimEffect, ClaimPath, RegistrationVoucher, ReservedClaim, SignedVoucher,
};
use crate::config::ControllerConfig;
use crate::error::RegistrarError;
use crate::events::{CreditReason, RegistrarEvent};
use crate::ledger::{PaymentLedger, PreparedCredits};
use crate::namehash::{self, NameId};
use crate::pricing::TierPrice;
use crate::registry::NameRegistry;

// ---------------------------------------------------------------------------
// Call context and results
// ---------------------------------------------------------------------------

/// Who is calling, what they attached, and when.
///
/// The host authenticates `caller` and stamps `now`; the registrar never
/// reads a clock of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Address,
    pub value: NativeAmount,
    pub now: i64,
}

impl CallContext {
    pub fn new(caller: Address, now: i64) -> Self {
        Self {
            caller,
            value: NativeAmount::ZERO,
            now,
        }
    }

    pub fn with_value(mut self, value: NativeAmount) -> Self {
        self.value = value;
        self
    }
}

/// How a registration price was made up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub base: ReferenceAmount,
    pub auction_premium: ReferenceAmount,
    pub auction_batch: Option<BatchId>,
    pub total_reference: ReferenceAmount,
    pub total_native: NativeAmount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub id: NameId,
    pub name: String,
    pub owner: Address,
    pub expiry: i64,
    pub path: ClaimPath,
    pub price: PriceBreakdown,
    pub refund: NativeAmount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Renewal {
    pub id: NameId,
    pub expiry: i64,
    pub price: NativeAmount,
    pub refund: NativeAmount,
}

/// Everything persistent about a controller. The price feed is not
/// included; it is re-attached on restore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerSnapshot {
    pub config: ControllerConfig,
    pub registry: NameRegistry,
    pub authorization: AuthorizationState,
    pub auctions: AuctionBook,
    pub ledger: PaymentLedger,
}

// ---------------------------------------------------------------------------
// RegistrarController
// ---------------------------------------------------------------------------

pub struct RegistrarController {
    pub(crate) config: ControllerConfig,
    pub(crate) registry: NameRegistry,
    pub(crate) auth: AuthorizationState,
    pub(crate) auctions: AuctionBook,
    pub(crate) ledger: PaymentLedger,
    pub(crate) feed: Arc<dyn PriceFeed>,
}

impl std::fmt::Debug for RegistrarController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrarController")
            .field("controller", &self.config.controller_address)
            .field("names", &self.registry.record_count())
            .field("feed", &self.feed.describe())
            .finish()
    }
}

impl RegistrarController {
    /// Wires a controller to a registry. The registry must already trust
    /// `config.controller_address`, or every claim will fail with
    /// `Unauthorized`.
    pub fn new(config: ControllerConfig, registry: NameRegistry, feed: Arc<dyn PriceFeed>) -> Self {
        if registry.controller() != config.controller_address {
            warn!(
                registry_controller = %registry.controller(),
                controller = %config.controller_address,
                "registry does not trust this controller"
            );
        }
        Self {
            config,
            registry,
            auth: AuthorizationState::default(),
            auctions: AuctionBook::default(),
            ledger: PaymentLedger::default(),
            feed,
        }
    }

    pub fn from_snapshot(snapshot: ControllerSnapshot, feed: Arc<dyn PriceFeed>) -> Self {
        Self {
            config: snapshot.config,
            registry: snapshot.registry,
            auth: snapshot.authorization,
            auctions: snapshot.auctions,
            ledger: snapshot.ledger,
            feed,
        }
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            config: self.config.clone(),
            registry: self.registry.clone(),
            authorization: self.auth.clone(),
            auctions: self.auctions.clone(),
            ledger: self.ledger.clone(),
        }
    }

    // -- Accessors ----------------------------------------------------------

    /// The one read accessor for administrative configuration.
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn registry(&self) -> &NameRegistry {
        &self.registry
    }

    /// Direct access for registry-admin operations, which carry their own
    /// caller checks.
    pub fn registry_mut(&mut self) -> &mut NameRegistry {
        &mut self.registry
    }

    pub fn authorization(&self) -> &AuthorizationState {
        &self.auth
    }

    pub fn auctions(&self) -> &AuctionBook {
        &self.auctions
    }

    pub fn ledger(&self) -> &PaymentLedger {
        &self.ledger
    }

    pub fn price_feed(&self) -> &Arc<dyn PriceFeed> {
        &self.feed
    }

    pub fn domain(&self) -> TypedDataDomain {
        self.config.typed_data_domain()
    }

    pub fn nonce_of(&self, owner: &Address) -> u64 {
        self.auth.nonce_of(owner)
    }

    pub fn allowlist_used(&self, account: &Address) -> bool {
        self.auth.allowlist_used(account)
    }

    pub fn reservation_for(&self, name: &str) -> Result<Option<Address>, RegistrarError> {
        Ok(self.auth.reservation_for(&self.top_level_id(name)?))
    }

    pub fn balance_of(&self, account: &Address) -> NativeAmount {
        self.ledger.balance_of(account)
    }

    pub fn pending_events(&self) -> &[RegistrarEvent] {
        self.registry.pending_events()
    }

    pub fn drain_events(&mut self) -> Vec<RegistrarEvent> {
        self.registry.drain_events()
    }

    fn top_level_id(&self, name: &str) -> Result<NameId, RegistrarError> {
        let label = namehash::top_level_label(name, self.registry.tld())?;
        Ok(namehash::namehash(&self.registry.base_node(), label))
    }

    // -- Pricing ------------------------------------------------------------

    /// Base registration price in native token, ignoring auctions.
    pub fn calculate_price(&self, name: &str, duration: u64) -> Result<NativeAmount, RegistrarError> {
        let label = namehash::top_level_label(name, self.registry.tld())?;
        let reference = self.config.tiers.registration_price(label, duration)?;
        Ok(self.feed.convert(reference)?)
    }

    pub fn calculate_renewal_price(
        &self,
        name: &str,
        duration: u64,
    ) -> Result<NativeAmount, RegistrarError> {
        let label = namehash::top_level_label(name, self.registry.tld())?;
        let reference = self.config.tiers.renewal_price(label, duration)?;
        Ok(self.feed.convert(reference)?)
    }

    /// What the allowlist and reservation paths would charge right now:
    /// base price plus the auction premium inside an open window.
    pub fn quote(&self, name: &str, duration: u64, now: i64) -> Result<PriceBreakdown, RegistrarError> {
        let label = namehash::top_level_label(name, self.registry.tld())?;
        let id = namehash::namehash(&self.registry.base_node(), label);
        self.price_for(&id, label, duration, AuctionPolicy::ChargePremiumInWindow, now)
    }

    pub(crate) fn price_for(
        &self,
        id: &NameId,
        label: &str,
        duration: u64,
        policy: AuctionPolicy,
        now: i64,
    ) -> Result<PriceBreakdown, RegistrarError> {
        let premium = self.auctions.premium(id, label, policy, now)?;
        let base = self.config.tiers.registration_price(label, duration)?;
        let auction_premium = premium.map_or(ReferenceAmount::ZERO, |p| p.amount);
        let total_reference = base
            .checked_add(auction_premium)
            .ok_or(RegistrarError::PriceOverflow(base))?;
        let total_native = self.feed.convert(total_reference)?;

        debug!(
            name = label,
            duration,
            base = %base,
            premium = %auction_premium,
            total = %total_native,
            "priced registration"
        );
        Ok(PriceBreakdown {
            base,
            auction_premium,
            auction_batch: premium.map(|p| p.batch_id),
            total_reference,
            total_native,
        })
    }

    // -- Claim paths --------------------------------------------------------

    /// Registers the voucher's name for the voucher's owner. Anyone may
    /// submit the voucher; the submitter pays.
    pub fn register_with_signature(
        &mut self,
        ctx: &CallContext,
        voucher: &RegistrationVoucher,
        signature: &NominaSignature,
    ) -> Result<Registration, RegistrarError> {
        self.claim(
            ctx,
            &SignedVoucher {
                voucher,
                signature,
                auction: false,
            },
        )
    }

    /// One-time registration for an allowlisted caller.
    pub fn register_with_merkle_proof(
        &mut self,
        ctx: &CallContext,
        name: &str,
        duration: u64,
        proof: &[Hash32],
    ) -> Result<Registration, RegistrarError> {
        self.claim(
            ctx,
            &AllowlistProof {
                name,
                duration,
                proof,
            },
        )
    }

    /// Registration of a name reserved for the caller.
    pub fn register_reserved(
        &mut self,
        ctx: &CallContext,
        name: &str,
        duration: u64,
    ) -> Result<Registration, RegistrarError> {
        self.claim(ctx, &ReservedClaim { name, duration })
    }

    /// Runs a strategy, then the shared commit.
    pub(crate) fn claim<S: AuthorizationStrategy>(
        &mut self,
        ctx: &CallContext,
        strategy: &S,
    ) -> Result<Registration, RegistrarError> {
        let domain = self.config.typed_data_domain();
        let tld = self.registry.tld();
        let base = self.registry.base_node();
        let resolve = |name: &str| -> Result<NameId, RegistrarError> {
            let label = namehash::top_level_label(name, tld)?;
            Ok(namehash::namehash(&base, label))
        };
        let env = AuthorizationEnv {
            config: &self.config,
            state: &self.auth,
            domain: &domain,
            caller: ctx.caller,
            now: ctx.now,
            resolve: &resolve,
        };
        let claim = strategy.authorize(&env)?;
        self.commit(ctx, claim)
    }

    fn commit(
        &mut self,
        ctx: &CallContext,
        claim: AuthorizedClaim,
    ) -> Result<Registration, RegistrarError> {
        // 1. Name, duration, availability.
        let (id, label) = self
            .registry
            .check_registrable(&claim.name, claim.duration, ctx.now)?;
        if claim.owner.is_zero() {
            return Err(RegistrarError::ZeroAddress);
        }

        // 2. Reservations bind every path.
        let reservation = self.auth.reservation_for(&id);
        if let Some(holder) = reservation {
            if holder != ctx.caller {
                warn!(name = %label, caller = %ctx.caller, "claim of name reserved for another");
                return Err(RegistrarError::ReservedForAnother { name: label });
            }
        }

        // 3. Auction phase and price.
        let price = self.price_for(
            &id,
            &label,
            claim.duration,
            claim.path.auction_policy(),
            ctx.now,
        )?;

        // 4. Ceiling and payment.
        if let Some(ceiling) = claim.price_ceiling {
            if price.total_native > ceiling {
                return Err(RegistrarError::PriceExceedsCeiling {
                    price: price.total_native,
                    ceiling,
                });
            }
        }
        let refund = self.check_payment(ctx, price.total_native)?;
        let credits = self.prepare_credits(ctx, price.total_native, refund)?;

        // 5. Registry write: the last step that can fail.
        let (id, expiry) = self.registry.register(
            self.config.controller_address,
            &label,
            claim.owner,
            claim.duration,
            ctx.now,
        )?;

        // 6. Strategy effects.
        self.auth.apply(claim.effect);
        match claim.effect {
            ClaimEffect::ConsumeNonce { owner, used, .. } => {
                self.registry
                    .emit(RegistrarEvent::NonceConsumed { owner, nonce: used });
            }
            ClaimEffect::MarkAllowlistUsed(account) => {
                self.registry.emit(RegistrarEvent::AllowlistUsed { account });
            }
            ClaimEffect::None => {}
        }
        if reservation.is_some() {
            self.auth.set_reservation(id, None);
            self.registry.emit(RegistrarEvent::ReservationChanged {
                id,
                name: label.clone(),
                holder: None,
            });
        }
        self.registry.emit(RegistrarEvent::NameClaimed {
            id,
            name: label.clone(),
            owner: claim.owner,
            payer: ctx.caller,
            path: claim.path,
            base_price: price.base,
            auction_premium: price.auction_premium,
            price: price.total_native,
        });

        // 7. Money moves last.
        self.disburse(&credits);

        info!(
            name = %label,
            owner = %claim.owner,
            path = %claim.path,
            price = %price.total_native,
            expiry,
            "name claimed"
        );
        Ok(Registration {
            id,
            name: label,
            owner: claim.owner,
            expiry,
            path: claim.path,
            price,
            refund,
        })
    }

    fn check_payment(
        &self,
        ctx: &CallContext,
        price: NativeAmount,
    ) -> Result<NativeAmount, RegistrarError> {
        ctx.value
            .checked_sub(price)
            .ok_or(RegistrarError::InsufficientPayment {
                required: price,
                supplied: ctx.value,
            })
    }

    fn prepare_credits(
        &self,
        ctx: &CallContext,
        price: NativeAmount,
        refund: NativeAmount,
    ) -> Result<PreparedCredits, RegistrarError> {
        self.ledger.prepare(&[
            (self.config.payment_recipient, price, CreditReason::Proceeds),
            (ctx.caller, refund, CreditReason::Refund),
        ])
    }

    fn disburse(&mut self, credits: &PreparedCredits) {
        self.ledger.apply(credits);
        for &(account, amount, reason) in credits.credits() {
            self.registry.emit(RegistrarEvent::PaymentCredited {
                account,
                amount,
                reason,
            });
        }
    }

    // -- Renewal and payouts ------------------------------------------------

    /// Extends a name. Anyone may pay; ownership never changes.
    pub fn renew(
        &mut self,
        ctx: &CallContext,
        id: &NameId,
        duration: u64,
    ) -> Result<Renewal, RegistrarError> {
        let (record, _) = self.registry.check_renewable(id, duration, ctx.now)?;
        let label = record.label().to_string();
        let reference = self.config.tiers.renewal_price(&label, duration)?;
        let price = self.feed.convert(reference)?;
        let refund = self.check_payment(ctx, price)?;
        let credits = self.prepare_credits(ctx, price, refund)?;

        let expiry = self
            .registry
            .renew(self.config.controller_address, id, duration, ctx.now)?;

        self.registry.emit(RegistrarEvent::RenewalPaid {
            id: *id,
            payer: ctx.caller,
            price,
        });
        self.disburse(&credits);

        info!(name = %label, payer = %ctx.caller, %price, expiry, "renewal paid");
        Ok(Renewal {
            id: *id,
            expiry,
            price,
            refund,
        })
    }

    /// Same as [`renew`](Self::renew), addressed by name.
    pub fn renew_name(
        &mut self,
        ctx: &CallContext,
        name: &str,
        duration: u64,
    ) -> Result<Renewal, RegistrarError> {
        let id = self.registry.identifier_of(name)?;
        self.renew(ctx, &id, duration)
    }

    /// Pays out the caller's credited balance.
    pub fn withdraw(&mut self, ctx: &CallContext) -> Result<NativeAmount, RegistrarError> {
        let amount = self.ledger.withdraw(&ctx.caller)?;
        info!(account = %ctx.caller, %amount, "withdrawal");
        self.registry.emit(RegistrarEvent::Withdrawal {
            account: ctx.caller,
            amount,
        });
        Ok(amount)
    }

    // -- Owner pass-throughs ------------------------------------------------

    pub fn transfer(
        &mut self,
        ctx: &CallContext,
        id: &NameId,
        from: Address,
        to: Address,
    ) -> Result<(), RegistrarError> {
        self.registry
            .transfer_ownership(ctx.caller, id, from, to, ctx.now)
    }

    pub fn approve(
        &mut self,
        ctx: &CallContext,
        id: &NameId,
        delegate: Option<Address>,
    ) -> Result<(), RegistrarError> {
        self.registry.approve(ctx.caller, id, delegate, ctx.now)
    }

    pub fn register_subname(
        &mut self,
        ctx: &CallContext,
        label: &str,
        parent: &NameId,
        owner: Address,
        duration: u64,
    ) -> Result<(NameId, i64), RegistrarError> {
        self.registry
            .register_subname(ctx.caller, label, parent, owner, duration, ctx.now)
    }

    // -- Admin --------------------------------------------------------------

    pub(crate) fn require_admin(
        &self,
        ctx: &CallContext,
        action: &'static str,
    ) -> Result<(), RegistrarError> {
        if ctx.caller != self.config.admin {
            warn!(caller = %ctx.caller, action, "rejected non-admin call");
            return Err(RegistrarError::Unauthorized {
                caller: ctx.caller,
                action,
            });
        }
        Ok(())
    }

    pub fn set_tier(
        &mut self,
        ctx: &CallContext,
        bucket: usize,
        tier: Option<TierPrice>,
    ) -> Result<(), RegistrarError> {
        self.require_admin(ctx, "set price tiers")?;
        self.config.tiers.set(bucket, tier)?;
        info!(bucket, ?tier, "price tier updated");
        self.registry.emit(RegistrarEvent::TierChanged { bucket, tier });
        Ok(())
    }

    /// Sets the registration price of a bucket, keeping its renewal price.
    pub fn set_tier_price(
        &mut self,
        ctx: &CallContext,
        bucket: usize,
        registration: ReferenceAmount,
    ) -> Result<(), RegistrarError> {
        self.require_admin(ctx, "set price tiers")?;
        let renewal = self.config.tiers.get(bucket)?.and_then(|t| t.renewal);
        self.set_tier(
            ctx,
            bucket,
            Some(TierPrice {
                registration,
                renewal,
            }),
        )
    }

    /// Sets the renewal price of an already configured bucket.
    pub fn set_renewal_price(
        &mut self,
        ctx: &CallContext,
        bucket: usize,
        renewal: ReferenceAmount,
    ) -> Result<(), RegistrarError> {
        self.require_admin(ctx, "set price tiers")?;
        let mut tier = self
            .config
            .tiers
            .get(bucket)?
            .ok_or(RegistrarError::PricingNotConfigured { bucket })?;
        tier.renewal = Some(renewal);
        self.set_tier(ctx, bucket, Some(tier))
    }

    pub fn set_all_tiers(
        &mut self,
        ctx: &CallContext,
        tiers: [Option<TierPrice>; PRICE_TIER_COUNT],
    ) -> Result<(), RegistrarError> {
        self.require_admin(ctx, "set price tiers")?;
        for (i, tier) in tiers.into_iter().enumerate() {
            self.config.tiers.set(i + 1, tier)?;
            self.registry
                .emit(RegistrarEvent::TierChanged { bucket: i + 1, tier });
        }
        info!("all price tiers replaced");
        Ok(())
    }

    pub fn set_payment_recipient(
        &mut self,
        ctx: &CallContext,
        recipient: Address,
    ) -> Result<(), RegistrarError> {
        self.require_admin(ctx, "set the payment recipient")?;
        if recipient.is_zero() {
            return Err(RegistrarError::ZeroAddress);
        }
        self.config.payment_recipient = recipient;
        info!(%recipient, "payment recipient updated");
        self.registry
            .emit(RegistrarEvent::PaymentRecipientChanged { recipient });
        Ok(())
    }

    pub fn set_allowlist_root(
        &mut self,
        ctx: &CallContext,
        root: Option<Hash32>,
    ) -> Result<(), RegistrarError> {
        self.require_admin(ctx, "set the allowlist root")?;
        self.config.allowlist_root = root;
        let root = root.map(|r| hash::to_hex(&r));
        info!(root = ?root, "allowlist root updated");
        self.registry.emit(RegistrarEvent::AllowlistRootChanged { root });
        Ok(())
    }

    pub fn set_signer_key(
        &mut self,
        ctx: &CallContext,
        signer: Option<NominaPublicKey>,
    ) -> Result<(), RegistrarError> {
        self.require_admin(ctx, "rotate the signer key")?;
        self.config.signer = signer;
        let signer = signer.map(|k| k.to_hex());
        info!(signer = ?signer, "signer key rotated");
        self.registry.emit(RegistrarEvent::SignerKeyChanged { signer });
        Ok(())
    }

    pub fn set_price_feed(
        &mut self,
        ctx: &CallContext,
        feed: Arc<dyn PriceFeed>,
    ) -> Result<(), RegistrarError> {
        self.require_admin(ctx, "replace the price feed")?;
        let description = feed.describe();
        self.feed = feed;
        info!(feed = %description, "price feed replaced");
        self.registry
            .emit(RegistrarEvent::PriceFeedChanged { feed: description });
        Ok(())
    }

    pub fn set_reservation(
        &mut self,
        ctx: &CallContext,
        name: &str,
        holder: Option<Address>,
    ) -> Result<(), RegistrarError> {
        self.set_reservations(ctx, &[(name.to_string(), holder)])
    }

    /// Sets several reservations at once. All names are validated before
    /// any reservation changes.
    pub fn set_reservations(
        &mut self,
        ctx: &CallContext,
        entries: &[(String, Option<Address>)],
    ) -> Result<(), RegistrarError> {
        self.require_admin(ctx, "set reservations")?;
        let mut resolved = Vec::with_capacity(entries.len());
        for (name, holder) in entries {
            if holder.map_or(false, |h| h.is_zero()) {
                return Err(RegistrarError::ZeroAddress);
            }
            let label = namehash::top_level_label(name, self.registry.tld())?;
            let id = namehash::namehash(&self.registry.base_node(), label);
            resolved.push((id, label.to_string(), *holder));
        }

        for (id, name, holder) in resolved {
            self.auth.set_reservation(id, holder);
            info!(%name, holder = ?holder, "reservation updated");
            self.registry
                .emit(RegistrarEvent::ReservationChanged { id, name, holder });
        }
        Ok(())
    }

    pub fn transfer_admin(&mut self, ctx: &CallContext, admin: Address) -> Result<(), RegistrarError> {
        self.require_admin(ctx, "transfer controller admin")?;
        if admin.is_zero() {
            return Err(RegistrarError::ZeroAddress);
        }
        self.config.admin = admin;
        info!(%admin, "controller admin changed");
        self.registry
            .emit(RegistrarEvent::ControllerAdminChanged { admin });
        Ok(())
    }
}
