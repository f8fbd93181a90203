//! Integration tests for Dutch auctions and how each claim path treats
//! auction-bound names.

use std::sync::Arc;

use nomina_contracts::auction::AuctionPhase;
use nomina_contracts::authorization::RegistrationVoucher;
use nomina_contracts::controller::{CallContext, RegistrarController};
use nomina_contracts::error::RegistrarError;
use nomina_contracts::events::RegistrarEvent;
use nomina_contracts::pricing::TierPrice;
use nomina_contracts::registry::NameRegistry;
use nomina_contracts::{ClaimPath, ControllerConfig};
use nomina_protocol::amount::{NativeAmount, ReferenceAmount};
use nomina_protocol::config::SECONDS_PER_YEAR;
use nomina_protocol::crypto::keys::NominaKeypair;
use nomina_protocol::crypto::merkle::MerkleTree;
use nomina_protocol::crypto::signatures::sign_digest;
use nomina_protocol::identity::Address;
use nomina_protocol::oracle::{Quote, StaticPriceFeed};

const T0: i64 = 1_700_000_000;
const WINDOW_START: i64 = T0 + 1_000;
const WINDOW: u64 = 24 * 3_600;
const MIDWAY: i64 = WINDOW_START + 12 * 3_600;
const AFTER: i64 = WINDOW_START + WINDOW as i64 + 1;
const YEAR: u64 = SECONDS_PER_YEAR;

fn addr(label: &str) -> Address {
    Address::from_label(label)
}

fn usd(s: &str) -> ReferenceAmount {
    ReferenceAmount::parse_decimal(s).unwrap()
}

fn nom(s: &str) -> NativeAmount {
    NativeAmount::parse_decimal(s).unwrap()
}

fn paying(who: &str, value: &str, now: i64) -> CallContext {
    CallContext::new(addr(who), now).with_value(nom(value))
}

struct Fixture {
    controller: RegistrarController,
    signer: NominaKeypair,
    allowlist: MerkleTree,
}

/// "gold" is auctioned from $10 down to $1 over 24h. Four-character names
/// cost $10 a year; the native token trades at $2.
fn fixture() -> Fixture {
    let signer = NominaKeypair::from_seed(&[3u8; 32]);
    let allowlist = MerkleTree::from_addresses(&[addr("alice"), addr("bob")]);
    let feed = Arc::new(StaticPriceFeed::new(Quote::new(2_0000_0000, 8, T0)));
    let mut config = ControllerConfig::new(addr("admin"), addr("treasury"), 1, addr("controller"))
        .with_signer(signer.public_key())
        .with_allowlist_root(allowlist.root());
    config
        .tiers
        .set(4, Some(TierPrice::new(usd("10"), usd("8"))))
        .unwrap();
    let registry = NameRegistry::new(addr("admin"), addr("controller"), "nom").unwrap();
    let mut controller = RegistrarController::new(config, registry, feed);

    let admin = CallContext::new(addr("admin"), T0);
    let batch = controller
        .create_auction_batch(&admin, &["gold"], usd("10"), usd("1"), WINDOW, WINDOW_START)
        .unwrap();
    assert_eq!(batch, 0);
    Fixture {
        controller,
        signer,
        allowlist,
    }
}

fn voucher(name: &str, owner: &str, deadline: i64) -> RegistrationVoucher {
    RegistrationVoucher {
        name: name.into(),
        owner: addr(owner),
        duration: YEAR,
        price_ceiling: nom("100"),
        deadline,
        nonce: 0,
    }
}

// ---------------------------------------------------------------------------
// Batch management
// ---------------------------------------------------------------------------

#[test]
fn status_and_phase_follow_the_clock() {
    let fx = fixture();
    let c = &fx.controller;
    assert!(c.is_in_auction("gold").unwrap());
    assert!(!c.is_in_auction("iron").unwrap());

    assert_eq!(c.auction_phase("gold", T0).unwrap(), AuctionPhase::Scheduled { batch_id: 0 });
    assert_eq!(c.auction_phase("gold", MIDWAY).unwrap(), AuctionPhase::InWindow { batch_id: 0 });
    assert_eq!(
        c.auction_phase("gold", AFTER).unwrap(),
        AuctionPhase::WindowElapsed { batch_id: 0 }
    );

    assert_eq!(c.current_auction_price(0, MIDWAY).unwrap(), usd("5.5"));
    let status = c.get_auction_status(0, MIDWAY).unwrap();
    assert_eq!(status.current_price, Some(usd("5.5")));
    assert_eq!(status.time_remaining, 12 * 3_600);
    assert!(status.is_active && status.has_started && !status.is_complete);

    // Scheduled batches are not active yet; the countdown includes the wait.
    let before = c.get_auction_status(0, T0).unwrap();
    assert_eq!(before.current_price, None);
    assert_eq!(before.time_remaining, 87_400);
    assert!(!before.is_active && !before.has_started && !before.is_complete);

    let after = c.get_auction_status(0, AFTER).unwrap();
    assert_eq!(after.time_remaining, 0);
    assert!(!after.is_active && after.has_started && after.is_complete);

    assert_eq!(
        c.get_auction_status(9, MIDWAY),
        Err(RegistrarError::UnknownBatch(9))
    );
}

#[test]
fn batch_creation_rules() {
    let mut fx = fixture();
    let stranger = CallContext::new(addr("mallory"), T0);
    assert!(matches!(
        fx.controller
            .create_auction_batch(&stranger, &["iron"], usd("2"), usd("1"), WINDOW, T0),
        Err(RegistrarError::Unauthorized { .. })
    ));

    let admin = CallContext::new(addr("admin"), T0);
    assert_eq!(
        fx.controller
            .create_auction_batch(&admin, &["iron", "gold"], usd("2"), usd("1"), WINDOW, T0),
        Err(RegistrarError::AlreadyInAuction {
            name: "gold".into(),
            batch_id: 0
        })
    );
    assert!(!fx.controller.is_in_auction("iron").unwrap());

    let events = fx.controller.drain_events();
    assert!(matches!(
        events.last(),
        Some(RegistrarEvent::AuctionBatchCreated { batch_id: 0, .. })
    ));
}

// ---------------------------------------------------------------------------
// Before the window
// ---------------------------------------------------------------------------

#[test]
fn every_path_waits_for_the_window() {
    let mut fx = fixture();
    let not_started = RegistrarError::AuctionNotStarted {
        batch_id: 0,
        starts_at: WINDOW_START,
    };

    assert_eq!(
        fx.controller
            .purchase_auction(&paying("bob", "100", T0), "gold", YEAR, nom("100")),
        Err(not_started.clone())
    );

    let v = voucher("gold", "alice", T0 + 10);
    let sig = sign_digest(&fx.signer, &v.digest(&fx.controller.domain()));
    assert_eq!(
        fx.controller
            .register_with_signature(&paying("alice", "100", T0), &v, &sig),
        Err(not_started.clone())
    );

    let proof = fx.allowlist.proof(0).unwrap();
    assert_eq!(
        fx.controller
            .register_with_merkle_proof(&paying("alice", "100", T0), "gold", YEAR, &proof),
        Err(not_started)
    );
    assert!(!fx.controller.allowlist_used(&addr("alice")));
}

// ---------------------------------------------------------------------------
// Inside the window
// ---------------------------------------------------------------------------

#[test]
fn signature_path_is_refused_inside_the_window() {
    let mut fx = fixture();
    let v = voucher("gold", "alice", MIDWAY + 10);
    let sig = sign_digest(&fx.signer, &v.digest(&fx.controller.domain()));
    assert_eq!(
        fx.controller
            .register_with_signature(&paying("alice", "100", MIDWAY), &v, &sig),
        Err(RegistrarError::InAuction { name: "gold".into() })
    );
    assert_eq!(fx.controller.nonce_of(&addr("alice")), 0);
}

#[test]
fn allowlist_pays_base_plus_premium() {
    let mut fx = fixture();
    let proof = fx.allowlist.proof(1).unwrap();
    let reg = fx
        .controller
        .register_with_merkle_proof(&paying("bob", "10", MIDWAY), "gold", YEAR, &proof)
        .unwrap();
    assert_eq!(reg.price.base, usd("10"));
    assert_eq!(reg.price.auction_premium, usd("5.5"));
    assert_eq!(reg.price.auction_batch, Some(0));
    assert_eq!(reg.price.total_native, nom("7.75"));
    assert_eq!(reg.refund, nom("2.25"));
}

#[test]
fn reservation_pays_base_plus_premium() {
    let mut fx = fixture();
    let admin = CallContext::new(addr("admin"), T0);
    fx.controller
        .set_reservation(&admin, "gold", Some(addr("carol")))
        .unwrap();

    // The reservation holds against auction buyers too.
    assert_eq!(
        fx.controller
            .purchase_auction(&paying("bob", "10", MIDWAY), "gold", YEAR, nom("10")),
        Err(RegistrarError::ReservedForAnother { name: "gold".into() })
    );

    let reg = fx
        .controller
        .register_reserved(&paying("carol", "7.75", MIDWAY), "gold", YEAR)
        .unwrap();
    assert_eq!(reg.path, ClaimPath::Reservation);
    assert_eq!(reg.price.total_native, nom("7.75"));
}

#[test]
fn purchase_respects_ceiling() {
    let mut fx = fixture();
    assert_eq!(
        fx.controller
            .purchase_auction(&paying("bob", "10", MIDWAY), "gold", YEAR, nom("7")),
        Err(RegistrarError::PriceExceedsCeiling {
            price: nom("7.75"),
            ceiling: nom("7")
        })
    );
    let reg = fx
        .controller
        .purchase_auction(&paying("bob", "10", MIDWAY), "gold", YEAR, nom("8"))
        .unwrap();
    assert_eq!(reg.owner, addr("bob"));
    assert_eq!(reg.path, ClaimPath::AuctionPurchase);
}

#[test]
fn auction_voucher_pays_current_price() {
    let mut fx = fixture();
    let v = voucher("gold", "alice", MIDWAY + 10);
    let domain = fx.controller.domain();

    // A plain voucher signature does not open the auction path.
    let plain = sign_digest(&fx.signer, &v.digest(&domain));
    assert_eq!(
        fx.controller
            .register_auction_with_signature(&paying("relayer", "10", MIDWAY), &v, &plain),
        Err(RegistrarError::InvalidSignature)
    );

    let sig = sign_digest(&fx.signer, &v.auction_digest(&domain));
    let reg = fx
        .controller
        .register_auction_with_signature(&paying("relayer", "10", MIDWAY), &v, &sig)
        .unwrap();
    assert_eq!(reg.owner, addr("alice"));
    assert_eq!(reg.path, ClaimPath::AuctionSignature);
    assert_eq!(reg.price.total_native, nom("7.75"));
    assert_eq!(fx.controller.nonce_of(&addr("alice")), 1);
}

#[test]
fn auction_paths_need_an_auctioned_name() {
    let mut fx = fixture();
    assert_eq!(
        fx.controller
            .purchase_auction(&paying("bob", "10", MIDWAY), "iron", YEAR, nom("10")),
        Err(RegistrarError::NotInAuction { name: "iron".into() })
    );
}

#[test]
fn paused_batch_blocks_every_path() {
    let mut fx = fixture();
    let admin = CallContext::new(addr("admin"), T0);
    fx.controller.set_auction_batch_active(&admin, 0, false).unwrap();
    let paused = RegistrarError::AuctionPaused { batch_id: 0 };

    assert_eq!(
        fx.controller
            .purchase_auction(&paying("bob", "10", MIDWAY), "gold", YEAR, nom("10")),
        Err(paused.clone())
    );
    let proof = fx.allowlist.proof(1).unwrap();
    assert_eq!(
        fx.controller
            .register_with_merkle_proof(&paying("bob", "10", MIDWAY), "gold", YEAR, &proof),
        Err(paused.clone())
    );
    let v = voucher("gold", "alice", MIDWAY + 10);
    let sig = sign_digest(&fx.signer, &v.digest(&fx.controller.domain()));
    assert_eq!(
        fx.controller
            .register_with_signature(&paying("alice", "10", MIDWAY), &v, &sig),
        Err(paused)
    );

    fx.controller.set_auction_batch_active(&admin, 0, true).unwrap();
    assert!(fx
        .controller
        .purchase_auction(&paying("bob", "10", MIDWAY), "gold", YEAR, nom("10"))
        .is_ok());
}

// ---------------------------------------------------------------------------
// After the window
// ---------------------------------------------------------------------------

#[test]
fn ordinary_paths_pay_base_after_the_window() {
    let mut fx = fixture();
    let v = voucher("gold", "alice", AFTER + 10);
    let sig = sign_digest(&fx.signer, &v.digest(&fx.controller.domain()));
    let reg = fx
        .controller
        .register_with_signature(&paying("alice", "5", AFTER), &v, &sig)
        .unwrap();
    assert_eq!(reg.price.auction_premium, ReferenceAmount::ZERO);
    assert_eq!(reg.price.total_native, nom("5"));
}

#[test]
fn allowlist_and_reservation_pay_base_after_the_window() {
    let mut fx = fixture();
    let proof = fx.allowlist.proof(1).unwrap();
    let reg = fx
        .controller
        .register_with_merkle_proof(&paying("bob", "5", AFTER), "gold", YEAR, &proof)
        .unwrap();
    assert_eq!(reg.price.auction_premium, ReferenceAmount::ZERO);
    assert_eq!(reg.price.auction_batch, None);
    assert_eq!(reg.price.total_native, nom("5"));
    assert_eq!(reg.refund, NativeAmount::ZERO);

    let mut fx = fixture();
    let admin = CallContext::new(addr("admin"), T0);
    fx.controller
        .set_reservation(&admin, "gold", Some(addr("carol")))
        .unwrap();
    let reg = fx
        .controller
        .register_reserved(&paying("carol", "5", AFTER), "gold", YEAR)
        .unwrap();
    assert_eq!(reg.path, ClaimPath::Reservation);
    assert_eq!(reg.price.total_native, nom("5"));
}

#[test]
fn purchase_after_the_window_pays_base_only() {
    let mut fx = fixture();
    let reg = fx
        .controller
        .purchase_auction(&paying("bob", "5", AFTER), "gold", YEAR, nom("100"))
        .unwrap();
    assert_eq!(reg.path, ClaimPath::AuctionPurchase);
    assert_eq!(reg.price.auction_premium, ReferenceAmount::ZERO);
    assert_eq!(reg.price.total_native, nom("5"));
}

#[test]
fn auction_voucher_after_the_window_pays_base_only() {
    let mut fx = fixture();
    let v = voucher("gold", "alice", AFTER + 10);
    let sig = sign_digest(&fx.signer, &v.auction_digest(&fx.controller.domain()));
    let reg = fx
        .controller
        .register_auction_with_signature(&paying("relayer", "5", AFTER), &v, &sig)
        .unwrap();
    assert_eq!(reg.path, ClaimPath::AuctionSignature);
    assert_eq!(reg.price.total_native, nom("5"));
    assert_eq!(fx.controller.nonce_of(&addr("alice")), 1);
}

#[test]
fn paused_batch_no_longer_matters_after_the_window() {
    let mut fx = fixture();
    let admin = CallContext::new(addr("admin"), T0);
    fx.controller.set_auction_batch_active(&admin, 0, false).unwrap();
    let reg = fx
        .controller
        .purchase_auction(&paying("bob", "5", AFTER), "gold", YEAR, nom("5"))
        .unwrap();
    assert_eq!(reg.price.total_native, nom("5"));
}
