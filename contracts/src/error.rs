//! # Registrar Errors
//!
//! One error enum for the whole registrar, classified by [`ErrorKind`].
//! Every error is terminal: the failed call changed nothing, and fixing it
//! takes a new request (new signature, nonce, name, or payment), never a
//! retry of the same one.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use nomina_protocol::amount::{NativeAmount, ReferenceAmount};
use nomina_protocol::identity::Address;
use nomina_protocol::oracle::OracleError;

use crate::auction::BatchId;

/// Coarse classification of a [`RegistrarError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The request is malformed.
    Validation,
    /// Well-formed, but the registrar's rules forbid it.
    Policy,
    /// The caller or their credentials are not good enough.
    Authorization,
    /// The target doesn't exist or is in the wrong lifecycle state.
    State,
    /// The money doesn't add up.
    Payment,
    /// The price feed failed.
    PriceFeed,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Policy => write!(f, "policy"),
            ErrorKind::Authorization => write!(f, "authorization"),
            ErrorKind::State => write!(f, "state"),
            ErrorKind::Payment => write!(f, "payment"),
            ErrorKind::PriceFeed => write!(f, "price_feed"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistrarError {
    // -- Validation -------------------------------------------------------
    #[error("empty name")]
    EmptyName,

    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("duration must be greater than zero")]
    ZeroDuration,

    #[error("the zero address cannot own or hold anything")]
    ZeroAddress,

    #[error("invalid price tier bucket {0}: buckets are 1 through 5")]
    InvalidBucket(usize),

    #[error("invalid auction parameters: {0}")]
    InvalidAuctionParameters(String),

    // -- Policy -----------------------------------------------------------
    #[error("registration pricing not configured for {bucket}-character names")]
    PricingNotConfigured { bucket: usize },

    #[error("renewal pricing not configured for {bucket}-character names")]
    RenewalPricingNotConfigured { bucket: usize },

    #[error("duration {duration}s is below the minimum of {minimum}s")]
    DurationTooShort { duration: u64, minimum: u64 },

    #[error("'{name}' is reserved for another address")]
    ReservedForAnother { name: String },

    #[error("'{name}' is not reserved for the caller")]
    NotReserved { name: String },

    #[error("'{name}' is in an open auction window; use the auction path")]
    InAuction { name: String },

    #[error("'{name}' is not part of any auction batch")]
    NotInAuction { name: String },

    #[error("auction batch {batch_id} opens at {starts_at}")]
    AuctionNotStarted { batch_id: BatchId, starts_at: i64 },

    #[error("auction batch {batch_id} is paused")]
    AuctionPaused { batch_id: BatchId },

    #[error("'{name}' already belongs to auction batch {batch_id}")]
    AlreadyInAuction { name: String, batch_id: BatchId },

    // -- Authorization ----------------------------------------------------
    #[error("{caller} is not allowed to {action}")]
    Unauthorized { caller: Address, action: &'static str },

    #[error("no signer key configured")]
    SignerNotConfigured,

    #[error("invalid voucher signature")]
    InvalidSignature,

    #[error("voucher deadline {deadline} has passed (now {now})")]
    SignatureExpired { deadline: i64, now: i64 },

    #[error("stale nonce for {owner}: expected {expected}, got {got}")]
    StaleNonce { owner: Address, expected: u64, got: u64 },

    #[error("allowlist proof does not verify")]
    InvalidProof,

    #[error("{0} has already used its allowlist eligibility")]
    AllowlistAlreadyUsed(Address),

    #[error("{claimed} is not the current owner")]
    OwnerMismatch { claimed: Address },

    // -- State ------------------------------------------------------------
    #[error("no record for {0}")]
    UnknownName(String),

    #[error("'{name}' expired at {expiry}")]
    Expired { name: String, expiry: i64 },

    #[error("'{name}' is not available")]
    NotAvailable { name: String },

    #[error("parent '{name}' is not active")]
    InactiveParent { name: String },

    #[error("unknown auction batch {0}")]
    UnknownBatch(BatchId),

    // -- Payment ----------------------------------------------------------
    #[error("insufficient payment: required {required}, supplied {supplied}")]
    InsufficientPayment {
        required: NativeAmount,
        supplied: NativeAmount,
    },

    #[error("price {price} exceeds ceiling {ceiling}")]
    PriceExceedsCeiling {
        price: NativeAmount,
        ceiling: NativeAmount,
    },

    #[error("price {0} overflows")]
    PriceOverflow(ReferenceAmount),

    #[error("arithmetic overflow")]
    Overflow,

    #[error("nothing to withdraw")]
    NothingToWithdraw,

    // -- Price feed -------------------------------------------------------
    #[error("price feed: {0}")]
    PriceFeed(#[from] OracleError),
}

impl RegistrarError {
    pub fn kind(&self) -> ErrorKind {
        use RegistrarError::*;
        match self {
            EmptyName
            | InvalidName { .. }
            | ZeroDuration
            | ZeroAddress
            | InvalidBucket(_)
            | InvalidAuctionParameters(_) => ErrorKind::Validation,

            PricingNotConfigured { .. }
            | RenewalPricingNotConfigured { .. }
            | DurationTooShort { .. }
            | ReservedForAnother { .. }
            | NotReserved { .. }
            | InAuction { .. }
            | NotInAuction { .. }
            | AuctionNotStarted { .. }
            | AuctionPaused { .. }
            | AlreadyInAuction { .. } => ErrorKind::Policy,

            Unauthorized { .. }
            | SignerNotConfigured
            | InvalidSignature
            | SignatureExpired { .. }
            | StaleNonce { .. }
            | InvalidProof
            | AllowlistAlreadyUsed(_)
            | OwnerMismatch { .. } => ErrorKind::Authorization,

            UnknownName(_)
            | Expired { .. }
            | NotAvailable { .. }
            | InactiveParent { .. }
            | UnknownBatch(_) => ErrorKind::State,

            InsufficientPayment { .. }
            | PriceExceedsCeiling { .. }
            | PriceOverflow(_)
            | Overflow
            | NothingToWithdraw => ErrorKind::Payment,

            PriceFeed(_) => ErrorKind::PriceFeed,
        }
    }

    /// Stable machine-readable code, e.g. `"stale_nonce"`.
    pub fn code(&self) -> &'static str {
        use RegistrarError::*;
        match self {
            EmptyName => "empty_name",
            InvalidName { .. } => "invalid_name",
            ZeroDuration => "zero_duration",
            ZeroAddress => "zero_address",
            InvalidBucket(_) => "invalid_bucket",
            InvalidAuctionParameters(_) => "invalid_auction_parameters",
            PricingNotConfigured { .. } => "pricing_not_configured",
            RenewalPricingNotConfigured { .. } => "renewal_pricing_not_configured",
            DurationTooShort { .. } => "duration_too_short",
            ReservedForAnother { .. } => "reserved_for_another",
            NotReserved { .. } => "not_reserved",
            InAuction { .. } => "in_auction",
            NotInAuction { .. } => "not_in_auction",
            AuctionNotStarted { .. } => "auction_not_started",
            AuctionPaused { .. } => "auction_paused",
            AlreadyInAuction { .. } => "already_in_auction",
            Unauthorized { .. } => "unauthorized",
            SignerNotConfigured => "signer_not_configured",
            InvalidSignature => "invalid_signature",
            SignatureExpired { .. } => "signature_expired",
            StaleNonce { .. } => "stale_nonce",
            InvalidProof => "invalid_proof",
            AllowlistAlreadyUsed(_) => "allowlist_already_used",
            OwnerMismatch { .. } => "owner_mismatch",
            UnknownName(_) => "unknown_name",
            Expired { .. } => "expired",
            NotAvailable { .. } => "not_available",
            InactiveParent { .. } => "inactive_parent",
            UnknownBatch(_) => "unknown_batch",
            InsufficientPayment { .. } => "insufficient_payment",
            PriceExceedsCeiling { .. } => "price_exceeds_ceiling",
            PriceOverflow(_) => "price_overflow",
            Overflow => "overflow",
            NothingToWithdraw => "nothing_to_withdraw",
            PriceFeed(_) => "price_feed",
        }
    }
}

pub type RegistrarResult<T> = Result<T, RegistrarError>;
