// Copyright (c) 2026 Nomina Contributors. MIT License.
// See LICENSE for details.

//! # Nomina Registrar Contracts
//!
//! The state machines behind Nomina's name service:
//!
//! - **Registry**: the authoritative record of who owns which name until
//!   when, with grace periods, delegated transfer, and sub-names.
//! - **Controller**: pricing, payment, and the five claim paths (signed
//!   voucher, auction voucher, allowlist proof, reservation, auction
//!   purchase), all funnelled through one validated commit.
//! - **Auctions**: Dutch auctions that put a decaying premium on chosen
//!   names for a window of time.
//!
//! ## Conventions
//!
//! 1. No operation reads a clock. The host passes `now` in, so the same
//!    inputs give the same result on every node.
//! 2. Every check runs before the first write. A call that returns `Err`
//!    has changed nothing, emitted nothing, and moved no money.
//! 3. Money is pulled, never pushed: proceeds and refunds are credited to
//!    a ledger and withdrawn separately.
//! 4. Every public type is serializable for snapshots and RPC.

pub mod auction;
pub mod authorization;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod ledger;
pub mod namehash;
pub mod pricing;
pub mod registry;

pub use auction::{AuctionBatch, AuctionPhase, AuctionStatus, BatchId};
pub use authorization::{ClaimPath, RegistrationVoucher};
pub use config::ControllerConfig;
pub use controller::{
    CallContext, ControllerSnapshot, PriceBreakdown, RegistrarController, Registration, Renewal,
};
pub use error::{ErrorKind, RegistrarError, RegistrarResult};
pub use events::{CreditReason, RegistrarEvent};
pub use namehash::NameId;
pub use pricing::{PriceTiers, TierPrice};
pub use registry::{NameRecord, NameRegistry, NameStatus};
