// Copyright (c) 2026 Nomina Contributors. MIT License.
// See LICENSE for details.

//! # Nomina Protocol — Core Library
//!
//! Primitives shared by the Nomina name registrar and the node that hosts
//! it. Nothing in here knows what a name is; that lives in
//! `nomina-contracts`.
//!
//! ## Modules
//!
//! - **amount** — Fixed-point reference and native currency amounts.
//! - **config** — Protocol constants: durations, decimals, chain ids.
//! - **crypto** — Ed25519 keys, BLAKE3 hashing, allowlist Merkle proofs,
//!   typed-data digests for signed vouchers.
//! - **identity** — 32-byte account addresses.
//! - **oracle** — The price feed interface and an admin-set implementation.
//! - **storage** — sled-backed snapshot and event persistence.
//!
//! ## Conventions
//!
//! 1. Money is integer, checked, and typed by currency.
//! 2. Time is Unix seconds (`i64`) supplied by the caller, never read from
//!    the clock inside state transitions.
//! 3. Every hash is BLAKE3 under a purpose-specific derivation context.

pub mod amount;
pub mod config;
pub mod crypto;
pub mod identity;
pub mod oracle;
pub mod storage;

pub use amount::{AmountParseError, NativeAmount, ReferenceAmount};
pub use identity::Address;
