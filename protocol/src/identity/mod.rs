//! # Identity
//!
//! Account addresses. Every caller, owner, and payee in the registrar is an
//! [`Address`]; the signer key behind vouchers is a
//! [`NominaPublicKey`](crate::crypto::NominaPublicKey).

pub mod address;

pub use address::{Address, AddressError};
