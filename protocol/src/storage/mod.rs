//! # Storage Module
//!
//! Persistence for a running Nomina node. The registrar itself is an
//! in-memory state machine; this layer lets a node survive restarts.
//!
//! ## What gets stored
//!
//! ```text
//! snapshots — the whole registrar state, keyed by deployment name
//! events    — the append-only event log, keyed by sequence number
//! metadata  — small bookkeeping values (schema version, last save time)
//! ```
//!
//! The store is generic over the stored types so the protocol crate doesn't
//! need to know what a registrar snapshot looks like. Values are bincode on
//! disk; JSON is for the API.

pub mod db;

pub use db::{DbError, DbResult, NominaDB};
