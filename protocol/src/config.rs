//! # Protocol Configuration & Constants
//!
//! Every magic number in Nomina lives here. Durations are in seconds,
//! timestamps are Unix seconds, amounts carry [`REFERENCE_DECIMALS`] or
//! [`NATIVE_DECIMALS`] of fixed-point precision.
//!
//! Runtime policy (tier prices, signer key, grace period overrides) lives in
//! the contracts crate's `ControllerConfig`; what's here are the defaults and
//! the things that must never change after launch.

// ---------------------------------------------------------------------------
// Network Identifiers
// ---------------------------------------------------------------------------

/// Mainnet chain id, mixed into every typed-data domain separator.
pub const CHAIN_ID_MAINNET: u64 = 0x4E4F_4D31; // "NOM1"

/// Testnet chain id.
pub const CHAIN_ID_TESTNET: u64 = 0x4E4F_4D54; // "NOMT"

/// Devnet chain id. Reset whenever someone feels like it.
pub const CHAIN_ID_DEVNET: u64 = 0x4E4F_4D44; // "NOMD"

/// Crate version, surfaced by the node's status endpoint.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// One day in seconds.
pub const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// The pricing year. Fixed at 365 days; leap years are not special.
pub const SECONDS_PER_YEAR: u64 = 365 * SECONDS_PER_DAY;

/// Default grace period after expiry: renewable, not transferable, not yet
/// claimable by anyone else.
pub const DEFAULT_GRACE_PERIOD: u64 = 90 * SECONDS_PER_DAY;

/// Default floor for a fresh registration.
pub const DEFAULT_MIN_REGISTRATION_DURATION: u64 = 28 * SECONDS_PER_DAY;

/// Maximum age of a price-feed quote before it is treated as stale.
pub const DEFAULT_MAX_QUOTE_AGE: u64 = 60 * 60;

// ---------------------------------------------------------------------------
// Amounts
// ---------------------------------------------------------------------------

/// Decimal places of the reference currency (USD-denominated prices).
pub const REFERENCE_DECIMALS: u32 = 18;

/// Decimal places of the native payment token.
pub const NATIVE_DECIMALS: u32 = 18;

/// `10^REFERENCE_DECIMALS`, i.e. one whole reference unit.
pub const REFERENCE_UNIT: u128 = 10u128.pow(REFERENCE_DECIMALS);

/// `10^NATIVE_DECIMALS`, i.e. one whole native token.
pub const NATIVE_UNIT: u128 = 10u128.pow(NATIVE_DECIMALS);

// ---------------------------------------------------------------------------
// Names
// ---------------------------------------------------------------------------

/// Number of price tiers. Tier `n` (1-based) covers names of exactly `n`
/// characters, the last one covers everything longer.
pub const PRICE_TIER_COUNT: usize = 5;

/// Longest accepted label, counted in Unicode scalar values.
pub const MAX_LABEL_LENGTH: usize = 63;

/// Label separator for hierarchical names.
pub const LABEL_SEPARATOR: char = '.';

/// Default top-level label the registrar issues names under.
pub const DEFAULT_BASE_TLD: &str = "nom";

// ---------------------------------------------------------------------------
// Typed Data
// ---------------------------------------------------------------------------

/// Domain name mixed into every signed voucher digest.
pub const TYPED_DATA_DOMAIN_NAME: &str = "NominaRegistrar";

/// Domain version. Bump it to invalidate every outstanding voucher.
pub const TYPED_DATA_DOMAIN_VERSION: &str = "1";

// ---------------------------------------------------------------------------
// Node Defaults
// ---------------------------------------------------------------------------

/// Default RPC / REST port.
pub const DEFAULT_RPC_PORT: u16 = 9841;

/// Default Prometheus port.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

// ---------------------------------------------------------------------------
// Utility
// ---------------------------------------------------------------------------

/// Returns a friendly name for a chain id, mainly for logging.
pub fn network_name(chain_id: u64) -> String {
    match chain_id {
        CHAIN_ID_MAINNET => "mainnet".to_string(),
        CHAIN_ID_TESTNET => "testnet".to_string(),
        CHAIN_ID_DEVNET => "devnet".to_string(),
        other => format!("unknown(0x{:08X})", other),
    }
}

/// Parses a network name back into its chain id.
pub fn chain_id_for_network(name: &str) -> Option<u64> {
    match name.to_ascii_lowercase().as_str() {
        "mainnet" => Some(CHAIN_ID_MAINNET),
        "testnet" => Some(CHAIN_ID_TESTNET),
        "devnet" => Some(CHAIN_ID_DEVNET),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_ids_are_distinct() {
        assert_ne!(CHAIN_ID_MAINNET, CHAIN_ID_TESTNET);
        assert_ne!(CHAIN_ID_MAINNET, CHAIN_ID_DEVNET);
        assert_ne!(CHAIN_ID_TESTNET, CHAIN_ID_DEVNET);
    }

    #[test]
    fn test_network_name_roundtrip() {
        for id in [CHAIN_ID_MAINNET, CHAIN_ID_TESTNET, CHAIN_ID_DEVNET] {
            assert_eq!(chain_id_for_network(&network_name(id)), Some(id));
        }
        assert_eq!(network_name(0xCAFE), "unknown(0x0000CAFE)");
        assert_eq!(chain_id_for_network("moonnet"), None);
    }

    #[test]
    fn test_time_constants_sanity() {
        assert_eq!(SECONDS_PER_YEAR, 31_536_000);
        assert!(DEFAULT_MIN_REGISTRATION_DURATION < SECONDS_PER_YEAR);
        assert!(DEFAULT_GRACE_PERIOD > 0);
    }

    #[test]
    fn test_units() {
        assert_eq!(REFERENCE_UNIT, 1_000_000_000_000_000_000);
        assert_eq!(NATIVE_UNIT, REFERENCE_UNIT);
    }
}
