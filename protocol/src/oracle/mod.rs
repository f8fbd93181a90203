//! # Price Feeds
//!
//! Tier prices are set in the reference currency; callers pay in the native
//! token. A [`PriceFeed`] bridges the two through exactly two functions:
//!
//! - [`PriceFeed::latest_quote`] — the raw fixed-point quote.
//! - [`PriceFeed::convert`] — reference amount → native amount.
//!
//! Feed failures are errors, always. A feed that can't produce a fresh,
//! positive quote must say so; it must never fall back to zero or to the
//! last good value. The registrar propagates the error to the caller.
//!
//! ## Quote format
//!
//! `answer` is the price of one whole native token in reference units,
//! scaled by `10^decimals` (the common oracle convention: `answer = 2_0000_0000`
//! with `decimals = 8` means one token costs 2.00).

pub mod static_feed;

pub use static_feed::StaticPriceFeed;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::amount::{NativeAmount, ReferenceAmount};
use crate::config::{NATIVE_DECIMALS, REFERENCE_DECIMALS};

/// Errors a price feed can report.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("price feed unavailable: {0}")]
    Unavailable(String),

    #[error("price feed returned a non-positive quote")]
    NonPositiveQuote,

    #[error("price feed quote is stale: {age_secs}s old, limit {max_age_secs}s")]
    StaleQuote { age_secs: u64, max_age_secs: u64 },

    #[error("price conversion overflowed")]
    Overflow,
}

/// A raw fixed-point quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Reference units per whole native token, times `10^decimals`.
    pub answer: u128,
    pub decimals: u32,
    /// Unix seconds when the quote was produced.
    pub updated_at: i64,
}

impl Quote {
    pub fn new(answer: u128, decimals: u32, updated_at: i64) -> Self {
        Self {
            answer,
            decimals,
            updated_at,
        }
    }

    /// Converts a reference amount at this quote.
    ///
    /// `native = reference * 10^decimals / answer`, adjusted for any
    /// difference between the two currencies' decimals. Truncates toward
    /// zero exactly once.
    pub fn convert(&self, amount: ReferenceAmount) -> Result<NativeAmount, OracleError> {
        if self.answer == 0 {
            return Err(OracleError::NonPositiveQuote);
        }
        let quote_scale = 10u128
            .checked_pow(self.decimals)
            .ok_or(OracleError::Overflow)?;
        let mut numerator = amount
            .raw()
            .checked_mul(quote_scale)
            .ok_or(OracleError::Overflow)?;
        let mut denominator = self.answer;

        if NATIVE_DECIMALS >= REFERENCE_DECIMALS {
            let shift = 10u128.pow(NATIVE_DECIMALS - REFERENCE_DECIMALS);
            numerator = numerator.checked_mul(shift).ok_or(OracleError::Overflow)?;
        } else {
            let shift = 10u128.pow(REFERENCE_DECIMALS - NATIVE_DECIMALS);
            denominator = denominator.checked_mul(shift).ok_or(OracleError::Overflow)?;
        }

        Ok(NativeAmount::from_raw(numerator / denominator))
    }
}

/// The two-function interface the registrar consumes.
///
/// `Send + Sync` so a feed can sit behind an `Arc` shared between the node's
/// request handlers and its admin endpoints.
pub trait PriceFeed: Send + Sync {
    /// The current raw quote.
    fn latest_quote(&self) -> Result<Quote, OracleError>;

    /// Converts a reference-currency amount to native token.
    fn convert(&self, amount: ReferenceAmount) -> Result<NativeAmount, OracleError> {
        self.latest_quote()?.convert(amount)
    }

    /// Short identifier for logs and status pages.
    fn describe(&self) -> String {
        "price-feed".to_string()
    }
}
