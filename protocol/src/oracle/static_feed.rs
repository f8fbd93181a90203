//! An administratively set price feed.
//!
//! Used on devnet (the node's operator posts quotes through an admin RPC)
//! and throughout the test suites, where it can be told to fail on demand.

use parking_lot::RwLock;

use super::{OracleError, PriceFeed, Quote};

#[derive(Debug)]
enum FeedState {
    Live(Quote),
    Down(String),
}

/// A price feed whose quote is set by hand.
#[derive(Debug)]
pub struct StaticPriceFeed {
    state: RwLock<FeedState>,
    /// When set, quotes older than this (against the wall clock) are
    /// rejected as stale.
    max_age_secs: Option<u64>,
}

impl StaticPriceFeed {
    /// A feed that never goes stale. Tests use this.
    pub fn new(quote: Quote) -> Self {
        Self {
            state: RwLock::new(FeedState::Live(quote)),
            max_age_secs: None,
        }
    }

    /// A feed that rejects quotes older than `max_age_secs`.
    pub fn with_max_age(quote: Quote, max_age_secs: u64) -> Self {
        Self {
            state: RwLock::new(FeedState::Live(quote)),
            max_age_secs: Some(max_age_secs),
        }
    }

    /// Convenience: `answer` with 8 decimals, stamped now.
    pub fn from_answer(answer: u128) -> Self {
        Self::new(Quote::new(answer, 8, chrono::Utc::now().timestamp()))
    }

    /// Posts a new quote and brings the feed back up.
    pub fn set_quote(&self, quote: Quote) {
        tracing::info!(
            answer = quote.answer,
            decimals = quote.decimals,
            updated_at = quote.updated_at,
            "price feed quote updated"
        );
        *self.state.write() = FeedState::Live(quote);
    }

    /// Takes the feed down. Every call fails until the next `set_quote`.
    pub fn set_unavailable(&self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(%reason, "price feed marked unavailable");
        *self.state.write() = FeedState::Down(reason);
    }

    fn check_fresh(&self, quote: &Quote) -> Result<(), OracleError> {
        let Some(max_age_secs) = self.max_age_secs else {
            return Ok(());
        };
        let now = chrono::Utc::now().timestamp();
        let age_secs = now.saturating_sub(quote.updated_at).max(0) as u64;
        if age_secs > max_age_secs {
            return Err(OracleError::StaleQuote {
                age_secs,
                max_age_secs,
            });
        }
        Ok(())
    }
}

impl PriceFeed for StaticPriceFeed {
    fn latest_quote(&self) -> Result<Quote, OracleError> {
        match &*self.state.read() {
            FeedState::Live(quote) => {
                if quote.answer == 0 {
                    return Err(OracleError::NonPositiveQuote);
                }
                self.check_fresh(quote)?;
                Ok(*quote)
            }
            FeedState::Down(reason) => Err(OracleError::Unavailable(reason.clone())),
        }
    }

    fn describe(&self) -> String {
        "static-feed".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::{NativeAmount, ReferenceAmount};

    #[test]
    fn test_live_feed_converts() {
        let feed = StaticPriceFeed::new(Quote::new(4_0000_0000, 8, 0));
        let out = feed.convert(ReferenceAmount::from_units(8).unwrap()).unwrap();
        assert_eq!(out, NativeAmount::from_units(2).unwrap());
    }

    #[test]
    fn test_down_feed_propagates_error() {
        let feed = StaticPriceFeed::new(Quote::new(1, 8, 0));
        feed.set_unavailable("sequencer offline");
        assert_eq!(
            feed.convert(ReferenceAmount::from_units(1).unwrap()),
            Err(OracleError::Unavailable("sequencer offline".into()))
        );
        feed.set_quote(Quote::new(1_0000_0000, 8, 0));
        assert!(feed.latest_quote().is_ok());
    }

    #[test]
    fn test_stale_quote_rejected() {
        let old = chrono::Utc::now().timestamp() - 3_600;
        let feed = StaticPriceFeed::with_max_age(Quote::new(1_0000_0000, 8, old), 60);
        assert!(matches!(
            feed.latest_quote(),
            Err(OracleError::StaleQuote { max_age_secs: 60, .. })
        ));
    }

    #[test]
    fn test_zero_answer_rejected() {
        let feed = StaticPriceFeed::new(Quote::new(0, 8, 0));
        assert_eq!(feed.latest_quote(), Err(OracleError::NonPositiveQuote));
    }
}
