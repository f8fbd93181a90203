//! # Pricing Engine
//!
//! Names are priced by character count into five buckets: 1, 2, 3, 4 and
//! 5-or-more characters. Each bucket carries an annual registration price
//! and an annual renewal price in the reference currency.
//!
//! ## Proration
//!
//! ```text
//! d <= 1 year:  registration * d / YEAR
//! d >  1 year:  registration + renewal * (d - YEAR) / YEAR
//! renewal(d):   renewal * d / YEAR
//! ```
//!
//! Always multiply first, then divide, so each term truncates once.
//!
//! ## Unconfigured tiers
//!
//! A bucket is either `Some(TierPrice)` or `None`. There is no magic
//! sentinel price; zero is a legitimate (free) price. `None` fails with
//! [`RegistrarError::PricingNotConfigured`]. A configured tier may still
//! lack a renewal price, in which case anything that needs it (renewals and
//! registrations longer than a year) fails with
//! [`RegistrarError::RenewalPricingNotConfigured`].

use serde::{Deserialize, Serialize};

use nomina_protocol::amount::ReferenceAmount;
use nomina_protocol::config::{PRICE_TIER_COUNT, SECONDS_PER_YEAR};

use crate::error::RegistrarError;
use crate::namehash::char_count;

/// Annual prices for one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPrice {
    pub registration: ReferenceAmount,
    pub renewal: Option<ReferenceAmount>,
}

impl TierPrice {
    pub fn new(registration: ReferenceAmount, renewal: ReferenceAmount) -> Self {
        Self {
            registration,
            renewal: Some(renewal),
        }
    }

    pub fn registration_only(registration: ReferenceAmount) -> Self {
        Self {
            registration,
            renewal: None,
        }
    }
}

/// Bucket (1-based) for a label: `min(chars, 5)`.
pub fn bucket_for(label: &str) -> usize {
    char_count(label).clamp(1, PRICE_TIER_COUNT)
}

/// `annual * duration / YEAR`.
pub fn prorate(annual: ReferenceAmount, duration: u64) -> Result<ReferenceAmount, RegistrarError> {
    annual
        .mul_div(duration as u128, SECONDS_PER_YEAR as u128)
        .ok_or(RegistrarError::PriceOverflow(annual))
}

/// The five-bucket price table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTiers {
    tiers: [Option<TierPrice>; PRICE_TIER_COUNT],
}

impl PriceTiers {
    pub fn new(tiers: [Option<TierPrice>; PRICE_TIER_COUNT]) -> Self {
        Self { tiers }
    }

    fn index(bucket: usize) -> Result<usize, RegistrarError> {
        if (1..=PRICE_TIER_COUNT).contains(&bucket) {
            Ok(bucket - 1)
        } else {
            Err(RegistrarError::InvalidBucket(bucket))
        }
    }

    pub fn get(&self, bucket: usize) -> Result<Option<TierPrice>, RegistrarError> {
        Ok(self.tiers[Self::index(bucket)?])
    }

    pub fn set(&mut self, bucket: usize, tier: Option<TierPrice>) -> Result<(), RegistrarError> {
        self.tiers[Self::index(bucket)?] = tier;
        Ok(())
    }

    pub fn all(&self) -> &[Option<TierPrice>; PRICE_TIER_COUNT] {
        &self.tiers
    }

    /// Configured tier for `label`.
    pub fn tier_for(&self, label: &str) -> Result<TierPrice, RegistrarError> {
        let bucket = bucket_for(label);
        self.tiers[bucket - 1].ok_or(RegistrarError::PricingNotConfigured { bucket })
    }

    /// Registration price in the reference currency.
    pub fn registration_price(
        &self,
        label: &str,
        duration: u64,
    ) -> Result<ReferenceAmount, RegistrarError> {
        let bucket = bucket_for(label);
        let tier = self.tier_for(label)?;

        if duration <= SECONDS_PER_YEAR {
            return prorate(tier.registration, duration);
        }

        let renewal = tier
            .renewal
            .ok_or(RegistrarError::RenewalPricingNotConfigured { bucket })?;
        let extra = prorate(renewal, duration - SECONDS_PER_YEAR)?;
        tier.registration
            .checked_add(extra)
            .ok_or(RegistrarError::PriceOverflow(tier.registration))
    }

    /// Renewal price in the reference currency. No first-year split.
    pub fn renewal_price(
        &self,
        label: &str,
        duration: u64,
    ) -> Result<ReferenceAmount, RegistrarError> {
        let bucket = bucket_for(label);
        let renewal = self
            .tier_for(label)?
            .renewal
            .ok_or(RegistrarError::RenewalPricingNotConfigured { bucket })?;
        prorate(renewal, duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nomina_protocol::config::SECONDS_PER_DAY;

    fn usd(units: u128) -> ReferenceAmount {
        ReferenceAmount::from_units(units).unwrap()
    }

    fn four_char_table() -> PriceTiers {
        let mut tiers = PriceTiers::default();
        tiers.set(4, Some(TierPrice::new(usd(10), usd(8)))).unwrap();
        tiers
    }

    #[test]
    fn test_bucket_for() {
        assert_eq!(bucket_for("a"), 1);
        assert_eq!(bucket_for("abcd"), 4);
        assert_eq!(bucket_for("abcde"), 5);
        assert_eq!(bucket_for("abcdefghijk"), 5);
        assert_eq!(bucket_for("ñañá"), 4);
    }

    #[test]
    fn test_one_year_is_registration_price() {
        let t = four_char_table();
        assert_eq!(t.registration_price("abcd", SECONDS_PER_YEAR).unwrap(), usd(10));
    }

    #[test]
    fn test_short_durations_prorate_registration() {
        let t = four_char_table();
        let half = t.registration_price("abcd", SECONDS_PER_YEAR / 2).unwrap();
        assert_eq!(half, usd(5));
        let d = 100 * SECONDS_PER_DAY;
        assert_eq!(
            t.registration_price("abcd", d).unwrap().raw(),
            usd(10).raw() * d as u128 / SECONDS_PER_YEAR as u128
        );
    }

    #[test]
    fn test_long_durations_split_first_year() {
        let t = four_char_table();
        assert_eq!(
            t.registration_price("abcd", SECONDS_PER_YEAR * 3 / 2).unwrap(),
            usd(14)
        );
        assert_eq!(t.registration_price("abcd", 2 * SECONDS_PER_YEAR).unwrap(), usd(18));
        assert_eq!(t.registration_price("abcd", 3 * SECONDS_PER_YEAR).unwrap(), usd(26));
    }

    #[test]
    fn test_renewal_has_no_split() {
        let t = four_char_table();
        assert_eq!(t.renewal_price("abcd", 2 * SECONDS_PER_YEAR).unwrap(), usd(16));
    }

    #[test]
    fn test_unconfigured_bucket() {
        let t = four_char_table();
        assert_eq!(
            t.registration_price("abc", SECONDS_PER_YEAR),
            Err(RegistrarError::PricingNotConfigured { bucket: 3 })
        );
    }

    #[test]
    fn test_missing_renewal_blocks_multi_year_only() {
        let mut t = PriceTiers::default();
        t.set(5, Some(TierPrice::registration_only(usd(3)))).unwrap();
        assert_eq!(t.registration_price("abcde", SECONDS_PER_YEAR).unwrap(), usd(3));
        assert_eq!(
            t.registration_price("abcde", 2 * SECONDS_PER_YEAR),
            Err(RegistrarError::RenewalPricingNotConfigured { bucket: 5 })
        );
        assert!(t.renewal_price("abcde", SECONDS_PER_YEAR).is_err());
    }

    #[test]
    fn test_zero_is_a_real_price() {
        let mut t = PriceTiers::default();
        t.set(5, Some(TierPrice::new(ReferenceAmount::ZERO, ReferenceAmount::ZERO)))
            .unwrap();
        assert_eq!(
            t.registration_price("freebie", SECONDS_PER_YEAR).unwrap(),
            ReferenceAmount::ZERO
        );
    }

    #[test]
    fn test_bucket_bounds() {
        let mut t = PriceTiers::default();
        assert_eq!(t.set(0, None), Err(RegistrarError::InvalidBucket(0)));
        assert_eq!(t.set(6, None), Err(RegistrarError::InvalidBucket(6)));
        assert!(t.get(5).unwrap().is_none());
    }
}
