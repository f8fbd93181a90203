//! # Amounts
//!
//! Two fixed-point currencies flow through the registrar and they must never
//! be mixed: prices are configured in a **reference** currency (USD-like, 18
//! decimals) and paid in the **native** token (18 decimals). Each is a
//! distinct `u128` newtype so the compiler refuses `usd + native`.
//!
//! All arithmetic is checked. No floats anywhere near money.
//!
//! ## Serialization
//!
//! Human-readable formats (JSON, TOML) carry the raw base-unit value as a
//! string of digits, since most JSON tooling silently truncates integers
//! above 2^53. Binary formats (bincode snapshots) store the raw `u128`.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::{NATIVE_DECIMALS, NATIVE_UNIT, REFERENCE_DECIMALS, REFERENCE_UNIT};

/// Failure to parse a decimal amount string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountParseError {
    #[error("empty amount")]
    Empty,

    #[error("invalid digit in amount: {0}")]
    InvalidDigit(String),

    #[error("too many fractional digits: at most {max} allowed")]
    TooPrecise { max: u32 },

    #[error("amount overflows u128")]
    Overflow,
}

macro_rules! fixed_point_amount {
    ($(#[$meta:meta])* $name:ident, $decimals:expr, $unit:expr, $symbol:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(u128);

        impl $name {
            /// Zero.
            pub const ZERO: Self = Self(0);

            /// Number of fractional decimal digits.
            pub const DECIMALS: u32 = $decimals;

            /// Wraps a raw base-unit value.
            pub const fn from_raw(raw: u128) -> Self {
                Self(raw)
            }

            /// Whole units, e.g. `from_units(10)` is ten full units.
            /// Returns `None` on overflow.
            pub fn from_units(units: u128) -> Option<Self> {
                units.checked_mul($unit).map(Self)
            }

            /// The raw base-unit value.
            pub const fn raw(self) -> u128 {
                self.0
            }

            pub fn is_zero(self) -> bool {
                self.0 == 0
            }

            pub fn checked_add(self, other: Self) -> Option<Self> {
                self.0.checked_add(other.0).map(Self)
            }

            pub fn checked_sub(self, other: Self) -> Option<Self> {
                self.0.checked_sub(other.0).map(Self)
            }

            pub fn saturating_sub(self, other: Self) -> Self {
                Self(self.0.saturating_sub(other.0))
            }

            /// `self * numerator / denominator`, multiplying first so that
            /// proration truncates once instead of twice.
            pub fn mul_div(self, numerator: u128, denominator: u128) -> Option<Self> {
                if denominator == 0 {
                    return None;
                }
                self.0
                    .checked_mul(numerator)
                    .map(|product| Self(product / denominator))
            }

            /// Renders the amount with its full decimal expansion, trailing
            /// zeros trimmed (`"2.5"`, `"13"`).
            pub fn to_decimal_string(self) -> String {
                let whole = self.0 / $unit;
                let frac = self.0 % $unit;
                if frac == 0 {
                    return whole.to_string();
                }
                let frac_str = format!("{:0>width$}", frac, width = $decimals as usize);
                format!("{}.{}", whole, frac_str.trim_end_matches('0'))
            }

            /// Parses `"12"`, `"12.5"` or `"0.000000000000000001"` into base
            /// units. Rejects more fractional digits than the currency has.
            pub fn parse_decimal(s: &str) -> Result<Self, AmountParseError> {
                parse_fixed_point(s, $decimals).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{} {}", self.to_decimal_string(), $symbol)
            }
        }

        impl FromStr for $name {
            type Err = AmountParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse_decimal(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                if serializer.is_human_readable() {
                    serializer.collect_str(&self.0)
                } else {
                    serializer.serialize_u128(self.0)
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                if deserializer.is_human_readable() {
                    deserializer.deserialize_any(RawAmountVisitor).map(Self)
                } else {
                    u128::deserialize(deserializer).map(Self)
                }
            }
        }
    };
}

fixed_point_amount!(
    /// An amount of the reference (pricing) currency, in base units of
    /// `10^-18`. Tier prices and auction premiums are configured in this.
    ReferenceAmount,
    REFERENCE_DECIMALS,
    REFERENCE_UNIT,
    "REF"
);

fixed_point_amount!(
    /// An amount of the native payment token, in base units of `10^-18`.
    /// Everything a caller actually pays or gets refunded is in this.
    NativeAmount,
    NATIVE_DECIMALS,
    NATIVE_UNIT,
    "NOM"
);

/// Accepts a raw base-unit integer either as a JSON number or as a decimal
/// digit string.
struct RawAmountVisitor;

impl<'de> Visitor<'de> for RawAmountVisitor {
    type Value = u128;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a non-negative integer or a string of digits")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
        Ok(v as u128)
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<u128, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<u128, E> {
        u128::try_from(v).map_err(|_| E::custom("amount must not be negative"))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
        v.parse::<u128>().map_err(E::custom)
    }
}

fn parse_fixed_point(s: &str, decimals: u32) -> Result<u128, AmountParseError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(AmountParseError::Empty);
    }
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if frac.len() > decimals as usize {
        return Err(AmountParseError::TooPrecise { max: decimals });
    }
    let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
    if !all_digits(whole) || !all_digits(frac) || (whole.is_empty() && frac.is_empty()) {
        return Err(AmountParseError::InvalidDigit(s.to_string()));
    }

    let unit = 10u128.pow(decimals);
    let whole_value = if whole.is_empty() {
        0
    } else {
        whole.parse::<u128>().map_err(|_| AmountParseError::Overflow)?
    };
    let frac_value = if frac.is_empty() {
        0
    } else {
        let padded = format!("{:0<width$}", frac, width = decimals as usize);
        padded.parse::<u128>().map_err(|_| AmountParseError::Overflow)?
    };

    whole_value
        .checked_mul(unit)
        .and_then(|w| w.checked_add(frac_value))
        .ok_or(AmountParseError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_units() {
        let ten = ReferenceAmount::from_units(10).unwrap();
        assert_eq!(ten.raw(), 10 * REFERENCE_UNIT);
        assert!(ReferenceAmount::from_units(u128::MAX).is_none());
    }

    #[test]
    fn test_decimal_string() {
        let half = NativeAmount::from_raw(NATIVE_UNIT * 5 / 2);
        assert_eq!(half.to_decimal_string(), "2.5");
        assert_eq!(NativeAmount::from_units(13).unwrap().to_decimal_string(), "13");
        assert_eq!(NativeAmount::from_raw(1).to_decimal_string(), "0.000000000000000001");
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(
            ReferenceAmount::parse_decimal("12.5").unwrap().raw(),
            12 * REFERENCE_UNIT + REFERENCE_UNIT / 2
        );
        assert_eq!(ReferenceAmount::parse_decimal(".5").unwrap().raw(), REFERENCE_UNIT / 2);
        assert_eq!(
            ReferenceAmount::parse_decimal(""),
            Err(AmountParseError::Empty)
        );
        assert!(matches!(
            ReferenceAmount::parse_decimal("1.0000000000000000001"),
            Err(AmountParseError::TooPrecise { .. })
        ));
        assert!(matches!(
            ReferenceAmount::parse_decimal("1,5"),
            Err(AmountParseError::InvalidDigit(_))
        ));
    }

    #[test]
    fn test_mul_div_multiplies_first() {
        // 10 * 1 / 3 would be 3 if divided first on whole units; base units
        // keep the precision.
        let ten = ReferenceAmount::from_units(10).unwrap();
        let third = ten.mul_div(1, 3).unwrap();
        assert_eq!(third.raw(), 10 * REFERENCE_UNIT / 3);
        assert!(ten.mul_div(1, 0).is_none());
    }

    #[test]
    fn test_json_uses_strings() {
        let amount = NativeAmount::from_units(20).unwrap();
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "\"20000000000000000000\"");
        let back: NativeAmount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, amount);
        let from_number: NativeAmount = serde_json::from_str("42").unwrap();
        assert_eq!(from_number.raw(), 42);
    }

    #[test]
    fn test_bincode_uses_raw_integer() {
        let amount = ReferenceAmount::from_raw(u128::MAX);
        let bytes = bincode::serialize(&amount).unwrap();
        assert_eq!(bytes.len(), 16);
        let back: ReferenceAmount = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, amount);
    }
}
