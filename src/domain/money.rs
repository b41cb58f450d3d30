use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use std::str::FromStr;

use bigdecimal::{BigDecimal, Zero};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// An exact decimal amount.
///
/// Amounts never pass through a binary float. On the wire they are always a
/// decimal string such as `"1499.99"`; JSON numbers are rejected.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Money(BigDecimal);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid money amount '{0}'")]
pub struct InvalidMoney(pub String);

impl Money {
    pub fn zero() -> Self {
        Money(BigDecimal::zero())
    }

    pub fn is_negative(&self) -> bool {
        self.0 < BigDecimal::zero()
    }

    /// `self * quantity`, used for order line totals.
    pub fn times(&self, quantity: i32) -> Money {
        Money(&self.0 * BigDecimal::from(quantity))
    }

    pub fn as_decimal(&self) -> &BigDecimal {
        &self.0
    }

    pub fn into_decimal(self) -> BigDecimal {
        self.0
    }
}

impl From<BigDecimal> for Money {
    fn from(value: BigDecimal) -> Self {
        Money(value)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::zero(), Add::add)
    }
}

impl FromStr for Money {
    type Err = InvalidMoney;

    /// Accepts plain decimal notation only: an optional `-`, digits, and an
    /// optional fractional part. Exponents, `NaN` and blanks are refused.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix('-').unwrap_or(s);
        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (digits, None),
        };
        let well_formed = !int_part.is_empty()
            && int_part.bytes().all(|b| b.is_ascii_digit())
            && frac_part.map_or(true, |f| !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()));
        if !well_formed {
            return Err(InvalidMoney(s.to_string()));
        }
        BigDecimal::from_str(s)
            .map(Money)
            .map_err(|_| InvalidMoney(s.to_string()))
    }
}

impl fmt::Display for Money {
    /// Always plain notation; `BigDecimal`'s own `Display` switches to
    /// exponents for small magnitudes, which `from_str` refuses.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_plain_string())
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Money::from_str(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn money(s: &str) -> Money {
        Money::from_str(s).expect("valid money")
    }

    #[test]
    fn parses_plain_decimals() {
        assert_eq!(money("1499.99").to_string(), "1499.99");
        assert_eq!(money("0").to_string(), "0");
        assert!(money("-3.50").is_negative());
    }

    #[test]
    fn rejects_non_decimal_notation() {
        for bad in ["", " ", "1e3", "NaN", "12.", ".5", "1,50", "+1", "--1", "1.2.3"] {
            assert!(Money::from_str(bad).is_err(), "'{bad}' should be rejected");
        }
    }

    #[test]
    fn equality_is_numeric_and_exact() {
        assert_eq!(money("24.00"), money("24"));
        assert_ne!(money("24.00"), money("23.99"));
        assert_ne!(money("24.00"), money("24.001"));
        assert_ne!(money("24.00"), money("23.9999999"));
    }

    #[test]
    fn line_totals_sum_without_rounding() {
        let total: Money = [money("10.50").times(2), money("3.00").times(1)]
            .into_iter()
            .sum();
        assert_eq!(total.to_string(), "24.00");

        let total: Money = std::iter::repeat(money("0.10")).take(10).sum();
        assert_eq!(total, money("1"));
    }

    #[test]
    fn serializes_as_json_string() {
        let json = serde_json::to_string(&money("1499.99")).expect("serialize");
        assert_eq!(json, "\"1499.99\"");
    }

    #[test]
    fn json_numbers_are_rejected() {
        assert!(serde_json::from_str::<Money>("1499.99").is_err());
        assert!(serde_json::from_str::<Money>("\"1499.99\"").is_ok());
    }

    #[test]
    fn random_fixtures_survive_the_wire_unchanged() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            // Half the fixtures are below one, often with many leading
            // fractional zeros.
            let units: u64 = if rng.gen_bool(0.5) { 0 } else { rng.gen_range(0..10_000_000_000) };
            let scale: usize = rng.gen_range(0..=12);
            let significant: u32 = rng.gen_range(0..=scale as u32);
            let fraction: u64 = rng.gen_range(0..10u64.pow(significant));
            let text = if scale == 0 {
                units.to_string()
            } else {
                format!("{units}.{fraction:0scale$}")
            };

            let original = money(&text);
            let json = serde_json::to_string(&original).expect("serialize");
            let decoded: Money = serde_json::from_str(&json).expect("deserialize");

            assert_eq!(decoded, original, "fixture {text}");
            assert_eq!(decoded.to_string(), text, "fixture {text}");
        }
    }

    #[test]
    fn tiny_amounts_stay_in_plain_notation() {
        for text in ["0.0000001", "0.000000000001", "-0.00000005", "100000000000000000000.5"] {
            let original = money(text);
            assert_eq!(original.to_string(), text);

            let json = serde_json::to_string(&original).expect("serialize");
            assert_eq!(json, format!("\"{text}\""));
            let decoded: Money = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(decoded, original, "fixture {text}");
        }
    }
}
