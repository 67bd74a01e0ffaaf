//! Arbitrary-precision base-10 fixed-point numbers.
//!
//! A value is `coefficient * 10^exponent` with a `BigInt` coefficient.
//! Results are normalized (no trailing zeros in the coefficient) so equality,
//! ordering, and hashing agree. Division truncates toward zero at
//! [`DIV_PRECISION`] fractional digits beyond the operand scales.

use std::{
    cmp::Ordering,
    fmt::{self, Display},
    hash::{Hash, Hasher},
    str::FromStr,
};

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

/// Extra fractional digits produced by division before truncation.
const DIV_PRECISION: u32 = 28;

/// An arbitrary-precision decimal number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decimal {
    coefficient: BigInt,
    exponent: i32,
}

impl Decimal {
    #[must_use]
    pub fn new(coefficient: BigInt, exponent: i32) -> Self {
        let mut d = Self { coefficient, exponent };
        d.normalize();
        d
    }

    #[must_use]
    pub fn zero() -> Self {
        Self {
            coefficient: BigInt::zero(),
            exponent: 0,
        }
    }

    #[must_use]
    pub fn from_i64(value: i64) -> Self {
        Self::new(BigInt::from(value), 0)
    }

    #[must_use]
    pub fn from_u64(value: u64) -> Self {
        Self::new(BigInt::from(value), 0)
    }

    /// Converts through the shortest decimal rendering of the float, so
    /// `decimal(0.1)` is exactly `0.1`.
    #[must_use]
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let mut buffer = ryu::Buffer::new();
        Self::from_str(buffer.format(value)).ok()
    }

    pub fn is_zero(&self) -> bool {
        self.coefficient.is_zero()
    }

    fn normalize(&mut self) {
        if self.coefficient.is_zero() {
            self.exponent = 0;
            return;
        }
        let ten = BigInt::from(10);
        loop {
            let (quotient, remainder) = self.coefficient.div_rem(&ten);
            if !remainder.is_zero() {
                break;
            }
            self.coefficient = quotient;
            self.exponent += 1;
        }
    }

    /// Rescales both operands to the smaller exponent so coefficients are
    /// directly comparable.
    fn aligned(&self, other: &Self) -> (BigInt, BigInt) {
        let exponent = self.exponent.min(other.exponent);
        let lhs = scale_up(&self.coefficient, self.exponent - exponent);
        let rhs = scale_up(&other.coefficient, other.exponent - exponent);
        (lhs, rhs)
    }

    #[must_use]
    pub fn add(&self, other: &Self) -> Self {
        let exponent = self.exponent.min(other.exponent);
        let (lhs, rhs) = self.aligned(other);
        Self::new(lhs + rhs, exponent)
    }

    #[must_use]
    pub fn sub(&self, other: &Self) -> Self {
        let exponent = self.exponent.min(other.exponent);
        let (lhs, rhs) = self.aligned(other);
        Self::new(lhs - rhs, exponent)
    }

    #[must_use]
    pub fn mul(&self, other: &Self) -> Self {
        Self::new(
            &self.coefficient * &other.coefficient,
            self.exponent.saturating_add(other.exponent),
        )
    }

    /// Division truncated toward zero; `None` when `other` is zero.
    #[must_use]
    pub fn div(&self, other: &Self) -> Option<Self> {
        if other.coefficient.is_zero() {
            return None;
        }
        let scaled = scale_up(&self.coefficient, i32::try_from(DIV_PRECISION).unwrap_or(i32::MAX));
        let quotient = scaled / &other.coefficient;
        Some(Self::new(
            quotient,
            self.exponent - other.exponent - DIV_PRECISION as i32,
        ))
    }

    /// Remainder with the sign of the dividend; `None` when `other` is zero.
    #[must_use]
    pub fn rem(&self, other: &Self) -> Option<Self> {
        if other.coefficient.is_zero() {
            return None;
        }
        let exponent = self.exponent.min(other.exponent);
        let (lhs, rhs) = self.aligned(other);
        Some(Self::new(lhs % rhs, exponent))
    }

    #[must_use]
    pub fn neg(&self) -> Self {
        Self {
            coefficient: -&self.coefficient,
            exponent: self.exponent,
        }
    }

    /// Approximate conversion for widening comparisons against floats.
    #[must_use]
    pub fn to_f64(&self) -> f64 {
        self.coefficient.to_f64().unwrap_or(f64::NAN) * 10f64.powi(self.exponent)
    }

    #[must_use]
    pub fn to_i64(&self) -> Option<i64> {
        if self.exponent < 0 {
            return None;
        }
        scale_up(&self.coefficient, self.exponent).to_i64()
    }
}

fn scale_up(coefficient: &BigInt, digits: i32) -> BigInt {
    if digits <= 0 {
        return coefficient.clone();
    }
    coefficient * BigInt::from(10).pow(digits as u32)
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        // Normalized representations are canonical.
        self.exponent == other.exponent && self.coefficient == other.coefficient
    }
}

impl Eq for Decimal {}

impl Hash for Decimal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.coefficient.hash(state);
        self.exponent.hash(state);
    }
}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        let (lhs, rhs) = self.aligned(other);
        lhs.cmp(&rhs)
    }
}

/// Parse failure for decimal literals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDecimalError;

impl Display for ParseDecimalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid decimal literal")
    }
}

impl std::error::Error for ParseDecimalError {}

impl FromStr for Decimal {
    type Err = ParseDecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseDecimalError);
        }
        let (sign, digits) = match s.as_bytes()[0] {
            b'+' => (1, &s[1..]),
            b'-' => (-1, &s[1..]),
            _ => (1, s),
        };
        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(ParseDecimalError);
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit()) || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseDecimalError);
        }
        let mut combined = String::with_capacity(int_part.len() + frac_part.len());
        combined.push_str(int_part);
        combined.push_str(frac_part);
        let coefficient = if combined.is_empty() {
            BigInt::zero()
        } else {
            BigInt::from_str(&combined).map_err(|_| ParseDecimalError)?
        };
        let exponent = -(i32::try_from(frac_part.len()).map_err(|_| ParseDecimalError)?);
        Ok(Self::new(BigInt::from(sign) * coefficient, exponent))
    }
}

impl Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exponent >= 0 {
            let scaled = scale_up(&self.coefficient, self.exponent);
            return write!(f, "{scaled}");
        }
        let digits = self.coefficient.abs().to_string();
        let frac_len = self.exponent.unsigned_abs() as usize;
        let sign = if self.coefficient.is_negative() { "-" } else { "" };
        if digits.len() > frac_len {
            let split = digits.len() - frac_len;
            write!(f, "{sign}{}.{}", &digits[..split], &digits[split..])
        } else {
            write!(f, "{sign}0.{}{}", "0".repeat(frac_len - digits.len()), digits)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn parse_and_display_round_trip() {
        for text in ["0", "1", "-1", "1.5", "-0.25", "12.345"] {
            assert_eq!(dec(text).to_string(), text);
        }
    }

    #[test]
    fn trailing_zeros_normalize() {
        assert_eq!(dec("1.50"), dec("1.5"));
        assert_eq!(dec("1.50").to_string(), "1.5");
        assert_eq!(dec("100").to_string(), "100");
    }

    #[test]
    fn arithmetic() {
        assert_eq!(dec("1.5").add(&dec("2.25")), dec("3.75"));
        assert_eq!(dec("1").sub(&dec("0.75")), dec("0.25"));
        assert_eq!(dec("1.5").mul(&dec("2")), dec("3"));
        assert_eq!(dec("1").div(&dec("4")).unwrap(), dec("0.25"));
        assert_eq!(dec("7").rem(&dec("4")).unwrap(), dec("3"));
        assert!(dec("1").div(&Decimal::zero()).is_none());
    }

    #[test]
    fn ordering_aligns_exponents() {
        assert!(dec("0.5") < dec("0.75"));
        assert!(dec("-2") < dec("0.1"));
        assert_eq!(dec("2.0").cmp(&dec("2")), Ordering::Equal);
    }

    #[test]
    fn float_round_trips_through_shortest_form() {
        assert_eq!(Decimal::from_f64(0.1).unwrap(), dec("0.1"));
        assert!(Decimal::from_f64(f64::NAN).is_none());
    }
}
