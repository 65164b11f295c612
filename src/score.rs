//! Defines `Score`, the exact rational score attached to every member.
//!
//! A `Score` is an arbitrary-precision rational number. Unlike an IEEE-754
//! double, it carries decimal input of any length without rounding, so
//! ordering and equality are exact no matter how many fractional digits a
//! caller supplies. All conversions into `Score` happen here, before a value
//! ever reaches a sorted set; the list itself only compares, copies, and adds
//! scores.

use std::fmt;
use std::ops::Add;
use std::str::FromStr;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{pow, Signed, Zero};

use crate::error::Error;

/// An exact rational score.
///
/// Equality, ordering, and addition are lossless. Construction accepts
/// decimal text (with optional sign, fraction, and exponent), `numer/denom`
/// fraction text, finite `f64` values (converted to their exact binary
/// value), and the primitive integer types.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Score(BigRational);

impl Score {
    /// Returns the additive identity.
    pub fn zero() -> Self {
        Score(BigRational::zero())
    }

    /// Converts a finite `f64` into its exact rational value.
    ///
    /// Every finite double is a dyadic rational, so this conversion is
    /// lossless: `from_f64(0.1)` yields the binary value the literal `0.1`
    /// actually denotes, not the decimal 1/10. NaN and the infinities are
    /// rejected with [`Error::InvalidScore`].
    pub fn from_f64(value: f64) -> Result<Self, Error> {
        BigRational::from_float(value)
            .map(Score)
            .ok_or_else(|| Error::InvalidScore(value.to_string()))
    }

    /// Renders the score as fixed-point decimal text with exactly
    /// `precision` fractional digits.
    ///
    /// The rendering is lossless whenever the denominator divides a power of
    /// ten within `precision`; otherwise the last digit is rounded to
    /// nearest, with halves away from zero. The score itself is unaffected.
    /// With `precision` 0 the result is the nearest integer, without a
    /// decimal point.
    pub fn to_decimal(&self, precision: usize) -> String {
        let denom = self.0.denom();
        let magnitude = self.0.numer().abs();
        let scale = pow(BigInt::from(10), precision);
        // floor(m·scale/d + 1/2): rounds the last kept digit half away from
        // zero, carrying into the integer part when the fraction overflows.
        let two = BigInt::from(2);
        let rounded = (&magnitude * &scale * &two + denom) / (denom * &two);
        let int_part = &rounded / &scale;
        let mut out = String::new();
        if self.0.is_negative() {
            out.push('-');
        }
        out.push_str(&int_part.to_string());
        if precision > 0 {
            let frac = &rounded % &scale;
            let digits = frac.to_string();
            out.push('.');
            for _ in digits.len()..precision {
                out.push('0');
            }
            out.push_str(&digits);
        }
        out
    }

    /// Consumes the score and returns the underlying rational.
    pub fn into_ratio(self) -> BigRational {
        self.0
    }

    /// Borrows the underlying rational.
    pub fn as_ratio(&self) -> &BigRational {
        &self.0
    }
}

/// Parses decimal text into a rational, or `None` if malformed.
///
/// Accepted forms mirror what an arbitrary-precision rational parser takes:
/// `"42"`, `"-3.25"`, `"+.5"`, `"12."`, `"6.02e23"`, `"2.5E-3"`, and the
/// fraction form `"numer/denom"`.
fn parse_rational(text: &str) -> Option<BigRational> {
    let text = text.trim();
    if let Some((numer, denom)) = text.split_once('/') {
        let numer = BigInt::from_str(numer).ok()?;
        let denom = BigInt::from_str(denom).ok()?;
        if denom.is_zero() {
            return None;
        }
        return Some(BigRational::new(numer, denom));
    }

    let (mantissa, exponent) = match text.split_once(['e', 'E']) {
        Some((mantissa, exponent)) => (mantissa, exponent.parse::<i32>().ok()?),
        None => (text, 0),
    };
    let (negative, unsigned) = match mantissa.strip_prefix(['+', '-']) {
        Some(stripped) => (mantissa.starts_with('-'), stripped),
        None => (false, mantissa),
    };
    let (int_digits, frac_digits) = match unsigned.split_once('.') {
        Some((int_digits, frac_digits)) => (int_digits, frac_digits),
        None => (unsigned, ""),
    };
    if int_digits.is_empty() && frac_digits.is_empty() {
        return None;
    }
    if !int_digits.chars().all(|c| c.is_ascii_digit())
        || !frac_digits.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }

    let mut numer = BigInt::from_str(&format!("{int_digits}{frac_digits}")).ok()?;
    let mut denom = pow(BigInt::from(10), frac_digits.len());
    if exponent >= 0 {
        numer *= pow(BigInt::from(10), exponent as usize);
    } else {
        denom *= pow(BigInt::from(10), exponent.unsigned_abs() as usize);
    }
    if negative {
        numer = -numer;
    }
    Some(BigRational::new(numer, denom))
}

impl FromStr for Score {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_rational(s)
            .map(Score)
            .ok_or_else(|| Error::InvalidScore(s.to_string()))
    }
}

impl fmt::Display for Score {
    /// Displays the exact rational (`"3/2"`, `"42"`). Use
    /// [`Score::to_decimal`] for fixed-point text.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<BigRational> for Score {
    fn from(ratio: BigRational) -> Self {
        Score(ratio)
    }
}

impl From<i64> for Score {
    fn from(value: i64) -> Self {
        Score(BigRational::from_integer(BigInt::from(value)))
    }
}

impl From<i32> for Score {
    fn from(value: i32) -> Self {
        Score(BigRational::from_integer(BigInt::from(value)))
    }
}

impl From<u64> for Score {
    fn from(value: u64) -> Self {
        Score(BigRational::from_integer(BigInt::from(value)))
    }
}

impl Add for Score {
    type Output = Score;

    fn add(self, rhs: Score) -> Score {
        Score(self.0 + rhs.0)
    }
}

impl Add<&Score> for &Score {
    type Output = Score;

    fn add(self, rhs: &Score) -> Score {
        Score(&self.0 + &rhs.0)
    }
}
