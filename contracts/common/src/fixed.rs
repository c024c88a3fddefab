//! Fixed-Point Math
//!
//! Unsigned 18-decimal fixed point with explicit rounding. Every product and
//! quotient is computed through a 256-bit intermediate so that `a * b / c`
//! never overflows before the division, and every result states which way it
//! was rounded.
//!
//! Rounding direction is part of correctness here: amounts owed *to* the
//! protocol round up (`Ceil`), amounts paid *out* round down (`Floor`), and
//! estimates use `Round`.

use borsh::{BorshDeserialize, BorshSerialize};
use core::fmt;
use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::constants::fix::{DECIMALS, MAX_SHIFT, ONE_RAW};
use crate::errors::{RTokenError, RTokenResult};

/// 18-decimal unsigned fixed-point number
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
    BorshSerialize, BorshDeserialize,
)]
pub struct Fix(u128);

/// 0.0
pub const FIX_ZERO: Fix = Fix(0);
/// 1.0
pub const FIX_ONE: Fix = Fix(ONE_RAW);
/// Largest representable value; also the "unbounded" price
pub const FIX_MAX: Fix = Fix(u128::MAX);

/// Direction to round a non-exact result
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize,
    BorshDeserialize,
)]
pub enum RoundingMode {
    /// Toward zero; amounts paid out
    #[default]
    Floor,
    /// To nearest, ties away from zero; estimates
    Round,
    /// Away from zero; amounts owed
    Ceil,
}

/// Computes `a * b / c` rounded per `rounding`
pub fn mul_div(a: u128, b: u128, c: u128, rounding: RoundingMode) -> RTokenResult<u128> {
    if c == 0 {
        return Err(RTokenError::DivisionByZero);
    }
    let divisor = U256::from(c);
    let (quotient, remainder) = (U256::from(a) * U256::from(b)).div_mod(divisor);
    let bump = match rounding {
        RoundingMode::Floor => false,
        RoundingMode::Ceil => !remainder.is_zero(),
        RoundingMode::Round => remainder * U256::from(2u8) >= divisor,
    };
    let result = if bump { quotient + U256::one() } else { quotient };
    to_u128(result)
}

fn to_u128(value: U256) -> RTokenResult<u128> {
    if value.bits() > 128 {
        return Err(RTokenError::Overflow);
    }
    Ok(value.low_u128())
}

fn pow10(exp: u8) -> RTokenResult<u128> {
    if exp > MAX_SHIFT {
        return Err(RTokenError::Overflow);
    }
    10u128.checked_pow(exp as u32).ok_or(RTokenError::Overflow)
}

impl Fix {
    /// Wraps a raw 18-decimal value
    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    /// Raw 18-decimal value
    pub const fn raw(self) -> u128 {
        self.0
    }

    /// Whole number
    pub const fn from_int(n: u64) -> Self {
        Self(n as u128 * ONE_RAW)
    }

    /// `n` percent
    pub const fn percent(n: u64) -> Self {
        Self(n as u128 * (ONE_RAW / 100))
    }

    /// `n` basis points
    pub const fn bps(n: u64) -> Self {
        Self(n as u128 * (ONE_RAW / 10_000))
    }

    /// `num / den` as a fixed-point value
    pub fn ratio(num: u128, den: u128, rounding: RoundingMode) -> RTokenResult<Self> {
        mul_div(num, ONE_RAW, den, rounding).map(Self)
    }

    /// True for 0.0
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Checked addition
    pub fn plus(self, rhs: Fix) -> RTokenResult<Fix> {
        self.0.checked_add(rhs.0).map(Fix).ok_or(RTokenError::Overflow)
    }

    /// Checked subtraction
    pub fn minus(self, rhs: Fix) -> RTokenResult<Fix> {
        self.0.checked_sub(rhs.0).map(Fix).ok_or(RTokenError::Underflow)
    }

    /// Subtraction clamped at zero
    pub fn saturating_minus(self, rhs: Fix) -> Fix {
        Fix(self.0.saturating_sub(rhs.0))
    }

    /// `self * rhs`
    pub fn mul(self, rhs: Fix, rounding: RoundingMode) -> RTokenResult<Fix> {
        mul_div(self.0, rhs.0, ONE_RAW, rounding).map(Fix)
    }

    /// `self / rhs`
    pub fn div(self, rhs: Fix, rounding: RoundingMode) -> RTokenResult<Fix> {
        mul_div(self.0, ONE_RAW, rhs.0, rounding).map(Fix)
    }

    /// `self * num / den` with a single rounding step
    pub fn mul_div(self, num: Fix, den: Fix, rounding: RoundingMode) -> RTokenResult<Fix> {
        mul_div(self.0, num.0, den.0, rounding).map(Fix)
    }

    /// `self * n` for an integer `n`
    pub fn mul_int(self, n: u128) -> RTokenResult<Fix> {
        self.0.checked_mul(n).map(Fix).ok_or(RTokenError::Overflow)
    }

    /// `self / n` for an integer `n`
    pub fn div_int(self, n: u128, rounding: RoundingMode) -> RTokenResult<Fix> {
        mul_div(self.0, 1, n, rounding).map(Fix)
    }

    /// `1 - self`, failing above 1.0
    pub fn one_minus(self) -> RTokenResult<Fix> {
        FIX_ONE.minus(self)
    }

    /// Converts a raw token balance with `decimals` into whole-token units.
    /// Precision finer than 18 decimals is floored.
    pub fn from_amount(amount: u128, decimals: u8) -> RTokenResult<Fix> {
        mul_div(amount, ONE_RAW, pow10(decimals)?, RoundingMode::Floor).map(Fix)
    }

    /// Converts whole-token units into a raw token balance with `decimals`
    pub fn to_amount(self, decimals: u8, rounding: RoundingMode) -> RTokenResult<u128> {
        mul_div(self.0, pow10(decimals)?, ONE_RAW, rounding)
    }
}

impl fmt::Display for Fix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let int = self.0 / ONE_RAW;
        let frac = self.0 % ONE_RAW;
        if frac == 0 {
            return write!(f, "{int}");
        }
        let digits = format!("{:0width$}", frac, width = DECIMALS as usize);
        write!(f, "{int}.{}", digits.trim_end_matches('0'))
    }
}
