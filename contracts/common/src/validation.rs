//! Validation Helpers
//!
//! Reusable guard clauses for configuration setters and entry points.
//!
//! ```rust,ignore
//! use rtoken_common::check;
//!
//! check!(amount > 0, RTokenError::ZeroAmount);
//! ```

use std::collections::BTreeSet;

use crate::errors::{RTokenError, RTokenResult};
use crate::fixed::Fix;
use crate::types::TokenId;

// ============ Validation Macro ============

/// Check a condition and return an error if it fails.
///
/// ```rust,ignore
/// check!(
///     sell != buy,
///     RTokenError::SameToken { token: sell }
/// );
/// ```
#[macro_export]
macro_rules! check {
    ($condition:expr, $error:expr) => {
        if !($condition) {
            return Err($error);
        }
    };
}

pub use check;

// ============ Parameter Checks ============

/// Validates `value <= max` for a time parameter
pub fn require_max_u64(value: u64, max: u64, param: &'static str) -> RTokenResult<()> {
    check!(
        value <= max,
        RTokenError::InvalidParameter { param, reason: "above maximum" }
    );
    Ok(())
}

/// Validates `min <= value <= max` for a time parameter
pub fn require_range_u64(value: u64, min: u64, max: u64, param: &'static str) -> RTokenResult<()> {
    check!(
        value >= min,
        RTokenError::InvalidParameter { param, reason: "below minimum" }
    );
    require_max_u64(value, max, param)
}

/// Validates a fixed-point parameter against an inclusive maximum
pub fn require_max_fix(value: Fix, max_raw: u128, param: &'static str) -> RTokenResult<()> {
    check!(
        value.raw() <= max_raw,
        RTokenError::InvalidParameter { param, reason: "above maximum" }
    );
    Ok(())
}

/// Validates a fixed-point parameter against an exclusive maximum
pub fn require_below_fix(value: Fix, max_raw: u128, param: &'static str) -> RTokenResult<()> {
    check!(
        value.raw() < max_raw,
        RTokenError::InvalidParameter { param, reason: "must be below maximum" }
    );
    Ok(())
}

/// Validates a strictly positive fixed-point parameter
pub fn require_positive_fix(value: Fix, param: &'static str) -> RTokenResult<()> {
    check!(
        !value.is_zero(),
        RTokenError::InvalidParameter { param, reason: "must be positive" }
    );
    Ok(())
}

/// Validates a non-zero amount
pub fn require_nonzero(amount: u128) -> RTokenResult<()> {
    check!(amount > 0, RTokenError::ZeroAmount);
    Ok(())
}

/// Validates that no token appears twice
pub fn require_unique(tokens: &[TokenId]) -> RTokenResult<()> {
    let mut seen = BTreeSet::new();
    for token in tokens {
        check!(seen.insert(*token), RTokenError::DuplicateToken { token: *token });
    }
    Ok(())
}

/// Validates two parallel inputs have equal length
pub fn require_same_len(left: usize, right: usize) -> RTokenResult<()> {
    check!(left == right, RTokenError::LengthMismatch { left, right });
    Ok(())
}
