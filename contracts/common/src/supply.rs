//! RToken Supply
//!
//! Tracks outstanding RToken and how many basket units (BUs) it is owed.
//! Melting burns supply without reducing the baskets owed, so each remaining
//! RToken is backed by more BUs:
//!
//! ```text
//! base_factor    = (supply + melted) / supply      (1 when supply == 0)
//! baskets_needed = supply + melted
//! ```

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::errors::{RTokenError, RTokenResult};
use crate::fixed::{Fix, RoundingMode, FIX_ONE};
use crate::types::TokenId;

/// Supply accounting for the RToken
#[derive(
    Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct RTokenSupply {
    /// RToken's own token identifier
    pub token: TokenId,
    /// Outstanding RToken (raw, 18 decimals)
    pub supply: u128,
    /// Accumulated melt (raw, 18 decimals)
    pub melted: u128,
}

impl RTokenSupply {
    /// Creates an empty supply record
    pub fn new(token: TokenId) -> Self {
        Self { token, supply: 0, melted: 0 }
    }

    /// Basket units owed to holders
    pub fn baskets_needed(&self) -> RTokenResult<Fix> {
        self.supply
            .checked_add(self.melted)
            .map(Fix::from_raw)
            .ok_or(RTokenError::Overflow)
    }

    /// BUs per RToken
    pub fn base_factor(&self) -> RTokenResult<Fix> {
        if self.supply == 0 {
            return Ok(FIX_ONE);
        }
        Fix::ratio(self.baskets_needed()?.raw(), self.supply, RoundingMode::Floor)
    }

    /// Converts an RToken amount to BUs
    pub fn to_bus(&self, amount: u128, rounding: RoundingMode) -> RTokenResult<Fix> {
        if self.supply == 0 {
            return Ok(Fix::from_raw(amount));
        }
        let needed = self.baskets_needed()?;
        Fix::from_raw(amount).mul_div(needed, Fix::from_raw(self.supply), rounding)
    }

    /// Converts BUs to an RToken amount
    pub fn from_bus(&self, baskets: Fix, rounding: RoundingMode) -> RTokenResult<u128> {
        if self.supply == 0 {
            return Ok(baskets.raw());
        }
        let needed = self.baskets_needed()?;
        Ok(baskets.mul_div(Fix::from_raw(self.supply), needed, rounding)?.raw())
    }

    /// Records newly issued RToken
    pub fn record_issue(&mut self, amount: u128) -> RTokenResult<()> {
        self.supply = self.supply.checked_add(amount).ok_or(RTokenError::Overflow)?;
        Ok(())
    }

    /// Records redeemed RToken; the melt share follows the burned supply
    pub fn record_redeem(&mut self, amount: u128, baskets: Fix) -> RTokenResult<()> {
        let needed = self.baskets_needed()?.minus(baskets)?;
        self.supply = self.supply.checked_sub(amount).ok_or(RTokenError::Underflow)?;
        self.melted = needed.raw().checked_sub(self.supply).ok_or(RTokenError::Underflow)?;
        Ok(())
    }

    /// Burns supply while keeping the baskets owed
    pub fn melt(&mut self, amount: u128) -> RTokenResult<()> {
        self.supply = self.supply.checked_sub(amount).ok_or(RTokenError::Underflow)?;
        self.melted = self.melted.checked_add(amount).ok_or(RTokenError::Overflow)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ONE: u128 = 1_000_000_000_000_000_000;

    #[test]
    fn test_zero_supply_factor_is_one() {
        let supply = RTokenSupply::new([7u8; 32]);
        assert_eq!(supply.base_factor().unwrap(), FIX_ONE);
        assert_eq!(supply.to_bus(5 * ONE, RoundingMode::Floor).unwrap(), Fix::from_int(5));
        assert_eq!(supply.from_bus(Fix::from_int(5), RoundingMode::Floor).unwrap(), 5 * ONE);
    }

    #[test]
    fn test_melt_raises_base_factor() {
        let mut supply = RTokenSupply::new([7u8; 32]);
        supply.record_issue(100 * ONE).unwrap();
        supply.melt(20 * ONE).unwrap();

        assert_eq!(supply.supply, 80 * ONE);
        assert_eq!(supply.baskets_needed().unwrap(), Fix::from_int(100));
        assert_eq!(supply.base_factor().unwrap(), Fix::percent(125));
        assert_eq!(supply.to_bus(8 * ONE, RoundingMode::Floor).unwrap(), Fix::from_int(10));
        assert_eq!(supply.from_bus(Fix::from_int(10), RoundingMode::Floor).unwrap(), 8 * ONE);
    }

    #[test]
    fn test_redeem_keeps_factor() {
        let mut supply = RTokenSupply::new([7u8; 32]);
        supply.record_issue(100 * ONE).unwrap();
        supply.melt(20 * ONE).unwrap();

        let baskets = supply.to_bus(40 * ONE, RoundingMode::Floor).unwrap();
        supply.record_redeem(40 * ONE, baskets).unwrap();
        assert_eq!(supply.supply, 40 * ONE);
        assert_eq!(supply.baskets_needed().unwrap(), Fix::from_int(50));
        assert_eq!(supply.base_factor().unwrap(), Fix::percent(125));
    }

    #[test]
    fn test_over_melt_rejected() {
        let mut supply = RTokenSupply::new([7u8; 32]);
        supply.record_issue(ONE).unwrap();
        assert_eq!(supply.melt(2 * ONE), Err(RTokenError::Underflow));
    }

    proptest! {
        #[test]
        fn prop_conversions_never_overstate(
            issued in 1u128..1_000_000_000 * ONE,
            melt_bps in 0u128..5_000,
            amount in 0u128..1_000_000_000 * ONE,
        ) {
            let mut supply = RTokenSupply::new([7u8; 32]);
            supply.record_issue(issued).unwrap();
            supply.melt(issued * melt_bps / 10_000).unwrap();

            let bus = supply.to_bus(amount, RoundingMode::Floor).unwrap();
            let back = supply.from_bus(bus, RoundingMode::Floor).unwrap();
            prop_assert!(back <= amount);

            let baskets = Fix::from_raw(amount);
            let rtoken = supply.from_bus(baskets, RoundingMode::Floor).unwrap();
            let again = supply.to_bus(rtoken, RoundingMode::Floor).unwrap();
            prop_assert!(again <= baskets);

            let owed = supply.to_bus(amount, RoundingMode::Ceil).unwrap();
            prop_assert!(owed >= bus);
        }
    }
}
