//! Token Ledger
//!
//! Balances of every token the engine touches, keyed by token and account.
//! This is the engine's view of the external token contracts: every debit is
//! checked, so a transfer can never drive a balance negative.

use std::collections::BTreeMap;

use crate::errors::{RTokenError, RTokenResult};
use crate::types::{Address, TokenId};
use crate::check;

/// Raw balances per token per account
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    balances: BTreeMap<TokenId, BTreeMap<Address, u128>>,
    supplies: BTreeMap<TokenId, u128>,
}

impl Ledger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of `account` in `token`
    pub fn balance_of(&self, token: &TokenId, account: &Address) -> u128 {
        self.balances
            .get(token)
            .and_then(|accounts| accounts.get(account))
            .copied()
            .unwrap_or(0)
    }

    /// Total supply tracked for `token`
    pub fn total_supply(&self, token: &TokenId) -> u128 {
        self.supplies.get(token).copied().unwrap_or(0)
    }

    /// Move `amount` of `token` between accounts
    pub fn transfer(
        &mut self,
        token: &TokenId,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> RTokenResult<()> {
        if amount == 0 || from == to {
            return Ok(());
        }
        self.debit(token, from, amount)?;
        self.credit(token, to, amount)
    }

    /// Create `amount` of `token` for `to`
    pub fn mint(&mut self, token: &TokenId, to: &Address, amount: u128) -> RTokenResult<()> {
        let supply = self.supplies.entry(*token).or_insert(0);
        *supply = supply.checked_add(amount).ok_or(RTokenError::Overflow)?;
        self.credit(token, to, amount)
    }

    /// Destroy `amount` of `token` held by `from`
    pub fn burn(&mut self, token: &TokenId, from: &Address, amount: u128) -> RTokenResult<()> {
        self.debit(token, from, amount)?;
        let supply = self.supplies.entry(*token).or_insert(0);
        *supply = supply.checked_sub(amount).ok_or(RTokenError::Underflow)?;
        Ok(())
    }

    fn debit(&mut self, token: &TokenId, from: &Address, amount: u128) -> RTokenResult<()> {
        let available = self.balance_of(token, from);
        check!(
            available >= amount,
            RTokenError::InsufficientBalance { token: *token, available, requested: amount }
        );
        let accounts = self.balances.entry(*token).or_default();
        accounts.insert(*from, available - amount);
        Ok(())
    }

    fn credit(&mut self, token: &TokenId, to: &Address, amount: u128) -> RTokenResult<()> {
        let accounts = self.balances.entry(*token).or_default();
        let balance = accounts.entry(*to).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(RTokenError::Overflow)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: TokenId = [1u8; 32];
    const ALICE: Address = [2u8; 32];
    const BOB: Address = [3u8; 32];

    #[test]
    fn test_mint_transfer_burn() {
        let mut ledger = Ledger::new();
        ledger.mint(&TOKEN, &ALICE, 1_000).unwrap();
        ledger.transfer(&TOKEN, &ALICE, &BOB, 400).unwrap();

        assert_eq!(ledger.balance_of(&TOKEN, &ALICE), 600);
        assert_eq!(ledger.balance_of(&TOKEN, &BOB), 400);
        assert_eq!(ledger.total_supply(&TOKEN), 1_000);

        ledger.burn(&TOKEN, &BOB, 400).unwrap();
        assert_eq!(ledger.balance_of(&TOKEN, &BOB), 0);
        assert_eq!(ledger.total_supply(&TOKEN), 600);
    }

    #[test]
    fn test_overdraft_rejected_without_side_effects() {
        let mut ledger = Ledger::new();
        ledger.mint(&TOKEN, &ALICE, 100).unwrap();
        let before = ledger.clone();

        let result = ledger.transfer(&TOKEN, &ALICE, &BOB, 101);
        assert_eq!(
            result,
            Err(RTokenError::InsufficientBalance { token: TOKEN, available: 100, requested: 101 })
        );
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_self_transfer_is_noop() {
        let mut ledger = Ledger::new();
        ledger.mint(&TOKEN, &ALICE, 5).unwrap();
        ledger.transfer(&TOKEN, &ALICE, &ALICE, 5).unwrap();
        assert_eq!(ledger.balance_of(&TOKEN, &ALICE), 5);
    }
}
