//! Basket
//!
//! The ordered set of collateral backing one basket unit (BU), with each
//! member's quantity in reference units. Token quantities are derived at use
//! time from the collateral's current refPerTok, never cached.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use rtoken_common::{Fix, RTokenResult, TokenId};

/// One member of a basket
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct BasketEntry {
    pub token: TokenId,
    /// Reference units per BU
    pub ref_amt: Fix,
}

/// A committed basket; replaced wholesale, never edited in place
#[derive(
    Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct Basket {
    entries: Vec<BasketEntry>,
    /// Bumped on every successful switch
    pub nonce: u64,
    /// Time of the last successful switch
    pub timestamp: u64,
}

impl Basket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[BasketEntry] {
        &self.entries
    }

    pub fn tokens(&self) -> Vec<TokenId> {
        self.entries.iter().map(|entry| entry.token).collect()
    }

    pub fn ref_amts(&self) -> Vec<Fix> {
        self.entries.iter().map(|entry| entry.ref_amt).collect()
    }

    pub fn contains(&self, token: &TokenId) -> bool {
        self.ref_amt(token).is_some()
    }

    /// Reference units per BU for `token`
    pub fn ref_amt(&self, token: &TokenId) -> Option<Fix> {
        self.entries
            .iter()
            .find(|entry| entry.token == *token)
            .map(|entry| entry.ref_amt)
    }

    /// Adds `ref_amt` for `token`, appending it if new
    pub fn add(&mut self, token: TokenId, ref_amt: Fix) -> RTokenResult<()> {
        match self.entries.iter_mut().find(|entry| entry.token == token) {
            Some(entry) => entry.ref_amt = entry.ref_amt.plus(ref_amt)?,
            None => self.entries.push(BasketEntry { token, ref_amt }),
        }
        Ok(())
    }

    /// Serialize for storage
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }

    /// Deserialize from storage
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }
}
