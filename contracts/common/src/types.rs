//! Core Types for the RToken Engine
//!
//! Fundamental identifiers and small value types shared by every component.

use borsh::{BorshDeserialize, BorshSerialize};
use core::fmt;
use serde::{Deserialize, Serialize};

use crate::constants::collateral::MAX_TARGET_NAME_LEN;
use crate::fixed::{Fix, FIX_MAX, FIX_ZERO};

/// Type alias for account addresses (32-byte hash)
pub type Address = [u8; 32];

/// Type alias for token identifiers
pub type TokenId = [u8; 32];

/// Type alias for trade identifiers (the trade's escrow address)
pub type TradeId = [u8; 32];

/// First four bytes of an identifier as hex, for log lines
pub fn short_hex(id: &[u8; 32]) -> String {
    id[..4].iter().map(|b| format!("{b:02x}")).collect()
}

// ============ Target Names ============

/// The economic peg a collateral tracks (e.g. `USD`, `ETH`)
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, BorshSerialize,
    BorshDeserialize,
)]
pub struct TargetName([u8; MAX_TARGET_NAME_LEN]);

impl TargetName {
    /// Creates a target name from a short ASCII label, truncating past 32 bytes
    pub fn new(label: &str) -> Self {
        let mut bytes = [0u8; MAX_TARGET_NAME_LEN];
        let src = label.as_bytes();
        let len = src.len().min(MAX_TARGET_NAME_LEN);
        bytes[..len].copy_from_slice(&src[..len]);
        Self(bytes)
    }

    /// Label without the zero padding
    pub fn as_str(&self) -> &str {
        let end = self.0.iter().position(|b| *b == 0).unwrap_or(MAX_TARGET_NAME_LEN);
        core::str::from_utf8(&self.0[..end]).unwrap_or("")
    }

    /// True when no label was given
    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }
}

impl fmt::Debug for TargetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TargetName({})", self.as_str())
    }
}

impl fmt::Display for TargetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============ Collateral Status ============

/// Health of a collateral; ordered from best to worst
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
    BorshSerialize, BorshDeserialize,
)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum CollateralStatus {
    /// Operating normally
    #[default]
    Sound = 0,
    /// Soft default; may recover within the grace window
    Iffy = 1,
    /// Defaulted; terminal
    Disabled = 2,
}

impl CollateralStatus {
    /// The worse of two statuses
    pub fn worst(self, other: Self) -> Self {
        self.max(other)
    }
}

// ============ Prices ============

/// Price range of one whole token in the unit of account
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct Price {
    /// Lower bound
    pub low: Fix,
    /// Upper bound
    pub high: Fix,
}

impl Price {
    /// The "no information" price
    pub const UNPRICED: Price = Price { low: FIX_ZERO, high: FIX_MAX };

    /// Creates a price range
    pub fn new(low: Fix, high: Fix) -> Self {
        Self { low, high }
    }

    /// True when neither bound carries information
    pub fn is_unpriced(&self) -> bool {
        self.low == FIX_ZERO && self.high == FIX_MAX
    }

    /// True when the low bound can be used to value a sale
    pub fn has_low(&self) -> bool {
        self.low > FIX_ZERO
    }

    /// True when the high bound can be used to value a purchase
    pub fn has_high(&self) -> bool {
        self.high < FIX_MAX && self.high > FIX_ZERO
    }
}

// ============ Trades ============

/// Lifecycle of a trade
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize,
    BorshDeserialize,
)]
pub enum TradeStatus {
    /// Auction running or awaiting settlement
    #[default]
    Open,
    /// Settled; proceeds disbursed
    Closed,
}

/// Auction mechanism backing a trade
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize,
    BorshDeserialize,
)]
pub enum TradeKind {
    /// Sealed-bid batch auction cleared at a uniform rate
    #[default]
    Batch,
    /// Descending-price auction; first bidder takes the lot
    Dutch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_name() {
        let usd = TargetName::new("USD");
        assert_eq!(usd.as_str(), "USD");
        assert_eq!(usd.to_string(), "USD");
        assert!(!usd.is_empty());
        assert_ne!(usd, TargetName::new("ETH"));
        assert!(TargetName::new("").is_empty());
    }

    #[test]
    fn test_status_ordering() {
        use CollateralStatus::*;
        assert!(Sound < Iffy && Iffy < Disabled);
        assert_eq!(Sound.worst(Iffy), Iffy);
        assert_eq!(Disabled.worst(Iffy), Disabled);
    }

    #[test]
    fn test_unpriced() {
        assert!(Price::UNPRICED.is_unpriced());
        assert!(!Price::UNPRICED.has_low());
        assert!(!Price::UNPRICED.has_high());
    }

    #[test]
    fn test_short_hex() {
        let mut id = [0u8; 32];
        id[0] = 0xab;
        id[3] = 0x01;
        assert_eq!(short_hex(&id), "ab000001");
    }
}
