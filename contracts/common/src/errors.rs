//! Error Types for the RToken Engine
//!
//! Typed errors grouped by component. Oracle faults never appear here:
//! they are folded into collateral status. An unfillable basket is a state,
//! not an error. Everything below aborts the operation that raised it.

use thiserror::Error;

use crate::types::{Address, TokenId, TradeId};

/// Result type alias for RToken operations
pub type RTokenResult<T> = Result<T, RTokenError>;

/// Main error enum for all engine errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RTokenError {
    // ============ Registry Errors ============
    /// Token has no registered asset
    #[error("asset not registered: {token:?}")]
    AssetNotRegistered { token: TokenId },

    /// Token already has a registered asset
    #[error("asset already registered: {token:?}")]
    AssetAlreadyRegistered { token: TokenId },

    /// Registered asset is not collateral
    #[error("asset is not collateral: {token:?}")]
    NotCollateral { token: TokenId },

    /// Registry is at capacity
    #[error("registry full: {count} assets (max {max})")]
    RegistryFull { count: usize, max: usize },

    // ============ Basket Errors ============
    /// No valid basket can be set
    #[error("basket disabled")]
    BasketDisabled,

    /// Basket is not SOUND or still warming up
    #[error("basket not ready")]
    BasketNotReady,

    /// Basket configuration is empty
    #[error("empty basket")]
    EmptyBasket,

    /// Token appears twice in one configuration
    #[error("duplicate token: {token:?}")]
    DuplicateToken { token: TokenId },

    /// Configuration exceeds a size bound
    #[error("too many tokens: {count} (max {max})")]
    TooManyTokens { count: usize, max: usize },

    /// Two parallel inputs differ in length
    #[error("length mismatch: {left} != {right}")]
    LengthMismatch { left: usize, right: usize },

    /// Operation requires full collateralization
    #[error("not fully collateralized")]
    NotFullyCollateralized,

    // ============ Trading Errors ============
    /// Trading delay since the last basket change has not elapsed
    #[error("trading delayed until {until}")]
    TradingDelayed { until: u64 },

    /// A trade for this sell token is already open
    #[error("trade already open for {sell:?}")]
    TradeAlreadyOpen { sell: TokenId },

    /// Trade not found
    #[error("trade not found: {trade_id:?}")]
    TradeNotFound { trade_id: TradeId },

    /// Trade is not in the state the operation expects
    #[error("trade not open: {trade_id:?}")]
    TradeNotOpen { trade_id: TradeId },

    #[error("no open trade selling {sell:?}")]
    NoOpenTrade { sell: TokenId },

    /// Auction window has not elapsed
    #[error("auction ends at {ends_at}")]
    AuctionNotOver { ends_at: u64 },

    /// Auction window has elapsed
    #[error("auction ended at {ended_at}")]
    AuctionOver { ended_at: u64 },

    /// Bid is worse than the auction allows
    #[error("bid too low: offered {offered}, required {required}")]
    BidTooLow { offered: u128, required: u128 },

    /// Operation does not apply to this auction kind
    #[error("wrong auction kind")]
    WrongAuctionKind,

    /// Sell and buy tokens must differ
    #[error("cannot trade a token for itself: {token:?}")]
    SameToken { token: TokenId },

    /// Broker is not accepting new trades
    #[error("broker disabled")]
    BrokerDisabled,

    /// Asset has no usable price
    #[error("asset unpriced: {token:?}")]
    UnpricedAsset { token: TokenId },

    // ============ Amount Errors ============
    /// Zero amount not allowed
    #[error("zero amount")]
    ZeroAmount,

    /// Account balance too small for a debit
    #[error("insufficient balance of {token:?}: available {available}, requested {requested}")]
    InsufficientBalance {
        token: TokenId,
        available: u128,
        requested: u128,
    },

    // ============ Math Errors ============
    /// Arithmetic overflow occurred
    #[error("arithmetic overflow")]
    Overflow,

    /// Arithmetic underflow occurred
    #[error("arithmetic underflow")]
    Underflow,

    /// Division by zero
    #[error("division by zero")]
    DivisionByZero,

    // ============ Input Validation Errors ============
    /// Invalid parameter value
    #[error("invalid parameter {param}: {reason}")]
    InvalidParameter {
        param: &'static str,
        reason: &'static str,
    },

    /// Caller is not allowed to perform this action
    #[error("unauthorized caller: {caller:?}")]
    Unauthorized { caller: Address },

    // ============ State Errors ============
    /// Entry point called while another entry point is in flight
    #[error("reentrant call")]
    Reentrancy,

    /// RToken minted on the ledger disagrees with the supply record
    #[error("supply mismatch: ledger {ledger}, recorded {recorded}")]
    SupplyMismatch { ledger: u128, recorded: u128 },
}

impl RTokenError {
    /// Returns a stable error code for logging/debugging
    pub fn code(&self) -> &'static str {
        match self {
            Self::AssetNotRegistered { .. } => "E001_ASSET_NOT_REGISTERED",
            Self::AssetAlreadyRegistered { .. } => "E002_ASSET_REGISTERED",
            Self::NotCollateral { .. } => "E003_NOT_COLLATERAL",
            Self::RegistryFull { .. } => "E004_REGISTRY_FULL",
            Self::BasketDisabled => "E010_BASKET_DISABLED",
            Self::BasketNotReady => "E011_BASKET_NOT_READY",
            Self::EmptyBasket => "E012_EMPTY_BASKET",
            Self::DuplicateToken { .. } => "E013_DUPLICATE_TOKEN",
            Self::TooManyTokens { .. } => "E014_TOO_MANY_TOKENS",
            Self::LengthMismatch { .. } => "E015_LENGTH_MISMATCH",
            Self::NotFullyCollateralized => "E016_NOT_COLLATERALIZED",
            Self::TradingDelayed { .. } => "E020_TRADING_DELAYED",
            Self::TradeAlreadyOpen { .. } => "E021_TRADE_ALREADY_OPEN",
            Self::TradeNotFound { .. } => "E022_TRADE_NOT_FOUND",
            Self::TradeNotOpen { .. } => "E023_TRADE_NOT_OPEN",
            Self::NoOpenTrade { .. } => "E031_NO_OPEN_TRADE",
            Self::AuctionNotOver { .. } => "E024_AUCTION_NOT_OVER",
            Self::AuctionOver { .. } => "E025_AUCTION_OVER",
            Self::BidTooLow { .. } => "E026_BID_TOO_LOW",
            Self::WrongAuctionKind => "E027_WRONG_AUCTION_KIND",
            Self::SameToken { .. } => "E028_SAME_TOKEN",
            Self::BrokerDisabled => "E029_BROKER_DISABLED",
            Self::UnpricedAsset { .. } => "E030_UNPRICED_ASSET",
            Self::ZeroAmount => "E040_ZERO_AMOUNT",
            Self::InsufficientBalance { .. } => "E041_INSUFFICIENT_BALANCE",
            Self::Overflow => "E050_OVERFLOW",
            Self::Underflow => "E051_UNDERFLOW",
            Self::DivisionByZero => "E052_DIV_ZERO",
            Self::InvalidParameter { .. } => "E060_INVALID_PARAM",
            Self::Unauthorized { .. } => "E061_UNAUTHORIZED",
            Self::Reentrancy => "E070_REENTRANCY",
            Self::SupplyMismatch { .. } => "E071_SUPPLY_MISMATCH",
        }
    }

    /// Returns true if retrying later (or with other inputs) can succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::TradingDelayed { .. } => true,  // Wait for the delay
            Self::AuctionNotOver { .. } => true,  // Wait for the auction
            Self::BasketNotReady => true,         // Wait for warmup
            Self::TradeAlreadyOpen { .. } => true, // Settle first
            Self::InsufficientBalance { .. } => true,
            _ => false,
        }
    }

    /// Returns true for accounting invariant violations
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::Overflow
                | Self::Underflow
                | Self::DivisionByZero
                | Self::InsufficientBalance { .. }
                | Self::TradeAlreadyOpen { .. }
                | Self::SupplyMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_error_codes_unique() {
        let errors = [
            RTokenError::AssetNotRegistered { token: [0u8; 32] },
            RTokenError::BasketDisabled,
            RTokenError::TradeAlreadyOpen { sell: [1u8; 32] },
            RTokenError::TradingDelayed { until: 10 },
            RTokenError::ZeroAmount,
            RTokenError::Overflow,
            RTokenError::Underflow,
            RTokenError::Reentrancy,
            RTokenError::SupplyMismatch { ledger: 1, recorded: 2 },
        ];

        let codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        let unique: BTreeSet<_> = codes.iter().collect();
        assert_eq!(codes.len(), unique.len(), "Error codes must be unique");
    }

    #[test]
    fn test_display() {
        let err = RTokenError::BidTooLow { offered: 5, required: 10 };
        assert_eq!(err.to_string(), "bid too low: offered 5, required 10");
    }

    #[test]
    fn test_classification() {
        assert!(RTokenError::Underflow.is_invariant_violation());
        assert!(!RTokenError::BasketDisabled.is_invariant_violation());
        assert!(RTokenError::SupplyMismatch { ledger: 1, recorded: 2 }.is_invariant_violation());
        assert!(RTokenError::TradingDelayed { until: 1 }.is_recoverable());
        assert!(!RTokenError::Overflow.is_recoverable());
    }
}
