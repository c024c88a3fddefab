//! Protocol Constants
//!
//! Bounds and default values for the RToken collateralization engine.
//! Fixed-point values are stored as raw 18-decimal `u128` so they can be
//! used in `const` context; wrap them with [`crate::fixed::Fix::from_raw`].
//!
//! # Network Configuration
//!
//! Use feature flags to compile for different networks:
//! - `mainnet` - Production defaults (longer warmup and trading delay)
//! - Default (no feature) - Testnet defaults (short delays for testing)
//!
//! ```toml
//! # For mainnet deployment:
//! rtoken-common = { path = "...", features = ["mainnet"] }
//! ```

/// Fixed-point representation
pub mod fix {
    /// Decimal places carried by every `Fix`
    pub const DECIMALS: u8 = 18;
    /// Raw value of 1.0
    pub const ONE_RAW: u128 = 1_000_000_000_000_000_000;
    /// Largest decimal shift accepted when converting token amounts
    pub const MAX_SHIFT: u8 = 38;
}

/// Time values (seconds)
pub mod time {
    /// One minute
    pub const MINUTE: u64 = 60;
    /// One hour
    pub const HOUR: u64 = 3_600;
    /// One day
    pub const DAY: u64 = 86_400;
    /// One week
    pub const WEEK: u64 = 604_800;
    /// One year (365 days)
    pub const YEAR: u64 = 31_536_000;
}

/// Asset and collateral parameter bounds
pub mod collateral {
    use super::fix::ONE_RAW;
    use super::time::{DAY, WEEK, YEAR};

    /// Maximum oracle staleness timeout
    pub const MAX_ORACLE_TIMEOUT: u64 = YEAR;

    /// Maximum window over which a stale price decays to unpriced
    pub const MAX_PRICE_TIMEOUT: u64 = YEAR;

    /// Oracle error must be strictly below 100%
    pub const MAX_ORACLE_ERROR_RAW: u128 = ONE_RAW;

    /// Default threshold must be strictly below 100%
    pub const MAX_DEFAULT_THRESHOLD_RAW: u128 = ONE_RAW;

    /// Maximum grace window between IFFY and DISABLED
    pub const MAX_DELAY_UNTIL_DEFAULT: u64 = 2 * WEEK;

    /// Default grace window between IFFY and DISABLED
    pub const DEFAULT_DELAY_UNTIL_DEFAULT: u64 = DAY;

    /// Default allowed peg deviation (5%)
    pub const DEFAULT_DEFAULT_THRESHOLD_RAW: u128 = ONE_RAW / 20;

    /// Default oracle error (0.5%)
    pub const DEFAULT_ORACLE_ERROR_RAW: u128 = ONE_RAW / 200;

    /// Default oracle timeout (1 day heartbeat)
    pub const DEFAULT_ORACLE_TIMEOUT: u64 = DAY;

    /// Default price decay window (1 week)
    pub const DEFAULT_PRICE_TIMEOUT: u64 = WEEK;

    /// Maximum trade volume a single asset may declare, in UoA (1e12)
    pub const MAX_TRADE_VOLUME_RAW: u128 = 1_000_000_000_000 * ONE_RAW;

    /// Maximum length of a target name
    pub const MAX_TARGET_NAME_LEN: usize = 32;

    /// Maximum number of registered assets
    pub const MAX_REGISTERED_ASSETS: usize = 256;
}

/// Basket configuration bounds
pub mod basket {
    use super::fix::ONE_RAW;
    use super::time::{MINUTE, YEAR};

    /// Maximum number of collateral tokens in one basket
    pub const MAX_BASKET_SIZE: usize = 100;

    /// Maximum length of a backup candidate list
    pub const MAX_BACKUP_ERC20S: usize = 64;

    /// Maximum target amount per basket unit for a single prime entry
    pub const MAX_TARGET_AMT_RAW: u128 = 1_000 * ONE_RAW;

    /// Minimum warmup period after the basket regains SOUND status
    pub const MIN_WARMUP_PERIOD: u64 = MINUTE;

    /// Maximum warmup period
    pub const MAX_WARMUP_PERIOD: u64 = YEAR;

    /// Default warmup period
    /// - Mainnet: 15 minutes
    /// - Testnet: 1 minute
    #[cfg(feature = "mainnet")]
    pub const DEFAULT_WARMUP_PERIOD: u64 = 15 * MINUTE;
    #[cfg(not(feature = "mainnet"))]
    pub const DEFAULT_WARMUP_PERIOD: u64 = MINUTE;
}

/// Rebalancing parameter bounds
pub mod trading {
    use super::fix::ONE_RAW;
    use super::time::YEAR;

    /// Maximum trading delay after a basket change
    pub const MAX_TRADING_DELAY: u64 = YEAR;

    /// Maximum backing buffer (100%)
    pub const MAX_BACKING_BUFFER_RAW: u128 = ONE_RAW;

    /// Maximum trade slippage (100%, exclusive)
    pub const MAX_TRADE_SLIPPAGE_RAW: u128 = ONE_RAW;

    /// Maximum minimum trade volume, in UoA (1e12)
    pub const MAX_MIN_TRADE_VOLUME_RAW: u128 = 1_000_000_000_000 * ONE_RAW;

    /// Default backing buffer (0.01%)
    pub const DEFAULT_BACKING_BUFFER_RAW: u128 = ONE_RAW / 10_000;

    /// Default max trade slippage (1%)
    pub const DEFAULT_MAX_TRADE_SLIPPAGE_RAW: u128 = ONE_RAW / 100;

    /// Default minimum trade volume (1,000 UoA)
    pub const DEFAULT_MIN_TRADE_VOLUME_RAW: u128 = 1_000 * ONE_RAW;

    /// Default trading delay
    /// - Mainnet: 1 hour
    /// - Testnet: none
    #[cfg(feature = "mainnet")]
    pub const DEFAULT_TRADING_DELAY: u64 = super::time::HOUR;
    #[cfg(not(feature = "mainnet"))]
    pub const DEFAULT_TRADING_DELAY: u64 = 0;
}

/// Broker and auction bounds
pub mod broker {
    use super::time::{MINUTE, WEEK};

    /// Minimum auction length
    pub const MIN_AUCTION_LENGTH: u64 = MINUTE;

    /// Maximum auction length
    pub const MAX_AUCTION_LENGTH: u64 = WEEK;

    /// Default batch auction length (15 minutes)
    pub const DEFAULT_BATCH_AUCTION_LENGTH: u64 = 15 * MINUTE;

    /// Default Dutch auction length (30 minutes)
    pub const DEFAULT_DUTCH_AUCTION_LENGTH: u64 = 30 * MINUTE;

    /// Violations tolerated before the broker disables itself
    pub const DEFAULT_MAX_VIOLATIONS: u32 = 1;

    /// Maximum bids held by one batch auction
    pub const MAX_BATCH_BIDS: usize = 128;
}
