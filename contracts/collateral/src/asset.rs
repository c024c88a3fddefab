//! Plain Assets
//!
//! A registered token that is not collateral (the insurance asset, reward
//! tokens). It is priced from one feed and can be traded, but never backs
//! the basket.
//!
//! ## Price Range
//!
//! ```text
//! low  = p * (1 - oracle_error)      (floor)
//! high = p * (1 + oracle_error)      (ceil)
//! ```
//!
//! When the feed fails or goes stale, the last saved range is served for
//! `oracle_timeout`, then decays linearly over `price_timeout`: the low bound
//! falls to zero while the high bound rises, until the asset is unpriced.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use rtoken_common::constants::{collateral, fix};
use rtoken_common::validation::{
    require_below_fix, require_max_fix, require_max_u64, require_range_u64,
};
use rtoken_common::{
    mul_div, short_hex, Fix, Price, RTokenResult, RoundingMode, TokenId, FIX_MAX, FIX_ONE,
    FIX_ZERO,
};

use crate::feed::{fresh_answer, FeedError, PriceFeed};

// ============================================================================
// Configuration
// ============================================================================

/// Per-asset pricing and trading parameters
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct AssetConfig {
    /// Token identifier
    pub token: TokenId,
    /// Decimals of raw token balances
    pub decimals: u8,
    /// Relative error of the feed; widens the price range
    pub oracle_error: Fix,
    /// Seconds an answer stays fresh
    pub oracle_timeout: u64,
    /// Seconds over which a saved price decays once stale
    pub price_timeout: u64,
    /// Largest trade worth opening in one auction (UoA)
    pub max_trade_volume: Fix,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            token: [0u8; 32],
            decimals: fix::DECIMALS,
            oracle_error: Fix::from_raw(collateral::DEFAULT_ORACLE_ERROR_RAW),
            oracle_timeout: collateral::DEFAULT_ORACLE_TIMEOUT,
            price_timeout: collateral::DEFAULT_PRICE_TIMEOUT,
            max_trade_volume: Fix::from_int(1_000_000),
        }
    }
}

impl AssetConfig {
    /// Config for `token` with default parameters
    pub fn for_token(token: TokenId) -> Self {
        Self { token, ..Self::default() }
    }

    /// Checks every parameter against its bound
    pub fn validate(&self) -> RTokenResult<()> {
        require_max_u64(self.decimals as u64, fix::MAX_SHIFT as u64, "decimals")?;
        require_below_fix(self.oracle_error, collateral::MAX_ORACLE_ERROR_RAW, "oracle_error")?;
        require_range_u64(
            self.oracle_timeout,
            1,
            collateral::MAX_ORACLE_TIMEOUT,
            "oracle_timeout",
        )?;
        require_range_u64(self.price_timeout, 1, collateral::MAX_PRICE_TIMEOUT, "price_timeout")?;
        require_max_fix(
            self.max_trade_volume,
            collateral::MAX_TRADE_VOLUME_RAW,
            "max_trade_volume",
        )
    }
}

// ============================================================================
// Price Cache
// ============================================================================

/// Last price range observed from a working feed
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize,
    BorshDeserialize,
)]
pub struct PriceCache {
    pub saved_low: Fix,
    pub saved_high: Fix,
    pub last_save: u64,
}

impl PriceCache {
    /// Record a range observed at `now`
    pub fn save(&mut self, price: Price, now: u64) {
        self.saved_low = price.low;
        self.saved_high = price.high;
        self.last_save = now;
    }

    /// Saved range aged to `now`
    pub fn decayed(&self, now: u64, oracle_timeout: u64, price_timeout: u64) -> Price {
        if self.saved_high.is_zero() {
            return Price::UNPRICED;
        }
        let age = now.saturating_sub(self.last_save);
        if age <= oracle_timeout {
            return Price::new(self.saved_low, self.saved_high);
        }
        let past = age - oracle_timeout;
        if past >= price_timeout {
            return Price::UNPRICED;
        }
        let remaining = (price_timeout - past) as u128;
        let total = price_timeout as u128;
        let low = mul_div(self.saved_low.raw(), remaining, total, RoundingMode::Floor)
            .map(Fix::from_raw)
            .unwrap_or(FIX_ZERO);
        let high = mul_div(self.saved_high.raw(), total, remaining, RoundingMode::Ceil)
            .map(Fix::from_raw)
            .unwrap_or(FIX_MAX);
        Price::new(low, high)
    }
}

/// Widens a point price by the oracle error
pub fn price_range(value: Fix, oracle_error: Fix) -> Price {
    let low = value
        .mul(FIX_ONE.saturating_minus(oracle_error), RoundingMode::Floor)
        .unwrap_or(FIX_ZERO);
    let high = FIX_ONE
        .plus(oracle_error)
        .and_then(|factor| value.mul(factor, RoundingMode::Ceil))
        .unwrap_or(FIX_MAX);
    Price::new(low, high)
}

// ============================================================================
// Asset
// ============================================================================

/// A priced, tradable, non-collateral token
#[derive(Debug)]
pub struct Asset {
    config: AssetConfig,
    feed: Box<dyn PriceFeed>,
    cache: PriceCache,
}

impl Asset {
    /// Validates the config and wraps the feed
    pub fn new(config: AssetConfig, feed: Box<dyn PriceFeed>) -> RTokenResult<Self> {
        config.validate()?;
        Ok(Self { config, feed, cache: PriceCache::default() })
    }

    pub fn config(&self) -> &AssetConfig {
        &self.config
    }

    pub fn token(&self) -> TokenId {
        self.config.token
    }

    pub fn decimals(&self) -> u8 {
        self.config.decimals
    }

    pub fn max_trade_volume(&self) -> Fix {
        self.config.max_trade_volume
    }

    pub fn cache(&self) -> &PriceCache {
        &self.cache
    }

    /// Fresh price range straight from the feed
    pub fn try_price(&self, now: u64) -> Result<Price, FeedError> {
        let value = fresh_answer(self.feed.as_ref(), now, self.config.oracle_timeout)?;
        Ok(price_range(value, self.config.oracle_error))
    }

    /// Saves the current feed price; feed faults keep the old save
    pub fn refresh(&mut self, now: u64) {
        match self.try_price(now) {
            Ok(price) if price.high < FIX_MAX => self.cache.save(price, now),
            Ok(_) => {}
            Err(err) => {
                log::debug!("asset {} kept saved price: {}", short_hex(&self.config.token), err);
            }
        }
    }

    /// Best available price range at `now`
    pub fn price(&self, now: u64) -> Price {
        match self.try_price(now) {
            Ok(price) if price.high < FIX_MAX => price,
            _ => self.cache.decayed(now, self.config.oracle_timeout, self.config.price_timeout),
        }
    }
}
