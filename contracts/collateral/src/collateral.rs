//! Collateral
//!
//! A backing token with a health status driven by its own refresh routine.
//!
//! ## Status Machine
//!
//! ```text
//!            peg outside range / feed fault
//!   SOUND ──────────────────────────────────▶ IFFY
//!     ▲                                         │
//!     └──────────── price recovers ─────────────┤
//!                                               │ IFFY for delay_until_default
//!   refPerTok decreased (any state)             ▼
//!   ─────────────────────────────────────▶ DISABLED (terminal)
//! ```
//!
//! Feed faults never surface as errors; they only move the status toward
//! IFFY. Once DISABLED, `refresh` is a no-op.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use rtoken_common::constants::collateral;
use rtoken_common::validation::{require_below_fix, require_max_u64};
use rtoken_common::{
    check, short_hex, CollateralStatus, Fix, Price, RTokenError, RTokenResult, RoundingMode,
    TargetName, TokenId, FIX_MAX, FIX_ONE,
};

use crate::asset::{price_range, AssetConfig, PriceCache};
use crate::feed::{fresh_answer, FeedError, PriceFeed, RateSource};

// ============================================================================
// Configuration
// ============================================================================

/// Parameters of one collateral
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct CollateralConfig {
    /// Pricing and trading parameters
    pub asset: AssetConfig,
    /// Peg this collateral tracks
    pub target_name: TargetName,
    /// Allowed relative deviation of the peg price
    pub default_threshold: Fix,
    /// Seconds IFFY may last before the collateral defaults
    pub delay_until_default: u64,
}

impl Default for CollateralConfig {
    fn default() -> Self {
        Self {
            asset: AssetConfig::default(),
            target_name: TargetName::new("USD"),
            default_threshold: Fix::from_raw(collateral::DEFAULT_DEFAULT_THRESHOLD_RAW),
            delay_until_default: collateral::DEFAULT_DELAY_UNTIL_DEFAULT,
        }
    }
}

impl CollateralConfig {
    /// Config for `token` pegged to `target`, default parameters
    pub fn for_token(token: TokenId, target: &str) -> Self {
        Self {
            asset: AssetConfig::for_token(token),
            target_name: TargetName::new(target),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> RTokenResult<()> {
        self.asset.validate()?;
        check!(
            !self.target_name.is_empty(),
            RTokenError::InvalidParameter { param: "target_name", reason: "must not be empty" }
        );
        require_below_fix(
            self.default_threshold,
            collateral::MAX_DEFAULT_THRESHOLD_RAW,
            "default_threshold",
        )?;
        require_max_u64(
            self.delay_until_default,
            collateral::MAX_DELAY_UNTIL_DEFAULT,
            "delay_until_default",
        )
    }
}

// ============================================================================
// Kinds
// ============================================================================

/// How the peg and the UoA price are read from the feeds
#[derive(Debug)]
pub enum CollateralKind {
    /// Target is the unit of account; the feed reports UoA per reference unit
    Fiat,
    /// The feed reports target per reference unit (the peg); `target_feed`
    /// reports UoA per target
    NonFiat { target_feed: Box<dyn PriceFeed> },
    /// Reference unit equals target; the feed reports UoA per target and
    /// only a feed fault can make it IFFY
    SelfReferential,
}

// ============================================================================
// Persisted State
// ============================================================================

/// Status record that survives between invocations
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize,
    BorshDeserialize,
)]
pub struct CollateralState {
    pub status: CollateralStatus,
    /// Time the current IFFY stretch began
    pub iffy_since: Option<u64>,
    /// refPerTok observed at the last refresh
    pub ref_per_tok: Fix,
}

/// Status transition reported by a refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub token: TokenId,
    pub old: CollateralStatus,
    pub new: CollateralStatus,
}

// ============================================================================
// Collateral
// ============================================================================

/// A token that can back the basket
#[derive(Debug)]
pub struct Collateral {
    config: CollateralConfig,
    kind: CollateralKind,
    feed: Box<dyn PriceFeed>,
    rate: Option<Box<dyn RateSource>>,
    state: CollateralState,
    cache: PriceCache,
}

impl Collateral {
    /// Creates a SOUND collateral. `rate` of `None` means refPerTok is
    /// constant 1.
    pub fn new(
        config: CollateralConfig,
        kind: CollateralKind,
        feed: Box<dyn PriceFeed>,
        rate: Option<Box<dyn RateSource>>,
    ) -> RTokenResult<Self> {
        config.validate()?;
        let ref_per_tok = match &rate {
            Some(source) => source.ref_per_tok().map_err(|_| RTokenError::InvalidParameter {
                param: "rate",
                reason: "source unavailable",
            })?,
            None => FIX_ONE,
        };
        check!(
            !ref_per_tok.is_zero(),
            RTokenError::InvalidParameter { param: "rate", reason: "must be positive" }
        );
        Ok(Self {
            config,
            kind,
            feed,
            rate,
            state: CollateralState { ref_per_tok, ..CollateralState::default() },
            cache: PriceCache::default(),
        })
    }

    /// Fiat collateral without an exchange rate
    pub fn fiat(config: CollateralConfig, feed: Box<dyn PriceFeed>) -> RTokenResult<Self> {
        Self::new(config, CollateralKind::Fiat, feed, None)
    }

    pub fn config(&self) -> &CollateralConfig {
        &self.config
    }

    pub fn kind(&self) -> &CollateralKind {
        &self.kind
    }

    pub fn token(&self) -> TokenId {
        self.config.asset.token
    }

    pub fn decimals(&self) -> u8 {
        self.config.asset.decimals
    }

    pub fn target_name(&self) -> TargetName {
        self.config.target_name
    }

    pub fn max_trade_volume(&self) -> Fix {
        self.config.asset.max_trade_volume
    }

    pub fn status(&self) -> CollateralStatus {
        self.state.status
    }

    pub fn state(&self) -> &CollateralState {
        &self.state
    }

    pub fn cache(&self) -> &PriceCache {
        &self.cache
    }

    /// Target units per reference unit; 1 for every supported kind
    pub fn target_per_ref(&self) -> Fix {
        FIX_ONE
    }

    /// Reference units per whole token as of the last refresh
    pub fn ref_per_tok(&self) -> Fix {
        self.state.ref_per_tok
    }

    /// Peg price bounds `[bottom, top]` in target units
    pub fn peg_range(&self) -> (Fix, Fix) {
        let target = self.target_per_ref();
        let threshold = self.config.default_threshold;
        let bottom = target
            .mul(FIX_ONE.saturating_minus(threshold), RoundingMode::Ceil)
            .unwrap_or(target);
        let top = FIX_ONE
            .plus(threshold)
            .and_then(|factor| target.mul(factor, RoundingMode::Floor))
            .unwrap_or(FIX_MAX);
        (bottom, top)
    }

    fn live_ref_per_tok(&self) -> Result<Fix, FeedError> {
        match &self.rate {
            Some(source) => source.ref_per_tok(),
            None => Ok(FIX_ONE),
        }
    }

    /// Fresh token price range and peg price
    pub fn try_price(&self, now: u64) -> Result<(Price, Fix), FeedError> {
        let timeout = self.config.asset.oracle_timeout;
        let value = fresh_answer(self.feed.as_ref(), now, timeout)?;
        let (peg, uoa_per_ref) = match &self.kind {
            CollateralKind::Fiat => (value, value),
            CollateralKind::NonFiat { target_feed } => {
                let uoa_per_target = fresh_answer(target_feed.as_ref(), now, timeout)?;
                let uoa_per_ref = value
                    .mul(uoa_per_target, RoundingMode::Floor)
                    .map_err(|_| FeedError::OutOfRange)?;
                (value, uoa_per_ref)
            }
            CollateralKind::SelfReferential => (self.target_per_ref(), value),
        };
        let uoa_per_tok = uoa_per_ref
            .mul(self.live_ref_per_tok()?, RoundingMode::Floor)
            .map_err(|_| FeedError::OutOfRange)?;
        Ok((price_range(uoa_per_tok, self.config.asset.oracle_error), peg))
    }

    /// Best available token price range at `now`
    pub fn price(&self, now: u64) -> Price {
        match self.try_price(now) {
            Ok((price, _)) if price.high < FIX_MAX => price,
            _ => {
                let asset = &self.config.asset;
                self.cache.decayed(now, asset.oracle_timeout, asset.price_timeout)
            }
        }
    }

    /// Re-evaluates the status; the only path that mutates it
    pub fn refresh(&mut self, now: u64) -> Option<StatusChange> {
        let old = self.state.status;
        if old == CollateralStatus::Disabled {
            return None;
        }

        let mut rate_fault = false;
        match self.live_ref_per_tok() {
            Ok(rate) if rate < self.state.ref_per_tok => {
                log::warn!(
                    "collateral {} refPerTok fell from {} to {}",
                    short_hex(&self.token()),
                    self.state.ref_per_tok,
                    rate
                );
                self.state.status = CollateralStatus::Disabled;
            }
            Ok(rate) => self.state.ref_per_tok = rate,
            Err(err) => {
                log::debug!("collateral {} rate fault: {}", short_hex(&self.token()), err);
                rate_fault = true;
            }
        }

        if self.state.status != CollateralStatus::Disabled {
            let healthy = match self.try_price(now) {
                Ok((price, peg)) => {
                    if price.high < FIX_MAX {
                        self.cache.save(price, now);
                    }
                    let (bottom, top) = self.peg_range();
                    !rate_fault && peg >= bottom && peg <= top && price.has_low()
                }
                Err(err) => {
                    log::debug!("collateral {} feed fault: {}", short_hex(&self.token()), err);
                    false
                }
            };
            if healthy {
                self.mark_sound();
            } else {
                self.mark_iffy(now);
            }
        }

        let new = self.state.status;
        if new == old {
            return None;
        }
        log::info!("collateral {} status {:?} -> {:?}", short_hex(&self.token()), old, new);
        Some(StatusChange { token: self.token(), old, new })
    }

    fn mark_sound(&mut self) {
        self.state.status = CollateralStatus::Sound;
        self.state.iffy_since = None;
    }

    fn mark_iffy(&mut self, now: u64) {
        let since = *self.state.iffy_since.get_or_insert(now);
        self.state.status = if now.saturating_sub(since) >= self.config.delay_until_default {
            CollateralStatus::Disabled
        } else {
            CollateralStatus::Iffy
        };
    }
}
