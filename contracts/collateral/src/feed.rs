//! Price Feed Capabilities
//!
//! The engine never implements an oracle. Collateral consumes two external
//! capabilities:
//!
//! - [`PriceFeed`]: `latest_price() -> (value, updated_at)`, may fail
//! - [`RateSource`]: the reference units backed by one whole token
//!
//! [`ManualFeed`] and [`ManualRate`] are operator-pushed implementations.
//! Both are shared handles: a clone observes and drives the same state, so
//! the operator keeps one copy while the registered collateral holds another.

use core::fmt;
use std::cell::RefCell;
use std::rc::Rc;

use rtoken_common::Fix;
use thiserror::Error;

/// A feed fault; folded into the soft-default path, never propagated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FeedError {
    /// The feed could not be queried
    #[error("feed unavailable")]
    Unavailable,

    /// The feed answered with zero
    #[error("feed returned zero")]
    ZeroAnswer,

    /// The last answer is older than the oracle timeout
    #[error("stale answer from {updated_at}")]
    Stale { updated_at: u64 },

    /// Derived price does not fit the fixed-point range
    #[error("price out of range")]
    OutOfRange,
}

/// One answer of a price feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedAnswer {
    /// Price as an 18-decimal value
    pub value: Fix,
    /// Time of the answer
    pub updated_at: u64,
}

/// External price-feed capability
pub trait PriceFeed: fmt::Debug {
    /// Latest answer of the feed
    fn latest_price(&self) -> Result<FeedAnswer, FeedError>;
}

/// External exchange-rate capability (refPerTok)
pub trait RateSource: fmt::Debug {
    /// Reference units per whole token
    fn ref_per_tok(&self) -> Result<Fix, FeedError>;
}

/// Reads a feed and rejects zero or stale answers
pub fn fresh_answer(
    feed: &dyn PriceFeed,
    now: u64,
    oracle_timeout: u64,
) -> Result<Fix, FeedError> {
    let answer = feed.latest_price()?;
    if answer.value.is_zero() {
        return Err(FeedError::ZeroAnswer);
    }
    if now.saturating_sub(answer.updated_at) > oracle_timeout {
        return Err(FeedError::Stale { updated_at: answer.updated_at });
    }
    Ok(answer.value)
}

// ============================================================================
// Manual Feed
// ============================================================================

#[derive(Debug, Default)]
struct FeedState {
    answer: Option<FeedAnswer>,
    failing: bool,
}

/// Operator-pushed price feed
#[derive(Debug, Clone, Default)]
pub struct ManualFeed {
    state: Rc<RefCell<FeedState>>,
}

impl ManualFeed {
    /// Feed with an initial answer
    pub fn new(value: Fix, updated_at: u64) -> Self {
        let feed = Self::default();
        feed.set_price(value, updated_at);
        feed
    }

    /// Publish a new answer
    pub fn set_price(&self, value: Fix, updated_at: u64) {
        self.state.borrow_mut().answer = Some(FeedAnswer { value, updated_at });
    }

    /// Make every query fail until cleared
    pub fn set_failing(&self, failing: bool) {
        self.state.borrow_mut().failing = failing;
    }
}

impl PriceFeed for ManualFeed {
    fn latest_price(&self) -> Result<FeedAnswer, FeedError> {
        let state = self.state.borrow();
        if state.failing {
            return Err(FeedError::Unavailable);
        }
        state.answer.ok_or(FeedError::Unavailable)
    }
}

// ============================================================================
// Manual Rate
// ============================================================================

/// Operator-pushed exchange rate
#[derive(Debug, Clone)]
pub struct ManualRate {
    state: Rc<RefCell<Option<Fix>>>,
}

impl ManualRate {
    /// Rate source starting at `rate`
    pub fn new(rate: Fix) -> Self {
        Self { state: Rc::new(RefCell::new(Some(rate))) }
    }

    /// Publish a new rate
    pub fn set_rate(&self, rate: Fix) {
        *self.state.borrow_mut() = Some(rate);
    }

    /// Make every query fail until a rate is set again
    pub fn set_failing(&self) {
        *self.state.borrow_mut() = None;
    }
}

impl RateSource for ManualRate {
    fn ref_per_tok(&self) -> Result<Fix, FeedError> {
        self.state.borrow().ok_or(FeedError::Unavailable)
    }
}
