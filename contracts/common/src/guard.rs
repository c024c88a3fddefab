//! Re-entrancy Guard
//!
//! Every external entry point holds a [`GuardToken`] for its whole duration.
//! A nested entry (for example a price feed or auction venue calling back
//! into the engine) fails with [`RTokenError::Reentrancy`] instead of
//! observing half-applied state.

use std::cell::Cell;
use std::rc::Rc;

use crate::errors::{RTokenError, RTokenResult};

/// Exclusive-access flag shared by all entry points of one engine
#[derive(Debug, Clone, Default)]
pub struct ReentrancyGuard {
    entered: Rc<Cell<bool>>,
}

/// Proof of exclusive access; releases the guard on drop
#[derive(Debug)]
#[must_use = "the guard is released as soon as the token is dropped"]
pub struct GuardToken {
    entered: Rc<Cell<bool>>,
}

impl ReentrancyGuard {
    /// Create an unlocked guard
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire exclusive access
    pub fn enter(&self) -> RTokenResult<GuardToken> {
        if self.entered.replace(true) {
            log::warn!("rejected reentrant call");
            return Err(RTokenError::Reentrancy);
        }
        Ok(GuardToken { entered: Rc::clone(&self.entered) })
    }

    /// True while an entry point is running
    pub fn is_entered(&self) -> bool {
        self.entered.get()
    }
}

impl Drop for GuardToken {
    fn drop(&mut self) {
        self.entered.set(false);
    }
}
