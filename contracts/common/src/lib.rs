//! RToken Common Library
//!
//! Shared types, constants, and utilities for every component of the
//! RToken collateralization engine.
//!
//! ## Execution Model
//!
//! The engine assumes an environment with atomic, sequential state
//! transitions:
//! - **No waiting**: grace windows, trading delays and auction lengths are
//!   timestamps compared at the next invocation
//! - **No partial commits**: every entry point validates before it mutates
//! - **Explicit exclusivity**: entry points hold a [`guard::ReentrancyGuard`]
//!
//! ## Modules
//!
//! - **Fixed point**: 18-decimal math with explicit rounding direction
//! - **Ledger**: checked token balances standing in for token contracts
//! - **Supply**: RToken supply, melt and basket-unit conversion
//! - **Events**: indexable record of every state mutation
//! - **Errors**: one typed error enum with stable codes

pub mod constants;
pub mod errors;
pub mod types;
pub mod fixed;
pub mod events;
pub mod validation;
pub mod ledger;
pub mod supply;
pub mod guard;

// Re-exports for convenience
pub use errors::*;
pub use types::*;
pub use fixed::*;
pub use events::*;
pub use ledger::Ledger;
pub use supply::RTokenSupply;
pub use guard::{GuardToken, ReentrancyGuard};
