//! RToken Backing Manager
//!
//! Compares the collateral it holds with what the basket requires and trades
//! the difference away through the broker.
//!
//! ## Control Loop
//!
//! Each `manage_tokens` call opens at most one trade:
//!
//! 1. Bail out unless the basket is ready and the trading delay has passed
//! 2. **Undercollateralized**: sell the largest surplus for the largest
//!    deficit, sized to cover that deficit. Waits while any trade is open.
//! 3. **Fully collateralized**: sell the largest surplus above the backing
//!    buffer for the revenue token
//!
//! Unpriced assets and dust lots are skipped, never fatal.

pub mod trading;
pub mod manager;

pub use trading::{collect_holdings, pick_largest, prepare_trade, Holding, TradingConfig};
pub use manager::{BackingContext, BackingManager, IdleReason, ManageOutcome};
