//! RToken Broker
//!
//! Auctions for the BackingManager's trade requests.
//!
//! ## Trade Lifecycle
//!
//! ```text
//! open_trade ──▶ OPEN ──(bids, auction window)──▶ settle ──▶ CLOSED
//! ```
//!
//! - The lot is escrowed at open; trades cannot be cancelled, only settled
//! - At most one OPEN trade per sell token
//! - Settlement pays the origin and returns any unsold lot
//! - A CLOSED trade never changes again

pub mod trade;
pub mod broker;

pub use trade::{BatchBid, BatchClearing, BatchFill, Trade, TradeRequest};
pub use broker::{generate_trade_id, Broker, BrokerConfig};
