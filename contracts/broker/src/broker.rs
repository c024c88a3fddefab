//! Broker
//!
//! Turns trade requests into auctions. The broker escrows the lot, keeps at
//! most one OPEN trade per sell token, and settles trades back to their
//! origin. Settling a CLOSED trade returns its recorded amounts and moves
//! nothing.
//!
//! ## Safety Valve
//!
//! A settlement the escrow cannot cover counts as a violation and leaves the
//! trade OPEN. Reaching `max_violations` disables new trades; trades already
//! open can still be bid on and settled.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use rtoken_common::constants::broker;
use rtoken_common::validation::require_range_u64;
use rtoken_common::{
    check, short_hex, Address, EventLog, Ledger, RTokenError, RTokenEvent, RTokenResult, TokenId,
    TradeId, TradeKind, TradeStatus,
};

use crate::trade::{BatchBid, Trade, TradeRequest};

// ============================================================================
// Configuration
// ============================================================================

/// Auction parameters
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct BrokerConfig {
    pub batch_auction_length: u64,
    pub dutch_auction_length: u64,
    /// Violations tolerated before new trades are disabled
    pub max_violations: u32,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            batch_auction_length: broker::DEFAULT_BATCH_AUCTION_LENGTH,
            dutch_auction_length: broker::DEFAULT_DUTCH_AUCTION_LENGTH,
            max_violations: broker::DEFAULT_MAX_VIOLATIONS,
        }
    }
}

impl BrokerConfig {
    pub fn validate(&self) -> RTokenResult<()> {
        require_range_u64(
            self.batch_auction_length,
            broker::MIN_AUCTION_LENGTH,
            broker::MAX_AUCTION_LENGTH,
            "batch_auction_length",
        )?;
        require_range_u64(
            self.dutch_auction_length,
            broker::MIN_AUCTION_LENGTH,
            broker::MAX_AUCTION_LENGTH,
            "dutch_auction_length",
        )?;
        check!(
            self.max_violations > 0,
            RTokenError::InvalidParameter { param: "max_violations", reason: "must be positive" }
        );
        Ok(())
    }

    pub fn auction_length(&self, kind: TradeKind) -> u64 {
        match kind {
            TradeKind::Batch => self.batch_auction_length,
            TradeKind::Dutch => self.dutch_auction_length,
        }
    }
}

/// Deterministic escrow address of a broker's `nonce`-th trade
pub fn generate_trade_id(broker_id: &Address, nonce: u64) -> TradeId {
    let mut hasher = Sha256::new();
    hasher.update(b"rtoken/trade");
    hasher.update(broker_id);
    hasher.update(nonce.to_le_bytes());
    let result = hasher.finalize();
    let mut id = [0u8; 32];
    id.copy_from_slice(&result);
    id
}

// ============================================================================
// Broker
// ============================================================================

/// Auction house for the BackingManager
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct Broker {
    id: Address,
    config: BrokerConfig,
    disabled: bool,
    violations: u32,
    nonce: u64,
    trades: BTreeMap<TradeId, Trade>,
    open_by_sell: BTreeMap<TokenId, TradeId>,
}

impl Broker {
    pub fn new(id: Address, config: BrokerConfig) -> RTokenResult<Self> {
        config.validate()?;
        Ok(Self {
            id,
            config,
            disabled: false,
            violations: 0,
            nonce: 0,
            trades: BTreeMap::new(),
            open_by_sell: BTreeMap::new(),
        })
    }

    pub fn id(&self) -> Address {
        self.id
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn violations(&self) -> u32 {
        self.violations
    }

    pub fn trade(&self, trade_id: &TradeId) -> Option<&Trade> {
        self.trades.get(trade_id)
    }

    /// The OPEN trade selling `sell`, if any
    pub fn open_trade_for(&self, sell: &TokenId) -> Option<&Trade> {
        self.open_by_sell.get(sell).and_then(|id| self.trades.get(id))
    }

    pub fn open_trade_count(&self) -> usize {
        self.open_by_sell.len()
    }

    pub fn open_trades(&self) -> impl Iterator<Item = &Trade> {
        self.open_by_sell.values().filter_map(|id| self.trades.get(id))
    }

    // ========================================================================
    // Governance
    // ========================================================================

    pub fn set_config(&mut self, config: BrokerConfig) -> RTokenResult<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Enables or disables new trades; re-enabling clears the violation count
    pub fn set_disabled(&mut self, disabled: bool, now: u64, events: &mut EventLog) {
        if !disabled {
            self.violations = 0;
        }
        if self.disabled != disabled {
            log::warn!("broker disabled: {}", disabled);
            self.disabled = disabled;
            events.emit(RTokenEvent::BrokerDisabledSet { disabled, timestamp: now });
        }
    }

    /// Replays violations counted by a rolled-back copy of this broker
    pub fn replay_violations(&mut self, staged: &Broker, now: u64, events: &mut EventLog) {
        for _ in self.violations..staged.violations {
            self.report_violation(now, events);
        }
    }

    /// Counts one auction venue violation
    pub fn report_violation(&mut self, now: u64, events: &mut EventLog) {
        self.violations = self.violations.saturating_add(1);
        log::warn!("broker violation {} of {}", self.violations, self.config.max_violations);
        if self.violations >= self.config.max_violations {
            self.set_disabled(true, now, events);
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Escrows the lot from `origin` and opens an auction
    pub fn open_trade(
        &mut self,
        origin: Address,
        request: &TradeRequest,
        kind: TradeKind,
        ledger: &mut Ledger,
        now: u64,
        events: &mut EventLog,
    ) -> RTokenResult<TradeId> {
        // 1. Broker must accept new trades
        check!(!self.disabled, RTokenError::BrokerDisabled);

        // 2. Request must be well formed
        check!(request.sell != request.buy, RTokenError::SameToken { token: request.sell });
        check!(request.sell_amount > 0, RTokenError::ZeroAmount);
        check!(
            request.min_buy_amount <= request.best_buy_amount,
            RTokenError::InvalidParameter { param: "min_buy_amount", reason: "above best" }
        );

        // 3. One open trade per sell token
        check!(
            !self.open_by_sell.contains_key(&request.sell),
            RTokenError::TradeAlreadyOpen { sell: request.sell }
        );

        // 4. Escrow the lot
        let trade_id = generate_trade_id(&self.id, self.nonce);
        ledger.transfer(&request.sell, &origin, &trade_id, request.sell_amount)?;

        let trade =
            Trade::new(trade_id, kind, origin, request, now, self.config.auction_length(kind));
        log::info!(
            "opened {:?} trade {}: {} of {} for at least {} of {}",
            kind,
            short_hex(&trade_id),
            request.sell_amount,
            short_hex(&request.sell),
            request.min_buy_amount,
            short_hex(&request.buy)
        );
        events.emit(RTokenEvent::TradeStarted {
            trade_id,
            kind,
            sell: request.sell,
            buy: request.buy,
            sell_amount: request.sell_amount,
            min_buy_amount: request.min_buy_amount,
            timestamp: now,
        });

        self.nonce += 1;
        self.open_by_sell.insert(request.sell, trade_id);
        self.trades.insert(trade_id, trade);
        Ok(trade_id)
    }

    fn open_trade_mut(&mut self, trade_id: &TradeId) -> RTokenResult<&mut Trade> {
        let trade = self
            .trades
            .get_mut(trade_id)
            .ok_or(RTokenError::TradeNotFound { trade_id: *trade_id })?;
        check!(trade.is_open(), RTokenError::TradeNotOpen { trade_id: *trade_id });
        Ok(trade)
    }

    /// Escrows a sealed bid in a batch auction
    pub fn bid_batch(
        &mut self,
        trade_id: &TradeId,
        bid: BatchBid,
        ledger: &mut Ledger,
        now: u64,
        events: &mut EventLog,
    ) -> RTokenResult<()> {
        let trade = self.open_trade_mut(trade_id)?;
        trade.check_batch_bid(&bid, now)?;
        check!(
            trade.bids.len() < broker::MAX_BATCH_BIDS,
            RTokenError::TooManyTokens { count: trade.bids.len(), max: broker::MAX_BATCH_BIDS }
        );

        ledger.transfer(&trade.buy, &bid.bidder, &trade.escrow(), bid.buy_amount)?;
        trade.bids.push(bid);
        events.emit(RTokenEvent::TradeBid {
            trade_id: *trade_id,
            bidder: bid.bidder,
            sell_amount: bid.sell_amount,
            buy_amount: bid.buy_amount,
            timestamp: now,
        });
        Ok(())
    }

    /// Buys the whole Dutch lot at the current price; returns the amount paid
    pub fn bid_dutch(
        &mut self,
        trade_id: &TradeId,
        bidder: Address,
        ledger: &mut Ledger,
        now: u64,
        events: &mut EventLog,
    ) -> RTokenResult<u128> {
        let trade = self.open_trade_mut(trade_id)?;
        check!(trade.kind == TradeKind::Dutch, RTokenError::WrongAuctionKind);
        check!(trade.winner.is_none(), RTokenError::AuctionOver { ended_at: now });
        check!(now < trade.end_time, RTokenError::AuctionOver { ended_at: trade.end_time });

        let price = trade.dutch_price(now)?;
        let escrow = trade.escrow();
        let mut staged = ledger.clone();
        staged.transfer(&trade.buy, &bidder, &escrow, price)?;
        staged.transfer(&trade.sell, &escrow, &bidder, trade.sell_amount)?;
        *ledger = staged;

        trade.winner = Some(bidder);
        trade.sold = trade.sell_amount;
        trade.bought = price;
        events.emit(RTokenEvent::TradeBid {
            trade_id: *trade_id,
            bidder,
            sell_amount: trade.sell_amount,
            buy_amount: price,
            timestamp: now,
        });
        Ok(price)
    }

    /// Closes a trade and pays its origin; returns `(sold, bought)`
    pub fn settle(
        &mut self,
        trade_id: &TradeId,
        ledger: &mut Ledger,
        now: u64,
        events: &mut EventLog,
    ) -> RTokenResult<(u128, u128)> {
        let trade = self
            .trades
            .get(trade_id)
            .ok_or(RTokenError::TradeNotFound { trade_id: *trade_id })?;
        if trade.status == TradeStatus::Closed {
            return Ok((trade.sold, trade.bought));
        }
        check!(trade.can_settle(now), RTokenError::AuctionNotOver { ends_at: trade.end_time });

        // Compute every movement before touching the ledger
        let (sell, buy, sell_amount) = (trade.sell, trade.buy, trade.sell_amount);
        let mut staged = ledger.clone();
        let (sold, bought) = match Self::disburse(trade, &mut staged) {
            Ok(amounts) => amounts,
            Err(err) => {
                log::error!("trade {} cannot settle: {}", short_hex(trade_id), err.code());
                if err.is_invariant_violation() {
                    self.report_violation(now, events);
                }
                return Err(err);
            }
        };
        *ledger = staged;

        if let Some(trade) = self.trades.get_mut(trade_id) {
            trade.status = TradeStatus::Closed;
            trade.sold = sold;
            trade.bought = bought;
        }
        self.open_by_sell.remove(&sell);

        log::info!(
            "settled trade {}: sold {} of {}, bought {}",
            short_hex(trade_id),
            sold,
            sell_amount,
            bought
        );
        events.emit(RTokenEvent::TradeSettled {
            trade_id: *trade_id,
            sell,
            buy,
            sold,
            bought,
            timestamp: now,
        });
        Ok((sold, bought))
    }

    /// Pays bidders and the origin out of the trade's escrow
    fn disburse(trade: &Trade, ledger: &mut Ledger) -> RTokenResult<(u128, u128)> {
        let escrow = trade.escrow();
        let (sold, bought) = match trade.kind {
            TradeKind::Dutch => {
                let (sold, bought) =
                    if trade.winner.is_some() { (trade.sold, trade.bought) } else { (0, 0) };
                ledger.transfer(&trade.buy, &escrow, &trade.origin, bought)?;
                (sold, bought)
            }
            TradeKind::Batch => {
                let clearing = trade.clear_batch()?;
                for fill in &clearing.fills {
                    ledger.transfer(&trade.sell, &escrow, &fill.bidder, fill.received)?;
                    ledger.transfer(&trade.buy, &escrow, &fill.bidder, fill.refund)?;
                }
                ledger.transfer(&trade.buy, &escrow, &trade.origin, clearing.bought)?;
                (clearing.sold, clearing.bought)
            }
        };
        let unsold = trade.sell_amount.checked_sub(sold).ok_or(RTokenError::Underflow)?;
        ledger.transfer(&trade.sell, &escrow, &trade.origin, unsold)?;
        Ok((sold, bought))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BROKER: Address = [0xbb; 32];
    const ORIGIN: Address = [0x0a; 32];
    const ALICE: Address = [0xa1; 32];
    const BOB: Address = [0xb0; 32];
    const SELL: TokenId = [0x51; 32];
    const BUY: TokenId = [0xb7; 32];

    fn setup() -> (Broker, Ledger, EventLog) {
        let broker = Broker::new(BROKER, BrokerConfig::default()).unwrap();
        let mut ledger = Ledger::new();
        ledger.mint(&SELL, &ORIGIN, 1_000).unwrap();
        ledger.mint(&BUY, &ALICE, 10_000).unwrap();
        ledger.mint(&BUY, &BOB, 10_000).unwrap();
        (broker, ledger, EventLog::new())
    }

    fn request() -> TradeRequest {
        TradeRequest {
            sell: SELL,
            buy: BUY,
            sell_amount: 1_000,
            min_buy_amount: 900,
            best_buy_amount: 1_100,
        }
    }

    #[test]
    fn test_trade_ids_are_deterministic() {
        assert_eq!(generate_trade_id(&BROKER, 0), generate_trade_id(&BROKER, 0));
        assert_ne!(generate_trade_id(&BROKER, 0), generate_trade_id(&BROKER, 1));
    }

    #[test]
    fn test_one_open_trade_per_sell_token() {
        let (mut broker, mut ledger, mut events) = setup();
        let small = TradeRequest { sell_amount: 500, ..request() };
        broker.open_trade(ORIGIN, &small, TradeKind::Batch, &mut ledger, 0, &mut events).unwrap();
        assert_eq!(
            broker.open_trade(ORIGIN, &small, TradeKind::Batch, &mut ledger, 0, &mut events),
            Err(RTokenError::TradeAlreadyOpen { sell: SELL })
        );
        assert_eq!(broker.open_trade_count(), 1);
        assert_eq!(ledger.balance_of(&SELL, &ORIGIN), 500);
    }

    #[test]
    fn test_dutch_lifecycle() {
        let (mut broker, mut ledger, mut events) = setup();
        let id = broker
            .open_trade(ORIGIN, &request(), TradeKind::Dutch, &mut ledger, 0, &mut events)
            .unwrap();
        assert_eq!(ledger.balance_of(&SELL, &id), 1_000);
        assert_eq!(
            broker.settle(&id, &mut ledger, 10, &mut events),
            Err(RTokenError::AuctionNotOver { ends_at: broker::DEFAULT_DUTCH_AUCTION_LENGTH })
        );

        let half = broker::DEFAULT_DUTCH_AUCTION_LENGTH / 2;
        let paid = broker.bid_dutch(&id, ALICE, &mut ledger, half, &mut events).unwrap();
        assert_eq!(paid, 1_000);
        assert_eq!(ledger.balance_of(&SELL, &ALICE), 1_000);
        assert!(broker.bid_dutch(&id, BOB, &mut ledger, half, &mut events).is_err());

        assert_eq!(broker.settle(&id, &mut ledger, half, &mut events).unwrap(), (1_000, 1_000));
        assert_eq!(ledger.balance_of(&BUY, &ORIGIN), 1_000);
        assert!(broker.open_trade_for(&SELL).is_none());

        // Closed trades are immutable
        assert_eq!(broker.settle(&id, &mut ledger, half + 1, &mut events).unwrap(), (1_000, 1_000));
        assert_eq!(ledger.balance_of(&BUY, &ORIGIN), 1_000);
        assert_eq!(broker.trade(&id).unwrap().status, TradeStatus::Closed);
    }

    #[test]
    fn test_unsold_lot_returned() {
        let (mut broker, mut ledger, mut events) = setup();
        let id = broker
            .open_trade(ORIGIN, &request(), TradeKind::Batch, &mut ledger, 0, &mut events)
            .unwrap();
        let end = broker::DEFAULT_BATCH_AUCTION_LENGTH;
        assert_eq!(broker.settle(&id, &mut ledger, end, &mut events).unwrap(), (0, 0));
        assert_eq!(ledger.balance_of(&SELL, &ORIGIN), 1_000);
        assert_eq!(ledger.balance_of(&SELL, &id), 0);
        assert!(!broker.is_disabled());
    }

    #[test]
    fn test_batch_settlement_disburses() {
        let (mut broker, mut ledger, mut events) = setup();
        let id = broker
            .open_trade(ORIGIN, &request(), TradeKind::Batch, &mut ledger, 0, &mut events)
            .unwrap();
        let alice = BatchBid { bidder: ALICE, sell_amount: 600, buy_amount: 660 };
        let bob = BatchBid { bidder: BOB, sell_amount: 600, buy_amount: 600 };
        broker.bid_batch(&id, alice, &mut ledger, 1, &mut events).unwrap();
        broker.bid_batch(&id, bob, &mut ledger, 2, &mut events).unwrap();
        assert_eq!(ledger.balance_of(&BUY, &id), 1_260);

        let end = broker::DEFAULT_BATCH_AUCTION_LENGTH;
        assert_eq!(broker.settle(&id, &mut ledger, end, &mut events).unwrap(), (1_000, 1_000));
        assert_eq!(ledger.balance_of(&SELL, &ALICE), 600);
        assert_eq!(ledger.balance_of(&SELL, &BOB), 400);
        assert_eq!(ledger.balance_of(&BUY, &ALICE), 10_000 - 600);
        assert_eq!(ledger.balance_of(&BUY, &BOB), 10_000 - 400);
        assert_eq!(ledger.balance_of(&BUY, &ORIGIN), 1_000);
        assert_eq!(ledger.balance_of(&BUY, &id), 0);
        assert_eq!(ledger.balance_of(&SELL, &id), 0);
    }

    #[test]
    fn test_disabled_blocks_new_trades_only() {
        let (mut broker, mut ledger, mut events) = setup();
        let small = TradeRequest { sell_amount: 500, ..request() };
        let id = broker
            .open_trade(ORIGIN, &small, TradeKind::Dutch, &mut ledger, 0, &mut events)
            .unwrap();

        broker.report_violation(1, &mut events);
        assert!(broker.is_disabled());
        let reverse = TradeRequest { sell: BUY, buy: SELL, ..small };
        assert_eq!(
            broker.open_trade(ORIGIN, &reverse, TradeKind::Dutch, &mut ledger, 1, &mut events),
            Err(RTokenError::BrokerDisabled)
        );

        // The open trade still settles
        let end = broker::DEFAULT_DUTCH_AUCTION_LENGTH;
        assert_eq!(broker.settle(&id, &mut ledger, end, &mut events).unwrap(), (0, 0));
        assert_eq!(ledger.balance_of(&SELL, &ORIGIN), 1_000);

        broker.set_disabled(false, 2, &mut events);
        assert_eq!(broker.violations(), 0);
        assert_eq!(events.filter_by_type(rtoken_common::EventType::BrokerDisabledSet).len(), 2);
    }

    #[test]
    fn test_escrow_shortfall_counts_as_violation() {
        let (mut broker, mut ledger, mut events) = setup();
        broker
            .set_config(BrokerConfig { max_violations: 2, ..BrokerConfig::default() })
            .unwrap();
        let small = TradeRequest { sell_amount: 500, ..request() };
        let id = broker
            .open_trade(ORIGIN, &small, TradeKind::Batch, &mut ledger, 0, &mut events)
            .unwrap();

        // Escrow loses part of the lot
        ledger.burn(&SELL, &id, 1).unwrap();
        let end = broker::DEFAULT_BATCH_AUCTION_LENGTH;
        let shortfall = Err(RTokenError::InsufficientBalance { token: SELL, available: 499, requested: 500 });
        assert_eq!(broker.settle(&id, &mut ledger, end, &mut events), shortfall);
        assert_eq!(broker.violations(), 1);
        assert!(!broker.is_disabled());
        assert_eq!(broker.trade(&id).unwrap().status, TradeStatus::Open);
        assert_eq!(ledger.balance_of(&SELL, &id), 499);

        assert_eq!(broker.settle(&id, &mut ledger, end + 1, &mut events), shortfall);
        assert_eq!(broker.violations(), 2);
        assert!(broker.is_disabled());
        assert!(events.filter_by_type(rtoken_common::EventType::TradeSettled).is_empty());
    }

    #[test]
    fn test_same_token_rejected() {
        let (mut broker, mut ledger, mut events) = setup();
        let bad = TradeRequest { buy: SELL, ..request() };
        assert_eq!(
            broker.open_trade(ORIGIN, &bad, TradeKind::Batch, &mut ledger, 0, &mut events),
            Err(RTokenError::SameToken { token: SELL })
        );
    }

    #[test]
    fn test_config_bounds() {
        let config = BrokerConfig { dutch_auction_length: 1, ..BrokerConfig::default() };
        assert!(Broker::new(BROKER, config).is_err());
        let config = BrokerConfig { max_violations: 0, ..BrokerConfig::default() };
        assert!(config.validate().is_err());
    }
}
