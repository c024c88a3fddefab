//! Trades
//!
//! One auction selling a fixed lot of `sell` for `buy`. A trade is OPEN from
//! creation until settlement and CLOSED afterwards; once CLOSED its amounts
//! never change.
//!
//! ## Dutch Auction
//!
//! ```text
//! price(t) = start - (start - min) * (t - start_time) / (end_time - start_time)
//! ```
//!
//! The first bidder pays `price(t)` for the whole lot, which ends the auction.
//!
//! ## Batch Auction
//!
//! Bidders escrow `buy_amount` for `sell_amount` of the lot. At settlement
//! bids fill best rate first; every filled bidder pays the rate of the last
//! filled bid and the rest of its escrow is refunded.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use rtoken_common::{
    check, mul_div, Address, Fix, RTokenError, RTokenResult, RoundingMode, TokenId, TradeId,
    TradeKind, TradeStatus,
};

/// What the BackingManager wants sold
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct TradeRequest {
    pub sell: TokenId,
    pub buy: TokenId,
    /// Raw lot size
    pub sell_amount: u128,
    /// Worst acceptable proceeds for the whole lot
    pub min_buy_amount: u128,
    /// Proceeds at the most favorable plausible prices; Dutch start price
    pub best_buy_amount: u128,
}

/// A sealed batch bid
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct BatchBid {
    pub bidder: Address,
    /// Raw lot amount wanted
    pub sell_amount: u128,
    /// Raw buy tokens escrowed
    pub buy_amount: u128,
}

/// Outcome for one batch bidder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchFill {
    pub bidder: Address,
    /// Lot tokens received
    pub received: u128,
    /// Buy tokens kept by the auction
    pub paid: u128,
    /// Buy tokens returned
    pub refund: u128,
}

/// Result of clearing a batch auction
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchClearing {
    pub sold: u128,
    pub bought: u128,
    pub fills: Vec<BatchFill>,
}

/// One auction
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct Trade {
    /// Also the escrow account holding the lot and the bids
    pub id: TradeId,
    pub kind: TradeKind,
    /// Account that receives the proceeds
    pub origin: Address,
    pub sell: TokenId,
    pub buy: TokenId,
    pub sell_amount: u128,
    pub min_buy_amount: u128,
    pub start_buy_amount: u128,
    pub start_time: u64,
    pub end_time: u64,
    pub status: TradeStatus,
    pub bids: Vec<BatchBid>,
    /// Winner of a Dutch auction
    pub winner: Option<Address>,
    /// Lot amount sold, final once CLOSED
    pub sold: u128,
    /// Proceeds, final once CLOSED
    pub bought: u128,
}

impl Trade {
    /// Creates an OPEN trade from a request
    pub fn new(
        id: TradeId,
        kind: TradeKind,
        origin: Address,
        request: &TradeRequest,
        start_time: u64,
        auction_length: u64,
    ) -> Self {
        Self {
            id,
            kind,
            origin,
            sell: request.sell,
            buy: request.buy,
            sell_amount: request.sell_amount,
            min_buy_amount: request.min_buy_amount,
            start_buy_amount: request.best_buy_amount.max(request.min_buy_amount),
            start_time,
            end_time: start_time.saturating_add(auction_length),
            status: TradeStatus::Open,
            bids: Vec::new(),
            winner: None,
            sold: 0,
            bought: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    /// Escrow account of the trade
    pub fn escrow(&self) -> Address {
        self.id
    }

    /// True once the auction can be settled
    pub fn can_settle(&self, now: u64) -> bool {
        self.is_open() && (now >= self.end_time || self.winner.is_some())
    }

    /// Proceeds a Dutch bidder must pay at `now`; never below the floor
    pub fn dutch_price(&self, now: u64) -> RTokenResult<u128> {
        if now <= self.start_time {
            return Ok(self.start_buy_amount);
        }
        if now >= self.end_time {
            return Ok(self.min_buy_amount);
        }
        let spread = self.start_buy_amount - self.min_buy_amount;
        let elapsed = (now - self.start_time) as u128;
        let length = (self.end_time - self.start_time) as u128;
        let decay = mul_div(spread, elapsed, length, RoundingMode::Floor)?;
        Ok(self.start_buy_amount - decay)
    }

    /// Least buy amount a batch bid for `sell_amount` must offer
    pub fn min_bid(&self, sell_amount: u128) -> RTokenResult<u128> {
        mul_div(sell_amount, self.min_buy_amount, self.sell_amount, RoundingMode::Ceil)
    }

    /// Validates a batch bid against the lot and the floor rate
    pub fn check_batch_bid(&self, bid: &BatchBid, now: u64) -> RTokenResult<()> {
        check!(self.kind == TradeKind::Batch, RTokenError::WrongAuctionKind);
        check!(self.is_open(), RTokenError::TradeNotOpen { trade_id: self.id });
        check!(now < self.end_time, RTokenError::AuctionOver { ended_at: self.end_time });
        check!(bid.sell_amount > 0 && bid.buy_amount > 0, RTokenError::ZeroAmount);
        check!(
            bid.sell_amount <= self.sell_amount,
            RTokenError::InvalidParameter { param: "sell_amount", reason: "exceeds lot" }
        );
        let required = self.min_bid(bid.sell_amount)?;
        check!(
            bid.buy_amount >= required,
            RTokenError::BidTooLow { offered: bid.buy_amount, required }
        );
        Ok(())
    }

    /// Fills bids best rate first at the last filled bid's rate
    pub fn clear_batch(&self) -> RTokenResult<BatchClearing> {
        let mut ranked: Vec<(Fix, &BatchBid)> = Vec::with_capacity(self.bids.len());
        for bid in &self.bids {
            ranked.push((Fix::ratio(bid.buy_amount, bid.sell_amount, RoundingMode::Floor)?, bid));
        }
        // Stable: equal rates keep arrival order
        ranked.sort_by(|a, b| b.0.cmp(&a.0));

        let mut remaining = self.sell_amount;
        let mut filled: Vec<(&BatchBid, u128)> = Vec::new();
        for (_, bid) in &ranked {
            if remaining == 0 {
                break;
            }
            let take = bid.sell_amount.min(remaining);
            remaining -= take;
            filled.push((*bid, take));
        }

        let mut clearing = BatchClearing::default();
        let Some((marginal, _)) = filled.last().copied() else {
            clearing.fills = self.refunds_only();
            return Ok(clearing);
        };

        for (bid, take) in &filled {
            let paid = mul_div(*take, marginal.buy_amount, marginal.sell_amount, RoundingMode::Ceil)?
                .min(bid.buy_amount);
            clearing.sold += take;
            clearing.bought = clearing.bought.checked_add(paid).ok_or(RTokenError::Overflow)?;
            clearing.fills.push(BatchFill {
                bidder: bid.bidder,
                received: *take,
                paid,
                refund: bid.buy_amount - paid,
            });
        }
        for (_, bid) in ranked.iter().skip(filled.len()) {
            clearing.fills.push(BatchFill {
                bidder: bid.bidder,
                received: 0,
                paid: 0,
                refund: bid.buy_amount,
            });
        }
        Ok(clearing)
    }

    fn refunds_only(&self) -> Vec<BatchFill> {
        self.bids
            .iter()
            .map(|bid| BatchFill { bidder: bid.bidder, received: 0, paid: 0, refund: bid.buy_amount })
            .collect()
    }

    /// Serialize for storage
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }

    /// Deserialize from storage
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }
}
