//! Backing Manager
//!
//! Holds the collateral behind the RToken and keeps it aligned with the
//! current basket, one trade per invocation.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use rtoken_basket_handler::BasketHandler;
use rtoken_broker::{Broker, TradeRequest};
use rtoken_collateral::AssetRegistry;
use rtoken_common::{
    check, short_hex, Address, EventLog, Ledger, RTokenError, RTokenResult, RTokenSupply,
    TokenId, TradeId,
};

use crate::trading::{collect_holdings, pick_largest, prepare_trade, Holding, TradingConfig};

// ============================================================================
// Context
// ============================================================================

/// Everything one rebalancing round reads or writes
pub struct BackingContext<'a> {
    pub registry: &'a AssetRegistry,
    pub basket_handler: &'a BasketHandler,
    pub broker: &'a mut Broker,
    pub ledger: &'a mut Ledger,
    pub supply: &'a RTokenSupply,
    /// Current timestamp
    pub now: u64,
    pub events: &'a mut EventLog,
}

/// Result of one `manage_tokens` round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManageOutcome {
    /// A trade was handed to the broker
    TradeOpened { trade_id: TradeId, request: TradeRequest },
    /// Nothing to do this round
    Idle(IdleReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleReason {
    /// Broker refuses new trades
    BrokerDisabled,
    /// Recollateralization waits for open trades to settle
    TradesOpen,
    /// No priced, non-dust pair to trade
    NothingToTrade,
}

// ============================================================================
// Backing Manager
// ============================================================================

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct BackingManager {
    address: Address,
    config: TradingConfig,
    revenue_token: TokenId,
    /// Open trades started by this manager, keyed by sell token
    trades: BTreeMap<TokenId, TradeId>,
}

impl BackingManager {
    pub fn new(address: Address, revenue_token: TokenId, config: TradingConfig) -> RTokenResult<Self> {
        config.validate()?;
        Ok(Self { address, config, revenue_token, trades: BTreeMap::new() })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn config(&self) -> &TradingConfig {
        &self.config
    }

    pub fn revenue_token(&self) -> TokenId {
        self.revenue_token
    }

    /// Open trade selling `sell`, if any
    pub fn trade_for(&self, sell: &TokenId) -> Option<TradeId> {
        self.trades.get(sell).copied()
    }

    pub fn open_trade_count(&self) -> usize {
        self.trades.len()
    }

    pub fn set_config(&mut self, config: TradingConfig) -> RTokenResult<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    // ========================================================================
    // Rebalancing
    // ========================================================================

    /// Opens at most one trade moving holdings toward the basket
    pub fn manage_tokens(&mut self, ctx: &mut BackingContext<'_>) -> RTokenResult<ManageOutcome> {
        // 1. Basket must be SOUND and warmed up
        check!(
            ctx.basket_handler.is_ready(ctx.registry, ctx.now),
            RTokenError::BasketNotReady
        );

        // 2. Let markets settle after a basket switch
        let until = ctx.basket_handler.timestamp().saturating_add(self.config.trading_delay);
        check!(ctx.now >= until, RTokenError::TradingDelayed { until });

        // 3. Broker must accept trades
        if ctx.broker.is_disabled() {
            return Ok(ManageOutcome::Idle(IdleReason::BrokerDisabled));
        }

        // 4. Pick the path
        let collateralized = ctx.basket_handler.fully_collateralized(
            &self.address,
            ctx.registry,
            ctx.ledger,
            ctx.supply,
        )?;
        let request = if collateralized {
            self.revenue_trade(ctx)?
        } else {
            if !self.trades.is_empty() {
                log::debug!("recollateralization waits on {} open trades", self.trades.len());
                return Ok(ManageOutcome::Idle(IdleReason::TradesOpen));
            }
            self.recollateralization_trade(ctx)?
        };
        let Some(request) = request else {
            return Ok(ManageOutcome::Idle(IdleReason::NothingToTrade));
        };

        // 5. Hand the lot to the broker
        let trade_id = ctx.broker.open_trade(
            self.address,
            &request,
            self.config.auction_kind,
            ctx.ledger,
            ctx.now,
            ctx.events,
        )?;
        self.trades.insert(request.sell, trade_id);
        Ok(ManageOutcome::TradeOpened { trade_id, request })
    }

    /// Sells the largest surplus to cover the largest deficit
    fn recollateralization_trade(&self, ctx: &BackingContext<'_>) -> RTokenResult<Option<TradeRequest>> {
        let holdings = self.holdings(ctx)?;
        let Some(buy) = pick_largest(&holdings, Holding::deficit_value) else {
            log::debug!("undercollateralized with no priced deficit");
            return Ok(None);
        };
        let sellable = holdings.iter().filter(|h| h.token != buy.token);
        let Some(sell) = pick_largest(sellable, Holding::surplus_value) else {
            log::warn!("no surplus left to cover deficit in {}", short_hex(&buy.token));
            return Ok(None);
        };
        prepare_trade(sell, buy, true, &self.config)
    }

    /// Sells the largest surplus for the revenue token
    fn revenue_trade(&self, ctx: &BackingContext<'_>) -> RTokenResult<Option<TradeRequest>> {
        let holdings = self.holdings(ctx)?;
        let Some(buy) = holdings.iter().find(|h| h.token == self.revenue_token) else {
            log::debug!("revenue token {} not registered", short_hex(&self.revenue_token));
            return Ok(None);
        };
        let sellable = holdings.iter().filter(|h| {
            h.token != self.revenue_token
                && !self.trades.contains_key(&h.token)
                && ctx.broker.open_trade_for(&h.token).is_none()
        });
        let Some(sell) = pick_largest(sellable, Holding::surplus_value) else {
            return Ok(None);
        };
        prepare_trade(sell, buy, false, &self.config)
    }

    fn holdings(&self, ctx: &BackingContext<'_>) -> RTokenResult<Vec<Holding>> {
        collect_holdings(
            &self.address,
            ctx.supply.baskets_needed()?,
            self.config.backing_buffer,
            ctx.registry,
            ctx.basket_handler,
            ctx.ledger,
            ctx.now,
        )
    }

    /// Settles the open trade selling `sell`; returns `(sold, bought)`
    pub fn settle_trade(
        &mut self,
        sell: &TokenId,
        ctx: &mut BackingContext<'_>,
    ) -> RTokenResult<(u128, u128)> {
        let trade_id = self.trade_for(sell).ok_or(RTokenError::NoOpenTrade { sell: *sell })?;
        let proceeds = ctx.broker.settle(&trade_id, ctx.ledger, ctx.now, ctx.events)?;
        self.trades.remove(sell);
        Ok(proceeds)
    }
}
