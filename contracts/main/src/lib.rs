//! RToken Main
//!
//! Owns every component of one RToken and exposes the external entry points.
//!
//! ## Entry Points
//!
//! Every mutating call holds the re-entrancy guard for its whole duration
//! and either commits all of its effects or none of them. Work that can fail
//! halfway runs against staged copies of the broker, ledger and handlers and
//! is swapped in on success; its events are only published then.
//!
//! | call | who | effect |
//! |------|-----|--------|
//! | `refresh` | anyone | refresh every asset, track basket status |
//! | `refresh_basket` | owner, or anyone while DISABLED | reselect the basket |
//! | `poke` | anyone | refresh, reselect if DISABLED, one rebalancing round |
//! | `manage_tokens` | anyone | one rebalancing round |
//! | `settle_trade` | anyone | settle, then try another round |
//! | `issue` / `redeem` / `melt` | holders | supply changes |
//! | setters | owner | registry, basket and trading configuration |

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use rtoken_backing_manager::{BackingContext, BackingManager, ManageOutcome, TradingConfig};
use rtoken_basket_handler::{BasketHandler, BasketHandlerConfig};
use rtoken_broker::{BatchBid, Broker, BrokerConfig};
use rtoken_collateral::{AssetRegistry, RegisteredAsset};
use rtoken_common::validation::require_nonzero;
use rtoken_common::{
    check, short_hex, Address, CollateralStatus, EventLog, Fix, Ledger, RTokenError,
    RTokenEvent, RTokenResult, RTokenSupply, ReentrancyGuard, RoundingMode, TargetName, TokenId,
    TradeId,
};

#[cfg(test)]
mod integration_tests;

// ============ Deployment ============

/// Fixed identities of one RToken instance
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct Deployment {
    /// Governance
    pub owner: Address,
    /// The RToken itself
    pub rtoken: TokenId,
    /// Asset bought with revenue (the insurance token)
    pub revenue_token: TokenId,
    /// Account holding the backing collateral
    pub backing_manager: Address,
    /// Broker identity; seeds trade escrow addresses
    pub broker: Address,
}

/// Runtime parameters of every component
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize,
    BorshDeserialize,
)]
pub struct MainConfig {
    pub basket: BasketHandlerConfig,
    pub trading: TradingConfig,
    pub broker: BrokerConfig,
}

impl MainConfig {
    pub fn validate(&self) -> RTokenResult<()> {
        self.basket.validate()?;
        self.trading.validate()?;
        self.broker.validate()
    }
}

// ============ Main ============

pub struct Main {
    owner: Address,
    registry: AssetRegistry,
    basket_handler: BasketHandler,
    backing_manager: BackingManager,
    broker: Broker,
    ledger: Ledger,
    supply: RTokenSupply,
    guard: ReentrancyGuard,
    events: EventLog,
}

impl Main {
    pub fn new(deployment: Deployment, config: MainConfig) -> RTokenResult<Self> {
        config.validate()?;
        check!(
            deployment.backing_manager != deployment.owner,
            RTokenError::InvalidParameter { param: "backing_manager", reason: "same as owner" }
        );
        Ok(Self {
            owner: deployment.owner,
            registry: AssetRegistry::new(),
            basket_handler: BasketHandler::new(config.basket)?,
            backing_manager: BackingManager::new(
                deployment.backing_manager,
                deployment.revenue_token,
                config.trading,
            )?,
            broker: Broker::new(deployment.broker, config.broker)?,
            ledger: Ledger::new(),
            supply: RTokenSupply::new(deployment.rtoken),
            guard: ReentrancyGuard::new(),
            events: EventLog::new(),
        })
    }

    // ============ Accessors ============

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn registry(&self) -> &AssetRegistry {
        &self.registry
    }

    pub fn basket_handler(&self) -> &BasketHandler {
        &self.basket_handler
    }

    pub fn backing_manager(&self) -> &BackingManager {
        &self.backing_manager
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    pub fn supply(&self) -> &RTokenSupply {
        &self.supply
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Direct access to the token layer, for funding accounts
    pub fn ledger_mut(&mut self) -> &mut Ledger {
        &mut self.ledger
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn guard(&self) -> &ReentrancyGuard {
        &self.guard
    }

    fn only_owner(&self, caller: &Address) -> RTokenResult<()> {
        check!(*caller == self.owner, RTokenError::Unauthorized { caller: *caller });
        Ok(())
    }

    // ============ Views ============

    pub fn status(&self) -> CollateralStatus {
        self.basket_handler.status(&self.registry)
    }

    pub fn fully_collateralized(&self) -> RTokenResult<bool> {
        self.basket_handler.fully_collateralized(
            &self.backing_manager.address(),
            &self.registry,
            &self.ledger,
            &self.supply,
        )
    }

    /// Token amounts for `baskets` BUs
    pub fn quote(&self, baskets: Fix, rounding: RoundingMode) -> RTokenResult<Vec<(TokenId, u128)>> {
        self.basket_handler.quote(baskets, rounding, &self.registry)
    }

    pub fn baskets_held_by(&self, account: &Address) -> RTokenResult<Fix> {
        self.basket_handler.baskets_held_by(account, &self.registry, &self.ledger)
    }

    // ============ Keepers ============

    /// Refreshes every asset and records the basket status
    pub fn refresh(&mut self, now: u64) -> RTokenResult<()> {
        let _guard = self.guard.enter()?;
        self.refresh_assets(now);
        Ok(())
    }

    fn refresh_assets(&mut self, now: u64) {
        self.registry.refresh_all(now, &mut self.events);
        self.basket_handler.track_status(&self.registry, now);
    }

    /// Reselects the basket. Open to anyone once the basket is DISABLED.
    pub fn refresh_basket(&mut self, caller: Address, now: u64) -> RTokenResult<()> {
        let _guard = self.guard.enter()?;
        self.refresh_assets(now);
        if self.status() != CollateralStatus::Disabled {
            self.only_owner(&caller)?;
        }
        self.switch_basket(now)
    }

    fn switch_basket(&mut self, now: u64) -> RTokenResult<()> {
        let mut handler = self.basket_handler.clone();
        let mut events = EventLog::new();
        handler.refresh_basket(&self.registry, now, &mut events)?;
        self.basket_handler = handler;
        self.events.extend(events);
        Ok(())
    }

    /// Refresh, reselect a DISABLED basket, then one rebalancing round.
    /// Returns `None` when the round is deferred (warmup or trading delay).
    pub fn poke(&mut self, now: u64) -> RTokenResult<Option<ManageOutcome>> {
        let _guard = self.guard.enter()?;
        self.refresh_assets(now);
        if self.status() == CollateralStatus::Disabled {
            self.switch_basket(now)?;
        }
        match self.rebalance(now) {
            Ok(outcome) => Ok(Some(outcome)),
            Err(err) if err.is_recoverable() => {
                log::debug!("rebalancing deferred: {}", err.code());
                Ok(None)
            }
            Err(err) => {
                log_abort("poke", &err);
                Err(err)
            }
        }
    }

    /// One rebalancing round
    pub fn manage_tokens(&mut self, now: u64) -> RTokenResult<ManageOutcome> {
        let _guard = self.guard.enter()?;
        self.rebalance(now)
    }

    fn rebalance(&mut self, now: u64) -> RTokenResult<ManageOutcome> {
        let mut manager = self.backing_manager.clone();
        let mut broker = self.broker.clone();
        let mut ledger = self.ledger.clone();
        let mut events = EventLog::new();
        let mut ctx = BackingContext {
            registry: &self.registry,
            basket_handler: &self.basket_handler,
            broker: &mut broker,
            ledger: &mut ledger,
            supply: &self.supply,
            now,
            events: &mut events,
        };
        let outcome = manager.manage_tokens(&mut ctx)?;

        self.backing_manager = manager;
        self.broker = broker;
        self.ledger = ledger;
        self.events.extend(events);
        Ok(outcome)
    }

    /// Settles the trade selling `sell`, then tries to open the next one
    pub fn settle_trade(&mut self, sell: &TokenId, now: u64) -> RTokenResult<(u128, u128)> {
        let _guard = self.guard.enter()?;
        let mut manager = self.backing_manager.clone();
        let mut broker = self.broker.clone();
        let mut ledger = self.ledger.clone();
        let mut events = EventLog::new();
        let mut ctx = BackingContext {
            registry: &self.registry,
            basket_handler: &self.basket_handler,
            broker: &mut broker,
            ledger: &mut ledger,
            supply: &self.supply,
            now,
            events: &mut events,
        };
        let proceeds = match manager.settle_trade(sell, &mut ctx) {
            Ok(proceeds) => proceeds,
            Err(err) => {
                // The broker's violation count survives the rollback
                self.broker.replay_violations(&broker, now, &mut self.events);
                return Err(err);
            }
        };

        self.backing_manager = manager;
        self.broker = broker;
        self.ledger = ledger;
        self.events.extend(events);

        if let Err(err) = self.rebalance(now) {
            log::debug!("no follow-up trade after settling {}", short_hex(sell));
            log_abort("follow-up round", &err);
        }
        Ok(proceeds)
    }

    // ============ Auctions ============

    /// Takes a Dutch lot at its current price; returns the amount paid
    pub fn bid_dutch(&mut self, bidder: Address, trade_id: &TradeId, now: u64) -> RTokenResult<u128> {
        let _guard = self.guard.enter()?;
        self.broker.bid_dutch(trade_id, bidder, &mut self.ledger, now, &mut self.events)
    }

    /// Escrows a sealed batch-auction bid
    pub fn bid_batch(&mut self, trade_id: &TradeId, bid: BatchBid, now: u64) -> RTokenResult<()> {
        let _guard = self.guard.enter()?;
        self.broker.bid_batch(trade_id, bid, &mut self.ledger, now, &mut self.events)
    }

    // ============ Issuance ============

    /// Deposits the basket for `amount` RToken and mints it to `account`.
    /// Collateral owed rounds up. Returns the deposited amounts.
    pub fn issue(
        &mut self,
        account: Address,
        amount: u128,
        now: u64,
    ) -> RTokenResult<Vec<(TokenId, u128)>> {
        let _guard = self.guard.enter()?;

        // 1. Basket must be SOUND and warmed up
        require_nonzero(amount)?;
        check!(
            self.basket_handler.is_ready(&self.registry, now),
            RTokenError::BasketNotReady
        );

        // 2. Quote the deposit
        let baskets = self.basket_handler.to_bus(&self.supply, amount, RoundingMode::Ceil)?;
        let deposits = self.basket_handler.quote(baskets, RoundingMode::Ceil, &self.registry)?;

        // 3. Stage transfers and mint
        let backing = self.backing_manager.address();
        let mut ledger = self.ledger.clone();
        for (token, owed) in &deposits {
            ledger.transfer(token, &account, &backing, *owed)?;
        }
        ledger.mint(&self.supply.token, &account, amount)?;
        let mut supply = self.supply.clone();
        supply.record_issue(amount)?;
        check_supply(&ledger, &supply)?;

        // 4. Commit
        self.ledger = ledger;
        self.supply = supply;
        log::info!("issued {} to {} ({} BUs)", amount, short_hex(&account), baskets);
        self.events.emit(RTokenEvent::Issuance { account, amount, baskets, timestamp: now });
        Ok(deposits)
    }

    /// Burns `amount` RToken from `account` and pays out its share of the
    /// basket. Payouts round down. Returns the withdrawn amounts.
    pub fn redeem(
        &mut self,
        account: Address,
        amount: u128,
        now: u64,
    ) -> RTokenResult<Vec<(TokenId, u128)>> {
        let _guard = self.guard.enter()?;

        // 1. Only a fully backed RToken can be redeemed
        require_nonzero(amount)?;
        check!(self.fully_collateralized()?, RTokenError::NotFullyCollateralized);

        // 2. Quote the payout
        let baskets = self.basket_handler.to_bus(&self.supply, amount, RoundingMode::Floor)?;
        let payouts = self.basket_handler.quote(baskets, RoundingMode::Floor, &self.registry)?;

        // 3. Stage burn and transfers
        let backing = self.backing_manager.address();
        let mut ledger = self.ledger.clone();
        ledger.burn(&self.supply.token, &account, amount)?;
        for (token, paid) in &payouts {
            ledger.transfer(token, &backing, &account, *paid).map_err(|err| {
                log_abort("redeem", &err);
                err
            })?;
        }
        let mut supply = self.supply.clone();
        supply.record_redeem(amount, baskets)?;
        check_supply(&ledger, &supply)?;

        // 4. Commit
        self.ledger = ledger;
        self.supply = supply;
        log::info!("redeemed {} from {} ({} BUs)", amount, short_hex(&account), baskets);
        self.events.emit(RTokenEvent::Redemption { account, amount, baskets, timestamp: now });
        Ok(payouts)
    }

    /// Burns `amount` of the caller's RToken, leaving the BUs owed unchanged
    pub fn melt(&mut self, caller: Address, amount: u128, now: u64) -> RTokenResult<()> {
        let _guard = self.guard.enter()?;
        require_nonzero(amount)?;

        let mut ledger = self.ledger.clone();
        ledger.burn(&self.supply.token, &caller, amount)?;
        let mut supply = self.supply.clone();
        supply.melt(amount)?;
        check_supply(&ledger, &supply)?;

        self.ledger = ledger;
        self.supply = supply;
        log::info!("melted {} from {}", amount, short_hex(&caller));
        self.events.emit(RTokenEvent::Melted {
            amount,
            new_supply: self.supply.supply,
            timestamp: now,
        });
        Ok(())
    }

    // ============ Governance ============

    pub fn register_asset(
        &mut self,
        caller: Address,
        asset: impl Into<RegisteredAsset>,
        now: u64,
    ) -> RTokenResult<()> {
        let _guard = self.guard.enter()?;
        self.only_owner(&caller)?;
        self.registry.register(asset, now, &mut self.events)
    }

    /// Replaces the plugin behind an already registered token
    pub fn swap_registered(
        &mut self,
        caller: Address,
        asset: impl Into<RegisteredAsset>,
        now: u64,
    ) -> RTokenResult<()> {
        let _guard = self.guard.enter()?;
        self.only_owner(&caller)?;
        self.registry.swap_registered(asset, now, &mut self.events)?;
        self.basket_handler.track_status(&self.registry, now);
        Ok(())
    }

    /// Removes an asset. A basket member going away leaves the basket
    /// DISABLED until the next `refresh_basket`.
    pub fn unregister_asset(&mut self, caller: Address, token: &TokenId, now: u64) -> RTokenResult<()> {
        let _guard = self.guard.enter()?;
        self.only_owner(&caller)?;
        self.registry.unregister(token, now, &mut self.events)?;
        self.basket_handler.track_status(&self.registry, now);
        Ok(())
    }

    pub fn set_prime_basket(
        &mut self,
        caller: Address,
        tokens: &[TokenId],
        target_amts: &[Fix],
        now: u64,
    ) -> RTokenResult<()> {
        let _guard = self.guard.enter()?;
        self.only_owner(&caller)?;
        self.basket_handler
            .set_prime_basket(tokens, target_amts, &self.registry, now, &mut self.events)
    }

    pub fn set_backup_config(
        &mut self,
        caller: Address,
        target: TargetName,
        max: u32,
        erc20s: &[TokenId],
        now: u64,
    ) -> RTokenResult<()> {
        let _guard = self.guard.enter()?;
        self.only_owner(&caller)?;
        self.basket_handler
            .set_backup_config(target, max, erc20s, &self.registry, now, &mut self.events)
    }

    pub fn set_warmup_period(&mut self, caller: Address, warmup_period: u64) -> RTokenResult<()> {
        let _guard = self.guard.enter()?;
        self.only_owner(&caller)?;
        self.basket_handler.set_warmup_period(warmup_period)
    }

    pub fn set_trading_config(&mut self, caller: Address, config: TradingConfig) -> RTokenResult<()> {
        let _guard = self.guard.enter()?;
        self.only_owner(&caller)?;
        self.backing_manager.set_config(config)
    }

    pub fn set_broker_config(&mut self, caller: Address, config: BrokerConfig) -> RTokenResult<()> {
        let _guard = self.guard.enter()?;
        self.only_owner(&caller)?;
        self.broker.set_config(config)
    }

    pub fn set_broker_disabled(&mut self, caller: Address, disabled: bool, now: u64) -> RTokenResult<()> {
        let _guard = self.guard.enter()?;
        self.only_owner(&caller)?;
        self.broker.set_disabled(disabled, now, &mut self.events);
        Ok(())
    }
}

// ============ Accounting Checks ============

/// RToken on the ledger must match the supply record
fn check_supply(ledger: &Ledger, supply: &RTokenSupply) -> RTokenResult<()> {
    let minted = ledger.total_supply(&supply.token);
    if minted != supply.supply {
        let err = RTokenError::SupplyMismatch { ledger: minted, recorded: supply.supply };
        log_abort("supply check", &err);
        return Err(err);
    }
    Ok(())
}

/// Broken accounting is an error; anything else is routine
fn log_abort(op: &str, err: &RTokenError) {
    if err.is_invariant_violation() {
        log::error!("{op} aborted on broken accounting: {err} ({})", err.code());
    } else {
        log::debug!("{op} aborted: {}", err.code());
    }
}
