//! Basket Handler
//!
//! Owns the current [`Basket`] and its lifecycle: governance configures a
//! prime basket and per-target backup lists, and `refresh_basket` derives the
//! basket actually in force.
//!
//! ## Selection
//!
//! 1. Prime members that are registered, collateral and SOUND keep their
//!    configured weight: `ref_amt = target_amt / target_per_ref`.
//! 2. The weight of every other prime member is pooled per target name.
//! 3. Each pooled target is split equally across the first `max` good
//!    backups of that target, in configured order.
//! 4. A target with pooled weight and no good backup leaves the handler
//!    disabled; the previous basket stays in storage but is never quoted.
//!
//! The new basket is built aside and committed in one assignment.
//!
//! ## Rounding
//!
//! Quantities owed to the protocol round up, quantities paid out round down.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use rtoken_collateral::{AssetRegistry, Collateral};
use rtoken_common::constants::basket;
use rtoken_common::validation::{
    require_max_fix, require_positive_fix, require_range_u64, require_same_len, require_unique,
};
use rtoken_common::{
    check, short_hex, Address, CollateralStatus, EventLog, Fix, Ledger, Price, RTokenError,
    RTokenEvent, RTokenResult, RTokenSupply, RoundingMode, TargetName, TokenId, FIX_MAX, FIX_ZERO,
};

use crate::basket::Basket;

// ============================================================================
// Configuration
// ============================================================================

/// Runtime parameters of the basket handler
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct BasketHandlerConfig {
    /// Seconds the basket must stay SOUND before issuance and trading resume
    pub warmup_period: u64,
}

impl Default for BasketHandlerConfig {
    fn default() -> Self {
        Self { warmup_period: basket::DEFAULT_WARMUP_PERIOD }
    }
}

impl BasketHandlerConfig {
    pub fn validate(&self) -> RTokenResult<()> {
        require_range_u64(
            self.warmup_period,
            basket::MIN_WARMUP_PERIOD,
            basket::MAX_WARMUP_PERIOD,
            "warmup_period",
        )
    }
}

/// One prime basket member
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct PrimeEntry {
    pub token: TokenId,
    pub target_name: TargetName,
    /// Target units per BU
    pub target_amt: Fix,
}

/// Emergency candidates for one target name
#[derive(
    Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct BackupConfig {
    /// Most backups used at once
    pub max: u32,
    /// Candidates in order of preference
    pub erc20s: Vec<TokenId>,
}

// ============================================================================
// Handler
// ============================================================================

/// Basket state machine
#[derive(
    Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct BasketHandler {
    config: BasketHandlerConfig,
    prime: Vec<PrimeEntry>,
    backups: BTreeMap<TargetName, BackupConfig>,
    basket: Basket,
    disabled: bool,
    last_status: CollateralStatus,
    last_status_timestamp: u64,
}

/// Good collateral: registered, collateral, SOUND, and pegged to `target`
fn good_collateral<'a>(
    registry: &'a AssetRegistry,
    token: &TokenId,
    target: TargetName,
) -> Option<&'a Collateral> {
    registry
        .to_collateral(token)
        .ok()
        .filter(|coll| coll.status() == CollateralStatus::Sound && coll.target_name() == target)
}

impl BasketHandler {
    /// Handler with no basket; reports DISABLED until the first switch
    pub fn new(config: BasketHandlerConfig) -> RTokenResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            disabled: true,
            last_status: CollateralStatus::Disabled,
            ..Self::default()
        })
    }

    pub fn config(&self) -> &BasketHandlerConfig {
        &self.config
    }

    pub fn basket(&self) -> &Basket {
        &self.basket
    }

    pub fn nonce(&self) -> u64 {
        self.basket.nonce
    }

    pub fn timestamp(&self) -> u64 {
        self.basket.timestamp
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn prime(&self) -> &[PrimeEntry] {
        &self.prime
    }

    pub fn backup_config(&self, target: &TargetName) -> Option<&BackupConfig> {
        self.backups.get(target)
    }

    pub fn last_status_timestamp(&self) -> u64 {
        self.last_status_timestamp
    }

    // ========================================================================
    // Governance
    // ========================================================================

    pub fn set_warmup_period(&mut self, warmup_period: u64) -> RTokenResult<()> {
        let config = BasketHandlerConfig { warmup_period };
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Sets the prime basket. Takes effect at the next `refresh_basket`.
    pub fn set_prime_basket(
        &mut self,
        tokens: &[TokenId],
        target_amts: &[Fix],
        registry: &AssetRegistry,
        now: u64,
        events: &mut EventLog,
    ) -> RTokenResult<()> {
        require_same_len(tokens.len(), target_amts.len())?;
        check!(!tokens.is_empty(), RTokenError::EmptyBasket);
        check!(
            tokens.len() <= basket::MAX_BASKET_SIZE,
            RTokenError::TooManyTokens { count: tokens.len(), max: basket::MAX_BASKET_SIZE }
        );
        require_unique(tokens)?;

        let mut prime = Vec::with_capacity(tokens.len());
        for (token, target_amt) in tokens.iter().zip(target_amts) {
            require_positive_fix(*target_amt, "target_amt")?;
            require_max_fix(*target_amt, basket::MAX_TARGET_AMT_RAW, "target_amt")?;
            let coll = registry.to_collateral(token)?;
            prime.push(PrimeEntry {
                token: *token,
                target_name: coll.target_name(),
                target_amt: *target_amt,
            });
        }

        log::info!("prime basket set with {} members", prime.len());
        self.prime = prime;
        events.emit(RTokenEvent::PrimeBasketSet {
            tokens: tokens.to_vec(),
            target_amts: target_amts.to_vec(),
            timestamp: now,
        });
        Ok(())
    }

    /// Sets the backup list of one target name
    pub fn set_backup_config(
        &mut self,
        target: TargetName,
        max: u32,
        erc20s: &[TokenId],
        registry: &AssetRegistry,
        now: u64,
        events: &mut EventLog,
    ) -> RTokenResult<()> {
        check!(
            erc20s.len() <= basket::MAX_BACKUP_ERC20S,
            RTokenError::TooManyTokens { count: erc20s.len(), max: basket::MAX_BACKUP_ERC20S }
        );
        require_unique(erc20s)?;
        for token in erc20s {
            let coll = registry.to_collateral(token)?;
            check!(
                coll.target_name() == target,
                RTokenError::InvalidParameter { param: "erc20s", reason: "target name mismatch" }
            );
        }

        log::info!("backup config for {}: max {} of {}", target, max, erc20s.len());
        self.backups.insert(target, BackupConfig { max, erc20s: erc20s.to_vec() });
        events.emit(RTokenEvent::BackupConfigSet {
            target_name: target,
            max,
            tokens: erc20s.to_vec(),
            timestamp: now,
        });
        Ok(())
    }

    /// Target name -> total target units per BU of the prime basket
    pub fn prime_target_weights(&self) -> BTreeMap<TargetName, Fix> {
        let mut weights: BTreeMap<TargetName, Fix> = BTreeMap::new();
        for entry in &self.prime {
            let weight = weights.entry(entry.target_name).or_default();
            *weight = weight.plus(entry.target_amt).unwrap_or(FIX_MAX);
        }
        weights
    }

    // ========================================================================
    // Selection
    // ========================================================================

    /// Derives the basket from prime and backups and commits it, or marks the
    /// handler disabled when some target cannot be filled
    pub fn refresh_basket(
        &mut self,
        registry: &AssetRegistry,
        now: u64,
        events: &mut EventLog,
    ) -> RTokenResult<()> {
        match self.select(registry)? {
            Some(mut next) => {
                next.nonce = self.basket.nonce.saturating_add(1);
                next.timestamp = now;
                log::info!("basket {} set with {} members", next.nonce, next.len());
                events.emit(RTokenEvent::BasketSet {
                    nonce: next.nonce,
                    tokens: next.tokens(),
                    ref_amts: next.ref_amts(),
                    disabled: false,
                    timestamp: now,
                });
                self.basket = next;
                self.disabled = false;
            }
            None => {
                log::warn!("no valid basket; basket handler disabled");
                events.emit(RTokenEvent::BasketSet {
                    nonce: self.basket.nonce,
                    tokens: Vec::new(),
                    ref_amts: Vec::new(),
                    disabled: true,
                    timestamp: now,
                });
                self.disabled = true;
            }
        }
        self.track_status(registry, now);
        Ok(())
    }

    fn select(&self, registry: &AssetRegistry) -> RTokenResult<Option<Basket>> {
        if self.prime.is_empty() {
            return Ok(None);
        }

        let mut next = Basket::new();
        let mut unsound: BTreeMap<TargetName, Fix> = BTreeMap::new();
        for entry in &self.prime {
            match good_collateral(registry, &entry.token, entry.target_name) {
                Some(coll) => {
                    let ref_amt = entry.target_amt.div(coll.target_per_ref(), RoundingMode::Ceil)?;
                    next.add(entry.token, ref_amt)?;
                }
                None => {
                    let weight = unsound.entry(entry.target_name).or_default();
                    *weight = weight.plus(entry.target_amt)?;
                }
            }
        }

        for (target, weight) in unsound {
            let chosen: Vec<&Collateral> = self
                .backups
                .get(&target)
                .map(|config| {
                    config
                        .erc20s
                        .iter()
                        .filter_map(|token| good_collateral(registry, token, target))
                        .take(config.max as usize)
                        .collect()
                })
                .unwrap_or_default();
            if chosen.is_empty() {
                log::warn!("target {} has no sound collateral", target);
                return Ok(None);
            }

            let share = weight.div_int(chosen.len() as u128, RoundingMode::Ceil)?;
            for coll in chosen {
                let ref_amt = share.div(coll.target_per_ref(), RoundingMode::Ceil)?;
                log::debug!("backup {} takes {} {}", short_hex(&coll.token()), ref_amt, target);
                next.add(coll.token(), ref_amt)?;
            }
        }

        check!(
            next.len() <= basket::MAX_BASKET_SIZE,
            RTokenError::TooManyTokens { count: next.len(), max: basket::MAX_BASKET_SIZE }
        );
        Ok(Some(next))
    }

    // ========================================================================
    // Status
    // ========================================================================

    /// Worst status across the basket; a disabled handler or a member that is
    /// no longer registered collateral reports DISABLED
    pub fn status(&self, registry: &AssetRegistry) -> CollateralStatus {
        if self.disabled || self.basket.is_empty() {
            return CollateralStatus::Disabled;
        }
        self.basket
            .entries()
            .iter()
            .map(|entry| registry.status_of(&entry.token))
            .fold(CollateralStatus::Sound, CollateralStatus::worst)
    }

    /// Records when the status last changed; drives the warmup period
    pub fn track_status(&mut self, registry: &AssetRegistry, now: u64) {
        let status = self.status(registry);
        if status != self.last_status {
            log::info!("basket status {:?} -> {:?}", self.last_status, status);
            self.last_status = status;
            self.last_status_timestamp = now;
        }
    }

    /// SOUND, and SOUND for at least the warmup period
    pub fn is_ready(&self, registry: &AssetRegistry, now: u64) -> bool {
        self.last_status == CollateralStatus::Sound
            && self.status(registry) == CollateralStatus::Sound
            && now >= self.last_status_timestamp.saturating_add(self.config.warmup_period)
    }

    // ========================================================================
    // Conversions
    // ========================================================================

    /// Whole tokens per BU: `ref_amt / refPerTok`, rounded per `rounding`
    pub fn quantity(
        &self,
        token: &TokenId,
        registry: &AssetRegistry,
        rounding: RoundingMode,
    ) -> RTokenResult<Fix> {
        let Some(ref_amt) = self.basket.ref_amt(token) else {
            return Ok(FIX_ZERO);
        };
        let Ok(coll) = registry.to_collateral(token) else {
            return Ok(FIX_ZERO);
        };
        let ref_per_tok = coll.ref_per_tok();
        if ref_per_tok.is_zero() {
            return Ok(FIX_MAX);
        }
        ref_amt.div(ref_per_tok, rounding)
    }

    /// Price range of one BU; unpriced when any member is
    pub fn price(&self, registry: &AssetRegistry, now: u64) -> RTokenResult<Price> {
        if self.disabled || self.basket.is_empty() {
            return Ok(Price::UNPRICED);
        }
        let mut low = FIX_ZERO;
        let mut high = FIX_ZERO;
        for entry in self.basket.entries() {
            let qty = self.quantity(&entry.token, registry, RoundingMode::Ceil)?;
            let price = match registry.to_asset(&entry.token) {
                Ok(asset) => asset.price(now),
                Err(_) => Price::UNPRICED,
            };
            low = low.plus(qty.mul(price.low, RoundingMode::Floor).unwrap_or(FIX_ZERO))?;
            if high != FIX_MAX {
                high = match qty.mul(price.high, RoundingMode::Ceil) {
                    Ok(value) if price.high != FIX_MAX => high.plus(value).unwrap_or(FIX_MAX),
                    _ => FIX_MAX,
                };
            }
        }
        Ok(Price::new(low, high))
    }

    /// Raw token amounts for `amount` BUs, rounded per `rounding`
    pub fn quote(
        &self,
        amount: Fix,
        rounding: RoundingMode,
        registry: &AssetRegistry,
    ) -> RTokenResult<Vec<(TokenId, u128)>> {
        check!(!self.disabled && !self.basket.is_empty(), RTokenError::BasketDisabled);
        self.basket
            .entries()
            .iter()
            .map(|entry| -> RTokenResult<(TokenId, u128)> {
                let asset = registry.to_asset(&entry.token)?;
                let qty = self.quantity(&entry.token, registry, rounding)?;
                let tokens = amount.mul(qty, rounding)?;
                Ok((entry.token, tokens.to_amount(asset.decimals(), rounding)?))
            })
            .collect()
    }

    /// Whole BUs `account` could redeem from its balances, rounded down
    pub fn baskets_held_by(
        &self,
        account: &Address,
        registry: &AssetRegistry,
        ledger: &Ledger,
    ) -> RTokenResult<Fix> {
        if self.disabled || self.basket.is_empty() {
            return Ok(FIX_ZERO);
        }
        let mut held = FIX_MAX;
        for entry in self.basket.entries() {
            let Ok(asset) = registry.to_asset(&entry.token) else {
                return Ok(FIX_ZERO);
            };
            let qty = self.quantity(&entry.token, registry, RoundingMode::Ceil)?;
            if qty == FIX_MAX {
                return Ok(FIX_ZERO);
            }
            let balance = ledger.balance_of(&entry.token, account);
            let balance = Fix::from_amount(balance, asset.decimals()).unwrap_or(FIX_MAX);
            let baskets = balance.div(qty, RoundingMode::Floor).unwrap_or(FIX_MAX);
            held = held.min(baskets);
        }
        Ok(held)
    }

    /// RToken amount to BUs at the current base factor
    pub fn to_bus(
        &self,
        supply: &RTokenSupply,
        amount: u128,
        rounding: RoundingMode,
    ) -> RTokenResult<Fix> {
        supply.to_bus(amount, rounding)
    }

    /// BUs to an RToken amount at the current base factor
    pub fn from_bus(
        &self,
        supply: &RTokenSupply,
        baskets: Fix,
        rounding: RoundingMode,
    ) -> RTokenResult<u128> {
        supply.from_bus(baskets, rounding)
    }

    /// True iff `holder` has every member for all BUs owed to RToken holders
    pub fn fully_collateralized(
        &self,
        holder: &Address,
        registry: &AssetRegistry,
        ledger: &Ledger,
        supply: &RTokenSupply,
    ) -> RTokenResult<bool> {
        if self.disabled || self.basket.is_empty() {
            return Ok(false);
        }
        Ok(self.baskets_held_by(holder, registry, ledger)? >= supply.baskets_needed()?)
    }
}
