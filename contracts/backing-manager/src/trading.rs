//! Trade Sizing
//!
//! Pure helpers that turn balances, basket quantities and price ranges into
//! surplus/deficit figures and trade requests.
//!
//! ## Worst-Case Floor
//!
//! ```text
//! min_buy = sell_amount * sell.low / buy.high * (1 - max_trade_slippage)
//! ```
//!
//! Sales are valued at the sell token's low price and purchases at the buy
//! token's high price, so the floor holds for every price in both ranges.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use rtoken_basket_handler::BasketHandler;
use rtoken_broker::TradeRequest;
use rtoken_collateral::AssetRegistry;
use rtoken_common::constants::trading;
use rtoken_common::validation::{require_below_fix, require_max_fix, require_max_u64};
use rtoken_common::{
    Address, Fix, Ledger, Price, RTokenResult, RoundingMode, TokenId, TradeKind, FIX_MAX, FIX_ONE,
    FIX_ZERO,
};

// ============================================================================
// Configuration
// ============================================================================

/// Rebalancing parameters
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct TradingConfig {
    /// Seconds after a basket switch before trades may open
    pub trading_delay: u64,
    /// Over-collateralization kept before a basket member counts as surplus
    pub backing_buffer: Fix,
    /// Slippage tolerated below the worst-case rate
    pub max_trade_slippage: Fix,
    /// Smallest trade worth opening (UoA)
    pub min_trade_volume: Fix,
    /// Auction mechanism for new trades
    pub auction_kind: TradeKind,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            trading_delay: trading::DEFAULT_TRADING_DELAY,
            backing_buffer: Fix::from_raw(trading::DEFAULT_BACKING_BUFFER_RAW),
            max_trade_slippage: Fix::from_raw(trading::DEFAULT_MAX_TRADE_SLIPPAGE_RAW),
            min_trade_volume: Fix::from_raw(trading::DEFAULT_MIN_TRADE_VOLUME_RAW),
            auction_kind: TradeKind::Dutch,
        }
    }
}

impl TradingConfig {
    pub fn validate(&self) -> RTokenResult<()> {
        require_max_u64(self.trading_delay, trading::MAX_TRADING_DELAY, "trading_delay")?;
        require_max_fix(self.backing_buffer, trading::MAX_BACKING_BUFFER_RAW, "backing_buffer")?;
        require_below_fix(
            self.max_trade_slippage,
            trading::MAX_TRADE_SLIPPAGE_RAW,
            "max_trade_slippage",
        )?;
        require_max_fix(
            self.min_trade_volume,
            trading::MAX_MIN_TRADE_VOLUME_RAW,
            "min_trade_volume",
        )
    }
}

// ============================================================================
// Holdings
// ============================================================================

/// One registered asset as seen by the rebalancing loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Holding {
    pub token: TokenId,
    pub decimals: u8,
    pub price: Price,
    pub max_trade_volume: Fix,
    pub in_basket: bool,
    /// Whole tokens beyond what the basket needs plus the buffer
    pub surplus: Fix,
    /// Whole tokens missing for the basket
    pub deficit: Fix,
}

impl Holding {
    /// Surplus valued at the low price; zero when the low price is unknown
    pub fn surplus_value(&self) -> Fix {
        if !self.price.has_low() {
            return FIX_ZERO;
        }
        self.surplus.mul(self.price.low, RoundingMode::Floor).unwrap_or(FIX_MAX)
    }

    /// Deficit valued at the high price; zero when the high price is unknown
    pub fn deficit_value(&self) -> Fix {
        if !self.price.has_high() {
            return FIX_ZERO;
        }
        self.deficit.mul(self.price.high, RoundingMode::Ceil).unwrap_or(FIX_MAX)
    }
}

/// Surplus and deficit of every registered asset held by `holder`, in
/// registration order. Assets whose quantity is undefined or whose balance
/// does not fit a `Fix` are skipped.
pub fn collect_holdings(
    holder: &Address,
    baskets_needed: Fix,
    backing_buffer: Fix,
    registry: &AssetRegistry,
    handler: &BasketHandler,
    ledger: &Ledger,
    now: u64,
) -> RTokenResult<Vec<Holding>> {
    let buffer_factor = FIX_ONE.plus(backing_buffer)?;
    let mut holdings = Vec::with_capacity(registry.len());
    for asset in registry.iter() {
        let token = asset.token();
        let Ok(held) = Fix::from_amount(ledger.balance_of(&token, holder), asset.decimals()) else {
            log::debug!("skipping {}: balance overflows", rtoken_common::short_hex(&token));
            continue;
        };
        let quantity = handler.quantity(&token, registry, RoundingMode::Ceil)?;
        if quantity == FIX_MAX {
            log::debug!("skipping {}: quantity undefined", rtoken_common::short_hex(&token));
            continue;
        }

        let (surplus, deficit) = if quantity.is_zero() {
            (held, FIX_ZERO)
        } else {
            let required = quantity.mul(baskets_needed, RoundingMode::Ceil)?;
            let threshold = required.mul(buffer_factor, RoundingMode::Ceil)?;
            (held.saturating_minus(threshold), required.saturating_minus(held))
        };
        holdings.push(Holding {
            token,
            decimals: asset.decimals(),
            price: asset.price(now),
            max_trade_volume: asset.max_trade_volume(),
            in_basket: !quantity.is_zero(),
            surplus,
            deficit,
        });
    }
    Ok(holdings)
}

/// First holding with the greatest positive `value`; ties keep registration order
pub fn pick_largest<'a>(
    holdings: impl IntoIterator<Item = &'a Holding>,
    value: impl Fn(&Holding) -> Fix,
) -> Option<&'a Holding> {
    let mut best: Option<(&Holding, Fix)> = None;
    for holding in holdings {
        let v = value(holding);
        if v.is_zero() {
            continue;
        }
        if best.map_or(true, |(_, top)| v > top) {
            best = Some((holding, v));
        }
    }
    best.map(|(holding, _)| holding)
}

// ============================================================================
// Sizing
// ============================================================================

/// Sizes a trade selling `sell` for `buy`. With `cover_deficit` the lot is
/// capped at what covers `buy.deficit` at worst-case prices. Returns `None`
/// for unpriced pairs and dust.
pub fn prepare_trade(
    sell: &Holding,
    buy: &Holding,
    cover_deficit: bool,
    config: &TradingConfig,
) -> RTokenResult<Option<TradeRequest>> {
    if !sell.price.has_low() || !buy.price.has_high() {
        return Ok(None);
    }
    let slippage_factor = FIX_ONE.minus(config.max_trade_slippage)?;

    let mut amount = sell.surplus;
    if cover_deficit {
        let covering = buy
            .deficit
            .mul(buy.price.high, RoundingMode::Ceil)?
            .div(sell.price.low, RoundingMode::Ceil)?
            .div(slippage_factor, RoundingMode::Ceil)?;
        amount = amount.min(covering);
    }
    let max_volume = sell.max_trade_volume.min(buy.max_trade_volume);
    amount = amount.min(max_volume.div(sell.price.low, RoundingMode::Floor)?);

    let sell_amount = amount.to_amount(sell.decimals, RoundingMode::Floor)?;
    let amount = Fix::from_amount(sell_amount, sell.decimals)?;
    let value = amount.mul(sell.price.low, RoundingMode::Floor)?;
    if sell_amount == 0 || value < config.min_trade_volume {
        log::debug!("trade of {} worth {} is dust", sell_amount, value);
        return Ok(None);
    }

    let min_buy = value
        .div(buy.price.high, RoundingMode::Ceil)?
        .mul(slippage_factor, RoundingMode::Ceil)?;
    let min_buy_amount = min_buy.to_amount(buy.decimals, RoundingMode::Ceil)?;
    let best_buy_amount = best_buy(amount, sell.price, buy.price, buy.decimals)
        .unwrap_or(min_buy_amount)
        .max(min_buy_amount);

    Ok(Some(TradeRequest {
        sell: sell.token,
        buy: buy.token,
        sell_amount,
        min_buy_amount,
        best_buy_amount,
    }))
}

fn best_buy(amount: Fix, sell: Price, buy: Price, decimals: u8) -> Option<u128> {
    if !sell.has_high() || !buy.has_low() {
        return None;
    }
    amount
        .mul(sell.high, RoundingMode::Floor)
        .and_then(|value| value.div(buy.low, RoundingMode::Floor))
        .and_then(|best| best.to_amount(decimals, RoundingMode::Floor))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn holding(token: u8, price: Price, surplus: Fix, deficit: Fix) -> Holding {
        Holding {
            token: [token; 32],
            decimals: 18,
            price,
            max_trade_volume: Fix::from_int(1_000_000),
            in_basket: true,
            surplus,
            deficit,
        }
    }

    fn config() -> TradingConfig {
        TradingConfig {
            max_trade_slippage: Fix::percent(1),
            min_trade_volume: Fix::from_int(10),
            ..TradingConfig::default()
        }
    }

    #[test]
    fn test_min_buy_uses_worst_prices() {
        let sell = holding(1, Price::new(Fix::percent(99), Fix::percent(101)), Fix::from_int(100), FIX_ZERO);
        let buy = holding(2, Price::new(Fix::percent(98), Fix::percent(110)), FIX_ZERO, FIX_ZERO);

        let request = prepare_trade(&sell, &buy, false, &config()).unwrap().unwrap();
        assert_eq!(request.sell_amount, 100 * 10u128.pow(18));
        // 100 * 0.99 / 1.10 * 0.99 = 89.1
        assert_eq!(request.min_buy_amount, 89_100_000_000_000_000_000);
        // 100 * 1.01 / 0.98
        assert!(request.best_buy_amount > request.min_buy_amount);
    }

    #[test]
    fn test_lot_capped_to_deficit() {
        let one = Price::new(FIX_ONE, FIX_ONE);
        let sell = holding(1, one, Fix::from_int(1_000), FIX_ZERO);
        let buy = holding(2, one, FIX_ZERO, Fix::from_int(99));

        let request = prepare_trade(&sell, &buy, true, &config()).unwrap().unwrap();
        // 99 / 0.99
        assert_eq!(request.sell_amount, 100 * 10u128.pow(18));
    }

    #[test]
    fn test_lot_capped_to_max_trade_volume() {
        let one = Price::new(FIX_ONE, FIX_ONE);
        let mut sell = holding(1, one, Fix::from_int(1_000), FIX_ZERO);
        sell.max_trade_volume = Fix::from_int(250);
        let buy = holding(2, one, FIX_ZERO, FIX_ZERO);

        let request = prepare_trade(&sell, &buy, false, &config()).unwrap().unwrap();
        assert_eq!(request.sell_amount, 250 * 10u128.pow(18));
    }

    #[test]
    fn test_dust_and_unpriced_skipped() {
        let one = Price::new(FIX_ONE, FIX_ONE);
        let dust = holding(1, one, Fix::from_int(5), FIX_ZERO);
        let buy = holding(2, one, FIX_ZERO, FIX_ZERO);
        assert_eq!(prepare_trade(&dust, &buy, false, &config()).unwrap(), None);

        let unpriced = holding(1, Price::UNPRICED, Fix::from_int(500), FIX_ZERO);
        assert_eq!(prepare_trade(&unpriced, &buy, false, &config()).unwrap(), None);
        let sell = holding(1, one, Fix::from_int(500), FIX_ZERO);
        let unpriced_buy = holding(2, Price::UNPRICED, FIX_ZERO, FIX_ZERO);
        assert_eq!(prepare_trade(&sell, &unpriced_buy, false, &config()).unwrap(), None);
    }

    #[test]
    fn test_pick_largest_prefers_first_on_tie() {
        let one = Price::new(FIX_ONE, FIX_ONE);
        let holdings = [
            holding(1, one, Fix::from_int(10), FIX_ZERO),
            holding(2, one, Fix::from_int(30), FIX_ZERO),
            holding(3, one, Fix::from_int(30), FIX_ZERO),
            holding(4, Price::UNPRICED, Fix::from_int(90), FIX_ZERO),
        ];
        let top = pick_largest(&holdings, Holding::surplus_value).unwrap();
        assert_eq!(top.token, [2u8; 32]);
        assert!(pick_largest(&holdings, Holding::deficit_value).is_none());
    }

    #[test]
    fn test_config_bounds() {
        assert!(TradingConfig::default().validate().is_ok());
        let config = TradingConfig { max_trade_slippage: FIX_ONE, ..TradingConfig::default() };
        assert!(config.validate().is_err());
    }

    proptest! {
        #[test]
        fn prop_floor_never_exceeds_worst_case_value(
            surplus in 1u64..10_000_000,
            sell_low in 1u64..10_000,
            buy_high in 1u64..10_000,
            slippage_bps in 0u64..500,
        ) {
            let sell = holding(1, Price::new(Fix::bps(sell_low), FIX_MAX), Fix::from_int(surplus), FIX_ZERO);
            let buy = holding(2, Price::new(FIX_ZERO, Fix::bps(buy_high)), FIX_ZERO, FIX_ZERO);
            let config = TradingConfig {
                max_trade_slippage: Fix::bps(slippage_bps),
                min_trade_volume: FIX_ZERO,
                ..TradingConfig::default()
            };

            if let Some(request) = prepare_trade(&sell, &buy, false, &config).unwrap() {
                let sold = Fix::from_raw(request.sell_amount);
                let worst_value = sold.mul(Fix::bps(sell_low), RoundingMode::Ceil).unwrap();
                let floor_cost = Fix::from_raw(request.min_buy_amount)
                    .mul(Fix::bps(buy_high), RoundingMode::Floor)
                    .unwrap();
                // Floor rounds up by at most a few raw units
                prop_assert!(floor_cost <= worst_value.plus(Fix::from_raw(10_000)).unwrap());
                prop_assert_eq!(request.best_buy_amount, request.min_buy_amount);
            }
        }
    }
}
