//! Integration Tests
//!
//! End-to-end scenarios driving every component through `Main`.

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;
    use rtoken_backing_manager::{IdleReason, ManageOutcome, TradingConfig};
    use rtoken_collateral::{
        Asset, AssetConfig, Collateral, CollateralConfig, CollateralKind, ManualFeed, ManualRate,
    };
    use rtoken_common::constants::time::DAY;
    use rtoken_common::*;

    use crate::*;

    const OWNER: Address = [0x01; 32];
    const ALICE: Address = [0x02; 32];
    const BIDDER: Address = [0x03; 32];
    const STRANGER: Address = [0x04; 32];
    const BACKING: Address = [0x10; 32];

    const RTOKEN: TokenId = [0x77; 32];
    const A: TokenId = [0xa1; 32];
    const B: TokenId = [0xb2; 32];
    const C: TokenId = [0xc3; 32];
    const RSR: TokenId = [0xee; 32];

    const E18: u128 = 1_000_000_000_000_000_000;
    const E6: u128 = 1_000_000;

    /// A (18 decimals, appreciating), B (6 decimals), C (18 decimals), all
    /// USD-pegged, plus RSR as the revenue asset
    struct Protocol {
        main: Main,
        feeds: BTreeMap<TokenId, ManualFeed>,
        rate_a: ManualRate,
    }

    impl Protocol {
        fn new(prime: &[(TokenId, Fix)]) -> Self {
            let deployment = Deployment {
                owner: OWNER,
                rtoken: RTOKEN,
                revenue_token: RSR,
                backing_manager: BACKING,
                broker: [0x20; 32],
            };
            let mut config = MainConfig::default();
            config.basket.warmup_period = 60;
            config.trading = TradingConfig {
                trading_delay: 0,
                min_trade_volume: FIX_ONE,
                ..TradingConfig::default()
            };
            let mut main = Main::new(deployment, config).unwrap();

            let feeds: BTreeMap<TokenId, ManualFeed> =
                [A, B, C, RSR].into_iter().map(|t| (t, ManualFeed::new(FIX_ONE, 0))).collect();
            let rate_a = ManualRate::new(FIX_ONE);

            let coll_a = Collateral::new(
                CollateralConfig::for_token(A, "USD"),
                CollateralKind::Fiat,
                Box::new(feeds[&A].clone()),
                Some(Box::new(rate_a.clone())),
            )
            .unwrap();
            let mut config_b = CollateralConfig::for_token(B, "USD");
            config_b.asset.decimals = 6;
            let coll_b = Collateral::fiat(config_b, Box::new(feeds[&B].clone())).unwrap();
            let coll_c =
                Collateral::fiat(CollateralConfig::for_token(C, "USD"), Box::new(feeds[&C].clone()))
                    .unwrap();
            let rsr = Asset::new(AssetConfig::for_token(RSR), Box::new(feeds[&RSR].clone())).unwrap();

            main.register_asset(OWNER, coll_a, 0).unwrap();
            main.register_asset(OWNER, coll_b, 0).unwrap();
            main.register_asset(OWNER, coll_c, 0).unwrap();
            main.register_asset(OWNER, rsr, 0).unwrap();
            main.refresh(0).unwrap();

            let (tokens, amts): (Vec<TokenId>, Vec<Fix>) = prime.iter().copied().unzip();
            main.set_prime_basket(OWNER, &tokens, &amts, 0).unwrap();
            main.refresh_basket(OWNER, 0).unwrap();

            Self { main, feeds, rate_a }
        }

        /// Republishes every feed at `now`, pegged unless overridden
        fn mark(&self, now: u64, overrides: &[(TokenId, Fix)]) {
            for (token, feed) in &self.feeds {
                let value = overrides
                    .iter()
                    .find(|(t, _)| t == token)
                    .map_or(FIX_ONE, |(_, v)| *v);
                feed.set_price(value, now);
            }
        }

        fn fund(&mut self, account: Address, token: TokenId, amount: u128) {
            self.main.ledger_mut().mint(&token, &account, amount).unwrap();
        }

        fn balance(&self, account: Address, token: TokenId) -> u128 {
            self.main.ledger().balance_of(&token, &account)
        }

        /// Alice issues 1000 RToken against a half A, half B basket
        fn issued_half_half() -> Self {
            let mut p = Self::new(&[(A, Fix::percent(50)), (B, Fix::percent(50))]);
            p.fund(ALICE, A, 1_000 * E18);
            p.fund(ALICE, B, 1_000 * E6);
            p.main.issue(ALICE, 1_000 * E18, 100).unwrap();
            p
        }
    }

    fn opened(outcome: Option<ManageOutcome>) -> (TradeId, rtoken_broker::TradeRequest) {
        match outcome {
            Some(ManageOutcome::TradeOpened { trade_id, request }) => (trade_id, request),
            other => panic!("expected a trade, got {other:?}"),
        }
    }

    // ========================================================================
    // Revenue
    // ========================================================================

    #[test]
    fn test_appreciation_sold_without_touching_other_members() {
        let mut p = Protocol::issued_half_half();
        assert_eq!(p.balance(BACKING, A), 500 * E18);
        assert_eq!(p.balance(BACKING, B), 500 * E6);
        assert_eq!(p.main.poke(200).unwrap(), Some(ManageOutcome::Idle(IdleReason::NothingToTrade)));

        // A's exchange rate rises 10%
        p.rate_a.set_rate(Fix::percent(110));
        let (trade_id, request) = opened(p.main.poke(300).unwrap());

        assert_eq!(request.sell, A);
        assert_eq!(request.buy, RSR);
        assert!(request.sell_amount > 45 * E18 && request.sell_amount < 46 * E18);
        assert!(p.main.broker().open_trade_for(&B).is_none());
        assert_eq!(p.main.backing_manager().trade_for(&A), Some(trade_id));
        assert!(p.main.fully_collateralized().unwrap());
        assert_eq!(p.main.events().filter_by_type(EventType::TradeStarted).len(), 1);
    }

    #[test]
    fn test_unsettleable_trade_disables_broker() {
        let mut p = Protocol::issued_half_half();
        p.rate_a.set_rate(Fix::percent(110));
        let (trade_id, request) = opened(p.main.poke(300).unwrap());

        // Escrow comes up short of the lot it must return
        p.main.ledger_mut().burn(&A, &trade_id, 1).unwrap();
        let end = 300 + constants::broker::DEFAULT_DUTCH_AUCTION_LENGTH;
        let err = p.main.settle_trade(&A, end).unwrap_err();
        assert_eq!(
            err,
            RTokenError::InsufficientBalance {
                token: A,
                available: request.sell_amount - 1,
                requested: request.sell_amount,
            }
        );

        assert_eq!(p.main.broker().violations(), 1);
        assert!(p.main.broker().is_disabled());
        assert_eq!(p.main.backing_manager().trade_for(&A), Some(trade_id));
        assert_eq!(p.balance(trade_id, A), request.sell_amount - 1);
        assert_eq!(p.main.poke(end).unwrap(), Some(ManageOutcome::Idle(IdleReason::BrokerDisabled)));
    }

    // ========================================================================
    // Default and backup substitution
    // ========================================================================

    #[test]
    fn test_default_substitutes_backup_and_recollateralizes() {
        let mut p = Protocol::issued_half_half();
        p.main.set_backup_config(OWNER, TargetName::new("USD"), 1, &[C], 100).unwrap();

        // B trades 50% below peg
        let start = 200;
        p.mark(start, &[(B, Fix::percent(50))]);
        p.main.refresh(start).unwrap();
        assert_eq!(p.main.registry().status_of(&B), CollateralStatus::Iffy);
        assert_eq!(p.main.status(), CollateralStatus::Iffy);
        assert_eq!(
            p.main.refresh_basket(STRANGER, start),
            Err(RTokenError::Unauthorized { caller: STRANGER })
        );

        p.mark(start + DAY - 1, &[(B, Fix::percent(50))]);
        p.main.refresh(start + DAY - 1).unwrap();
        assert_eq!(p.main.registry().status_of(&B), CollateralStatus::Iffy);

        let switch = start + DAY;
        p.mark(switch, &[(B, Fix::percent(50))]);
        p.main.refresh(switch).unwrap();
        assert_eq!(p.main.registry().status_of(&B), CollateralStatus::Disabled);
        assert_eq!(p.main.status(), CollateralStatus::Disabled);

        // Anyone may reselect a DISABLED basket
        p.main.refresh_basket(STRANGER, switch).unwrap();
        let basket = p.main.basket_handler().basket();
        assert_eq!(basket.tokens(), vec![A, C]);
        assert_eq!(basket.ref_amt(&C), Some(Fix::percent(50)));
        assert_eq!(basket.nonce, 2);
        assert_eq!(p.main.status(), CollateralStatus::Sound);
        assert!(!p.main.fully_collateralized().unwrap());

        // Warmup defers trading
        assert_eq!(p.main.poke(switch + 1).unwrap(), None);

        // The defaulted B is sold for the backup
        p.mark(switch + 60, &[(B, Fix::percent(50))]);
        let (trade_id, request) = opened(p.main.poke(switch + 60).unwrap());
        assert_eq!((request.sell, request.buy), (B, C));
        assert_eq!(request.sell_amount, 500 * E6);
        assert_eq!(p.main.manage_tokens(switch + 60), Ok(ManageOutcome::Idle(IdleReason::TradesOpen)));

        // RSR arrives while the auction runs; settling opens the next round
        p.fund(BACKING, RSR, 10_000 * E18);
        p.fund(BIDDER, C, 1_000 * E18);
        let paid = p.main.bid_dutch(BIDDER, &trade_id, switch + 120).unwrap();
        assert!(paid >= request.min_buy_amount);

        let (sold, bought) = p.main.settle_trade(&B, switch + 120).unwrap();
        assert_eq!((sold, bought), (500 * E6, paid));
        assert_eq!(p.balance(BACKING, C), paid);
        assert_eq!(p.balance(BIDDER, B), 500 * E6);
        assert_eq!(p.main.broker().trade(&trade_id).unwrap().status, TradeStatus::Closed);

        let next = p.main.broker().open_trade_for(&RSR).unwrap();
        assert_eq!(next.buy, C);
        assert_eq!(p.main.backing_manager().trade_for(&B), None);
    }

    #[test]
    fn test_unregistered_sole_collateral_disables_handler() {
        let mut p = Protocol::new(&[(A, FIX_ONE)]);
        assert_eq!(p.main.status(), CollateralStatus::Sound);

        p.main.unregister_asset(OWNER, &A, 10).unwrap();
        assert_eq!(p.main.status(), CollateralStatus::Disabled);

        p.main.refresh_basket(STRANGER, 20).unwrap();
        assert!(p.main.basket_handler().is_disabled());
        assert_eq!(p.main.quote(FIX_ONE, RoundingMode::Ceil), Err(RTokenError::BasketDisabled));
        assert!(!p.main.fully_collateralized().unwrap());
        assert_eq!(p.main.baskets_held_by(&BACKING), Ok(FIX_ZERO));
        assert_eq!(p.main.poke(100).unwrap(), None);

        let disabled_sets = p
            .main
            .events()
            .filter_by_type(EventType::BasketSet)
            .into_iter()
            .filter(|e| matches!(e, RTokenEvent::BasketSet { disabled: true, .. }))
            .count();
        assert!(disabled_sets >= 1);

        p.fund(ALICE, A, E18);
        assert_eq!(p.main.issue(ALICE, E18, 100), Err(RTokenError::BasketNotReady));
    }

    // ========================================================================
    // Issuance and redemption
    // ========================================================================

    #[test]
    fn test_issue_rounds_up_and_redeem_rounds_down() {
        let mut p = Protocol::new(&[(A, FIX_ONE), (B, Fix::from_raw(E18 / 1_000))]);
        p.fund(ALICE, A, 10 * E18);
        p.fund(ALICE, B, 10 * E6);

        let amount = E18 + 1;
        let deposits = p.main.issue(ALICE, amount, 100).unwrap();
        // ceil(X * 1.0) A and ceil(X * 0.001) B
        assert_eq!(deposits, vec![(A, E18 + 1), (B, 1_001)]);
        assert_eq!(p.balance(ALICE, RTOKEN), amount);
        assert_eq!(p.main.supply().supply, amount);
        assert!(p.main.fully_collateralized().unwrap());

        let payouts = p.main.redeem(ALICE, amount, 200).unwrap();
        assert_eq!(payouts, vec![(A, E18 + 1), (B, 1_000)]);
        assert_eq!(p.balance(BACKING, B), 1);
        assert_eq!(p.main.supply().supply, 0);
        assert_eq!(p.main.events().filter_by_type(EventType::Issuance).len(), 1);
        assert_eq!(p.main.events().filter_by_type(EventType::Redemption).len(), 1);
    }

    #[test]
    fn test_failed_issue_leaves_state_untouched() {
        let mut p = Protocol::new(&[(A, Fix::percent(50)), (B, Fix::percent(50))]);
        p.fund(ALICE, A, 1_000 * E18);
        p.fund(ALICE, B, E6);

        let before = p.main.ledger().clone();
        let err = p.main.issue(ALICE, 1_000 * E18, 100).unwrap_err();
        assert!(matches!(err, RTokenError::InsufficientBalance { token: B, .. }));
        assert_eq!(p.main.ledger(), &before);
        assert_eq!(p.main.supply().supply, 0);
        assert!(p.main.events().filter_by_type(EventType::Issuance).is_empty());
    }

    #[test]
    fn test_redeem_requires_full_collateralization() {
        let mut p = Protocol::issued_half_half();
        p.main.ledger_mut().burn(&B, &BACKING, E6).unwrap();
        assert_eq!(
            p.main.redeem(ALICE, E18, 200),
            Err(RTokenError::NotFullyCollateralized)
        );
    }

    #[test]
    fn test_melt_raises_basket_units_per_token() {
        let mut p = Protocol::issued_half_half();
        p.main.melt(ALICE, 500 * E18, 200).unwrap();

        assert_eq!(p.main.supply().supply, 500 * E18);
        assert_eq!(p.main.supply().base_factor().unwrap(), Fix::from_int(2));
        // Each remaining RToken redeems for two BUs
        let payouts = p.main.redeem(ALICE, 100 * E18, 300).unwrap();
        assert_eq!(payouts, vec![(A, 100 * E18), (B, 100 * E6)]);
    }

    #[test]
    fn test_stray_rtoken_mint_blocks_supply_changes() {
        let mut p = Protocol::issued_half_half();
        p.fund(STRANGER, RTOKEN, E18);
        let before = p.main.supply().clone();

        let err = p.main.melt(ALICE, E18, 200).unwrap_err();
        assert_eq!(
            err,
            RTokenError::SupplyMismatch { ledger: before.supply, recorded: before.supply - E18 }
        );
        assert!(err.is_invariant_violation());
        assert_eq!(p.main.supply(), &before);
        assert_eq!(p.balance(ALICE, RTOKEN), before.supply);
    }

    // ========================================================================
    // Governance and guard
    // ========================================================================

    #[test]
    fn test_setters_are_owner_only() {
        let mut p = Protocol::new(&[(A, FIX_ONE)]);
        let unauthorized = Err(RTokenError::Unauthorized { caller: STRANGER });
        assert_eq!(p.main.set_prime_basket(STRANGER, &[B], &[FIX_ONE], 1), unauthorized);
        assert_eq!(p.main.set_broker_disabled(STRANGER, true, 1), unauthorized);
        assert_eq!(p.main.set_warmup_period(STRANGER, 120), unauthorized);
        assert_eq!(p.main.refresh_basket(STRANGER, 1), unauthorized);

        let config = TradingConfig { max_trade_slippage: FIX_ONE, ..TradingConfig::default() };
        assert!(p.main.set_trading_config(OWNER, config).is_err());

        p.main.set_broker_disabled(OWNER, true, 1).unwrap();
        assert!(p.main.broker().is_disabled());
        assert_eq!(p.main.poke(100).unwrap(), Some(ManageOutcome::Idle(IdleReason::BrokerDisabled)));
    }

    #[test]
    fn test_reentrant_call_rejected() {
        let mut p = Protocol::new(&[(A, FIX_ONE)]);
        let token = p.main.guard().enter().unwrap();
        assert_eq!(p.main.refresh(1), Err(RTokenError::Reentrancy));
        assert_eq!(p.main.settle_trade(&A, 1), Err(RTokenError::Reentrancy));
        drop(token);
        assert!(p.main.refresh(1).is_ok());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_redeem_never_pays_more_than_deposited(amount in 1u128..1_000_000 * E18) {
            let mut p = Protocol::new(&[(A, FIX_ONE), (B, Fix::from_raw(E18 / 1_000))]);
            p.fund(ALICE, A, 2_000_000 * E18);
            p.fund(ALICE, B, 2_000_000 * E6);

            let deposits = p.main.issue(ALICE, amount, 100).unwrap();
            let payouts = p.main.redeem(ALICE, amount, 100).unwrap();
            for ((token, paid_in), (_, paid_out)) in deposits.iter().zip(&payouts) {
                prop_assert!(paid_out <= paid_in, "{:?}: {} > {}", token, paid_out, paid_in);
            }
        }
    }
}
