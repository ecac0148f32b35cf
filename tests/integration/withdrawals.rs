//! Withdrawals under illiquid markets, and lender removal.

use multilend::lenders::LenderAdapter;
use multilend::market::Erc20;
use multilend::types::{StrategyError, U256};

use crate::common::{usdc, Env, ALICE, DAY, GOV, STRATEGIST};

#[test]
fn test_illiquid_market_never_books_a_loss() {
    let mut env = Env::new();
    let market = env.market(200, 500_000);
    env.add_compound(&market, "GenericCompound");

    env.deposit(ALICE, usdc(10_000));
    env.harvest();
    let before = env.strategy.estimated_total_assets();
    let shares = env.vault.balance_of(ALICE);

    market.drain_liquidity(env.chain.now());
    let out = env.withdraw(ALICE, shares).unwrap();
    assert_eq!(out, U256::ZERO);
    assert_eq!(env.vault.balance_of(ALICE), shares);
    assert!(env.strategy.estimated_total_assets() >= before);

    env.chain.sleep(DAY);
    let report = env.harvest();
    assert_eq!(report.loss, U256::ZERO);
    assert!(env.strategy.estimated_total_assets() >= before);

    market.restore_liquidity(env.chain.now()).unwrap();
    env.chain.sleep(DAY);
    let report = env.harvest();
    assert_eq!(report.loss, U256::ZERO);
    let out = env.withdraw_all(ALICE);
    assert!(out >= usdc(9_999));
}

#[test]
fn test_withdrawal_drains_liquid_lender_when_other_is_stuck() {
    let mut env = Env::new();
    let first = env.market(200, 500_000);
    let second = env.market(200, 500_000);
    let a = env.add_compound(&first, "First");
    let b = env.add_compound(&second, "Second");

    env.deposit(ALICE, usdc(10_000));
    env.harvest();
    let ctx = env.ctx(GOV);
    env.strategy.manual_allocation(&ctx, &[(a, 500), (b, 500)]).unwrap();
    assert_eq!(env.lender_nav(a), usdc(5_000));
    assert_eq!(env.lender_nav(b), usdc(5_000));

    first.drain_liquidity(env.chain.now());
    let shares = env.vault.balance_of(ALICE);
    let out = env.withdraw(ALICE, shares).unwrap();
    assert!(out >= usdc(4_999) && out <= usdc(5_001));
    assert_eq!(env.lender_nav(b), U256::ZERO);
    assert_eq!(env.lender_nav(a), usdc(5_000));
    assert!(env.vault.balance_of(ALICE) > U256::ZERO);
}

#[test]
fn test_safe_removal_succeeds_on_illiquid_lender() {
    let mut env = Env::new();
    let market = env.market(200, 500_000);
    let lender = env.add_compound(&market, "GenericCompound");
    env.deposit(ALICE, usdc(10_000));
    env.harvest();

    market.drain_liquidity(env.chain.now());
    let ctx = env.ctx(STRATEGIST);
    let removed = env.strategy.safe_remove_lender(&ctx, lender).unwrap();
    assert_eq!(env.strategy.num_lenders(), 0);
    assert_eq!(removed.address(), lender);
    // The stuck position travels with the adapter.
    assert!(removed.adapter().nav() >= usdc(10_000));
    assert_eq!(env.usdc.balance_of(lender), U256::ZERO);
}

#[test]
fn test_force_removal_hands_back_stuck_lender() {
    let mut env = Env::new();
    let market = env.market(200, 500_000);
    let address = env.add_compound(&market, "GenericCompound");
    env.deposit(ALICE, usdc(10_000));
    env.harvest();

    market.drain_liquidity(env.chain.now());
    let ctx = env.ctx(STRATEGIST);
    let removed = env.strategy.force_remove_lender(&ctx, address).unwrap();
    assert_eq!(env.strategy.num_lenders(), 0);
    let shown = format!("{removed:?}");
    assert!(shown.contains("GenericCompound") && shown.contains(&format!("{address:?}")));
    assert!(removed.adapter().nav() >= usdc(10_000));
    assert_eq!(env.strategy.estimated_total_assets(), U256::ZERO);

    // Once the market recovers the adapter can be docked again.
    market.restore_liquidity(env.chain.now()).unwrap();
    env.strategy.add_lender(&env.ctx(GOV), removed).unwrap();
    assert!(env.strategy.estimated_total_assets() >= usdc(10_000));
}

#[test]
fn test_safe_removal_moves_funds_to_remaining_lender() {
    let mut env = Env::new();
    let first = env.market(400, 500_000);
    let second = env.market(200, 500_000);
    let a = env.add_compound(&first, "First");
    let b = env.add_compound(&second, "Second");
    env.deposit(ALICE, usdc(10_000));
    env.harvest();
    assert_eq!(env.lender_nav(a), usdc(10_000));

    let ctx = env.ctx(STRATEGIST);
    let removed = env.strategy.safe_remove_lender(&ctx, a).unwrap();
    assert_eq!(removed.adapter().nav(), U256::ZERO);
    assert_eq!(env.lender_nav(b), usdc(10_000));
    assert_eq!(env.strategy.loose(), U256::ZERO);
    assert_eq!(env.usdc.balance_of(removed.address()), U256::ZERO);

    let err = env.strategy.safe_remove_lender(&ctx, a).unwrap_err();
    assert!(matches!(err, StrategyError::NotLender(_)));
}

#[test]
fn test_withdrawal_threshold_keeps_small_requests_on_lenders() {
    let mut env = Env::new();
    let market = env.market(200, 500_000);
    env.add_compound(&market, "GenericCompound");
    env.deposit(ALICE, usdc(10_000));
    env.harvest();

    let ctx = env.ctx(GOV);
    env.strategy
        .set_withdrawal_threshold(&ctx, usdc(100))
        .unwrap();
    let out = env.withdraw(ALICE, usdc(50)).unwrap();
    assert_eq!(out, U256::ZERO);

    let out = env.withdraw(ALICE, usdc(500)).unwrap();
    assert_eq!(out, usdc(500));
}
