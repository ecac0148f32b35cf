//! Deposit, harvest and withdraw through the vault.

use multilend::market::Erc20;
use multilend::math::{bps_of, within_bps};
use multilend::types::{StrategyStatus, U256};

use crate::common::{usdc, Env, ALICE, BOB, DAY, STRATEGIST, WHALE};

#[test]
fn test_first_deposit_is_deployed_without_loss() {
    let mut env = Env::new();
    let market = env.market(200, 500_000);
    let lender = env.add_compound(&market, "GenericCompound");

    let amount = usdc(501);
    env.deposit(STRATEGIST, amount);
    assert!(env.trigger(U256::from(1u8)));

    let report = env.harvest();
    assert_eq!(report.loss, U256::ZERO);
    assert_eq!(report.debt_outstanding, U256::ZERO);
    let floor = amount - amount / U256::from(1_000_000u64);
    assert!(env.strategy.estimated_total_assets() >= floor);
    assert_eq!(env.lender_nav(lender), amount);
    assert_eq!(env.strategy.loose(), U256::ZERO);
    assert!(!env.trigger(U256::from(1u8)));
}

#[test]
fn test_round_trip_returns_deposit() {
    let mut env = Env::new();
    let market = env.market(200, 500_000);
    env.add_compound(&market, "GenericCompound");

    let amount = usdc(10_000);
    env.deposit(ALICE, amount);
    env.harvest();
    env.chain.sleep(DAY);
    let report = env.harvest();
    assert!(report.profit > U256::ZERO);
    assert_eq!(report.loss, U256::ZERO);

    let out = env.withdraw_all(ALICE);
    assert!(out >= amount - bps_of(amount, 10));
    assert_eq!(env.vault.balance_of(ALICE), U256::ZERO);
    assert_eq!(env.usdc.balance_of(ALICE), out);
}

#[test]
fn test_profit_unlocks_into_share_price() {
    let mut env = Env::new();
    let market = env.market(200, 500_000);
    env.add_compound(&market, "GenericCompound");

    env.deposit(ALICE, usdc(10_000));
    env.harvest();
    let before = env.vault.price_per_share(env.chain.now());
    env.chain.sleep(7 * DAY);
    let report = env.harvest();
    assert!(report.profit > U256::ZERO);
    assert_eq!(env.vault.price_per_share(env.chain.now()), before);

    env.chain.sleep(DAY);
    assert!(env.vault.price_per_share(env.chain.now()) > before);
}

#[test]
fn test_deposits_concentrate_in_best_lender() {
    let mut env = Env::new();
    let cheap = env.market(100, 500_000);
    let rich = env.market(400, 500_000);
    let low = env.add_compound(&cheap, "Low");
    let high = env.add_compound(&rich, "High");

    env.deposit(ALICE, usdc(50_000));
    env.harvest();
    assert_eq!(env.lender_nav(low), U256::ZERO);
    assert_eq!(env.lender_nav(high), usdc(50_000));

    let statuses = env.strategy.lend_statuses();
    assert_eq!(statuses.len(), 2);
    assert!(statuses.iter().any(|s| s.name == "High" && s.assets == usdc(50_000)));
}

#[test]
fn test_rebalances_when_rates_flip() {
    let mut env = Env::new();
    let first = env.market(200, 500_000);
    let second = env.market(200, 100_000);
    let a = env.add_compound(&first, "First");
    let b = env.add_compound(&second, "Second");

    env.deposit(ALICE, usdc(20_000));
    env.harvest();
    assert_eq!(env.lender_nav(a), usdc(20_000));

    // Borrowers leave the first market and pile into the second.
    first.repay(WHALE, usdc(450_000), env.chain.now()).unwrap();
    second.borrow(WHALE, usdc(600_000), env.chain.now()).unwrap();
    env.chain.sleep(DAY);
    env.harvest();

    assert_eq!(env.lender_nav(a), U256::ZERO);
    assert!(env.lender_nav(b) >= usdc(20_000));
}

#[test]
fn test_two_depositors_share_profit_pro_rata() {
    let mut env = Env::new();
    let market = env.market(200, 500_000);
    env.add_compound(&market, "GenericCompound");

    env.deposit(ALICE, usdc(30_000));
    env.deposit(BOB, usdc(10_000));
    env.harvest();
    env.chain.sleep(30 * DAY);
    env.harvest();
    env.chain.sleep(DAY);

    let alice = env.withdraw_all(ALICE);
    let bob = env.withdraw_all(BOB);
    assert!(alice > usdc(30_000));
    assert!(bob > usdc(10_000));
    let alice_gain = alice - usdc(30_000);
    let bob_gain = bob - usdc(10_000);
    assert!(within_bps(alice_gain, bob_gain * U256::from(3u8), 10));
}

#[test]
fn test_emergency_exit_returns_everything_to_vault() {
    let mut env = Env::new();
    let market = env.market(200, 500_000);
    let lender = env.add_compound(&market, "GenericCompound");

    env.deposit(ALICE, usdc(10_000));
    env.harvest();
    env.chain.sleep(DAY);

    let ctx = env.ctx(STRATEGIST);
    env.strategy.set_emergency_exit(&ctx, &mut env.vault).unwrap();
    assert!(env.strategy.emergency_exit());
    assert!(env.trigger(U256::from(1u8)));

    let report = env.harvest();
    assert!(report.emergency_exit);
    assert_eq!(report.loss, U256::ZERO);
    assert!(report.profit > U256::ZERO);
    assert_eq!(env.lender_nav(lender), U256::ZERO);
    assert_eq!(env.strategy.estimated_total_assets(), U256::ZERO);
    assert_eq!(env.strategy.ledger().total_debt, U256::ZERO);
    assert!(env.vault.total_idle() > usdc(10_000));
    assert_eq!(env.strategy.status(), StrategyStatus::Active);
}
