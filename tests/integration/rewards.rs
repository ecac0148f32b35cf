//! Reward claiming, selling and trade factory hand-off.

use std::sync::Arc;

use multilend::config::{LenderConfig, StrategyConfig, VaultConfig};
use multilend::lenders::{EthCompound, Lender, LenderAdapter, SonneFinance};
use multilend::market::{Erc20, TradeFactory};
use multilend::sim::{Chain, RateModel, SimCompoundMarket, SimToken, SimTradeFactory, SimVault};
use multilend::strategy::Strategy;
use multilend::types::{units, MarketError, U256};
use multilend::vault::VaultStrategy;

use crate::common::{usdc, Env, ALICE, DAY, GOV, STRATEGIST, WHALE};

#[test]
fn test_rewards_sold_through_router_count_as_profit() {
    let mut env = Env::new();
    let market = env.rewarding_market(100_000);
    let lender = env.add_compound(&market, "GenericCompound");
    let strategist = env.ctx(STRATEGIST);
    match env.strategy.lender_mut(lender) {
        Some(Lender::GenericCompound(l)) => l.set_uni_fees(&strategist, 3_000, 500).unwrap(),
        _ => panic!("compound lender missing"),
    }

    env.deposit(ALICE, usdc(100_000));
    env.harvest();
    env.chain.sleep(DAY);
    assert!(env.trigger(U256::from(1u8)));

    let report = env.harvest();
    assert!(report.rewards_claimed > units(20, 18));
    assert_eq!(env.comp.balance_of(lender), U256::ZERO);
    // ~25 COMP at $50 less fees, plus a day of interest.
    assert!(report.profit > usdc(1_000));
    assert_eq!(report.loss, U256::ZERO);
}

#[test]
fn test_trade_factory_takes_over_reward_selling() {
    let mut env = Env::new();
    let market = env.rewarding_market(100_000);
    let lender = env.add_compound(&market, "GenericCompound");
    let tf = Arc::new(SimTradeFactory::new(
        env.chain.deploy(GOV),
        env.router.clone(),
    ));
    let gov = env.ctx(GOV);
    env.strategy
        .lender_mut(lender)
        .unwrap()
        .adapter_mut()
        .set_trade_factory(&gov, tf.clone())
        .unwrap();
    assert!(tf.is_enabled(env.comp.address(), env.usdc.address()));
    assert_eq!(env.comp.allowance(lender, tf.address()), U256::MAX);

    env.deposit(ALICE, usdc(100_000));
    env.harvest();
    env.chain.sleep(DAY);
    let report = env.harvest();
    let held = env.comp.balance_of(lender);
    assert!(held > U256::ZERO);
    assert_eq!(held, report.rewards_claimed);
    // Rewards waiting on the factory do not make a harvest due.
    assert!(!env.trigger(U256::from(1u8)));

    let proceeds = tf
        .execute(lender, env.comp.address(), env.usdc.address(), held)
        .unwrap();
    assert_eq!(env.comp.balance_of(lender), U256::ZERO);
    assert_eq!(env.usdc.balance_of(lender), proceeds);

    let report = env.harvest();
    assert!(report.profit + U256::from(1u8) >= proceeds);
    assert_eq!(env.usdc.balance_of(lender), U256::ZERO);

    let strategist = env.ctx(STRATEGIST);
    env.strategy
        .lender_mut(lender)
        .unwrap()
        .adapter_mut()
        .remove_trade_factory_permissions(&strategist)
        .unwrap();
    assert_eq!(env.comp.allowance(lender, tf.address()), U256::ZERO);
    let err = tf
        .execute(lender, env.comp.address(), env.usdc.address(), U256::from(1u8))
        .unwrap_err();
    assert!(matches!(err, MarketError::PairDisabled { .. }));
}

#[test]
fn test_small_rewards_wait_for_claim_threshold() {
    let mut env = Env::new();
    let market = env.rewarding_market(1_000);
    let lender = env.add_compound(&market, "GenericCompound");
    let strategist = env.ctx(STRATEGIST);
    env.strategy
        .lender_mut(lender)
        .unwrap()
        .adapter_mut()
        .set_reward_thresholds(&strategist, units(1, 18), units(100, 18))
        .unwrap();

    env.deposit(ALICE, usdc(10_000));
    env.harvest();
    env.chain.sleep(DAY);
    let report = env.harvest();
    assert_eq!(report.rewards_claimed, U256::ZERO);

    let adapter = env.strategy.lender(lender).unwrap().adapter();
    assert!(adapter.pending_rewards(env.chain.now()) > U256::ZERO);
    assert!(!adapter.harvest_trigger(env.chain.now(), U256::from(1u8)));
}

#[test]
fn test_sonne_sells_rewards_on_volatile_pool() {
    let mut env = Env::new();
    let sonne_token = SimToken::new("SONNE", 18);
    env.router.list(&sonne_token, units(1, 17));
    let market = env.market(200, 500_000);
    market.set_rewards(sonne_token.clone(), units(1_000_000, 18));

    let access = env.strategy.lender_access();
    let adapter = SonneFinance::new(
        env.chain.deploy(STRATEGIST),
        "SonneFinance",
        access,
        Arc::new(env.usdc.clone()),
        market.clone(),
        Some(env.router.clone()),
        &LenderConfig::default(),
    );
    assert!(!adapter.stable_route());
    let address = adapter.address();
    env.strategy
        .add_lender(&env.ctx(GOV), Lender::from(adapter))
        .unwrap();

    env.deposit(ALICE, usdc(100_000));
    env.harvest();
    env.chain.sleep(DAY);
    let report = env.harvest();
    assert!(report.rewards_claimed > U256::ZERO);
    assert_eq!(sonne_token.balance_of(address), U256::ZERO);
    assert!(report.profit > U256::ZERO);
}

#[test]
fn test_eth_strategy_round_trip() {
    let mut chain = Chain::new();
    let weth = SimToken::new("WETH", 18);
    let vault_address = chain.deploy(GOV);
    let mut vault = SimVault::new(
        vault_address,
        Arc::new(weth.clone()),
        GOV,
        GOV,
        &VaultConfig::default(),
        chain.now(),
    );
    let strategy_address = chain.deploy(STRATEGIST);
    let mut strategy = Strategy::new(
        &chain.ctx(STRATEGIST),
        strategy_address,
        &vault,
        Arc::new(weth.clone()),
        &StrategyConfig::default(),
    )
    .unwrap();
    vault
        .add_strategy(&chain.ctx(GOV), &strategy, 10_000, U256::ZERO, U256::MAX)
        .unwrap();

    let market = Arc::new(SimCompoundMarket::new(
        chain.deploy(WHALE),
        Arc::new(weth.native_ledger()),
        RateModel::default(),
        chain.now(),
    ));
    weth.mint_native(WHALE, units(1_000, 18));
    market.seed(WHALE, units(1_000, 18), chain.now()).unwrap();
    market.borrow(WHALE, units(500, 18), chain.now()).unwrap();

    let lender = EthCompound::new(
        chain.deploy(STRATEGIST),
        "EthCompound",
        strategy.lender_access(),
        Arc::new(weth.clone()),
        market.clone(),
        None,
        &LenderConfig::default(),
    );
    let address = lender.address();
    strategy.add_lender(&chain.ctx(GOV), lender.into()).unwrap();

    let amount = units(10, 18);
    weth.mint(ALICE, amount);
    vault.deposit(&chain.ctx(ALICE), amount).unwrap();
    strategy.harvest(&chain.ctx(STRATEGIST), &mut vault).unwrap();
    match strategy.lender(address) {
        Some(Lender::EthCompound(l)) => {
            assert_eq!(l.nav(), amount);
            assert_eq!(l.native_balance(), U256::ZERO);
        }
        _ => panic!("eth lender missing"),
    }
    assert_eq!(weth.balance_of(address), U256::ZERO);

    chain.sleep(30 * DAY);
    let report = strategy.harvest(&chain.ctx(STRATEGIST), &mut vault).unwrap();
    assert!(report.profit > U256::ZERO);
    assert_eq!(report.loss, U256::ZERO);

    let shares = vault.balance_of(ALICE);
    let out = vault
        .withdraw(
            &chain.ctx(ALICE),
            shares,
            &mut [&mut strategy as &mut dyn VaultStrategy],
        )
        .unwrap();
    assert!(out >= amount - amount / U256::from(1_000u64));
    assert_eq!(weth.balance_of(ALICE), out);
}
