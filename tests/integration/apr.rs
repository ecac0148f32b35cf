//! APR estimates against what deposits actually earn.

use std::sync::Arc;

use multilend::config::LenderConfig;
use multilend::lenders::{AaveMorpho, Lender, LenderAdapter};
use multilend::math::within_bps;
use multilend::sim::{RateModel, SimMorphoMarket};
use multilend::types::U256;

use crate::common::{usdc, Env, ALICE, DAY, GOV, WHALE};

#[test]
fn test_future_apr_matches_realised_after_deposit() {
    let mut env = Env::new();
    let market = env.market(200, 500_000);
    env.add_compound(&market, "GenericCompound");

    env.deposit(ALICE, usdc(10_000));
    env.harvest();
    let current = env.strategy.estimated_apr();
    let predicted = env.strategy.estimated_future_apr(usdc(200_000));
    assert!(predicted < current);

    env.deposit(ALICE, usdc(200_000));
    env.harvest();
    let realised = env.strategy.estimated_apr();
    assert!(within_bps(predicted, realised, 10));
}

#[test]
fn test_debt_limit_estimate_in_both_directions() {
    let mut env = Env::new();
    let market = env.market(200, 500_000);
    env.add_compound(&market, "GenericCompound");
    env.deposit(ALICE, usdc(100_000));
    env.harvest();

    let current = env.strategy.estimated_apr();
    let same = env
        .strategy
        .estimated_apr_for_debt_limit(&env.vault, usdc(100_000));
    assert!(within_bps(same, current, 1));

    let raised = env
        .strategy
        .estimated_apr_for_debt_limit(&env.vault, usdc(300_000));
    assert!(raised < current);
    assert_eq!(raised, env.strategy.estimated_future_apr(usdc(200_000)));

    let lowered = env
        .strategy
        .estimated_apr_for_debt_limit(&env.vault, usdc(40_000));
    assert!(within_bps(lowered, current, 1));
    assert_eq!(
        env.strategy.estimated_apr_for_debt_limit(&env.vault, U256::ZERO),
        U256::ZERO
    );
}

#[test]
fn test_reward_apr_dilutes_as_strategy_grows() {
    let mut env = Env::new();
    let market = env.rewarding_market(100_000);
    let lender = env.add_compound(&market, "GenericCompound");

    let adapter = env.strategy.lender(lender).unwrap().adapter();
    let small = adapter.reward_apr_for_supply_base(usdc(1_000));
    let large = adapter.reward_apr_for_supply_base(usdc(1_000_000));
    assert!(small > large);

    env.deposit(ALICE, usdc(50_000));
    env.harvest();
    let with_rewards = env.strategy.estimated_apr();
    let base_only = env.strategy.lend_statuses()[0].rate
        - env
            .strategy
            .lender(lender)
            .unwrap()
            .adapter()
            .reward_apr_for_supply_base(U256::ZERO);
    assert!(with_rewards > base_only);
}

#[test]
fn test_morpho_strategy_prefers_matched_supply() {
    let mut env = Env::new();
    let pool = env.market(200, 500_000);
    env.add_compound(&pool, "GenericCompound");

    let morpho = Arc::new(SimMorphoMarket::new(
        env.chain.deploy(WHALE),
        Arc::new(env.usdc.clone()),
        RateModel::default(),
        env.chain.now(),
    ));
    env.usdc.mint(WHALE, usdc(1_000_000));
    morpho
        .seed_pool(WHALE, usdc(1_000_000), env.chain.now())
        .unwrap();
    morpho
        .add_borrow_demand(usdc(500_000), env.chain.now())
        .unwrap();
    let adapter = AaveMorpho::new(
        env.chain.deploy(GOV),
        "GenericAaveMorpho",
        env.strategy.lender_access(),
        Arc::new(env.usdc.clone()),
        morpho.clone(),
        None,
        &LenderConfig::default(),
    );
    let address = adapter.address();
    env.strategy
        .add_lender(&env.ctx(GOV), Lender::from(adapter))
        .unwrap();

    env.deposit(ALICE, usdc(100_000));
    env.harvest();
    assert_eq!(env.lender_nav(address), usdc(100_000));
    match env.strategy.lender(address) {
        Some(Lender::AaveMorpho(l)) => assert_eq!(l.matched(), usdc(100_000)),
        _ => panic!("morpho lender missing"),
    }

    env.chain.sleep(30 * DAY);
    let report = env.harvest();
    assert!(report.profit > U256::ZERO);
    assert_eq!(report.loss, U256::ZERO);
}
