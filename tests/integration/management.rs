//! Roles, settings and cloning.

use std::sync::Arc;

use chrono::Duration;
use multilend::config::LenderConfig;
use multilend::lenders::{
    AaveMorpho, GenericCompound, Lender, LenderAccess, LenderAdapter, LenderKind, SonneFinance,
};
use multilend::market::LendingMarket;
use multilend::sim::{RateModel, SimMorphoMarket};
use multilend::strategy::allocation::{BestAprPolicy, ManualSplitPolicy};
use multilend::types::{AccessTier, Address, LenderError, StrategyError, U256};
use multilend::vault::Vault;

use crate::common::{usdc, Env, ALICE, BOB, DAY, GOV, STRATEGIST};

#[test]
fn test_lender_calls_check_roles() {
    let mut env = Env::new();
    let market = env.market(200, 500_000);
    let address = env.add_compound(&market, "GenericCompound");
    env.deposit(ALICE, usdc(1_000));
    env.harvest();

    let alice = env.ctx(ALICE);
    let strategist = env.ctx(STRATEGIST);
    let gov = env.ctx(GOV);
    let adapter = env.strategy.lender_mut(address).unwrap().adapter_mut();

    assert_eq!(
        adapter.withdraw(&alice, usdc(1)).unwrap_err(),
        LenderError::Unauthorized(AccessTier::Management)
    );
    assert_eq!(
        adapter.harvest(&alice).unwrap_err(),
        LenderError::Unauthorized(AccessTier::Keepers)
    );
    assert_eq!(
        adapter.emergency_withdraw(&strategist, usdc(1)).unwrap_err(),
        LenderError::Unauthorized(AccessTier::Governance)
    );
    assert_eq!(
        adapter.set_dust(&alice, U256::from(10u8)).unwrap_err().to_string(),
        "!management"
    );

    adapter.set_dust(&strategist, U256::from(10u8)).unwrap();
    assert_eq!(adapter.dust(), U256::from(10u8));
    adapter.set_keep3r(&strategist, BOB).unwrap();
    assert_eq!(adapter.keep3r(), BOB);
    adapter.harvest(&env.chain.ctx(BOB)).unwrap();

    let sent = adapter.emergency_withdraw(&gov, usdc(400)).unwrap();
    assert_eq!(sent, usdc(400));
    assert_eq!(adapter.nav(), usdc(600));
}

#[test]
fn test_strategy_setters_and_roles() {
    let mut env = Env::new();
    let alice = env.ctx(ALICE);
    let strategist = env.ctx(STRATEGIST);
    let gov = env.ctx(GOV);

    let err = env.strategy.set_keeper(&alice, BOB).unwrap_err();
    assert_eq!(err.to_string(), "!authorized");
    env.strategy.set_keeper(&strategist, BOB).unwrap();
    assert_eq!(env.strategy.roles().keeper, BOB);

    let err = env.strategy.set_strategist(&gov, Address::ZERO).unwrap_err();
    assert!(matches!(err, StrategyError::InvalidAddress("strategist")));
    env.strategy.set_rewards(&strategist, ALICE).unwrap();
    assert_eq!(env.strategy.roles().rewards, ALICE);

    env.strategy.set_profit_factor(&gov, U256::from(5u8)).unwrap();
    env.strategy.set_debt_threshold(&gov, usdc(10)).unwrap();
    env.strategy
        .set_min_report_delay(&strategist, Duration::hours(1))
        .unwrap();
    env.strategy
        .set_max_report_delay(&strategist, Duration::days(2))
        .unwrap();
    let t = env.strategy.thresholds();
    assert_eq!(t.profit_factor, U256::from(5u8));
    assert_eq!(t.debt_threshold, usdc(10));
    assert_eq!(t.min_report_delay, Duration::hours(1));
    assert_eq!(t.max_report_delay, Duration::days(2));

    assert_eq!(env.strategy.harvest_cooldown(), Duration::hours(6));
    let err = env
        .strategy
        .set_harvest_cooldown(&alice, Duration::hours(1))
        .unwrap_err();
    assert!(matches!(err, StrategyError::Unauthorized(AccessTier::Management)));
    env.strategy
        .set_harvest_cooldown(&gov, Duration::hours(1))
        .unwrap();
    assert_eq!(env.strategy.harvest_cooldown(), Duration::hours(1));

    // The new keeper can harvest; a stranger cannot.
    let err = env.strategy.harvest(&alice, &mut env.vault).unwrap_err();
    assert!(matches!(err, StrategyError::Unauthorized(AccessTier::Keepers)));
    env.strategy.harvest(&env.chain.ctx(BOB), &mut env.vault).unwrap();
}

#[test]
fn test_max_report_delay_forces_harvest() {
    let mut env = Env::new();
    let market = env.market(200, 500_000);
    env.add_compound(&market, "GenericCompound");
    env.deposit(ALICE, usdc(1_000));
    env.harvest();

    let huge_cost = usdc(1_000_000);
    env.chain.sleep(DAY / 2);
    assert!(!env.trigger(huge_cost));
    env.chain.sleep(DAY / 2);
    assert!(env.trigger(huge_cost));
}

#[test]
fn test_vault_role_changes_reach_lenders() {
    let mut env = Env::new();
    let market = env.market(200, 500_000);
    let address = env.add_compound(&market, "GenericCompound");

    env.vault.set_management(&env.ctx(GOV), BOB).unwrap();
    env.strategy.refresh_vault_roles(&env.vault);
    assert_eq!(env.strategy.roles().management, BOB);

    let bob = env.ctx(BOB);
    let adapter = env.strategy.lender_mut(address).unwrap().adapter_mut();
    adapter.set_dust(&bob, U256::from(7u8)).unwrap();
    assert_eq!(adapter.dust(), U256::from(7u8));
}

#[test]
fn test_manual_allocation_and_policy() {
    let mut env = Env::new();
    let first = env.market(400, 500_000);
    let second = env.market(200, 500_000);
    let a = env.add_compound(&first, "First");
    let b = env.add_compound(&second, "Second");
    env.deposit(ALICE, usdc(10_000));
    env.harvest();
    assert_eq!(env.strategy.allocation_policy(), "best-apr");

    let gov = env.ctx(GOV);
    let err = env
        .strategy
        .manual_allocation(&gov, &[(a, 300), (b, 600)])
        .unwrap_err();
    assert!(matches!(err, StrategyError::InvalidShares(900)));
    let stranger = Address::repeat_byte(0x99);
    let err = env
        .strategy
        .manual_allocation(&gov, &[(a, 300), (stranger, 700)])
        .unwrap_err();
    assert!(matches!(err, StrategyError::NotLender(_)));
    let err = env
        .strategy
        .manual_allocation(&env.ctx(ALICE), &[(a, 300), (b, 700)])
        .unwrap_err();
    assert!(matches!(err, StrategyError::Unauthorized(AccessTier::Management)));

    env.strategy
        .manual_allocation(&gov, &[(a, 300), (b, 700)])
        .unwrap();
    assert_eq!(env.lender_nav(a), usdc(3_000));
    assert_eq!(env.lender_nav(b), usdc(7_000));

    // A one-off split is undone by the next harvest under best-APR.
    env.deposit(ALICE, usdc(1_000));
    env.harvest();
    assert_eq!(env.lender_nav(b), U256::ZERO);

    // A persistent split survives harvests.
    let policy = ManualSplitPolicy::new(vec![(a, 500), (b, 500)]).unwrap();
    env.strategy
        .set_allocation_policy(&gov, Box::new(policy))
        .unwrap();
    env.deposit(ALICE, usdc(1_000));
    env.harvest();
    assert_eq!(env.strategy.allocation_policy(), "manual-split");
    assert!(env.lender_nav(b) > usdc(5_000));

    env.strategy
        .set_allocation_policy(&gov, Box::new(BestAprPolicy))
        .unwrap();
    assert_eq!(env.strategy.allocation_policy(), "best-apr");
}

#[test]
fn test_clone_strategy_starts_fresh() {
    let mut env = Env::new();
    let market = env.market(200, 500_000);
    env.add_compound(&market, "GenericCompound");
    env.strategy
        .set_profit_factor(&env.ctx(GOV), U256::from(7u8))
        .unwrap();

    let clone = env
        .strategy
        .clone_strategy(&env.chain.ctx(ALICE), &env.vault)
        .unwrap();
    assert_eq!(clone.num_lenders(), 0);
    assert_eq!(clone.roles().strategist, ALICE);
    assert_eq!(clone.roles().governance, GOV);
    assert_eq!(clone.thresholds().profit_factor, U256::from(100u8));
    assert_eq!(clone.vault(), env.vault.address());

    let second = env
        .strategy
        .clone_strategy(&env.chain.ctx(ALICE), &env.vault)
        .unwrap();
    assert_ne!(second.address(), clone.address());
}

#[test]
fn test_adapter_clones_reset_settings() {
    let mut env = Env::new();
    let market = env.market(200, 500_000);
    let other = env.market(300, 500_000);
    let access = env.strategy.lender_access();
    let mut template: GenericCompound = env.compound_lender(access, &market, "Template");
    template
        .set_dust(&env.ctx(STRATEGIST), U256::from(9u8))
        .unwrap();
    template.set_uni_fees(&env.ctx(STRATEGIST), 3_000, 500).unwrap();

    let fresh = LenderAccess {
        strategy: Address::repeat_byte(0x77),
        ..access
    };
    let copy = template.clone_compound_lender(fresh, "Copy", other.clone());
    assert_ne!(copy.address(), template.address());
    assert_eq!(copy.strategy(), fresh.strategy);
    assert_eq!(copy.dust(), U256::ZERO);
    assert_eq!(copy.uni_fees(), (0, 0));
    assert_eq!(copy.market(), other.address());
    assert_eq!(copy.lender_name(), "Copy");

    let mut sonne = SonneFinance::new(
        env.chain.deploy(STRATEGIST),
        "Sonne",
        access,
        Arc::new(env.usdc.clone()),
        market.clone(),
        None,
        &LenderConfig::default(),
    );
    sonne.set_stable_route(&env.ctx(STRATEGIST), true).unwrap();
    let sonne_copy = sonne.clone_sonne_finance(fresh, "SonneCopy", other.clone());
    assert!(!sonne_copy.stable_route());
    assert_eq!(sonne_copy.kind(), LenderKind::SonneFinance);

    let morpho_market = Arc::new(SimMorphoMarket::new(
        env.chain.deploy(GOV),
        Arc::new(env.usdc.clone()),
        RateModel::default(),
        env.chain.now(),
    ));
    let mut morpho = AaveMorpho::new(
        env.chain.deploy(STRATEGIST),
        "Morpho",
        access,
        Arc::new(env.usdc.clone()),
        morpho_market.clone(),
        None,
        &LenderConfig::default(),
    );
    morpho
        .set_max_gas_for_matching(&env.ctx(STRATEGIST), 0)
        .unwrap();
    let morpho_copy = morpho.clone_morpho_aave_lender(fresh, "MorphoCopy", morpho_market);
    assert_eq!(morpho_copy.max_gas_for_matching(), 100_000);

    // A clone is docked only on the strategy it was made for.
    let err = env
        .strategy
        .add_lender(&env.ctx(GOV), Lender::from(copy))
        .unwrap_err();
    assert!(matches!(err, StrategyError::UndockedLender(_)));
}
