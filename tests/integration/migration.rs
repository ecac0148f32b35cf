//! Moving a funded strategy's debt to a fresh clone.

use multilend::market::LendingMarket;
use multilend::math::within_bps;
use multilend::types::{StrategyError, StrategyStatus, VaultError, U256};
use multilend::vault::{Vault, VaultStrategy};

use crate::common::{usdc, Env, ALICE, DAY, GOV, STRATEGIST};

#[test]
fn test_migration_moves_debt_and_assets() {
    let mut env = Env::new();
    let market = env.market(200, 500_000);
    env.add_compound(&market, "GenericCompound");
    env.deposit(ALICE, usdc(10_000));
    env.harvest();
    env.chain.sleep(DAY);
    market.accrue_interest(env.chain.now());

    let old_address = env.strategy.address();
    let old_debt = env.vault.strategy_params(old_address).unwrap().total_debt;
    let old_assets = env.strategy.estimated_total_assets();
    assert!(old_assets > old_debt);

    let mut clone = env
        .strategy
        .clone_strategy(&env.chain.ctx(STRATEGIST), &env.vault)
        .unwrap();
    assert_eq!(clone.num_lenders(), 0);
    assert_ne!(clone.address(), old_address);

    let ctx = env.ctx(GOV);
    env.vault
        .migrate_strategy(&ctx, &mut env.strategy, &clone)
        .unwrap();

    let params = env.vault.strategy_params(clone.address()).unwrap();
    assert_eq!(params.total_debt, old_debt);
    assert_eq!(params.debt_ratio, 10_000);
    let old = env.vault.strategy_params(old_address).unwrap();
    assert_eq!(old.total_debt, U256::ZERO);
    assert_eq!(old.debt_ratio, 0);
    assert_eq!(env.vault.withdrawal_queue(), &[clone.address()]);

    assert_eq!(env.strategy.status(), StrategyStatus::Retired);
    assert_eq!(env.strategy.estimated_total_assets(), U256::ZERO);
    assert!(within_bps(clone.estimated_total_assets(), old_assets, 10));
    assert!(clone.loose() >= old_debt);

    let err = env
        .strategy
        .harvest(&env.chain.ctx(STRATEGIST), &mut env.vault)
        .unwrap_err();
    assert!(matches!(err, StrategyError::Inactive(StrategyStatus::Retired)));

    // The clone deploys through its own lender, then reports the
    // interest it carried over as profit.
    let lender = env.compound_lender(clone.lender_access(), &market, "GenericCompound");
    clone.add_lender(&env.ctx(GOV), lender.into()).unwrap();
    let report = clone.harvest(&env.ctx(STRATEGIST), &mut env.vault).unwrap();
    assert_eq!(report.loss, U256::ZERO);
    assert_eq!(clone.loose(), U256::ZERO);

    env.chain.sleep(DAY);
    let report = clone.harvest(&env.ctx(STRATEGIST), &mut env.vault).unwrap();
    assert_eq!(report.loss, U256::ZERO);
    assert!(report.profit > old_assets - old_debt);

    let shares = env.vault.balance_of(ALICE);
    let out = env
        .vault
        .withdraw(
            &env.chain.ctx(ALICE),
            shares,
            &mut [&mut clone as &mut dyn VaultStrategy],
        )
        .unwrap();
    assert!(out >= usdc(9_990));
}

#[test]
fn test_migration_needs_governance() {
    let mut env = Env::new();
    let market = env.market(200, 500_000);
    env.add_compound(&market, "GenericCompound");
    env.deposit(ALICE, usdc(1_000));
    env.harvest();

    let clone = env
        .strategy
        .clone_strategy(&env.chain.ctx(STRATEGIST), &env.vault)
        .unwrap();
    let ctx = env.ctx(STRATEGIST);
    let err = env
        .vault
        .migrate_strategy(&ctx, &mut env.strategy, &clone)
        .unwrap_err();
    assert!(matches!(err, VaultError::Unauthorized(_)));
    assert_eq!(env.strategy.status(), StrategyStatus::Active);
    assert!(env.vault.strategy_params(clone.address()).is_none());
}

#[test]
fn test_migration_waits_for_illiquid_lender() {
    let mut env = Env::new();
    let market = env.market(200, 500_000);
    env.add_compound(&market, "GenericCompound");
    env.deposit(ALICE, usdc(10_000));
    env.harvest();

    market.drain_liquidity(env.chain.now());
    let old_address = env.strategy.address();
    let old_debt = env.vault.strategy_params(old_address).unwrap().total_debt;
    let old_assets = env.strategy.estimated_total_assets();
    let clone = env
        .strategy
        .clone_strategy(&env.chain.ctx(STRATEGIST), &env.vault)
        .unwrap();

    let ctx = env.ctx(GOV);
    let err = env
        .vault
        .migrate_strategy(&ctx, &mut env.strategy, &clone)
        .unwrap_err();
    match err {
        VaultError::Strategy(inner) => {
            assert!(matches!(*inner, StrategyError::WithdrawFailed { .. }))
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(env.strategy.status(), StrategyStatus::Active);
    assert_eq!(env.strategy.estimated_total_assets(), old_assets);
    assert_eq!(
        env.vault.strategy_params(old_address).unwrap().total_debt,
        old_debt
    );
    assert!(env.vault.strategy_params(clone.address()).is_none());
    assert_eq!(env.vault.withdrawal_queue(), &[old_address]);

    market.restore_liquidity(env.chain.now()).unwrap();
    env.vault
        .migrate_strategy(&ctx, &mut env.strategy, &clone)
        .unwrap();
    assert_eq!(env.strategy.status(), StrategyStatus::Retired);
    assert!(within_bps(clone.estimated_total_assets(), old_assets, 10));
}
