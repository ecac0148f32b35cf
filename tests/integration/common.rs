//! Shared fixture.
//!
//! A USDC vault with one strategy attached at full debt ratio, a router
//! pricing USDC and COMP, and helpers to open Compound-style markets and
//! dock lenders on them.

#![allow(dead_code)]

use std::sync::Arc;

use multilend::config::{LenderConfig, StrategyConfig, VaultConfig};
use multilend::lenders::{GenericCompound, Lender, LenderAccess, LenderAdapter};
use multilend::sim::{Chain, RateModel, SimCompoundMarket, SimRouter, SimToken, SimVault};
use multilend::strategy::harvest::HarvestReport;
use multilend::strategy::Strategy;
use multilend::types::{units, Address, CallContext, VaultError, U256};
use multilend::vault::VaultStrategy;

pub const GOV: Address = Address::new([0x60; 20]);
pub const STRATEGIST: Address = Address::new([0x62; 20]);
pub const WHALE: Address = Address::new([0xee; 20]);
pub const ALICE: Address = Address::new([0xa1; 20]);
pub const BOB: Address = Address::new([0xb0; 20]);

pub const DAY: u64 = 86_400;

/// Whole USDC.
pub fn usdc(amount: u64) -> U256 {
    units(amount, 6)
}

pub struct Env {
    pub chain: Chain,
    pub usdc: SimToken,
    pub comp: SimToken,
    pub router: Arc<SimRouter>,
    pub vault: SimVault,
    pub strategy: Strategy,
}

impl Env {
    pub fn new() -> Self {
        let mut chain = Chain::new();
        let usdc = SimToken::new("USDC", 6);
        let comp = SimToken::new("COMP", 18);
        let router = Arc::new(SimRouter::new());
        router.list(&usdc, units(1, 18));
        router.list(&comp, units(50, 18));

        let vault_address = chain.deploy(GOV);
        let mut vault = SimVault::new(
            vault_address,
            Arc::new(usdc.clone()),
            GOV,
            GOV,
            &VaultConfig::default(),
            chain.now(),
        );
        let strategy_address = chain.deploy(STRATEGIST);
        let strategy = Strategy::new(
            &chain.ctx(STRATEGIST),
            strategy_address,
            &vault,
            Arc::new(usdc.clone()),
            &StrategyConfig::default(),
        )
        .unwrap();
        vault
            .add_strategy(&chain.ctx(GOV), &strategy, 10_000, U256::ZERO, U256::MAX)
            .unwrap();

        Self {
            chain,
            usdc,
            comp,
            router,
            vault,
            strategy,
        }
    }

    pub fn ctx(&self, who: Address) -> CallContext {
        self.chain.ctx(who)
    }

    /// A market holding 1M USDC from the whale with `borrowed` of it lent
    /// out. `base_rate_bps` shifts the whole rate curve.
    pub fn market(&mut self, base_rate_bps: u64, borrowed: u64) -> Arc<SimCompoundMarket> {
        let model = RateModel {
            base_rate: units(base_rate_bps, 14),
            ..RateModel::default()
        };
        let market = Arc::new(SimCompoundMarket::new(
            self.chain.deploy(WHALE),
            Arc::new(self.usdc.clone()),
            model,
            self.chain.now(),
        ));
        self.usdc.mint(WHALE, usdc(1_000_000));
        market.seed(WHALE, usdc(1_000_000), self.chain.now()).unwrap();
        if borrowed > 0 {
            market.borrow(WHALE, usdc(borrowed), self.chain.now()).unwrap();
        }
        market
    }

    /// Same as [`Env::market`] with COMP streamed to suppliers.
    pub fn rewarding_market(&mut self, comp_per_year: u64) -> Arc<SimCompoundMarket> {
        let market = self.market(200, 500_000);
        market.set_rewards(self.comp.clone(), units(comp_per_year, 18));
        market
    }

    /// A `GenericCompound` adapter bound through `access`, not yet docked.
    pub fn compound_lender(
        &mut self,
        access: LenderAccess,
        market: &Arc<SimCompoundMarket>,
        name: &str,
    ) -> GenericCompound {
        GenericCompound::new(
            self.chain.deploy(STRATEGIST),
            name,
            access,
            Arc::new(self.usdc.clone()),
            market.clone(),
            Some(self.router.clone()),
            &LenderConfig::default(),
        )
    }

    /// Dock a `GenericCompound` on `market`; returns the adapter address.
    pub fn add_compound(&mut self, market: &Arc<SimCompoundMarket>, name: &str) -> Address {
        let access = self.strategy.lender_access();
        let lender: Lender = self.compound_lender(access, market, name).into();
        let address = lender.address();
        self.strategy.add_lender(&self.ctx(GOV), lender).unwrap();
        address
    }

    pub fn deposit(&mut self, who: Address, amount: U256) -> U256 {
        self.usdc.mint(who, amount);
        self.vault.deposit(&self.chain.ctx(who), amount).unwrap()
    }

    pub fn harvest(&mut self) -> HarvestReport {
        let ctx = self.chain.ctx(STRATEGIST);
        self.strategy.harvest(&ctx, &mut self.vault).unwrap()
    }

    pub fn withdraw(&mut self, who: Address, shares: U256) -> Result<U256, VaultError> {
        let ctx = self.chain.ctx(who);
        self.vault
            .withdraw(&ctx, shares, &mut [&mut self.strategy as &mut dyn VaultStrategy])
    }

    pub fn withdraw_all(&mut self, who: Address) -> U256 {
        let shares = self.vault.balance_of(who);
        self.withdraw(who, shares).unwrap()
    }

    pub fn trigger(&self, call_cost: U256) -> bool {
        self.strategy
            .harvest_trigger(&self.vault, self.chain.now(), call_cost)
    }

    /// NAV of the docked lender at `address`.
    pub fn lender_nav(&self, address: Address) -> U256 {
        self.strategy
            .lender(address)
            .map(|l| l.adapter().nav())
            .unwrap_or(U256::ZERO)
    }
}
