//! Sonne Finance lender: a Compound v2 fork on Optimism.
//!
//! Rewards (SONNE) are sold through a Velodrome pair; whether the pair
//! is the stable or volatile pool is configurable.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::LenderConfig;
use crate::lenders::base::{LenderAccess, LenderAdapter, LenderBase, LenderKind};
use crate::market::{Erc20, LendingMarket, SwapRoute, SwapRouter};
use crate::types::{AccessTier, Address, CallContext, LenderError, U256};

pub struct SonneFinance {
    base: LenderBase,
    market: Arc<dyn LendingMarket>,
}

impl SonneFinance {
    pub fn new(
        address: Address,
        name: &str,
        access: LenderAccess,
        want: Arc<dyn Erc20>,
        market: Arc<dyn LendingMarket>,
        router: Option<Arc<dyn SwapRouter>>,
        cfg: &LenderConfig,
    ) -> Self {
        let mut base = LenderBase::new(name, address, want, access, router, cfg);
        base.route = Some(SwapRoute::Solidly { stable: false });
        Self { base, market }
    }

    pub fn stable_route(&self) -> bool {
        matches!(self.base.route, Some(SwapRoute::Solidly { stable: true }))
    }

    pub fn set_stable_route(&mut self, ctx: &CallContext, stable: bool) -> Result<(), LenderError> {
        self.base.check(ctx, AccessTier::Management)?;
        self.base.route = Some(SwapRoute::Solidly { stable });
        Ok(())
    }

    pub fn clone_sonne_finance(
        &mut self,
        access: LenderAccess,
        name: &str,
        market: Arc<dyn LendingMarket>,
    ) -> SonneFinance {
        let mut base = self.base.clone_for(name, access);
        base.route = Some(SwapRoute::Solidly { stable: false });
        SonneFinance { base, market }
    }
}

impl LenderAdapter for SonneFinance {
    fn base(&self) -> &LenderBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut LenderBase {
        &mut self.base
    }

    fn kind(&self) -> LenderKind {
        LenderKind::SonneFinance
    }

    fn accrue(&self, now: DateTime<Utc>) {
        self.market.accrue_interest(now);
    }

    fn lent(&self) -> U256 {
        self.market.balance_of_underlying_stored(self.base.address)
    }

    fn market_liquidity(&self) -> U256 {
        self.market.cash()
    }

    fn supply_rate_after(&self, extra: U256) -> U256 {
        self.market.supply_rate_after(extra)
    }

    fn market_total_supply(&self) -> U256 {
        self.market.total_supply_underlying()
    }

    fn reward_emission_per_year(&self) -> U256 {
        self.market.reward_emission_per_year()
    }

    fn reward_token(&self) -> Option<Arc<dyn Erc20>> {
        self.market.reward_token()
    }

    fn supply(&mut self, ctx: &CallContext, amount: U256) -> Result<(), LenderError> {
        Ok(self.market.supply(self.base.address, amount, ctx.timestamp)?)
    }

    fn redeem(&mut self, ctx: &CallContext, amount: U256) -> Result<(), LenderError> {
        Ok(self
            .market
            .redeem_underlying(self.base.address, amount, ctx.timestamp)?)
    }

    fn pending_rewards(&self, now: DateTime<Utc>) -> U256 {
        self.market.pending_rewards(self.base.address, now)
    }

    fn claim_rewards(&mut self, ctx: &CallContext) -> Result<U256, LenderError> {
        Ok(self.market.claim_rewards(self.base.address, ctx.timestamp))
    }
}
