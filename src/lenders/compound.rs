//! Compound v2 lender (`GenericCompound`).
//!
//! Supplies want to a cToken market and sells COMP through a two-hop
//! Uniswap v3 route once both fee tiers are configured.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::LenderConfig;
use crate::lenders::base::{LenderAccess, LenderAdapter, LenderBase, LenderKind};
use crate::market::{Erc20, LendingMarket, SwapRoute, SwapRouter};
use crate::types::{AccessTier, Address, CallContext, LenderError, U256};

pub struct GenericCompound {
    base: LenderBase,
    market: Arc<dyn LendingMarket>,
}

impl GenericCompound {
    pub fn new(
        address: Address,
        name: &str,
        access: LenderAccess,
        want: Arc<dyn Erc20>,
        market: Arc<dyn LendingMarket>,
        router: Option<Arc<dyn SwapRouter>>,
        cfg: &LenderConfig,
    ) -> Self {
        Self {
            base: LenderBase::new(name, address, want, access, router, cfg),
            market,
        }
    }

    pub fn market(&self) -> Address {
        self.market.address()
    }

    /// Current Uniswap v3 fee tiers; zero when no route is configured.
    pub fn uni_fees(&self) -> (u32, u32) {
        match self.base.route {
            Some(SwapRoute::UniswapV3 {
                reward_to_eth_fee,
                eth_to_want_fee,
            }) => (reward_to_eth_fee, eth_to_want_fee),
            _ => (0, 0),
        }
    }

    pub fn set_uni_fees(
        &mut self,
        ctx: &CallContext,
        reward_to_eth_fee: u32,
        eth_to_want_fee: u32,
    ) -> Result<(), LenderError> {
        self.base.check(ctx, AccessTier::Management)?;
        self.base.route = uni_route(reward_to_eth_fee, eth_to_want_fee);
        Ok(())
    }

    /// New adapter for `access.strategy` on `market`, with default settings.
    pub fn clone_compound_lender(
        &mut self,
        access: LenderAccess,
        name: &str,
        market: Arc<dyn LendingMarket>,
    ) -> GenericCompound {
        GenericCompound {
            base: self.base.clone_for(name, access),
            market,
        }
    }
}

pub(crate) fn uni_route(reward_to_eth_fee: u32, eth_to_want_fee: u32) -> Option<SwapRoute> {
    (reward_to_eth_fee > 0 && eth_to_want_fee > 0).then_some(SwapRoute::UniswapV3 {
        reward_to_eth_fee,
        eth_to_want_fee,
    })
}

impl LenderAdapter for GenericCompound {
    fn base(&self) -> &LenderBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut LenderBase {
        &mut self.base
    }

    fn kind(&self) -> LenderKind {
        LenderKind::GenericCompound
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

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
