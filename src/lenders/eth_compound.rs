//! Compound lender for the native asset (cETH).
//!
//! The strategy deals in WETH; the market only takes ether. Want is
//! unwrapped right before supplying and wrapped again after redeeming.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::LenderConfig;
use crate::lenders::base::{LenderAccess, LenderAdapter, LenderBase, LenderKind};
use crate::lenders::compound::uni_route;
use crate::market::{Erc20, LendingMarket, SwapRouter, WrappedNative};
use crate::types::{AccessTier, Address, CallContext, LenderError, U256};

pub struct EthCompound {
    base: LenderBase,
    weth: Arc<dyn WrappedNative>,
    market: Arc<dyn LendingMarket>,
}

impl EthCompound {
    /// `market` must be denominated in the native asset behind `weth`.
    pub fn new<W: WrappedNative + 'static>(
        address: Address,
        name: &str,
        access: LenderAccess,
        weth: Arc<W>,
        market: Arc<dyn LendingMarket>,
        router: Option<Arc<dyn SwapRouter>>,
        cfg: &LenderConfig,
    ) -> Self {
        let want: Arc<dyn Erc20> = weth.clone();
        Self {
            base: LenderBase::new(name, address, want, access, router, cfg),
            weth,
            market,
        }
    }

    pub fn native_balance(&self) -> U256 {
        self.weth.native_balance_of(self.base.address)
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
}

impl LenderAdapter for EthCompound {
    fn base(&self) -> &LenderBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut LenderBase {
        &mut self.base
    }

    fn kind(&self) -> LenderKind {
        LenderKind::EthCompound
    }

    fn loose(&self) -> U256 {
        self.base.want_balance().saturating_add(self.native_balance())
    }

    fn settle_loose(&mut self) -> Result<(), LenderError> {
        let native = self.native_balance();
        if !native.is_zero() {
            self.weth.wrap_native(self.base.address, native)?;
        }
        Ok(())
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
        let me = self.base.address;
        let wrapped = self.base.want_balance();
        if !wrapped.is_zero() {
            self.weth.unwrap_native(me, wrapped)?;
        }
        let native = self.native_balance().min(amount);
        Ok(self.market.supply(me, native, ctx.timestamp)?)
    }

    fn redeem(&mut self, ctx: &CallContext, amount: U256) -> Result<(), LenderError> {
        self.market
            .redeem_underlying(self.base.address, amount, ctx.timestamp)?;
        self.settle_loose()
    }

    fn pending_rewards(&self, now: DateTime<Utc>) -> U256 {
        self.market.pending_rewards(self.base.address, now)
    }

    fn claim_rewards(&mut self, ctx: &CallContext) -> Result<U256, LenderError> {
        Ok(self.market.claim_rewards(self.base.address, ctx.timestamp))
    }
}
