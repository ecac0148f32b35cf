//! Morpho-Aave lender (`GenericAaveMorpho`).
//!
//! Supply is matched peer-to-peer against waiting borrowers up to the
//! gas budget, the rest sits in the underlying Aave pool. The rate
//! quoted is the blend the position would earn.

use alloy_primitives::address;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::LenderConfig;
use crate::lenders::base::{LenderAccess, LenderAdapter, LenderBase, LenderKind};
use crate::market::{Erc20, P2pMarket, SwapRouter};
use crate::types::{AccessTier, Address, CallContext, LenderError, U256};

/// Mainnet MORPHO rewards distributor.
pub const MORPHO_REWARDS_DISTRIBUTOR: Address =
    address!("3b14e5c73e0a56d607a8688098326fd4b4292135");

pub struct AaveMorpho {
    base: LenderBase,
    market: Arc<dyn P2pMarket>,
    max_gas_for_matching: u64,
    rewards_distributor: Address,
}

impl AaveMorpho {
    pub fn new(
        address: Address,
        name: &str,
        access: LenderAccess,
        want: Arc<dyn Erc20>,
        market: Arc<dyn P2pMarket>,
        router: Option<Arc<dyn SwapRouter>>,
        cfg: &LenderConfig,
    ) -> Self {
        Self {
            base: LenderBase::new(name, address, want, access, router, cfg),
            market,
            max_gas_for_matching: cfg.max_gas_for_matching,
            rewards_distributor: MORPHO_REWARDS_DISTRIBUTOR,
        }
    }

    pub fn max_gas_for_matching(&self) -> u64 {
        self.max_gas_for_matching
    }

    pub fn rewards_distributor(&self) -> Address {
        self.rewards_distributor
    }

    /// Share of the position earning the peer-to-peer rate.
    pub fn matched(&self) -> U256 {
        self.market.matched_balance_of(self.base.address)
    }

    pub fn set_max_gas_for_matching(
        &mut self,
        ctx: &CallContext,
        max_gas: u64,
    ) -> Result<(), LenderError> {
        self.base.check(ctx, AccessTier::Management)?;
        self.max_gas_for_matching = max_gas;
        Ok(())
    }

    /// Zero disables reward claiming.
    pub fn set_rewards_distributor(
        &mut self,
        ctx: &CallContext,
        distributor: Address,
    ) -> Result<(), LenderError> {
        self.base.check(ctx, AccessTier::Governance)?;
        self.rewards_distributor = distributor;
        Ok(())
    }

    pub fn clone_morpho_aave_lender(
        &mut self,
        access: LenderAccess,
        name: &str,
        market: Arc<dyn P2pMarket>,
    ) -> AaveMorpho {
        let defaults = LenderConfig::default();
        AaveMorpho {
            base: self.base.clone_for(name, access),
            market,
            max_gas_for_matching: defaults.max_gas_for_matching,
            rewards_distributor: MORPHO_REWARDS_DISTRIBUTOR,
        }
    }
}

impl LenderAdapter for AaveMorpho {
    fn base(&self) -> &LenderBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut LenderBase {
        &mut self.base
    }

    fn kind(&self) -> LenderKind {
        LenderKind::AaveMorpho
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
        self.market
            .next_user_supply_rate(self.base.address, extra, self.max_gas_for_matching)
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
        Ok(self.market.supply_matched(
            self.base.address,
            amount,
            self.max_gas_for_matching,
            ctx.timestamp,
        )?)
    }

    fn redeem(&mut self, ctx: &CallContext, amount: U256) -> Result<(), LenderError> {
        Ok(self
            .market
            .redeem_underlying(self.base.address, amount, ctx.timestamp)?)
    }

    fn pending_rewards(&self, now: DateTime<Utc>) -> U256 {
        if self.rewards_distributor == Address::ZERO {
            return U256::ZERO;
        }
        self.market.pending_rewards(self.base.address, now)
    }

    fn claim_rewards(&mut self, ctx: &CallContext) -> Result<U256, LenderError> {
        if self.rewards_distributor == Address::ZERO {
            return Ok(U256::ZERO);
        }
        Ok(self.market.claim_rewards(self.base.address, ctx.timestamp))
    }
}
