//! Capability trait shared by every lender adapter.
//!
//! A variant only supplies the market plumbing (supply, redeem, rates,
//! rewards). Access control, capped withdrawals, reward disposal and the
//! harvest trigger are provided here once for all variants.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::LenderConfig;
use crate::market::{Erc20, SwapRoute, SwapRouter, TradeFactory};
use crate::math::{apr_percent, mul_div};
use crate::types::{AccessTier, Address, CallContext, LenderError, U256, WAD};

/// Which market family an adapter speaks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LenderKind {
    GenericCompound,
    EthCompound,
    AaveMorpho,
    SonneFinance,
}

impl fmt::Display for LenderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LenderKind::GenericCompound => write!(f, "GenericCompound"),
            LenderKind::EthCompound => write!(f, "EthCompound"),
            LenderKind::AaveMorpho => write!(f, "GenericAaveMorpho"),
            LenderKind::SonneFinance => write!(f, "SonneFinance"),
        }
    }
}

/// Addresses an adapter trusts, copied from the owning strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LenderAccess {
    pub strategy: Address,
    pub governance: Address,
    pub management: Address,
    pub strategist: Address,
}

/// Result of a full exit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WithdrawOutcome {
    /// NAV at the start of the exit.
    pub requested: U256,
    /// Want sent back to the strategy.
    pub returned: U256,
}

impl WithdrawOutcome {
    pub fn is_complete(&self) -> bool {
        self.returned >= self.requested
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// State every adapter carries regardless of market.
pub struct LenderBase {
    pub(crate) name: String,
    pub(crate) address: Address,
    pub(crate) want: Arc<dyn Erc20>,
    pub(crate) access: LenderAccess,
    pub(crate) keep3r: Address,
    pub(crate) dust: U256,
    pub(crate) min_reward_to_sell: U256,
    pub(crate) min_reward_to_claim: U256,
    pub(crate) router: Option<Arc<dyn SwapRouter>>,
    pub(crate) route: Option<SwapRoute>,
    pub(crate) trade_factory: Option<Arc<dyn TradeFactory>>,
    initialized: bool,
    clone_nonce: u64,
}

impl LenderBase {
    pub fn new(
        name: &str,
        address: Address,
        want: Arc<dyn Erc20>,
        access: LenderAccess,
        router: Option<Arc<dyn SwapRouter>>,
        cfg: &LenderConfig,
    ) -> Self {
        let route = (cfg.reward_to_eth_fee > 0 && cfg.eth_to_want_fee > 0).then_some(
            SwapRoute::UniswapV3 {
                reward_to_eth_fee: cfg.reward_to_eth_fee,
                eth_to_want_fee: cfg.eth_to_want_fee,
            },
        );
        Self {
            name: name.to_string(),
            address,
            want,
            access,
            keep3r: Address::ZERO,
            dust: cfg.dust(),
            min_reward_to_sell: cfg.min_reward_to_sell(),
            min_reward_to_claim: cfg.min_reward_to_claim(),
            router,
            route,
            trade_factory: None,
            initialized: true,
            clone_nonce: 0,
        }
    }

    /// Fresh base for a clone: same want and router, default thresholds.
    pub(crate) fn clone_for(&mut self, name: &str, access: LenderAccess) -> LenderBase {
        let address = self.address.create(self.clone_nonce);
        self.clone_nonce += 1;
        LenderBase::new(
            name,
            address,
            self.want.clone(),
            access,
            self.router.clone(),
            &LenderConfig::default(),
        )
    }

    pub(crate) fn want_balance(&self) -> U256 {
        self.want.balance_of(self.address)
    }

    fn is_management(&self, who: Address) -> bool {
        who == self.access.strategy
            || who == self.access.governance
            || who == self.access.management
            || who == self.access.strategist
    }

    pub(crate) fn check(&self, ctx: &CallContext, tier: AccessTier) -> Result<(), LenderError> {
        let who = ctx.sender;
        let allowed = match tier {
            AccessTier::Governance => who == self.access.governance,
            AccessTier::Keepers => {
                self.is_management(who) || (self.keep3r != Address::ZERO && who == self.keep3r)
            }
            _ => self.is_management(who),
        };
        if allowed {
            Ok(())
        } else {
            Err(LenderError::Unauthorized(tier))
        }
    }
}

// ---------------------------------------------------------------------------
// LenderAdapter
// ---------------------------------------------------------------------------

pub trait LenderAdapter: Send + Sync {
    fn base(&self) -> &LenderBase;
    fn base_mut(&mut self) -> &mut LenderBase;
    fn kind(&self) -> LenderKind;

    // -- market plumbing ----------------------------------------------------

    fn accrue(&self, now: DateTime<Utc>);
    /// Underlying supplied to the market at the stored rate.
    fn lent(&self) -> U256;
    /// Underlying the market could pay out right now.
    fn market_liquidity(&self) -> U256;
    /// Base supply rate after `extra` more is supplied, rewards excluded.
    fn supply_rate_after(&self, extra: U256) -> U256;
    fn market_total_supply(&self) -> U256;
    fn reward_emission_per_year(&self) -> U256;
    fn reward_token(&self) -> Option<Arc<dyn Erc20>>;
    fn supply(&mut self, ctx: &CallContext, amount: U256) -> Result<(), LenderError>;
    fn redeem(&mut self, ctx: &CallContext, amount: U256) -> Result<(), LenderError>;
    fn pending_rewards(&self, now: DateTime<Utc>) -> U256;
    fn claim_rewards(&mut self, ctx: &CallContext) -> Result<U256, LenderError>;

    /// Want held by the adapter and not yet supplied.
    fn loose(&self) -> U256 {
        self.base().want_balance()
    }

    /// Convert anything held outside `want` back into `want`.
    fn settle_loose(&mut self) -> Result<(), LenderError> {
        Ok(())
    }

    // -- views --------------------------------------------------------------

    fn address(&self) -> Address {
        self.base().address
    }

    fn lender_name(&self) -> &str {
        &self.base().name
    }

    fn strategy(&self) -> Address {
        self.base().access.strategy
    }

    fn dust(&self) -> U256 {
        self.base().dust
    }

    fn keep3r(&self) -> Address {
        self.base().keep3r
    }

    fn trade_factory(&self) -> Option<Address> {
        self.base().trade_factory.as_ref().map(|tf| tf.address())
    }

    fn reward_thresholds(&self) -> (U256, U256) {
        (self.base().min_reward_to_sell, self.base().min_reward_to_claim)
    }

    fn underlying_balance_stored(&self) -> U256 {
        self.lent()
    }

    fn nav(&self) -> U256 {
        self.loose().saturating_add(self.lent())
    }

    fn has_assets(&self) -> bool {
        self.nav() > self.base().dust
    }

    fn apr(&self) -> U256 {
        self.apr_after_deposit(U256::ZERO)
    }

    fn apr_after_deposit(&self, amount: U256) -> U256 {
        self.supply_rate_after(amount)
            .saturating_add(self.reward_apr_for_supply_base(amount))
    }

    fn weighted_apr(&self) -> U256 {
        self.apr().saturating_mul(self.nav())
    }

    /// Reward yield valued in want, diluted over the market supply plus `extra`.
    fn reward_apr_for_supply_base(&self, extra: U256) -> U256 {
        let emission = self.reward_emission_per_year();
        if emission.is_zero() {
            return U256::ZERO;
        }
        let (Some(reward), Some(router)) = (self.reward_token(), self.base().router.as_ref())
        else {
            return U256::ZERO;
        };
        let route = self.base().route.unwrap_or_default();
        let Ok(value) = router.quote(reward.address(), self.base().want.address(), emission, &route)
        else {
            return U256::ZERO;
        };
        mul_div(value, WAD, self.market_total_supply().saturating_add(extra))
    }

    fn reward_balance(&self) -> U256 {
        self.reward_token()
            .map(|t| t.balance_of(self.address()))
            .unwrap_or(U256::ZERO)
    }

    /// Rewards can be swapped in place: a route is set and no trade factory owns them.
    fn can_sell_rewards(&self) -> bool {
        let base = self.base();
        base.trade_factory.is_none() && base.router.is_some() && base.route.is_some()
    }

    fn harvest_trigger(&self, now: DateTime<Utc>, _call_cost: U256) -> bool {
        let base = self.base();
        let pending = self.pending_rewards(now);
        if !pending.is_zero() && pending >= base.min_reward_to_claim {
            return true;
        }
        let held = self.reward_balance();
        self.can_sell_rewards() && !held.is_zero() && held >= base.min_reward_to_sell
    }

    // -- mutations ----------------------------------------------------------

    fn initialize(&mut self, access: LenderAccess) -> Result<(), LenderError> {
        let base = self.base_mut();
        if base.initialized {
            return Err(LenderError::AlreadyInitialized);
        }
        base.access = access;
        base.initialized = true;
        Ok(())
    }

    /// Copy the strategy's current roles. The bound strategy never changes.
    fn refresh_roles(&mut self, access: LenderAccess) {
        let base = self.base_mut();
        base.access = LenderAccess {
            strategy: base.access.strategy,
            ..access
        };
    }

    /// Supply every loose want to the market. Zero is a no-op.
    fn deposit(&mut self, ctx: &CallContext) -> Result<(), LenderError> {
        self.base().check(ctx, AccessTier::Management)?;
        let amount = self.loose();
        if amount.is_zero() {
            return Ok(());
        }
        self.supply(ctx, amount)?;
        debug!(lender = %self.lender_name(), amount = %amount, "Deposited");
        Ok(())
    }

    /// Withdraw up to `amount` to the strategy; returns what was sent.
    fn withdraw(&mut self, ctx: &CallContext, amount: U256) -> Result<U256, LenderError> {
        self.base().check(ctx, AccessTier::Management)?;
        withdraw_capped(self, ctx, amount)
    }

    /// Best-effort full exit. Illiquidity leaves the rest in the market.
    fn withdraw_all(&mut self, ctx: &CallContext) -> Result<WithdrawOutcome, LenderError> {
        self.base().check(ctx, AccessTier::Management)?;
        self.accrue(ctx.timestamp);
        let requested = self.nav();
        let returned = withdraw_capped(self, ctx, U256::MAX)?;
        Ok(WithdrawOutcome {
            requested,
            returned,
        })
    }

    /// Pull `amount` out of the market and send all loose want to governance.
    fn emergency_withdraw(&mut self, ctx: &CallContext, amount: U256) -> Result<U256, LenderError> {
        self.base().check(ctx, AccessTier::Governance)?;
        self.accrue(ctx.timestamp);
        let to_redeem = amount.min(self.market_liquidity()).min(self.lent());
        if !to_redeem.is_zero() {
            self.redeem(ctx, to_redeem)?;
        }
        self.settle_loose()?;
        let out = self.base().want_balance();
        if !out.is_zero() {
            self.base().want.transfer(self.address(), ctx.sender, out)?;
        }
        warn!(lender = %self.lender_name(), amount = %out, "Emergency withdrawal to governance");
        Ok(out)
    }

    /// Claim, dispose of rewards and reinvest loose want. Returns rewards claimed.
    fn harvest(&mut self, ctx: &CallContext) -> Result<U256, LenderError> {
        self.base().check(ctx, AccessTier::Keepers)?;
        self.accrue(ctx.timestamp);

        let pending = self.pending_rewards(ctx.timestamp);
        let claimed = if !pending.is_zero() && pending >= self.base().min_reward_to_claim {
            self.claim_rewards(ctx)?
        } else {
            U256::ZERO
        };

        dispose_rewards(self)?;

        let idle = self.loose();
        if !idle.is_zero() {
            self.supply(ctx, idle)?;
        }
        debug!(
            lender = %self.lender_name(),
            claimed = %claimed,
            reinvested = %idle,
            apr = %apr_percent(self.apr()),
            "Lender harvested"
        );
        Ok(claimed)
    }

    fn set_dust(&mut self, ctx: &CallContext, dust: U256) -> Result<(), LenderError> {
        self.base().check(ctx, AccessTier::Management)?;
        self.base_mut().dust = dust;
        Ok(())
    }

    fn set_keep3r(&mut self, ctx: &CallContext, keep3r: Address) -> Result<(), LenderError> {
        self.base().check(ctx, AccessTier::Management)?;
        self.base_mut().keep3r = keep3r;
        Ok(())
    }

    fn set_reward_thresholds(
        &mut self,
        ctx: &CallContext,
        min_to_sell: U256,
        min_to_claim: U256,
    ) -> Result<(), LenderError> {
        self.base().check(ctx, AccessTier::Management)?;
        let base = self.base_mut();
        base.min_reward_to_sell = min_to_sell;
        base.min_reward_to_claim = min_to_claim;
        Ok(())
    }

    /// Hand reward selling to `factory`, replacing any previous one.
    fn set_trade_factory(
        &mut self,
        ctx: &CallContext,
        factory: Arc<dyn TradeFactory>,
    ) -> Result<(), LenderError> {
        self.base().check(ctx, AccessTier::Governance)?;
        let reward = self.reward_token().ok_or(LenderError::NoRewardToken)?;
        revoke_trade_factory(self, reward.as_ref());

        let me = self.address();
        reward.approve(me, factory.address(), U256::MAX);
        factory.enable(reward.address(), self.base().want.address());
        info!(lender = %self.lender_name(), factory = %factory.address(), "Trade factory set");
        self.base_mut().trade_factory = Some(factory);
        Ok(())
    }

    fn remove_trade_factory_permissions(&mut self, ctx: &CallContext) -> Result<(), LenderError> {
        self.base().check(ctx, AccessTier::Management)?;
        if let Some(reward) = self.reward_token() {
            revoke_trade_factory(self, reward.as_ref());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Shared algorithms
// ---------------------------------------------------------------------------

/// Send up to `amount` to the strategy, loose want first, then whatever
/// market liquidity allows. Redeems at or below dust are skipped.
fn withdraw_capped<L: LenderAdapter + ?Sized>(
    lender: &mut L,
    ctx: &CallContext,
    amount: U256,
) -> Result<U256, LenderError> {
    lender.accrue(ctx.timestamp);
    lender.settle_loose()?;

    let me = lender.address();
    let strategy = lender.strategy();
    let lent = lender.lent();
    let loose = lender.loose();
    let amount = amount.min(lent.saturating_add(loose));

    if loose >= amount {
        if !amount.is_zero() {
            lender.base().want.transfer(me, strategy, amount)?;
        }
        return Ok(amount);
    }

    let liquidity = lender.market_liquidity();
    if liquidity > U256::from(1u8) {
        let to_withdraw = (amount - loose).min(liquidity).min(lent);
        if to_withdraw > lender.base().dust {
            lender.redeem(ctx, to_withdraw)?;
        }
    }

    lender.settle_loose()?;
    let returned = lender.base().want_balance();
    if !returned.is_zero() {
        lender.base().want.transfer(me, strategy, returned)?;
    }
    if returned < amount {
        warn!(
            lender = %lender.lender_name(),
            requested = %amount,
            returned = %returned,
            liquidity = %liquidity,
            "Partial withdrawal, market illiquid"
        );
    }
    Ok(returned)
}

/// Swap held rewards to want when selling in place is possible.
fn dispose_rewards<L: LenderAdapter + ?Sized>(lender: &mut L) -> Result<(), LenderError> {
    if !lender.can_sell_rewards() {
        return Ok(());
    }
    let Some(reward) = lender.reward_token() else {
        return Ok(());
    };
    let me = lender.address();
    let held = reward.balance_of(me);
    let base = lender.base();
    if held.is_zero() || held < base.min_reward_to_sell {
        return Ok(());
    }
    let (Some(router), Some(route)) = (base.router.as_ref(), base.route) else {
        return Ok(());
    };
    let out = router.swap(me, reward.address(), base.want.address(), held, U256::ZERO, &route)?;
    debug!(lender = %base.name, sold = %held, received = %out, "Rewards swapped");
    Ok(())
}

fn revoke_trade_factory<L: LenderAdapter + ?Sized>(lender: &mut L, reward: &dyn Erc20) {
    let me = lender.address();
    let want = lender.base().want.address();
    if let Some(old) = lender.base_mut().trade_factory.take() {
        reward.approve(me, old.address(), U256::ZERO);
        old.disable(reward.address(), want);
        info!(lender = %lender.lender_name(), factory = %old.address(), "Trade factory removed");
    }
}
