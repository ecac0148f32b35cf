//! Yearn v2 style vault.
//!
//! Share accounting, per-strategy debt ledgers, the withdrawal queue and
//! locked-profit degradation. Strategies are not owned by the vault;
//! calls that need one borrow it from the caller.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::VaultConfig;
use crate::market::Erc20;
use crate::math::{bps_of, mul_div};
use crate::types::{AccessTier, Address, CallContext, VaultError, MAX_BPS, U256};
use crate::vault::{StrategyParams, StrategyReport, Vault, VaultStrategy};

const MAX_DEBT_RATIO: u64 = 10_000;

pub struct SimVault {
    address: Address,
    want: Arc<dyn Erc20>,
    governance: Address,
    management: Address,
    deposit_limit: U256,
    max_loss_bps: u64,
    locked_profit_window: Duration,

    shares: HashMap<Address, U256>,
    total_supply: U256,

    strategies: HashMap<Address, StrategyParams>,
    withdrawal_queue: Vec<Address>,
    debt_ratio: u64,
    total_debt: U256,
    emergency_shutdown: bool,

    locked_profit: U256,
    last_report: DateTime<Utc>,
}

impl SimVault {
    pub fn new(
        address: Address,
        want: Arc<dyn Erc20>,
        governance: Address,
        management: Address,
        cfg: &VaultConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let deposit_limit = if cfg.deposit_limit == 0 {
            U256::MAX
        } else {
            U256::from(cfg.deposit_limit)
        };
        Self {
            address,
            want,
            governance,
            management,
            deposit_limit,
            max_loss_bps: cfg.max_loss_bps,
            locked_profit_window: Duration::seconds(
                i64::try_from(cfg.locked_profit_window_secs).unwrap_or(i64::MAX / 2),
            ),
            shares: HashMap::new(),
            total_supply: U256::ZERO,
            strategies: HashMap::new(),
            withdrawal_queue: Vec::new(),
            debt_ratio: 0,
            total_debt: U256::ZERO,
            emergency_shutdown: false,
            locked_profit: U256::ZERO,
            last_report: now,
        }
    }

    fn require(&self, ctx: &CallContext, tier: AccessTier) -> Result<(), VaultError> {
        let who = ctx.sender;
        let allowed = match tier {
            AccessTier::Governance => who == self.governance,
            _ => who == self.governance || who == self.management,
        };
        if allowed {
            Ok(())
        } else {
            Err(VaultError::Unauthorized(tier))
        }
    }

    // -- views --------------------------------------------------------------

    pub fn balance_of(&self, account: Address) -> U256 {
        self.shares.get(&account).copied().unwrap_or(U256::ZERO)
    }

    pub fn total_supply(&self) -> U256 {
        self.total_supply
    }

    /// Want held by the vault itself.
    pub fn total_idle(&self) -> U256 {
        self.want.balance_of(self.address)
    }

    pub fn total_assets(&self) -> U256 {
        self.total_idle().saturating_add(self.total_debt)
    }

    pub fn total_debt(&self) -> U256 {
        self.total_debt
    }

    pub fn debt_ratio(&self) -> u64 {
        self.debt_ratio
    }

    pub fn emergency_shutdown(&self) -> bool {
        self.emergency_shutdown
    }

    pub fn withdrawal_queue(&self) -> &[Address] {
        &self.withdrawal_queue
    }

    /// Profit from recent reports not yet released into the share price.
    pub fn locked_profit(&self, now: DateTime<Utc>) -> U256 {
        let elapsed = now - self.last_report;
        if elapsed >= self.locked_profit_window || self.locked_profit_window <= Duration::zero() {
            return U256::ZERO;
        }
        let window = U256::from(self.locked_profit_window.num_seconds().unsigned_abs());
        let remaining = window - U256::from(elapsed.num_seconds().unsigned_abs()).min(window);
        mul_div(self.locked_profit, remaining, window)
    }

    fn free_funds(&self, now: DateTime<Utc>) -> U256 {
        self.total_assets().saturating_sub(self.locked_profit(now))
    }

    fn share_value(&self, shares: U256, now: DateTime<Utc>) -> U256 {
        if self.total_supply.is_zero() {
            return shares;
        }
        mul_div(shares, self.free_funds(now), self.total_supply)
    }

    fn shares_for_amount(&self, amount: U256, now: DateTime<Utc>) -> U256 {
        let free = self.free_funds(now);
        if free.is_zero() {
            return U256::ZERO;
        }
        mul_div(amount, self.total_supply, free)
    }

    /// Want redeemable for one whole share.
    pub fn price_per_share(&self, now: DateTime<Utc>) -> U256 {
        self.share_value(self.want.asset().one(), now)
    }

    // -- strategies ---------------------------------------------------------

    pub fn add_strategy(
        &mut self,
        ctx: &CallContext,
        strategy: &dyn VaultStrategy,
        debt_ratio: u64,
        min_debt_per_harvest: U256,
        max_debt_per_harvest: U256,
    ) -> Result<(), VaultError> {
        self.require(ctx, AccessTier::Governance)?;
        let address = strategy.address();
        if strategy.vault() != self.address {
            return Err(VaultError::WrongVault(strategy.vault()));
        }
        if self.withdrawal_queue.contains(&address) {
            return Err(VaultError::StrategyAlreadyActive(address));
        }
        if self.debt_ratio + debt_ratio > MAX_DEBT_RATIO {
            return Err(VaultError::DebtRatioExceeded);
        }
        self.strategies.insert(
            address,
            StrategyParams {
                activation: ctx.timestamp,
                debt_ratio,
                min_debt_per_harvest,
                max_debt_per_harvest,
                last_report: ctx.timestamp,
                total_debt: U256::ZERO,
                total_gain: U256::ZERO,
                total_loss: U256::ZERO,
            },
        );
        self.debt_ratio += debt_ratio;
        self.withdrawal_queue.push(address);
        info!(vault = %self.address, strategy = %address, debt_ratio, "Strategy added");
        Ok(())
    }

    pub fn update_strategy_debt_ratio(
        &mut self,
        ctx: &CallContext,
        strategy: Address,
        debt_ratio: u64,
    ) -> Result<(), VaultError> {
        self.require(ctx, AccessTier::Management)?;
        let current = self
            .strategies
            .get(&strategy)
            .map(|p| p.debt_ratio)
            .ok_or(VaultError::UnknownStrategy(strategy))?;
        let others = self.debt_ratio - current;
        if others + debt_ratio > MAX_DEBT_RATIO {
            return Err(VaultError::DebtRatioExceeded);
        }
        if let Some(params) = self.strategies.get_mut(&strategy) {
            params.debt_ratio = debt_ratio;
        }
        self.debt_ratio = others + debt_ratio;
        debug!(vault = %self.address, strategy = %strategy, debt_ratio, "Debt ratio updated");
        Ok(())
    }

    /// Move `old`'s debt and debt ratio to `new` and have `old` hand over
    /// its assets.
    pub fn migrate_strategy(
        &mut self,
        ctx: &CallContext,
        old: &mut dyn VaultStrategy,
        new: &dyn VaultStrategy,
    ) -> Result<(), VaultError> {
        self.require(ctx, AccessTier::Governance)?;
        let from = old.address();
        let to = new.address();
        if new.vault() != self.address {
            return Err(VaultError::WrongVault(new.vault()));
        }
        let params = self
            .strategies
            .get(&from)
            .cloned()
            .ok_or(VaultError::UnknownStrategy(from))?;
        if self.withdrawal_queue.contains(&to) {
            return Err(VaultError::StrategyAlreadyActive(to));
        }

        old.migrate(&ctx.forwarded_by(self.address), to)
            .map_err(|e| VaultError::Strategy(Box::new(e)))?;

        if let Some(retired) = self.strategies.get_mut(&from) {
            retired.debt_ratio = 0;
            retired.total_debt = U256::ZERO;
        }
        self.strategies.insert(
            to,
            StrategyParams {
                activation: params.last_report,
                last_report: params.last_report,
                total_gain: U256::ZERO,
                total_loss: U256::ZERO,
                ..params
            },
        );
        if let Some(slot) = self.withdrawal_queue.iter_mut().find(|a| **a == from) {
            *slot = to;
        }
        info!(vault = %self.address, from = %from, to = %to, debt = %params.total_debt, "Strategy migrated");
        Ok(())
    }

    pub fn set_emergency_shutdown(&mut self, ctx: &CallContext, active: bool) -> Result<(), VaultError> {
        self.require(ctx, AccessTier::Management)?;
        self.emergency_shutdown = active;
        warn!(vault = %self.address, active, "Emergency shutdown toggled");
        Ok(())
    }

    pub fn set_management(&mut self, ctx: &CallContext, management: Address) -> Result<(), VaultError> {
        self.require(ctx, AccessTier::Governance)?;
        self.management = management;
        Ok(())
    }

    fn report_loss(&mut self, strategy: Address, loss: U256) -> Result<(), VaultError> {
        let vault_ratio = self.debt_ratio;
        let vault_debt = self.total_debt;
        let params = self
            .strategies
            .get_mut(&strategy)
            .ok_or(VaultError::UnknownStrategy(strategy))?;
        if params.total_debt < loss {
            return Err(VaultError::LossExceedsDebt {
                loss,
                debt: params.total_debt,
            });
        }
        if params.debt_ratio != 0 {
            // Shrink the strategy's ratio in proportion to the loss.
            let change = mul_div(loss, U256::from(vault_ratio), vault_debt);
            let change = u64::try_from(change)
                .unwrap_or(u64::MAX)
                .min(params.debt_ratio);
            params.debt_ratio -= change;
            self.debt_ratio -= change;
        }
        params.total_loss = params.total_loss.saturating_add(loss);
        params.total_debt -= loss;
        self.total_debt = self.total_debt.saturating_sub(loss);
        Ok(())
    }

    // -- users --------------------------------------------------------------

    /// Deposit `amount` from the sender; returns shares minted.
    pub fn deposit(&mut self, ctx: &CallContext, amount: U256) -> Result<U256, VaultError> {
        let available = self.deposit_limit.saturating_sub(self.total_assets());
        if amount > available {
            return Err(VaultError::DepositLimit { available });
        }
        let shares = if self.total_supply.is_zero() {
            amount
        } else {
            self.shares_for_amount(amount, ctx.timestamp)
        };
        self.want.transfer(ctx.sender, self.address, amount)?;
        *self.shares.entry(ctx.sender).or_insert(U256::ZERO) += shares;
        self.total_supply = self.total_supply.saturating_add(shares);
        debug!(vault = %self.address, from = %ctx.sender, amount = %amount, shares = %shares, "Deposit");
        Ok(shares)
    }

    /// Burn up to `shares` for want, pulling from `queue` in withdrawal
    /// queue order when idle want runs short. Returns want paid out.
    pub fn withdraw(
        &mut self,
        ctx: &CallContext,
        shares: U256,
        queue: &mut [&mut dyn VaultStrategy],
    ) -> Result<U256, VaultError> {
        let held = self.balance_of(ctx.sender);
        if shares > held {
            return Err(VaultError::InsufficientShares {
                requested: shares,
                held,
            });
        }
        let mut shares = shares;
        let mut value = self.share_value(shares, ctx.timestamp);
        let mut idle = self.total_idle();
        let mut total_loss = U256::ZERO;

        if value > idle {
            let inner = ctx.forwarded_by(self.address);
            for address in self.withdrawal_queue.clone() {
                if value <= idle {
                    break;
                }
                let Some(strategy) = queue.iter_mut().find(|s| s.address() == address) else {
                    continue;
                };
                let debt = self
                    .strategies
                    .get(&address)
                    .map(|p| p.total_debt)
                    .unwrap_or(U256::ZERO);
                let needed = (value - idle).min(debt);
                if needed.is_zero() {
                    continue;
                }

                let before = self.total_idle();
                let loss = strategy
                    .withdraw(&inner, needed)
                    .map_err(|e| VaultError::Strategy(Box::new(e)))?;
                let withdrawn = self.total_idle().saturating_sub(before);
                idle = idle.saturating_add(withdrawn);

                if !loss.is_zero() {
                    value = value.saturating_sub(loss);
                    total_loss = total_loss.saturating_add(loss);
                    self.report_loss(address, loss)?;
                }
                if let Some(params) = self.strategies.get_mut(&address) {
                    params.total_debt = params.total_debt.saturating_sub(withdrawn);
                }
                self.total_debt = self.total_debt.saturating_sub(withdrawn);
            }

            if value > idle {
                warn!(vault = %self.address, requested = %value, available = %idle, "Withdrawal partially filled");
                value = idle;
                shares = self.shares_for_amount(value.saturating_add(total_loss), ctx.timestamp);
            }
            if total_loss > bps_of(value.saturating_add(total_loss), self.max_loss_bps) {
                return Err(VaultError::MaxLossExceeded {
                    loss: total_loss,
                    value,
                });
            }
        }

        let shares = shares.min(held);
        self.shares.insert(ctx.sender, held - shares);
        self.total_supply = self.total_supply.saturating_sub(shares);
        if !value.is_zero() {
            self.want.transfer(self.address, ctx.sender, value)?;
        }
        debug!(vault = %self.address, to = %ctx.sender, value = %value, shares = %shares, "Withdraw");
        Ok(value)
    }
}

impl Vault for SimVault {
    fn address(&self) -> Address {
        self.address
    }

    fn want(&self) -> Address {
        self.want.address()
    }

    fn governance(&self) -> Address {
        self.governance
    }

    fn management(&self) -> Address {
        self.management
    }

    fn strategy_params(&self, strategy: Address) -> Option<StrategyParams> {
        self.strategies.get(&strategy).cloned()
    }

    fn credit_available(&self, strategy: Address) -> U256 {
        if self.emergency_shutdown {
            return U256::ZERO;
        }
        let Some(params) = self.strategies.get(&strategy) else {
            return U256::ZERO;
        };
        let total_assets = self.total_assets();
        let vault_limit = mul_div(total_assets, U256::from(self.debt_ratio), MAX_BPS);
        let strategy_limit = mul_div(total_assets, U256::from(params.debt_ratio), MAX_BPS);
        if strategy_limit <= params.total_debt || vault_limit <= self.total_debt {
            return U256::ZERO;
        }
        let available = (strategy_limit - params.total_debt)
            .min(vault_limit - self.total_debt)
            .min(self.total_idle());
        if available < params.min_debt_per_harvest {
            return U256::ZERO;
        }
        available.min(params.max_debt_per_harvest)
    }

    fn debt_outstanding(&self, strategy: Address) -> U256 {
        let Some(params) = self.strategies.get(&strategy) else {
            return U256::ZERO;
        };
        if self.debt_ratio == 0 || self.emergency_shutdown {
            return params.total_debt;
        }
        let limit = mul_div(self.total_assets(), U256::from(params.debt_ratio), MAX_BPS);
        params.total_debt.saturating_sub(limit)
    }

    fn report(&mut self, ctx: &CallContext, report: StrategyReport) -> Result<U256, VaultError> {
        let strategy = ctx.sender;
        if !self.withdrawal_queue.contains(&strategy) {
            return Err(VaultError::UnknownStrategy(strategy));
        }
        let StrategyReport {
            gain,
            loss,
            debt_payment,
        } = report;

        if !loss.is_zero() {
            self.report_loss(strategy, loss)?;
        }
        if let Some(params) = self.strategies.get_mut(&strategy) {
            params.total_gain = params.total_gain.saturating_add(gain);
        }

        let credit = self.credit_available(strategy);
        let mut debt = self.debt_outstanding(strategy);
        let debt_payment = debt_payment.min(debt);
        if !debt_payment.is_zero() {
            if let Some(params) = self.strategies.get_mut(&strategy) {
                params.total_debt -= debt_payment;
            }
            self.total_debt = self.total_debt.saturating_sub(debt_payment);
            debt -= debt_payment;
        }
        if !credit.is_zero() {
            if let Some(params) = self.strategies.get_mut(&strategy) {
                params.total_debt = params.total_debt.saturating_add(credit);
            }
            self.total_debt = self.total_debt.saturating_add(credit);
        }

        let total_avail = gain.saturating_add(debt_payment);
        if total_avail < credit {
            self.want.transfer(self.address, strategy, credit - total_avail)?;
        } else if total_avail > credit {
            self.want
                .transfer_from(self.address, strategy, self.address, total_avail - credit)?;
        }

        let before_loss = self.locked_profit(ctx.timestamp).saturating_add(gain);
        self.locked_profit = before_loss.saturating_sub(loss);
        self.last_report = ctx.timestamp;

        let params = self
            .strategies
            .get_mut(&strategy)
            .ok_or(VaultError::UnknownStrategy(strategy))?;
        params.last_report = ctx.timestamp;
        debug!(
            vault = %self.address,
            strategy = %strategy,
            gain = %gain,
            loss = %loss,
            debt_payment = %debt_payment,
            credit = %credit,
            "Strategy reported"
        );

        if params.debt_ratio == 0 || self.emergency_shutdown {
            Ok(params.total_debt)
        } else {
            Ok(debt)
        }
    }

    fn revoke_strategy(&mut self, ctx: &CallContext, strategy: Address) -> Result<(), VaultError> {
        if ctx.sender != strategy {
            self.require(ctx, AccessTier::Management)?;
        }
        let params = self
            .strategies
            .get_mut(&strategy)
            .ok_or(VaultError::UnknownStrategy(strategy))?;
        self.debt_ratio -= params.debt_ratio;
        params.debt_ratio = 0;
        info!(vault = %self.address, strategy = %strategy, "Strategy revoked");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
