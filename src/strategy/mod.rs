//! Strategy account: the roster of lenders behind one vault strategy.
//!
//! The strategy owns its lenders, keeps the want it has not deployed,
//! and settles with the vault on every harvest:
//!
//! ```text
//! keeper → harvest() ─┬─ ClaimRewards   each lender claims, swaps, reinvests
//!                     ├─ Reinvest       realise profit, free debt payment
//!                     └─ ReportToVault  report, then redeploy via the allocation policy
//! ```

pub mod allocation;
pub mod apr;
pub mod harvest;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::StrategyConfig;
use crate::lenders::{Lender, LenderAccess, LenderAdapter};
use crate::market::Erc20;
use crate::types::{
    AccessTier, Address, CallContext, StrategyError, StrategyStatus, VaultError, U256,
};
use crate::vault::{StrategyReport, Vault, VaultStrategy};

use allocation::{AllocationEngine, AllocationPolicy, ManualSplitPolicy, Move};
use apr::{AprEstimator, LendStatus};
use harvest::{HarvestCoordinator, HarvestPhase, HarvestReport, TriggerInputs};

// ---------------------------------------------------------------------------
// Account state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StrategyRoles {
    pub governance: Address,
    pub management: Address,
    pub strategist: Address,
    pub keeper: Address,
    /// Receives the strategy's share of vault fees.
    pub rewards: Address,
}

/// Tunables that decide when a harvest is due and how much is worth moving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thresholds {
    pub withdrawal_threshold: U256,
    pub debt_threshold: U256,
    pub profit_factor: U256,
    pub min_report_delay: Duration,
    pub max_report_delay: Duration,
}

impl Thresholds {
    pub fn from_config(cfg: &StrategyConfig) -> Self {
        Self {
            withdrawal_threshold: U256::from(cfg.withdrawal_threshold),
            debt_threshold: U256::from(cfg.debt_threshold),
            profit_factor: U256::from(cfg.profit_factor),
            min_report_delay: cfg.min_report_delay(),
            max_report_delay: cfg.max_report_delay(),
        }
    }
}

/// Copy of the vault's ledger for this strategy, refreshed after each report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DebtLedger {
    pub total_debt: U256,
    pub total_gain: U256,
    pub total_loss: U256,
}

/// Outcome of freeing funds for the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Liquidation {
    freed: U256,
    loss: U256,
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

pub struct Strategy {
    name: String,
    address: Address,
    vault: Address,
    want: Arc<dyn Erc20>,
    roles: StrategyRoles,
    status: StrategyStatus,
    emergency_exit: bool,
    thresholds: Thresholds,
    lenders: Vec<Lender>,
    allocation: AllocationEngine,
    coordinator: HarvestCoordinator,
    ledger: DebtLedger,
    defaults: StrategyConfig,
    clone_nonce: u64,
}

impl Strategy {
    /// Deploy and initialise against `vault`. The caller becomes strategist,
    /// keeper and rewards recipient.
    pub fn new(
        ctx: &CallContext,
        address: Address,
        vault: &dyn Vault,
        want: Arc<dyn Erc20>,
        cfg: &StrategyConfig,
    ) -> Result<Self, StrategyError> {
        let mut strategy = Self::uninitialized(address, want, cfg);
        strategy.initialize(ctx, vault)?;
        Ok(strategy)
    }

    /// Deployed but not yet bound to a vault.
    pub fn uninitialized(address: Address, want: Arc<dyn Erc20>, cfg: &StrategyConfig) -> Self {
        Self {
            name: cfg.name.clone(),
            address,
            vault: Address::ZERO,
            want,
            roles: StrategyRoles::default(),
            status: StrategyStatus::Uninitialized,
            emergency_exit: false,
            thresholds: Thresholds::from_config(cfg),
            lenders: Vec::new(),
            allocation: AllocationEngine::default(),
            coordinator: HarvestCoordinator::new(cfg.harvest_cooldown()),
            ledger: DebtLedger::default(),
            defaults: cfg.clone(),
            clone_nonce: 0,
        }
    }

    pub fn initialize(&mut self, ctx: &CallContext, vault: &dyn Vault) -> Result<(), StrategyError> {
        if self.status != StrategyStatus::Uninitialized {
            return Err(StrategyError::AlreadyInitialized);
        }
        if vault.want() != self.want.address() {
            return Err(StrategyError::InvalidAddress("want"));
        }
        self.vault = vault.address();
        self.roles = StrategyRoles {
            governance: vault.governance(),
            management: vault.management(),
            strategist: ctx.sender,
            keeper: ctx.sender,
            rewards: ctx.sender,
        };
        self.want.approve(self.address, self.vault, U256::MAX);
        self.status = StrategyStatus::Active;
        info!(strategy = %self.name, address = %self.address, vault = %self.vault, "Strategy initialized");
        Ok(())
    }

    /// Deploy a fresh strategy for `vault` with default thresholds and no lenders.
    pub fn clone_strategy(
        &mut self,
        ctx: &CallContext,
        vault: &dyn Vault,
    ) -> Result<Strategy, StrategyError> {
        let address = self.address.create(self.clone_nonce);
        self.clone_nonce += 1;
        let clone = Strategy::new(ctx, address, vault, self.want.clone(), &self.defaults)?;
        info!(template = %self.address, clone = %address, "Strategy cloned");
        Ok(clone)
    }

    // -- access control -----------------------------------------------------

    fn require(&self, ctx: &CallContext, tier: AccessTier) -> Result<(), StrategyError> {
        let who = ctx.sender;
        let r = &self.roles;
        let allowed = match tier {
            AccessTier::Governance => who == r.governance,
            AccessTier::Strategist => who == r.strategist,
            AccessTier::Authorized => who == r.strategist || who == r.governance,
            AccessTier::Management => {
                who == r.strategist || who == r.governance || who == r.management
            }
            AccessTier::Keepers => {
                who == r.keeper
                    || who == r.strategist
                    || who == r.governance
                    || who == r.management
            }
            AccessTier::Vault => who == self.vault,
        };
        if allowed {
            Ok(())
        } else {
            Err(StrategyError::Unauthorized(tier))
        }
    }

    fn require_active(&self) -> Result<(), StrategyError> {
        match self.status {
            StrategyStatus::Active => Ok(()),
            other => Err(StrategyError::Inactive(other)),
        }
    }

    /// Roles handed to lenders on this strategy's roster.
    pub fn lender_access(&self) -> LenderAccess {
        LenderAccess {
            strategy: self.address,
            governance: self.roles.governance,
            management: self.roles.management,
            strategist: self.roles.strategist,
        }
    }

    /// Pick up governance or management changes made on the vault.
    pub fn refresh_vault_roles(&mut self, vault: &dyn Vault) {
        self.roles.governance = vault.governance();
        self.roles.management = vault.management();
        self.push_roles();
    }

    fn push_roles(&mut self) {
        let access = self.lender_access();
        for lender in &mut self.lenders {
            lender.adapter_mut().refresh_roles(access);
        }
    }

    // -- views --------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn vault(&self) -> Address {
        self.vault
    }

    pub fn want(&self) -> &Arc<dyn Erc20> {
        &self.want
    }

    pub fn roles(&self) -> StrategyRoles {
        self.roles
    }

    pub fn status(&self) -> StrategyStatus {
        self.status
    }

    pub fn emergency_exit(&self) -> bool {
        self.emergency_exit
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn ledger(&self) -> DebtLedger {
        self.ledger
    }

    pub fn harvest_phase(&self) -> HarvestPhase {
        self.coordinator.phase()
    }

    pub fn harvest_count(&self) -> u64 {
        self.coordinator.runs()
    }

    pub fn allocation_policy(&self) -> &str {
        self.allocation.policy_name()
    }

    pub fn lenders(&self) -> &[Lender] {
        &self.lenders
    }

    pub fn num_lenders(&self) -> usize {
        self.lenders.len()
    }

    pub fn lender(&self, address: Address) -> Option<&Lender> {
        self.lenders.iter().find(|l| l.address() == address)
    }

    pub fn lender_mut(&mut self, address: Address) -> Option<&mut Lender> {
        self.lenders.iter_mut().find(|l| l.address() == address)
    }

    /// Want held by the strategy itself.
    pub fn loose(&self) -> U256 {
        self.want.balance_of(self.address)
    }

    pub fn lent_total_assets(&self) -> U256 {
        self.lenders
            .iter()
            .fold(U256::ZERO, |acc, l| acc.saturating_add(l.adapter().nav()))
    }

    pub fn estimated_total_assets(&self) -> U256 {
        self.lent_total_assets().saturating_add(self.loose())
    }

    pub fn estimated_apr(&self) -> U256 {
        AprEstimator::estimated_apr(&self.lenders, self.estimated_total_assets())
    }

    /// Blended APR if `extra` more want were deployed.
    pub fn estimated_future_apr(&self, extra: U256) -> U256 {
        AprEstimator::estimated_future_apr(&self.lenders, self.estimated_total_assets(), extra)
    }

    /// Blended APR if the vault moved this strategy's debt to `new_limit`.
    pub fn estimated_apr_for_debt_limit(&self, vault: &dyn Vault, new_limit: U256) -> U256 {
        let current = vault
            .strategy_params(self.address)
            .map(|p| p.total_debt)
            .unwrap_or(U256::ZERO);
        let total = self.estimated_total_assets();
        if new_limit >= current {
            AprEstimator::estimated_future_apr(&self.lenders, total, new_limit - current)
        } else {
            AprEstimator::estimated_apr_after_withdrawal(&self.lenders, total, current - new_limit)
        }
    }

    pub fn lend_statuses(&self) -> Vec<LendStatus> {
        AprEstimator::lend_statuses(&self.lenders)
    }

    // -- roster -------------------------------------------------------------

    pub fn add_lender(&mut self, ctx: &CallContext, lender: Lender) -> Result<(), StrategyError> {
        self.require(ctx, AccessTier::Governance)?;
        let address = lender.address();
        if lender.adapter().strategy() != self.address {
            return Err(StrategyError::UndockedLender(address));
        }
        if self.lender(address).is_some() {
            return Err(StrategyError::AlreadyAdded(address));
        }
        info!(
            strategy = %self.name,
            lender = %address,
            name = %lender.adapter().lender_name(),
            kind = %lender.adapter().kind(),
            "Lender added"
        );
        self.lenders.push(lender);
        Ok(())
    }

    /// Withdraw everything from `address` and drop it from the roster.
    /// Whatever an illiquid market could not pay out stays with the
    /// returned adapter.
    pub fn safe_remove_lender(
        &mut self,
        ctx: &CallContext,
        address: Address,
    ) -> Result<Lender, StrategyError> {
        self.remove_lender(ctx, address, false)
    }

    /// Drop `address` from the roster whatever it still holds.
    pub fn force_remove_lender(
        &mut self,
        ctx: &CallContext,
        address: Address,
    ) -> Result<Lender, StrategyError> {
        self.remove_lender(ctx, address, true)
    }

    fn remove_lender(
        &mut self,
        ctx: &CallContext,
        address: Address,
        force: bool,
    ) -> Result<Lender, StrategyError> {
        self.require(ctx, AccessTier::Management)?;
        let index = self
            .lenders
            .iter()
            .position(|l| l.address() == address)
            .ok_or(StrategyError::NotLender(address))?;

        let inner = ctx.forwarded_by(self.address);
        let adapter = self.lenders[index].adapter_mut();
        adapter.accrue(ctx.timestamp);
        // An illiquid market only leaves residue behind; a failing market
        // call aborts a safe removal but not a forced one.
        let returned = match adapter.withdraw_all(&inner) {
            Ok(outcome) => outcome.returned,
            Err(e) if force => {
                warn!(strategy = %self.name, lender = %address, error = %e, "Withdraw failed during forced removal");
                U256::ZERO
            }
            Err(e) => return Err(StrategyError::lender(address, "removal", e)),
        };

        let removed = self.lenders.swap_remove(index);
        let residue = removed.adapter().nav();
        if residue.is_zero() {
            info!(strategy = %self.name, lender = %address, returned = %returned, "Lender removed");
        } else {
            warn!(
                strategy = %self.name,
                lender = %address,
                returned = %returned,
                residue = %residue,
                forced = force,
                "Lender removed with residue"
            );
        }

        if !self.loose().is_zero() {
            self.adjust_position(ctx, U256::ZERO)?;
        }
        Ok(removed)
    }

    // -- allocation ---------------------------------------------------------

    pub fn set_allocation_policy(
        &mut self,
        ctx: &CallContext,
        policy: Box<dyn AllocationPolicy>,
    ) -> Result<(), StrategyError> {
        self.require(ctx, AccessTier::Management)?;
        info!(strategy = %self.name, policy = %policy.name(), "Allocation policy set");
        self.allocation.set_policy(policy);
        Ok(())
    }

    /// One-off rebalance: pull everything, then split by per-mille `shares`.
    pub fn manual_allocation(
        &mut self,
        ctx: &CallContext,
        shares: &[(Address, u32)],
    ) -> Result<(), StrategyError> {
        self.require(ctx, AccessTier::Management)?;
        for (address, _) in shares {
            if self.lender(*address).is_none() {
                return Err(StrategyError::NotLender(*address));
            }
        }
        let policy = ManualSplitPolicy::new(shares.to_vec())?;

        let inner = ctx.forwarded_by(self.address);
        let exits: Vec<Move> = (0..self.lenders.len()).map(Move::WithdrawAll).collect();
        AllocationEngine::execute(&mut self.lenders, &inner, self.want.as_ref(), &exits)?;
        let moves = policy.plan(&self.lenders, self.loose());
        AllocationEngine::execute(&mut self.lenders, &inner, self.want.as_ref(), &moves)?;
        info!(strategy = %self.name, lenders = shares.len(), "Manual allocation applied");
        Ok(())
    }

    /// Put loose want to work, keeping `debt_outstanding` back for the vault.
    fn adjust_position(&mut self, ctx: &CallContext, debt_outstanding: U256) -> Result<(), StrategyError> {
        if self.emergency_exit || self.lenders.is_empty() {
            return Ok(());
        }
        let inner = ctx.forwarded_by(self.address);
        let loose = self.loose();
        if debt_outstanding > loose {
            AllocationEngine::withdraw_some(
                &mut self.lenders,
                &inner,
                debt_outstanding - loose,
                self.thresholds.withdrawal_threshold,
            )?;
            return Ok(());
        }
        let moves = self.allocation.plan(&self.lenders, loose - debt_outstanding);
        debug!(strategy = %self.name, policy = %self.allocation.policy_name(), moves = moves.len(), "Adjusting position");
        AllocationEngine::execute(&mut self.lenders, &inner, self.want.as_ref(), &moves)
    }

    // -- harvest ------------------------------------------------------------

    /// Whether a keeper paying `call_cost` (in want) should harvest at `now`.
    pub fn harvest_trigger(
        &self,
        vault: &dyn Vault,
        now: DateTime<Utc>,
        call_cost: U256,
    ) -> bool {
        if self.status != StrategyStatus::Active {
            return false;
        }
        let params = vault.strategy_params(self.address);
        let inputs = TriggerInputs {
            now,
            call_cost,
            params: params.as_ref(),
            debt_outstanding: vault.debt_outstanding(self.address),
            credit_available: vault.credit_available(self.address),
            total_assets: self.estimated_total_assets(),
            lender_due: self
                .lenders
                .iter()
                .any(|l| l.adapter().harvest_trigger(now, call_cost)),
        };
        self.coordinator.should_harvest(&self.thresholds, &inputs)
    }

    pub fn harvest(
        &mut self,
        ctx: &CallContext,
        vault: &mut dyn Vault,
    ) -> Result<HarvestReport, StrategyError> {
        self.require(ctx, AccessTier::Keepers)?;
        self.require_active()?;
        if vault.address() != self.vault {
            return Err(VaultError::WrongVault(self.vault).into());
        }
        match self.run_harvest(ctx, vault) {
            Ok(report) => {
                self.coordinator.finish(&report);
                info!(
                    strategy = %self.name,
                    run_id = %report.run_id,
                    profit = %report.profit,
                    loss = %report.loss,
                    debt_payment = %report.debt_payment,
                    rewards = %report.rewards_claimed,
                    total_assets = %report.total_assets,
                    apr = %report.apr_percent(),
                    "Harvest reported"
                );
                Ok(report)
            }
            Err(e) => {
                self.coordinator.abort();
                warn!(strategy = %self.name, error = %e, "Harvest failed");
                Err(e)
            }
        }
    }

    fn run_harvest(
        &mut self,
        ctx: &CallContext,
        vault: &mut dyn Vault,
    ) -> Result<HarvestReport, StrategyError> {
        let inner = ctx.forwarded_by(self.address);

        self.coordinator.enter(HarvestPhase::TriggerCheck);
        for lender in &self.lenders {
            lender.adapter().accrue(ctx.timestamp);
        }
        let debt_outstanding = vault.debt_outstanding(self.address);

        self.coordinator.enter(HarvestPhase::ClaimRewards);
        let mut rewards_claimed = U256::ZERO;
        for lender in &mut self.lenders {
            let address = lender.address();
            let claimed = lender
                .adapter_mut()
                .harvest(&inner)
                .map_err(|e| StrategyError::lender(address, HarvestPhase::ClaimRewards, e))?;
            rewards_claimed = rewards_claimed.saturating_add(claimed);
        }

        self.coordinator.enter(HarvestPhase::Reinvest);
        let report = if self.emergency_exit {
            let freed = self.liquidate_all_positions(&inner)?;
            let loss = debt_outstanding.saturating_sub(freed);
            StrategyReport {
                gain: freed.saturating_sub(debt_outstanding),
                loss,
                debt_payment: debt_outstanding - loss,
            }
        } else {
            self.prepare_return(&inner, vault, debt_outstanding)?
        };

        self.coordinator.enter(HarvestPhase::ReportToVault);
        let outstanding = vault.report(&inner, report)?;
        self.adjust_position(ctx, outstanding)?;

        if let Some(params) = vault.strategy_params(self.address) {
            self.ledger = DebtLedger {
                total_debt: params.total_debt,
                total_gain: params.total_gain,
                total_loss: params.total_loss,
            };
        }

        Ok(HarvestReport {
            run_id: Uuid::new_v4(),
            strategy: self.address,
            timestamp: ctx.timestamp,
            block: ctx.block,
            profit: report.gain,
            loss: report.loss,
            debt_payment: report.debt_payment,
            debt_outstanding: outstanding,
            rewards_claimed,
            total_assets: self.estimated_total_assets(),
            total_debt: self.ledger.total_debt,
            estimated_apr: self.estimated_apr(),
            emergency_exit: self.emergency_exit,
            statuses: self.lend_statuses(),
        })
    }

    /// Work out profit or loss against the vault's debt and free what the
    /// vault is owed.
    fn prepare_return(
        &mut self,
        ctx: &CallContext,
        vault: &dyn Vault,
        debt_outstanding: U256,
    ) -> Result<StrategyReport, StrategyError> {
        let lent = self.lent_total_assets();
        let loose = self.loose();

        if lent.is_zero() {
            return Ok(StrategyReport {
                debt_payment: debt_outstanding.min(loose),
                ..StrategyReport::default()
            });
        }

        let total = lent.saturating_add(loose);
        let debt = vault
            .strategy_params(self.address)
            .map(|p| p.total_debt)
            .unwrap_or(U256::ZERO);

        let mut report = StrategyReport::default();
        if total > debt {
            report.gain = total - debt;
        } else {
            report.loss = debt - total;
        }

        let to_free = report.gain.saturating_add(debt_outstanding);
        if !to_free.is_zero() && loose < to_free {
            AllocationEngine::withdraw_some(
                &mut self.lenders,
                ctx,
                to_free - loose,
                self.thresholds.withdrawal_threshold,
            )?;
            let freed = self.loose();
            if freed < to_free {
                if report.gain > freed {
                    report.gain = freed;
                    report.debt_payment = U256::ZERO;
                } else {
                    report.debt_payment = (freed - report.gain).min(debt_outstanding);
                }
            } else {
                report.debt_payment = debt_outstanding;
            }
        } else {
            report.debt_payment = debt_outstanding;
        }
        Ok(report)
    }

    /// Free up to `amount` for the vault. Illiquid lenders shorten the
    /// amount freed, they never count as loss.
    fn liquidate_position(
        &mut self,
        ctx: &CallContext,
        amount: U256,
    ) -> Result<Liquidation, StrategyError> {
        let balance = self.loose();
        if balance >= amount {
            return Ok(Liquidation {
                freed: amount,
                loss: U256::ZERO,
            });
        }
        let inner = ctx.forwarded_by(self.address);
        AllocationEngine::withdraw_some(
            &mut self.lenders,
            &inner,
            amount - balance,
            self.thresholds.withdrawal_threshold,
        )?;
        Ok(Liquidation {
            freed: amount.min(self.loose()),
            loss: U256::ZERO,
        })
    }

    fn liquidate_all_positions(&mut self, ctx: &CallContext) -> Result<U256, StrategyError> {
        let exits: Vec<Move> = (0..self.lenders.len()).map(Move::WithdrawAll).collect();
        AllocationEngine::execute(&mut self.lenders, ctx, self.want.as_ref(), &exits)?;
        Ok(self.loose())
    }

    // -- setters ------------------------------------------------------------

    pub fn set_strategist(&mut self, ctx: &CallContext, strategist: Address) -> Result<(), StrategyError> {
        self.require(ctx, AccessTier::Authorized)?;
        if strategist == Address::ZERO {
            return Err(StrategyError::InvalidAddress("strategist"));
        }
        self.roles.strategist = strategist;
        self.push_roles();
        Ok(())
    }

    pub fn set_keeper(&mut self, ctx: &CallContext, keeper: Address) -> Result<(), StrategyError> {
        self.require(ctx, AccessTier::Authorized)?;
        if keeper == Address::ZERO {
            return Err(StrategyError::InvalidAddress("keeper"));
        }
        self.roles.keeper = keeper;
        Ok(())
    }

    pub fn set_rewards(&mut self, ctx: &CallContext, rewards: Address) -> Result<(), StrategyError> {
        self.require(ctx, AccessTier::Strategist)?;
        if rewards == Address::ZERO {
            return Err(StrategyError::InvalidAddress("rewards"));
        }
        self.roles.rewards = rewards;
        Ok(())
    }

    pub fn set_withdrawal_threshold(
        &mut self,
        ctx: &CallContext,
        threshold: U256,
    ) -> Result<(), StrategyError> {
        self.require(ctx, AccessTier::Management)?;
        self.thresholds.withdrawal_threshold = threshold;
        Ok(())
    }

    pub fn set_debt_threshold(&mut self, ctx: &CallContext, threshold: U256) -> Result<(), StrategyError> {
        self.require(ctx, AccessTier::Authorized)?;
        self.thresholds.debt_threshold = threshold;
        Ok(())
    }

    pub fn set_profit_factor(&mut self, ctx: &CallContext, factor: U256) -> Result<(), StrategyError> {
        self.require(ctx, AccessTier::Authorized)?;
        self.thresholds.profit_factor = factor;
        Ok(())
    }

    pub fn set_min_report_delay(&mut self, ctx: &CallContext, delay: Duration) -> Result<(), StrategyError> {
        self.require(ctx, AccessTier::Authorized)?;
        self.thresholds.min_report_delay = delay;
        Ok(())
    }

    pub fn set_max_report_delay(&mut self, ctx: &CallContext, delay: Duration) -> Result<(), StrategyError> {
        self.require(ctx, AccessTier::Authorized)?;
        self.thresholds.max_report_delay = delay;
        Ok(())
    }

    pub fn set_harvest_cooldown(&mut self, ctx: &CallContext, window: Duration) -> Result<(), StrategyError> {
        self.require(ctx, AccessTier::Management)?;
        self.coordinator.set_cooldown(window);
        Ok(())
    }

    pub fn harvest_cooldown(&self) -> Duration {
        self.coordinator.cooldown()
    }

    /// Stop deploying capital and ask the vault to recall all debt. The
    /// next harvest pulls every lender out.
    pub fn set_emergency_exit(
        &mut self,
        ctx: &CallContext,
        vault: &mut dyn Vault,
    ) -> Result<(), StrategyError> {
        self.require(ctx, AccessTier::Management)?;
        self.emergency_exit = true;
        vault.revoke_strategy(&ctx.forwarded_by(self.address), self.address)?;
        warn!(strategy = %self.name, by = %ctx.sender, "Emergency exit enabled");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Vault side
// ---------------------------------------------------------------------------

impl VaultStrategy for Strategy {
    fn address(&self) -> Address {
        self.address
    }

    fn vault(&self) -> Address {
        self.vault
    }

    fn estimated_total_assets(&self) -> U256 {
        Strategy::estimated_total_assets(self)
    }

    fn withdraw(&mut self, ctx: &CallContext, amount: U256) -> Result<U256, StrategyError> {
        self.require(ctx, AccessTier::Vault)?;
        self.require_active()?;
        let Liquidation { freed, loss } = self.liquidate_position(ctx, amount)?;
        if !freed.is_zero() {
            self.want
                .transfer(self.address, self.vault, freed)
                .map_err(|e| StrategyError::lender(self.address, "vault withdrawal", e.into()))?;
        }
        if freed < amount {
            warn!(strategy = %self.name, requested = %amount, freed = %freed, "Vault withdrawal partially filled");
        }
        Ok(loss)
    }

    fn migrate(&mut self, ctx: &CallContext, new_strategy: Address) -> Result<(), StrategyError> {
        self.require(ctx, AccessTier::Vault)?;
        self.require_active()?;
        // Funds an illiquid market cannot pay out would be stranded here
        // while the successor inherits the debt.
        for lender in &self.lenders {
            let adapter = lender.adapter();
            adapter.accrue(ctx.timestamp);
            let residue = stranded(adapter);
            if residue > adapter.dust() {
                warn!(strategy = %self.name, lender = %lender.address(), residue = %residue, "Migration blocked by illiquid lender");
                return Err(StrategyError::WithdrawFailed {
                    lender: lender.address(),
                    residue,
                });
            }
        }
        self.status = StrategyStatus::Migrating;

        let inner = ctx.forwarded_by(self.address);
        self.liquidate_all_positions(&inner)?;
        let amount = self.loose();
        if !amount.is_zero() {
            self.want
                .transfer(self.address, new_strategy, amount)
                .map_err(|e| StrategyError::lender(self.address, "migration", e.into()))?;
        }
        self.ledger = DebtLedger::default();
        self.status = StrategyStatus::Retired;
        info!(strategy = %self.name, to = %new_strategy, amount = %amount, "Strategy migrated");
        Ok(())
    }
}

/// What a full exit from `adapter` would leave behind right now.
fn stranded(adapter: &dyn LenderAdapter) -> U256 {
    let withdrawable = adapter
        .loose()
        .saturating_add(adapter.lent().min(adapter.market_liquidity()));
    adapter.nav().saturating_sub(withdrawable)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
