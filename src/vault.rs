//! The vault boundary.
//!
//! [`Vault`] is what a strategy needs from the vault it reports to;
//! [`VaultStrategy`] is what the vault needs from each strategy in its
//! withdrawal queue. Neither side owns the other: both are passed in per
//! call, so a harvest borrows the vault and a vault withdrawal borrows
//! its strategies.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{Address, CallContext, StrategyError, VaultError, U256};

/// Per-strategy ledger kept by the vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyParams {
    pub activation: DateTime<Utc>,
    /// Share of vault assets the strategy may hold, in basis points.
    pub debt_ratio: u64,
    pub min_debt_per_harvest: U256,
    pub max_debt_per_harvest: U256,
    pub last_report: DateTime<Utc>,
    pub total_debt: U256,
    pub total_gain: U256,
    pub total_loss: U256,
}

/// What a strategy hands the vault at the end of a harvest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StrategyReport {
    pub gain: U256,
    pub loss: U256,
    pub debt_payment: U256,
}

pub trait Vault {
    fn address(&self) -> Address;
    fn want(&self) -> Address;
    fn governance(&self) -> Address;
    fn management(&self) -> Address;

    fn strategy_params(&self, strategy: Address) -> Option<StrategyParams>;

    /// Want the vault would lend `strategy` on its next report.
    fn credit_available(&self, strategy: Address) -> U256;

    /// Debt `strategy` holds above its limit.
    fn debt_outstanding(&self, strategy: Address) -> U256;

    /// Settle a report sent by `ctx.sender`. Moves credit or collects
    /// gain plus debt payment, and returns the debt still outstanding.
    fn report(&mut self, ctx: &CallContext, report: StrategyReport) -> Result<U256, VaultError>;

    /// Set the debt ratio of `strategy` to zero so its debt is recalled.
    fn revoke_strategy(&mut self, ctx: &CallContext, strategy: Address) -> Result<(), VaultError>;
}

pub trait VaultStrategy {
    fn address(&self) -> Address;
    fn vault(&self) -> Address;
    fn estimated_total_assets(&self) -> U256;

    /// Free up to `amount` and send it to the vault. Returns the loss taken.
    fn withdraw(&mut self, ctx: &CallContext, amount: U256) -> Result<U256, StrategyError>;

    /// Hand every asset to `new_strategy` and retire.
    fn migrate(&mut self, ctx: &CallContext, new_strategy: Address) -> Result<(), StrategyError>;
}
