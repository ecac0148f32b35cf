//! Harvest cycle bookkeeping and the harvest trigger.
//!
//! A harvest walks `TriggerCheck → ClaimRewards → Reinvest →
//! ReportToVault` and always lands back in `Idle`, also on failure.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use tracing::debug;
use uuid::Uuid;

use crate::math::apr_percent;
use crate::strategy::apr::LendStatus;
use crate::strategy::Thresholds;
use crate::types::{Address, U256};
use crate::vault::StrategyParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HarvestPhase {
    Idle,
    TriggerCheck,
    ClaimRewards,
    Reinvest,
    ReportToVault,
}

impl fmt::Display for HarvestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HarvestPhase::Idle => write!(f, "idle"),
            HarvestPhase::TriggerCheck => write!(f, "trigger-check"),
            HarvestPhase::ClaimRewards => write!(f, "claim-rewards"),
            HarvestPhase::Reinvest => write!(f, "reinvest"),
            HarvestPhase::ReportToVault => write!(f, "report-to-vault"),
        }
    }
}

// ---------------------------------------------------------------------------
// Harvest report
// ---------------------------------------------------------------------------

/// Outcome of one harvest, as reported to the vault plus a roster snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestReport {
    pub run_id: Uuid,
    pub strategy: Address,
    pub timestamp: DateTime<Utc>,
    pub block: u64,
    pub profit: U256,
    pub loss: U256,
    pub debt_payment: U256,
    pub debt_outstanding: U256,
    pub rewards_claimed: U256,
    pub total_assets: U256,
    pub total_debt: U256,
    pub estimated_apr: U256,
    pub emergency_exit: bool,
    pub statuses: Vec<LendStatus>,
}

impl HarvestReport {
    pub fn apr_percent(&self) -> Decimal {
        apr_percent(self.estimated_apr)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Trigger inputs
// ---------------------------------------------------------------------------

/// Vault and roster state the trigger decides on.
#[derive(Debug, Clone)]
pub struct TriggerInputs<'a> {
    pub now: DateTime<Utc>,
    pub call_cost: U256,
    pub params: Option<&'a StrategyParams>,
    pub debt_outstanding: U256,
    pub credit_available: U256,
    pub total_assets: U256,
    /// Some lender wants its own harvest.
    pub lender_due: bool,
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

pub struct HarvestCoordinator {
    phase: HarvestPhase,
    cooldown: Duration,
    last_harvest: Option<DateTime<Utc>>,
    last_profit: U256,
    runs: u64,
}

impl HarvestCoordinator {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            phase: HarvestPhase::Idle,
            cooldown,
            last_harvest: None,
            last_profit: U256::ZERO,
            runs: 0,
        }
    }

    pub fn phase(&self) -> HarvestPhase {
        self.phase
    }

    pub fn runs(&self) -> u64 {
        self.runs
    }

    pub fn last_harvest(&self) -> Option<DateTime<Utc>> {
        self.last_harvest
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn set_cooldown(&mut self, cooldown: Duration) {
        self.cooldown = cooldown;
    }

    /// Within the window after a profitable harvest.
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        match self.last_harvest {
            Some(at) => !self.last_profit.is_zero() && now - at < self.cooldown,
            None => false,
        }
    }

    pub(crate) fn enter(&mut self, phase: HarvestPhase) {
        debug!(from = %self.phase, to = %phase, "Harvest phase");
        self.phase = phase;
    }

    pub(crate) fn abort(&mut self) {
        debug!(at = %self.phase, "Harvest aborted");
        self.phase = HarvestPhase::Idle;
    }

    pub(crate) fn finish(&mut self, report: &HarvestReport) {
        self.phase = HarvestPhase::Idle;
        self.last_harvest = Some(report.timestamp);
        self.last_profit = report.profit;
        self.runs += 1;
    }

    /// Whether a keeper paying `call_cost` (in want) should harvest now.
    pub fn should_harvest(&self, thresholds: &Thresholds, inputs: &TriggerInputs<'_>) -> bool {
        let Some(params) = inputs.params else {
            return false;
        };

        let since_report = inputs.now - params.last_report;
        if since_report < thresholds.min_report_delay {
            return false;
        }
        if since_report >= thresholds.max_report_delay {
            return true;
        }

        if inputs.debt_outstanding > thresholds.debt_threshold {
            return true;
        }
        if inputs.total_assets.saturating_add(thresholds.debt_threshold) < params.total_debt {
            return true;
        }
        if inputs.lender_due {
            return true;
        }

        // Inside the cooldown neither unrealised profit nor the credit that
        // is only the last gain flowing back out of the vault counts.
        let (profit, credit) = if self.in_cooldown(inputs.now) {
            (
                U256::ZERO,
                inputs.credit_available.saturating_sub(self.last_profit),
            )
        } else {
            (
                inputs.total_assets.saturating_sub(params.total_debt),
                inputs.credit_available,
            )
        };
        let cost = thresholds.profit_factor.saturating_mul(inputs.call_cost);
        cost < credit.saturating_add(profit)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
