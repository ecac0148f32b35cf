//! Capital routing across the lender roster.
//!
//! A policy turns the roster and the strategy's loose want into a list
//! of [`Move`]s; the engine executes them in order. Withdrawals for the
//! vault do not go through the policy: they drain the lowest-APR lender
//! first and move on when a lender comes back short.

use serde::Serialize;
use tracing::debug;

use crate::lenders::Lender;
use crate::market::Erc20;
use crate::types::{Address, CallContext, StrategyError, U256};

/// One step of an allocation plan. Indices refer to the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Move {
    WithdrawAll(usize),
    Withdraw(usize, U256),
    /// Deposit up to this amount of the strategy's loose want.
    Deposit(usize, U256),
    /// Deposit whatever loose want is left.
    DepositRest(usize),
}

pub trait AllocationPolicy: Send + Sync {
    fn name(&self) -> &str;
    fn plan(&self, lenders: &[Lender], loose: U256) -> Vec<Move>;
}

// ---------------------------------------------------------------------------
// Best APR
// ---------------------------------------------------------------------------

/// Output of the best-APR scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdjustEstimate {
    pub lowest: usize,
    pub lowest_apr: U256,
    pub highest: usize,
    /// APR of `highest` if it also absorbed everything `lowest` holds.
    pub potential: U256,
}

/// Find the lowest-APR lender holding assets and the lender offering the
/// best APR for `loose` more.
pub fn estimate_adjust_position(lenders: &[Lender], loose: U256) -> AdjustEstimate {
    let mut lowest = 0;
    let mut lowest_apr = U256::MAX;
    let mut lowest_nav = U256::ZERO;
    for (i, lender) in lenders.iter().enumerate() {
        let adapter = lender.adapter();
        if adapter.has_assets() {
            let apr = adapter.apr();
            if apr < lowest_apr {
                lowest_apr = apr;
                lowest = i;
                lowest_nav = adapter.nav();
            }
        }
    }

    let mut highest = 0;
    let mut highest_apr = U256::ZERO;
    for (i, lender) in lenders.iter().enumerate() {
        let apr = lender.adapter().apr_after_deposit(loose);
        if apr > highest_apr {
            highest_apr = apr;
            highest = i;
        }
    }

    let potential = lenders
        .get(highest)
        .map(|l| l.adapter().apr_after_deposit(lowest_nav.saturating_add(loose)))
        .unwrap_or(U256::ZERO);

    AdjustEstimate {
        lowest,
        lowest_apr,
        highest,
        potential,
    }
}

/// Concentrate capital in the single best lender, pulling out of the
/// worst one when moving its funds would still beat its current APR.
#[derive(Debug, Clone, Copy, Default)]
pub struct BestAprPolicy;

impl AllocationPolicy for BestAprPolicy {
    fn name(&self) -> &str {
        "best-apr"
    }

    fn plan(&self, lenders: &[Lender], loose: U256) -> Vec<Move> {
        if lenders.is_empty() {
            return Vec::new();
        }
        let est = estimate_adjust_position(lenders, loose);
        let mut moves = Vec::with_capacity(2);
        if est.lowest != est.highest && est.potential > est.lowest_apr {
            moves.push(Move::WithdrawAll(est.lowest));
        }
        moves.push(Move::DepositRest(est.highest));
        moves
    }
}

// ---------------------------------------------------------------------------
// Manual split
// ---------------------------------------------------------------------------

/// Fixed per-mille split across named lenders. Lenders not named get nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualSplitPolicy {
    shares: Vec<(Address, u32)>,
}

impl ManualSplitPolicy {
    pub const TOTAL_SHARES: u32 = 1_000;

    pub fn new(shares: Vec<(Address, u32)>) -> Result<Self, StrategyError> {
        let total: u32 = shares.iter().map(|(_, s)| *s).sum();
        if total != Self::TOTAL_SHARES {
            return Err(StrategyError::InvalidShares(total));
        }
        Ok(Self { shares })
    }

    pub fn shares(&self) -> &[(Address, u32)] {
        &self.shares
    }

    fn share_of(&self, lender: Address) -> u32 {
        self.shares
            .iter()
            .filter(|(a, _)| *a == lender)
            .map(|(_, s)| *s)
            .sum()
    }
}

impl AllocationPolicy for ManualSplitPolicy {
    fn name(&self) -> &str {
        "manual-split"
    }

    fn plan(&self, lenders: &[Lender], loose: U256) -> Vec<Move> {
        let navs: Vec<U256> = lenders.iter().map(|l| l.adapter().nav()).collect();
        let total = navs.iter().fold(loose, |acc, n| acc.saturating_add(*n));
        let targets: Vec<U256> = lenders
            .iter()
            .map(|l| {
                let share = U256::from(self.share_of(l.address()));
                total.saturating_mul(share) / U256::from(Self::TOTAL_SHARES)
            })
            .collect();

        let mut moves = Vec::new();
        for (i, lender) in lenders.iter().enumerate() {
            if targets[i].is_zero() {
                if !navs[i].is_zero() {
                    moves.push(Move::WithdrawAll(i));
                }
            } else if navs[i] > targets[i] && navs[i] - targets[i] > lender.adapter().dust() {
                moves.push(Move::Withdraw(i, navs[i] - targets[i]));
            }
        }

        let under: Vec<usize> = (0..lenders.len()).filter(|&i| navs[i] < targets[i]).collect();
        if let Some((&last, rest)) = under.split_last() {
            for &i in rest {
                moves.push(Move::Deposit(i, targets[i] - navs[i]));
            }
            moves.push(Move::DepositRest(last));
        }
        moves
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct AllocationEngine {
    policy: Box<dyn AllocationPolicy>,
}

impl Default for AllocationEngine {
    fn default() -> Self {
        Self::new(Box::new(BestAprPolicy))
    }
}

impl AllocationEngine {
    pub fn new(policy: Box<dyn AllocationPolicy>) -> Self {
        Self { policy }
    }

    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }

    pub fn set_policy(&mut self, policy: Box<dyn AllocationPolicy>) {
        self.policy = policy;
    }

    pub fn plan(&self, lenders: &[Lender], loose: U256) -> Vec<Move> {
        self.policy.plan(lenders, loose)
    }

    /// Run `moves` on behalf of the strategy at `ctx.sender`.
    pub fn execute(
        lenders: &mut [Lender],
        ctx: &CallContext,
        want: &dyn Erc20,
        moves: &[Move],
    ) -> Result<(), StrategyError> {
        let strategy = ctx.sender;
        for mv in moves {
            debug!(step = ?mv, "Allocation step");
            match *mv {
                Move::WithdrawAll(i) => {
                    let target = lenders[i].address();
                    lenders[i]
                        .adapter_mut()
                        .withdraw_all(ctx)
                        .map_err(|e| StrategyError::lender(target, "allocation", e))?;
                }
                Move::Withdraw(i, amount) => {
                    let target = lenders[i].address();
                    lenders[i]
                        .adapter_mut()
                        .withdraw(ctx, amount)
                        .map_err(|e| StrategyError::lender(target, "allocation", e))?;
                }
                Move::Deposit(i, amount) => {
                    let amount = amount.min(want.balance_of(strategy));
                    deposit_into(&mut lenders[i], ctx, want, amount)?;
                }
                Move::DepositRest(i) => {
                    let amount = want.balance_of(strategy);
                    deposit_into(&mut lenders[i], ctx, want, amount)?;
                }
            }
        }
        Ok(())
    }

    /// Free up to `amount` from the lenders, lowest APR first. Each lender
    /// is tried once; a short return moves on to the next one.
    pub fn withdraw_some(
        lenders: &mut [Lender],
        ctx: &CallContext,
        amount: U256,
        threshold: U256,
    ) -> Result<U256, StrategyError> {
        if lenders.is_empty() || amount.is_zero() || amount < threshold {
            return Ok(U256::ZERO);
        }
        let mut tried = vec![false; lenders.len()];
        let mut withdrawn = U256::ZERO;
        while withdrawn < amount {
            let Some(i) = lowest_apr_source(lenders, &tried) else {
                break;
            };
            tried[i] = true;
            let target = lenders[i].address();
            let requested = amount - withdrawn;
            let got = lenders[i]
                .adapter_mut()
                .withdraw(ctx, requested)
                .map_err(|e| StrategyError::lender(target, "withdraw", e))?;
            debug!(lender = %target, requested = %requested, returned = %got, "Withdrew from lender");
            withdrawn = withdrawn.saturating_add(got);
        }
        Ok(withdrawn)
    }
}

fn lowest_apr_source(lenders: &[Lender], tried: &[bool]) -> Option<usize> {
    lenders
        .iter()
        .enumerate()
        .filter(|(i, l)| !tried[*i] && l.adapter().has_assets())
        .min_by_key(|(_, l)| l.adapter().apr())
        .map(|(i, _)| i)
}

fn deposit_into(
    lender: &mut Lender,
    ctx: &CallContext,
    want: &dyn Erc20,
    amount: U256,
) -> Result<(), StrategyError> {
    if amount.is_zero() {
        return Ok(());
    }
    let adapter = lender.adapter_mut();
    let target = adapter.address();
    want.transfer(ctx.sender, target, amount)
        .map_err(|e| StrategyError::lender(target, "allocation", e.into()))?;
    adapter
        .deposit(ctx)
        .map_err(|e| StrategyError::lender(target, "allocation", e))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
