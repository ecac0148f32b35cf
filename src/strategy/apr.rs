//! Blended APR across the roster.
//!
//! Every estimate is a NAV-weighted average over the lenders, with the
//! strategy's loose want counted at zero yield.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::lenders::Lender;
use crate::math::apr_percent;
use crate::types::{Address, U256};

/// One row of `lend_statuses`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LendStatus {
    pub name: String,
    pub assets: U256,
    pub rate: U256,
    pub address: Address,
}

impl LendStatus {
    pub fn rate_percent(&self) -> Decimal {
        apr_percent(self.rate)
    }
}

pub struct AprEstimator;

impl AprEstimator {
    /// Current NAV-weighted APR over `total_assets`.
    pub fn estimated_apr(lenders: &[Lender], total_assets: U256) -> U256 {
        if total_assets.is_zero() {
            return U256::ZERO;
        }
        Self::weighted_sum(lenders, None) / total_assets
    }

    /// Blended APR once `extra` more is deposited into the lender that
    /// offers the best rate for it.
    pub fn estimated_future_apr(lenders: &[Lender], total_assets: U256, extra: U256) -> U256 {
        let mut choice = None;
        let mut highest_apr = U256::ZERO;
        let mut assets = U256::ZERO;
        for (i, lender) in lenders.iter().enumerate() {
            let adapter = lender.adapter();
            let apr = adapter.apr_after_deposit(extra);
            if apr > highest_apr {
                choice = Some(i);
                highest_apr = apr;
                assets = adapter.nav();
            }
        }

        let chosen = highest_apr.saturating_mul(assets.saturating_add(extra));
        let weighted = Self::weighted_sum(lenders, choice).saturating_add(chosen);
        let balance = total_assets.saturating_add(extra);
        if balance.is_zero() {
            return U256::ZERO;
        }
        weighted / balance
    }

    /// Blended APR once `change` is pulled out, lowest-APR lenders first.
    /// Rates of the lenders drawn from are taken as unchanged.
    pub fn estimated_apr_after_withdrawal(
        lenders: &[Lender],
        total_assets: U256,
        change: U256,
    ) -> U256 {
        let balance = total_assets.saturating_sub(change);
        if balance.is_zero() {
            return U256::ZERO;
        }

        let mut by_apr: Vec<(U256, U256)> = lenders
            .iter()
            .map(|l| (l.adapter().apr(), l.adapter().nav()))
            .collect();
        by_apr.sort_by_key(|(apr, _)| *apr);

        let mut remaining = change;
        let mut weighted = U256::ZERO;
        for (apr, nav) in by_apr {
            let taken = remaining.min(nav);
            remaining -= taken;
            weighted = weighted.saturating_add(apr.saturating_mul(nav - taken));
        }
        weighted / balance
    }

    pub fn lend_statuses(lenders: &[Lender]) -> Vec<LendStatus> {
        lenders
            .iter()
            .map(|l| {
                let adapter = l.adapter();
                LendStatus {
                    name: adapter.lender_name().to_string(),
                    assets: adapter.nav(),
                    rate: adapter.apr(),
                    address: adapter.address(),
                }
            })
            .collect()
    }

    fn weighted_sum(lenders: &[Lender], skip: Option<usize>) -> U256 {
        lenders
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != skip)
            .fold(U256::ZERO, |acc, (_, l)| {
                acc.saturating_add(l.adapter().weighted_apr())
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
