//! Simulated money markets.
//!
//! Both markets share the same pool model: a jump-rate borrow curve,
//! per-second interest accrual into a supply index, and an optional
//! reward stream split pro rata over supplier shares. Shares carry 36
//! decimals of precision so a fresh deposit reads back exactly.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{lock, SimToken};
use crate::market::{Erc20, LendingMarket, P2pMarket};
use crate::math::{bps_of, mul_div, mul_div_round, mul_div_up, w_div, w_mul};
use crate::types::{Address, MarketError, SECONDS_PER_YEAR, U256, WAD};

/// 1e36: shares per unit of underlying at an index of one.
const SCALE: U256 = U256::from_limbs([12_919_594_847_110_692_864, 54_210_108_624_275_221, 0, 0]);

/// Receives whatever `drain_liquidity` borrows.
const LIQUIDITY_SINK: Address = Address::new([0xdd; 20]);

/// Receives what the Morpho borrowers take from the pool.
const DEMAND_SINK: Address = Address::new([0xde; 20]);

fn elapsed_secs(from: DateTime<Utc>, to: DateTime<Utc>) -> U256 {
    U256::from(u64::try_from((to - from).num_seconds()).unwrap_or(0))
}

fn year() -> U256 {
    U256::from(SECONDS_PER_YEAR)
}

// ---------------------------------------------------------------------------
// Rate model
// ---------------------------------------------------------------------------

/// Jump-rate interest curve. All fields are WAD-scaled annual rates or ratios.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateModel {
    pub base_rate: U256,
    /// Slope below the kink.
    pub multiplier: U256,
    /// Slope above the kink.
    pub jump_multiplier: U256,
    pub kink: U256,
    pub reserve_factor: U256,
}

impl Default for RateModel {
    fn default() -> Self {
        Self {
            base_rate: U256::from(20_000_000_000_000_000u64),        // 2%
            multiplier: U256::from(200_000_000_000_000_000u64),      // 20%
            jump_multiplier: U256::from(3_000_000_000_000_000_000u64), // 300%
            kink: U256::from(800_000_000_000_000_000u64),            // 80%
            reserve_factor: U256::from(100_000_000_000_000_000u64),  // 10%
        }
    }
}

impl RateModel {
    pub fn utilization(&self, cash: U256, borrows: U256, reserves: U256) -> U256 {
        if borrows.is_zero() {
            return U256::ZERO;
        }
        let base = cash.saturating_add(borrows).saturating_sub(reserves);
        w_div(borrows, base).min(WAD)
    }

    pub fn borrow_rate(&self, utilization: U256) -> U256 {
        if utilization <= self.kink {
            return self.base_rate + w_mul(utilization, self.multiplier);
        }
        let normal = self.base_rate + w_mul(self.kink, self.multiplier);
        normal + w_mul(utilization - self.kink, self.jump_multiplier)
    }

    pub fn supply_rate(&self, utilization: U256) -> U256 {
        let net = WAD.saturating_sub(self.reserve_factor);
        w_mul(w_mul(self.borrow_rate(utilization), utilization), net)
    }
}

// ---------------------------------------------------------------------------
// Shared pool and reward stream
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Pool {
    model: RateModel,
    borrows: U256,
    reserves: U256,
    /// Underlying per share, WAD-scaled.
    index: U256,
    total_shares: U256,
    shares: HashMap<Address, U256>,
    last_accrual: DateTime<Utc>,
}

impl Pool {
    fn new(model: RateModel, now: DateTime<Utc>) -> Self {
        Self {
            model,
            borrows: U256::ZERO,
            reserves: U256::ZERO,
            index: WAD,
            total_shares: U256::ZERO,
            shares: HashMap::new(),
            last_accrual: now,
        }
    }

    fn shares_of(&self, account: Address) -> U256 {
        self.shares.get(&account).copied().unwrap_or(U256::ZERO)
    }

    fn to_underlying(&self, shares: U256) -> U256 {
        mul_div_round(shares, self.index, SCALE)
    }

    fn balance_of(&self, account: Address) -> U256 {
        self.to_underlying(self.shares_of(account))
    }

    fn total_supply(&self) -> U256 {
        self.to_underlying(self.total_shares)
    }

    fn rates(&self, cash: U256) -> (U256, U256) {
        let util = self.model.utilization(cash, self.borrows, self.reserves);
        (self.model.supply_rate(util), self.model.borrow_rate(util))
    }

    fn accrue(&mut self, cash: U256, now: DateTime<Utc>) {
        let dt = elapsed_secs(self.last_accrual, now);
        if dt.is_zero() {
            return;
        }
        let (_, borrow_rate) = self.rates(cash);
        let interest = mul_div(self.borrows, borrow_rate.saturating_mul(dt), WAD * year());
        let to_reserves = w_mul(interest, self.model.reserve_factor);
        self.borrows = self.borrows.saturating_add(interest);
        self.reserves = self.reserves.saturating_add(to_reserves);

        let supplied = self.total_supply();
        if !supplied.is_zero() {
            let growth = mul_div(self.index, interest - to_reserves, supplied);
            self.index = self.index.saturating_add(growth);
        }
        self.last_accrual = now;
    }

    fn mint(&mut self, account: Address, amount: U256) {
        let shares = mul_div(amount, SCALE, self.index);
        *self.shares.entry(account).or_insert(U256::ZERO) += shares;
        self.total_shares = self.total_shares.saturating_add(shares);
    }

    /// Burn the shares worth `amount`; a balance that rounds to `amount`
    /// is burnt whole.
    fn burn(&mut self, account: Address, amount: U256) -> Result<(), MarketError> {
        let held = self.shares_of(account);
        let mut shares = mul_div_up(amount, SCALE, self.index);
        if shares > held {
            let value = self.to_underlying(held);
            if value < amount {
                return Err(MarketError::InsufficientBalance {
                    requested: amount,
                    held: value,
                });
            }
            shares = held;
        }
        self.shares.insert(account, held - shares);
        self.total_shares = self.total_shares.saturating_sub(shares);
        Ok(())
    }
}

#[derive(Debug)]
struct RewardStream {
    token: SimToken,
    per_year: U256,
    /// Reward per unit of weight, scaled by `SCALE`.
    index: U256,
    last: DateTime<Utc>,
    user_index: HashMap<Address, U256>,
    accrued: HashMap<Address, U256>,
}

impl RewardStream {
    fn new(token: SimToken, per_year: U256, start: DateTime<Utc>) -> Self {
        Self {
            token,
            per_year,
            index: U256::ZERO,
            last: start,
            user_index: HashMap::new(),
            accrued: HashMap::new(),
        }
    }

    fn index_at(&self, total_weight: U256, now: DateTime<Utc>) -> U256 {
        if total_weight.is_zero() {
            return self.index;
        }
        let emitted = mul_div(self.per_year, elapsed_secs(self.last, now), year());
        self.index
            .saturating_add(mul_div(emitted, SCALE, total_weight))
    }

    fn accrue(&mut self, total_weight: U256, now: DateTime<Utc>) {
        if now <= self.last {
            return;
        }
        self.index = self.index_at(total_weight, now);
        self.last = now;
    }

    fn earned(&self, account: Address, weight: U256, index: U256) -> U256 {
        let paid = self.user_index.get(&account).copied().unwrap_or(U256::ZERO);
        let owed = self.accrued.get(&account).copied().unwrap_or(U256::ZERO);
        owed.saturating_add(mul_div(weight, index.saturating_sub(paid), SCALE))
    }

    /// Settle `account` at the current index before its weight changes.
    fn checkpoint(&mut self, account: Address, weight: U256) {
        let owed = self.earned(account, weight, self.index);
        self.accrued.insert(account, owed);
        self.user_index.insert(account, self.index);
    }

    fn pending(&self, account: Address, weight: U256, total_weight: U256, now: DateTime<Utc>) -> U256 {
        self.earned(account, weight, self.index_at(total_weight, now))
    }

    /// Pay out everything `account` has earned. Expects a fresh `accrue`.
    fn claim(&mut self, account: Address, weight: U256) -> U256 {
        self.checkpoint(account, weight);
        let amount = self.accrued.insert(account, U256::ZERO).unwrap_or(U256::ZERO);
        if !amount.is_zero() {
            self.token.mint(account, amount);
        }
        amount
    }
}

// ---------------------------------------------------------------------------
// Compound-style market
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct CompoundState {
    pool: Pool,
    rewards: Option<RewardStream>,
}

impl CompoundState {
    fn accrue(&mut self, cash: U256, now: DateTime<Utc>) {
        let weight = self.pool.total_shares;
        if let Some(stream) = self.rewards.as_mut() {
            stream.accrue(weight, now);
        }
        self.pool.accrue(cash, now);
    }

    fn checkpoint(&mut self, account: Address) {
        let weight = self.pool.shares_of(account);
        if let Some(stream) = self.rewards.as_mut() {
            stream.checkpoint(account, weight);
        }
    }
}

/// A cToken market: supply, redeem, third-party borrowing and a reward stream.
pub struct SimCompoundMarket {
    address: Address,
    underlying: Arc<dyn Erc20>,
    state: Mutex<CompoundState>,
}

impl SimCompoundMarket {
    pub fn new(
        address: Address,
        underlying: Arc<dyn Erc20>,
        model: RateModel,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            address,
            underlying,
            state: Mutex::new(CompoundState {
                pool: Pool::new(model, now),
                rewards: None,
            }),
        }
    }

    /// Emit `per_year` of `token` to suppliers from the last accrual on.
    pub fn set_rewards(&self, token: SimToken, per_year: U256) {
        let mut state = lock(&self.state);
        let start = state.pool.last_accrual;
        match state.rewards.as_mut() {
            Some(stream) => {
                stream.token = token;
                stream.per_year = per_year;
            }
            None => state.rewards = Some(RewardStream::new(token, per_year, start)),
        }
    }

    /// Supply on behalf of a third party.
    pub fn seed(&self, who: Address, amount: U256, now: DateTime<Utc>) -> Result<(), MarketError> {
        LendingMarket::supply(self, who, amount, now)
    }

    pub fn borrow(&self, who: Address, amount: U256, now: DateTime<Utc>) -> Result<(), MarketError> {
        let cash = self.cash();
        let mut state = lock(&self.state);
        state.accrue(cash, now);
        if amount > cash {
            return Err(MarketError::InsufficientLiquidity {
                requested: amount,
                available: cash,
            });
        }
        self.underlying.transfer(self.address, who, amount)?;
        state.pool.borrows = state.pool.borrows.saturating_add(amount);
        Ok(())
    }

    pub fn repay(&self, who: Address, amount: U256, now: DateTime<Utc>) -> Result<(), MarketError> {
        let cash = self.cash();
        let mut state = lock(&self.state);
        state.accrue(cash, now);
        let amount = amount.min(state.pool.borrows);
        self.underlying.transfer(who, self.address, amount)?;
        state.pool.borrows -= amount;
        Ok(())
    }

    /// Borrow every unit of cash, leaving suppliers unable to redeem.
    pub fn drain_liquidity(&self, now: DateTime<Utc>) -> U256 {
        let cash = self.cash();
        match self.borrow(LIQUIDITY_SINK, cash, now) {
            Ok(()) => cash,
            Err(_) => U256::ZERO,
        }
    }

    /// Pay back whatever `drain_liquidity` took.
    pub fn restore_liquidity(&self, now: DateTime<Utc>) -> Result<(), MarketError> {
        let drained = self.underlying.balance_of(LIQUIDITY_SINK);
        self.repay(LIQUIDITY_SINK, drained, now)
    }

    pub fn borrows(&self) -> U256 {
        lock(&self.state).pool.borrows
    }

    pub fn utilization(&self) -> U256 {
        let state = lock(&self.state);
        state
            .pool
            .model
            .utilization(self.cash(), state.pool.borrows, state.pool.reserves)
    }
}

impl LendingMarket for SimCompoundMarket {
    fn address(&self) -> Address {
        self.address
    }

    fn accrue_interest(&self, now: DateTime<Utc>) {
        let cash = self.cash();
        lock(&self.state).accrue(cash, now);
    }

    fn supply(&self, account: Address, amount: U256, now: DateTime<Utc>) -> Result<(), MarketError> {
        if amount.is_zero() {
            return Ok(());
        }
        let cash = self.cash();
        let mut state = lock(&self.state);
        state.accrue(cash, now);
        self.underlying.transfer(account, self.address, amount)?;
        state.checkpoint(account);
        state.pool.mint(account, amount);
        Ok(())
    }

    fn redeem_underlying(
        &self,
        account: Address,
        amount: U256,
        now: DateTime<Utc>,
    ) -> Result<(), MarketError> {
        if amount.is_zero() {
            return Ok(());
        }
        let cash = self.cash();
        let mut state = lock(&self.state);
        state.accrue(cash, now);
        if amount > cash {
            return Err(MarketError::InsufficientLiquidity {
                requested: amount,
                available: cash,
            });
        }
        state.checkpoint(account);
        state.pool.burn(account, amount)?;
        self.underlying.transfer(self.address, account, amount)
    }

    fn balance_of_underlying_stored(&self, account: Address) -> U256 {
        lock(&self.state).pool.balance_of(account)
    }

    fn cash(&self) -> U256 {
        self.underlying.balance_of(self.address)
    }

    fn total_supply_underlying(&self) -> U256 {
        lock(&self.state).pool.total_supply()
    }

    fn supply_rate_after(&self, extra_supply: U256) -> U256 {
        let cash = self.cash().saturating_add(extra_supply);
        lock(&self.state).pool.rates(cash).0
    }

    fn reward_token(&self) -> Option<Arc<dyn Erc20>> {
        lock(&self.state)
            .rewards
            .as_ref()
            .map(|s| Arc::new(s.token.clone()) as Arc<dyn Erc20>)
    }

    fn reward_emission_per_year(&self) -> U256 {
        lock(&self.state)
            .rewards
            .as_ref()
            .map(|s| s.per_year)
            .unwrap_or(U256::ZERO)
    }

    fn pending_rewards(&self, account: Address, now: DateTime<Utc>) -> U256 {
        let state = lock(&self.state);
        let weight = state.pool.shares_of(account);
        let total = state.pool.total_shares;
        state
            .rewards
            .as_ref()
            .map(|s| s.pending(account, weight, total, now))
            .unwrap_or(U256::ZERO)
    }

    fn claim_rewards(&self, account: Address, now: DateTime<Utc>) -> U256 {
        let cash = self.cash();
        let mut state = lock(&self.state);
        state.accrue(cash, now);
        let weight = state.pool.shares_of(account);
        state
            .rewards
            .as_mut()
            .map(|s| s.claim(account, weight))
            .unwrap_or(U256::ZERO)
    }
}

// ---------------------------------------------------------------------------
// Morpho-style market
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct MorphoState {
    pool: Pool,
    /// Peer-to-peer balance per share, WAD-scaled.
    p2p_index: U256,
    p2p_shares: HashMap<Address, U256>,
    p2p_total_shares: U256,
    /// Morpho borrow demand still served by the pool and open to matching.
    demand: U256,
    /// Position of the peer-to-peer rate between pool supply and borrow rates.
    p2p_cursor_bps: u64,
    rewards: Option<RewardStream>,
}

impl MorphoState {
    fn p2p_shares_of(&self, account: Address) -> U256 {
        self.p2p_shares.get(&account).copied().unwrap_or(U256::ZERO)
    }

    fn p2p_balance_of(&self, account: Address) -> U256 {
        mul_div_round(self.p2p_shares_of(account), self.p2p_index, SCALE)
    }

    fn p2p_total(&self) -> U256 {
        mul_div_round(self.p2p_total_shares, self.p2p_index, SCALE)
    }

    fn weight_of(&self, account: Address) -> U256 {
        self.pool
            .shares_of(account)
            .saturating_add(self.p2p_shares_of(account))
    }

    fn total_weight(&self) -> U256 {
        self.pool.total_shares.saturating_add(self.p2p_total_shares)
    }

    /// Peer-to-peer rate: the cursor's point between the pool supply and
    /// borrow rates.
    fn p2p_rate(&self, supply_rate: U256, borrow_rate: U256) -> U256 {
        let spread = borrow_rate.saturating_sub(supply_rate);
        supply_rate + bps_of(spread, self.p2p_cursor_bps)
    }

    fn accrue(&mut self, cash: U256, now: DateTime<Utc>) {
        let dt = elapsed_secs(self.pool.last_accrual, now);
        if dt.is_zero() {
            return;
        }
        let weight = self.total_weight();
        if let Some(stream) = self.rewards.as_mut() {
            stream.accrue(weight, now);
        }
        let (supply, borrow) = self.pool.rates(cash);
        let rate = self.p2p_rate(supply, borrow);
        let growth = mul_div(self.p2p_index, rate.saturating_mul(dt), WAD * year());
        self.p2p_index = self.p2p_index.saturating_add(growth);
        self.pool.accrue(cash, now);
    }

    fn checkpoint(&mut self, account: Address) {
        let weight = self.weight_of(account);
        if let Some(stream) = self.rewards.as_mut() {
            stream.checkpoint(account, weight);
        }
    }
}

/// Morpho over an Aave-style pool. Suppliers are matched peer-to-peer
/// with Morpho borrowers still on the pool and earn the cursor rate,
/// the midpoint by default.
pub struct SimMorphoMarket {
    address: Address,
    underlying: Arc<dyn Erc20>,
    state: Mutex<MorphoState>,
}

impl SimMorphoMarket {
    pub fn new(
        address: Address,
        underlying: Arc<dyn Erc20>,
        model: RateModel,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            address,
            underlying,
            state: Mutex::new(MorphoState {
                pool: Pool::new(model, now),
                p2p_index: WAD,
                p2p_shares: HashMap::new(),
                p2p_total_shares: U256::ZERO,
                demand: U256::ZERO,
                p2p_cursor_bps: 5_000,
                rewards: None,
            }),
        }
    }

    /// Move the peer-to-peer rate cursor; 0 pays the pool supply rate,
    /// 10 000 the pool borrow rate.
    pub fn set_p2p_cursor(&self, bps: u64, now: DateTime<Utc>) {
        let cash = self.cash();
        let mut state = lock(&self.state);
        state.accrue(cash, now);
        state.p2p_cursor_bps = bps.min(10_000);
    }

    pub fn set_rewards(&self, token: SimToken, per_year: U256) {
        let mut state = lock(&self.state);
        let start = state.pool.last_accrual;
        match state.rewards.as_mut() {
            Some(stream) => {
                stream.token = token;
                stream.per_year = per_year;
            }
            None => state.rewards = Some(RewardStream::new(token, per_year, start)),
        }
    }

    /// Supply straight to the pool on behalf of a third party.
    pub fn seed_pool(&self, who: Address, amount: U256, now: DateTime<Utc>) -> Result<(), MarketError> {
        self.supply_matched(who, amount, 0, now)
    }

    /// Morpho borrowers take `amount` from the pool, waiting to be matched.
    pub fn add_borrow_demand(&self, amount: U256, now: DateTime<Utc>) -> Result<(), MarketError> {
        let cash = self.cash();
        let mut state = lock(&self.state);
        state.accrue(cash, now);
        if amount > cash {
            return Err(MarketError::InsufficientLiquidity {
                requested: amount,
                available: cash,
            });
        }
        self.underlying.transfer(self.address, DEMAND_SINK, amount)?;
        state.pool.borrows = state.pool.borrows.saturating_add(amount);
        state.demand = state.demand.saturating_add(amount);
        Ok(())
    }

    pub fn unmatched_demand(&self) -> U256 {
        lock(&self.state).demand
    }
}

impl LendingMarket for SimMorphoMarket {
    fn address(&self) -> Address {
        self.address
    }

    fn accrue_interest(&self, now: DateTime<Utc>) {
        let cash = self.cash();
        lock(&self.state).accrue(cash, now);
    }

    fn supply(&self, account: Address, amount: U256, now: DateTime<Utc>) -> Result<(), MarketError> {
        self.supply_matched(account, amount, 0, now)
    }

    /// Pool balance first; the matched part is unmatched by borrowing it
    /// back from the pool.
    fn redeem_underlying(
        &self,
        account: Address,
        amount: U256,
        now: DateTime<Utc>,
    ) -> Result<(), MarketError> {
        if amount.is_zero() {
            return Ok(());
        }
        let cash = self.cash();
        let mut state = lock(&self.state);
        state.accrue(cash, now);
        if amount > cash {
            return Err(MarketError::InsufficientLiquidity {
                requested: amount,
                available: cash,
            });
        }
        let from_pool = amount.min(state.pool.balance_of(account));
        let from_p2p = amount - from_pool;
        let p2p_held = state.p2p_balance_of(account);
        if from_p2p > p2p_held {
            return Err(MarketError::InsufficientBalance {
                requested: amount,
                held: from_pool.saturating_add(p2p_held),
            });
        }

        state.checkpoint(account);
        state.pool.burn(account, from_pool)?;
        if !from_p2p.is_zero() {
            let held = state.p2p_shares_of(account);
            let shares = mul_div_up(from_p2p, SCALE, state.p2p_index).min(held);
            state.p2p_shares.insert(account, held - shares);
            state.p2p_total_shares = state.p2p_total_shares.saturating_sub(shares);
            state.pool.borrows = state.pool.borrows.saturating_add(from_p2p);
            state.demand = state.demand.saturating_add(from_p2p);
        }
        self.underlying.transfer(self.address, account, amount)
    }

    fn balance_of_underlying_stored(&self, account: Address) -> U256 {
        let state = lock(&self.state);
        state
            .pool
            .balance_of(account)
            .saturating_add(state.p2p_balance_of(account))
    }

    fn cash(&self) -> U256 {
        self.underlying.balance_of(self.address)
    }

    fn total_supply_underlying(&self) -> U256 {
        let state = lock(&self.state);
        state.pool.total_supply().saturating_add(state.p2p_total())
    }

    /// Pool supply rate; the peer-to-peer side is per user.
    fn supply_rate_after(&self, extra_supply: U256) -> U256 {
        let cash = self.cash().saturating_add(extra_supply);
        lock(&self.state).pool.rates(cash).0
    }

    fn reward_token(&self) -> Option<Arc<dyn Erc20>> {
        lock(&self.state)
            .rewards
            .as_ref()
            .map(|s| Arc::new(s.token.clone()) as Arc<dyn Erc20>)
    }

    fn reward_emission_per_year(&self) -> U256 {
        lock(&self.state)
            .rewards
            .as_ref()
            .map(|s| s.per_year)
            .unwrap_or(U256::ZERO)
    }

    fn pending_rewards(&self, account: Address, now: DateTime<Utc>) -> U256 {
        let state = lock(&self.state);
        let weight = state.weight_of(account);
        let total = state.total_weight();
        state
            .rewards
            .as_ref()
            .map(|s| s.pending(account, weight, total, now))
            .unwrap_or(U256::ZERO)
    }

    fn claim_rewards(&self, account: Address, now: DateTime<Utc>) -> U256 {
        let cash = self.cash();
        let mut state = lock(&self.state);
        state.accrue(cash, now);
        let weight = state.weight_of(account);
        state
            .rewards
            .as_mut()
            .map(|s| s.claim(account, weight))
            .unwrap_or(U256::ZERO)
    }
}

impl P2pMarket for SimMorphoMarket {
    fn supply_matched(
        &self,
        account: Address,
        amount: U256,
        max_gas: u64,
        now: DateTime<Utc>,
    ) -> Result<(), MarketError> {
        if amount.is_zero() {
            return Ok(());
        }
        let cash = self.cash();
        let mut state = lock(&self.state);
        state.accrue(cash, now);
        self.underlying.transfer(account, self.address, amount)?;
        state.checkpoint(account);

        let matched = if max_gas == 0 {
            U256::ZERO
        } else {
            amount.min(state.demand)
        };
        if !matched.is_zero() {
            // The supplier's funds repay the matched borrowers' pool debt.
            state.demand -= matched;
            state.pool.borrows = state.pool.borrows.saturating_sub(matched);
            let shares = mul_div(matched, SCALE, state.p2p_index);
            *state.p2p_shares.entry(account).or_insert(U256::ZERO) += shares;
            state.p2p_total_shares = state.p2p_total_shares.saturating_add(shares);
        }
        let to_pool = amount - matched;
        if !to_pool.is_zero() {
            state.pool.mint(account, to_pool);
        }
        Ok(())
    }

    fn matched_balance_of(&self, account: Address) -> U256 {
        lock(&self.state).p2p_balance_of(account)
    }

    fn next_user_supply_rate(&self, account: Address, amount: U256, max_gas: u64) -> U256 {
        let state = lock(&self.state);
        let matched = if max_gas == 0 {
            U256::ZERO
        } else {
            amount.min(state.demand)
        };
        let cash = self.cash().saturating_add(amount);
        let borrows = state.pool.borrows.saturating_sub(matched);
        let util = state.pool.model.utilization(cash, borrows, state.pool.reserves);
        let pool_rate = state.pool.model.supply_rate(util);
        let p2p_rate = state.p2p_rate(pool_rate, state.pool.model.borrow_rate(util));

        let p2p_balance = state.p2p_balance_of(account).saturating_add(matched);
        let pool_balance = state.pool.balance_of(account).saturating_add(amount - matched);
        let total = p2p_balance.saturating_add(pool_balance);
        if total.is_zero() {
            let open = max_gas > 0 && !(state.demand - matched).is_zero();
            return if open { p2p_rate } else { pool_rate };
        }
        p2p_rate
            .saturating_mul(p2p_balance)
            .saturating_add(pool_rate.saturating_mul(pool_balance))
            / total
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
