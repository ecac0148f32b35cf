//! External collaborators seen by the lenders.
//!
//! Each trait is the narrow surface a lender adapter needs from a token,
//! a money market, a swap venue or a trade factory. Implementations
//! share state behind interior mutability so the same handle can be
//! held by the adapter, the vault and the test driving them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::types::{Address, Asset, MarketError, U256};

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

/// Fungible token ledger.
///
/// `from` on `transfer` is the account that signed the call.
pub trait Erc20: Send + Sync {
    fn asset(&self) -> Asset;
    fn balance_of(&self, account: Address) -> U256;
    fn transfer(&self, from: Address, to: Address, amount: U256) -> Result<(), MarketError>;
    fn approve(&self, owner: Address, spender: Address, amount: U256);
    fn allowance(&self, owner: Address, spender: Address) -> U256;
    fn transfer_from(
        &self,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), MarketError>;

    fn address(&self) -> Address {
        self.asset().address
    }
}

/// Wrapped native asset (WETH). Native balances live beside the ERC20 ones.
pub trait WrappedNative: Erc20 {
    fn native_balance_of(&self, account: Address) -> U256;
    /// Burn wrapped tokens, credit native.
    fn unwrap_native(&self, account: Address, amount: U256) -> Result<(), MarketError>;
    /// Burn native, credit wrapped tokens.
    fn wrap_native(&self, account: Address, amount: U256) -> Result<(), MarketError>;
}

// ---------------------------------------------------------------------------
// Lending markets
// ---------------------------------------------------------------------------

/// A pooled money market (Compound v2 style cToken).
pub trait LendingMarket: Send + Sync {
    fn address(&self) -> Address;

    /// Bring borrow interest and reward indexes up to `now`.
    fn accrue_interest(&self, now: DateTime<Utc>);

    fn supply(&self, account: Address, amount: U256, now: DateTime<Utc>) -> Result<(), MarketError>;

    /// Redeem exactly `amount` of underlying to `account`.
    fn redeem_underlying(
        &self,
        account: Address,
        amount: U256,
        now: DateTime<Utc>,
    ) -> Result<(), MarketError>;

    /// Supplied balance at the last stored exchange rate.
    fn balance_of_underlying_stored(&self, account: Address) -> U256;

    /// Underlying held by the market and free to withdraw.
    fn cash(&self) -> U256;

    fn total_supply_underlying(&self) -> U256;

    /// Annual supply rate (WAD) once `extra_supply` more underlying is supplied.
    fn supply_rate_after(&self, extra_supply: U256) -> U256;

    fn reward_token(&self) -> Option<Arc<dyn Erc20>>;

    /// Reward tokens distributed to all suppliers per year.
    fn reward_emission_per_year(&self) -> U256;

    /// Rewards `account` could claim at `now`, without touching state.
    fn pending_rewards(&self, account: Address, now: DateTime<Utc>) -> U256;

    /// Transfer accrued rewards to `account`, returning the amount.
    fn claim_rewards(&self, account: Address, now: DateTime<Utc>) -> U256;
}

/// A peer-to-peer optimiser layered over a pool (Morpho-Aave).
pub trait P2pMarket: LendingMarket {
    /// Supply, matching peer-to-peer while `max_gas` allows.
    fn supply_matched(
        &self,
        account: Address,
        amount: U256,
        max_gas: u64,
        now: DateTime<Utc>,
    ) -> Result<(), MarketError>;

    /// Part of the account's balance currently matched peer-to-peer.
    fn matched_balance_of(&self, account: Address) -> U256;

    /// Blended annual rate the account earns after supplying `amount` more.
    fn next_user_supply_rate(&self, account: Address, amount: U256, max_gas: u64) -> U256;
}

// ---------------------------------------------------------------------------
// Swaps
// ---------------------------------------------------------------------------

/// Path taken from the reward token to want.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SwapRoute {
    /// Single hop, no fee.
    #[default]
    Direct,
    /// Uniswap v3 reward → WETH → want. Fees in hundredths of a bip.
    UniswapV3 {
        reward_to_eth_fee: u32,
        eth_to_want_fee: u32,
    },
    /// Velodrome / Solidly pair.
    Solidly { stable: bool },
}

pub trait SwapRouter: Send + Sync {
    fn quote(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        route: &SwapRoute,
    ) -> Result<U256, MarketError>;

    /// Swap from `account`'s balance, crediting the output back to it.
    fn swap(
        &self,
        account: Address,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        min_out: U256,
        route: &SwapRoute,
    ) -> Result<U256, MarketError>;
}

/// Delegate that sells reward tokens asynchronously on a lender's behalf.
#[cfg_attr(test, mockall::automock)]
pub trait TradeFactory: Send + Sync {
    fn address(&self) -> Address;
    fn enable(&self, token_in: Address, token_out: Address);
    fn disable(&self, token_in: Address, token_out: Address);
}
