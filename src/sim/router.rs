//! Swap venue and trade factory.
//!
//! The router prices every listed token against a common numeraire and
//! charges the fee of the route taken. Swaps burn the input from the
//! caller and mint the output, so no liquidity has to be provisioned.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::{lock, SimToken};
use crate::market::{Erc20, SwapRoute, SwapRouter, TradeFactory};
use crate::math::{bps_of, mul_div};
use crate::types::{units, Address, MarketError, U256};

/// Uniswap v3 fee denominator (hundredths of a bip).
const UNI_FEE_DENOMINATOR: u64 = 1_000_000;
const SOLIDLY_STABLE_FEE_BPS: u64 = 1;
const SOLIDLY_VOLATILE_FEE_BPS: u64 = 20;

/// Price-table router. Prices are WAD-scaled value per whole token.
#[derive(Default)]
pub struct SimRouter {
    listings: Mutex<HashMap<Address, (SimToken, U256)>>,
}

impl SimRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// List `token` at `price` (WAD per whole token), replacing any earlier price.
    pub fn list(&self, token: &SimToken, price: U256) {
        lock(&self.listings).insert(token.address(), (token.clone(), price));
    }

    pub fn price_of(&self, token: Address) -> Option<U256> {
        lock(&self.listings).get(&token).map(|(_, p)| *p)
    }

    fn listing(&self, token: Address) -> Result<(SimToken, U256), MarketError> {
        lock(&self.listings)
            .get(&token)
            .cloned()
            .ok_or(MarketError::UnknownToken(token))
    }

    fn after_fees(gross: U256, route: &SwapRoute) -> U256 {
        match *route {
            SwapRoute::Direct => gross,
            SwapRoute::UniswapV3 {
                reward_to_eth_fee,
                eth_to_want_fee,
            } => {
                let denom = U256::from(UNI_FEE_DENOMINATOR);
                let hop = |amount: U256, fee: u32| {
                    let keep = denom.saturating_sub(U256::from(fee));
                    mul_div(amount, keep, denom)
                };
                hop(hop(gross, reward_to_eth_fee), eth_to_want_fee)
            }
            SwapRoute::Solidly { stable } => {
                let fee = if stable {
                    SOLIDLY_STABLE_FEE_BPS
                } else {
                    SOLIDLY_VOLATILE_FEE_BPS
                };
                gross - bps_of(gross, fee)
            }
        }
    }
}

impl SwapRouter for SimRouter {
    fn quote(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        route: &SwapRoute,
    ) -> Result<U256, MarketError> {
        let (t_in, p_in) = self.listing(token_in)?;
        let (t_out, p_out) = self.listing(token_out)?;
        let value = mul_div(amount_in, p_in, units(1, t_in.decimals()));
        let gross = mul_div(value, units(1, t_out.decimals()), p_out);
        Ok(Self::after_fees(gross, route))
    }

    fn swap(
        &self,
        account: Address,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        min_out: U256,
        route: &SwapRoute,
    ) -> Result<U256, MarketError> {
        let out = self.quote(token_in, token_out, amount_in, route)?;
        if out < min_out {
            return Err(MarketError::Slippage { out, min_out });
        }
        let (t_in, _) = self.listing(token_in)?;
        let (t_out, _) = self.listing(token_out)?;
        t_in.burn(account, amount_in)?;
        t_out.mint(account, out);
        debug!(account = %account, amount_in = %amount_in, out = %out, ?route, "Swap");
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Trade factory
// ---------------------------------------------------------------------------

/// Sells rewards for the adapters that enabled it, when told to.
pub struct SimTradeFactory {
    address: Address,
    router: Arc<SimRouter>,
    route: SwapRoute,
    enabled: Mutex<HashSet<(Address, Address)>>,
}

impl SimTradeFactory {
    pub fn new(address: Address, router: Arc<SimRouter>) -> Self {
        Self {
            address,
            router,
            route: SwapRoute::Direct,
            enabled: Mutex::new(HashSet::new()),
        }
    }

    pub fn is_enabled(&self, token_in: Address, token_out: Address) -> bool {
        lock(&self.enabled).contains(&(token_in, token_out))
    }

    /// Pull `amount` of `token_in` from `lender` through its allowance,
    /// swap it and pay the `token_out` proceeds back to `lender`.
    pub fn execute(
        &self,
        lender: Address,
        token_in: Address,
        token_out: Address,
        amount: U256,
    ) -> Result<U256, MarketError> {
        if !self.is_enabled(token_in, token_out) {
            return Err(MarketError::PairDisabled {
                token_in,
                token_out,
            });
        }
        let (reward, _) = self.router.listing(token_in)?;
        let (want, _) = self.router.listing(token_out)?;
        reward.transfer_from(self.address, lender, self.address, amount)?;
        let out = self
            .router
            .swap(self.address, token_in, token_out, amount, U256::ZERO, &self.route)?;
        want.transfer(self.address, lender, out)?;
        debug!(lender = %lender, sold = %amount, paid = %out, "Trade executed");
        Ok(out)
    }
}

impl TradeFactory for SimTradeFactory {
    fn address(&self) -> Address {
        self.address
    }

    fn enable(&self, token_in: Address, token_out: Address) {
        lock(&self.enabled).insert((token_in, token_out));
    }

    fn disable(&self, token_in: Address, token_out: Address) {
        lock(&self.enabled).remove(&(token_in, token_out));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
