//! Token ledgers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::lock;
use crate::market::{Erc20, WrappedNative};
use crate::types::{Address, Asset, MarketError, U256};

#[derive(Debug, Default)]
struct Ledger {
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
    total_supply: U256,
}

impl Ledger {
    fn balance_of(&self, account: Address) -> U256 {
        self.balances.get(&account).copied().unwrap_or(U256::ZERO)
    }

    fn credit(&mut self, account: Address, amount: U256) {
        let balance = self.balances.entry(account).or_insert(U256::ZERO);
        *balance = balance.saturating_add(amount);
    }

    fn debit(&mut self, account: Address, amount: U256) -> Result<(), MarketError> {
        let held = self.balance_of(account);
        if held < amount {
            return Err(MarketError::InsufficientBalance {
                requested: amount,
                held,
            });
        }
        self.balances.insert(account, held - amount);
        Ok(())
    }

    fn transfer(&mut self, from: Address, to: Address, amount: U256) -> Result<(), MarketError> {
        self.debit(from, amount)?;
        self.credit(to, amount);
        Ok(())
    }

    fn allowance(&self, owner: Address, spender: Address) -> U256 {
        self.allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    fn spend_allowance(
        &mut self,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> Result<(), MarketError> {
        let allowed = self.allowance(owner, spender);
        if allowed < amount {
            return Err(MarketError::InsufficientAllowance {
                requested: amount,
                allowed,
            });
        }
        // An unlimited approval is never spent down.
        if allowed != U256::MAX {
            self.allowances.insert((owner, spender), allowed - amount);
        }
        Ok(())
    }

    fn mint(&mut self, to: Address, amount: U256) {
        self.credit(to, amount);
        self.total_supply = self.total_supply.saturating_add(amount);
    }

    fn burn(&mut self, from: Address, amount: U256) -> Result<(), MarketError> {
        self.debit(from, amount)?;
        self.total_supply = self.total_supply.saturating_sub(amount);
        Ok(())
    }
}

#[derive(Debug)]
struct TokenState {
    asset: Asset,
    native: Asset,
    wrapped: Ledger,
    native_ledger: Ledger,
}

/// In-memory ERC20. Clones share one ledger.
///
/// Every token also carries a native-asset ledger so it can stand in for
/// WETH; [`SimToken::native_ledger`] exposes that side as its own token.
#[derive(Debug, Clone)]
pub struct SimToken {
    state: Arc<Mutex<TokenState>>,
}

impl SimToken {
    pub fn new(symbol: &str, decimals: u8) -> Self {
        let native_symbol = symbol.strip_prefix('W').unwrap_or(symbol);
        Self {
            state: Arc::new(Mutex::new(TokenState {
                asset: Asset::new(symbol, decimals),
                native: Asset::new(&format!("native:{native_symbol}"), decimals),
                wrapped: Ledger::default(),
                native_ledger: Ledger::default(),
            })),
        }
    }

    pub fn symbol(&self) -> String {
        lock(&self.state).asset.symbol.clone()
    }

    pub fn decimals(&self) -> u8 {
        lock(&self.state).asset.decimals
    }

    pub fn total_supply(&self) -> U256 {
        lock(&self.state).wrapped.total_supply
    }

    pub fn mint(&self, to: Address, amount: U256) {
        lock(&self.state).wrapped.mint(to, amount);
    }

    pub fn burn(&self, from: Address, amount: U256) -> Result<(), MarketError> {
        lock(&self.state).wrapped.burn(from, amount)
    }

    pub fn mint_native(&self, to: Address, amount: U256) {
        lock(&self.state).native_ledger.mint(to, amount);
    }

    /// The native-asset side of this token as a separate ledger.
    pub fn native_ledger(&self) -> NativeLedger {
        NativeLedger {
            token: self.clone(),
        }
    }
}

impl Erc20 for SimToken {
    fn asset(&self) -> Asset {
        lock(&self.state).asset.clone()
    }

    fn balance_of(&self, account: Address) -> U256 {
        lock(&self.state).wrapped.balance_of(account)
    }

    fn transfer(&self, from: Address, to: Address, amount: U256) -> Result<(), MarketError> {
        lock(&self.state).wrapped.transfer(from, to, amount)
    }

    fn approve(&self, owner: Address, spender: Address, amount: U256) {
        lock(&self.state)
            .wrapped
            .allowances
            .insert((owner, spender), amount);
    }

    fn allowance(&self, owner: Address, spender: Address) -> U256 {
        lock(&self.state).wrapped.allowance(owner, spender)
    }

    fn transfer_from(
        &self,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), MarketError> {
        let mut state = lock(&self.state);
        state.wrapped.spend_allowance(from, spender, amount)?;
        state.wrapped.transfer(from, to, amount)
    }
}

impl WrappedNative for SimToken {
    fn native_balance_of(&self, account: Address) -> U256 {
        lock(&self.state).native_ledger.balance_of(account)
    }

    fn unwrap_native(&self, account: Address, amount: U256) -> Result<(), MarketError> {
        let mut state = lock(&self.state);
        state.wrapped.burn(account, amount)?;
        state.native_ledger.mint(account, amount);
        Ok(())
    }

    fn wrap_native(&self, account: Address, amount: U256) -> Result<(), MarketError> {
        let mut state = lock(&self.state);
        state.native_ledger.burn(account, amount)?;
        state.wrapped.mint(account, amount);
        Ok(())
    }
}

/// Native balances of a [`SimToken`], seen as a token of their own.
#[derive(Debug, Clone)]
pub struct NativeLedger {
    token: SimToken,
}

impl Erc20 for NativeLedger {
    fn asset(&self) -> Asset {
        lock(&self.token.state).native.clone()
    }

    fn balance_of(&self, account: Address) -> U256 {
        lock(&self.token.state).native_ledger.balance_of(account)
    }

    fn transfer(&self, from: Address, to: Address, amount: U256) -> Result<(), MarketError> {
        lock(&self.token.state).native_ledger.transfer(from, to, amount)
    }

    fn approve(&self, owner: Address, spender: Address, amount: U256) {
        lock(&self.token.state)
            .native_ledger
            .allowances
            .insert((owner, spender), amount);
    }

    fn allowance(&self, owner: Address, spender: Address) -> U256 {
        lock(&self.token.state).native_ledger.allowance(owner, spender)
    }

    fn transfer_from(
        &self,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), MarketError> {
        let mut state = lock(&self.token.state);
        state.native_ledger.spend_allowance(from, spender, amount)?;
        state.native_ledger.transfer(from, to, amount)
    }
}
