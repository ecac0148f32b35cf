//! Shared types for the MULTILEND engine.
//!
//! These types form the data model used across all modules: token
//! amounts, call context, access tiers and the error taxonomy. They are
//! kept free of behaviour so that the lender, strategy and vault layers
//! can depend on them without circular references.

use alloy_primitives::keccak256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use alloy_primitives::{Address, U256};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// 18-decimal fixed-point unit. APRs and exchange rates are WAD-scaled.
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Basis-point denominator used by debt ratios and loss limits.
pub const MAX_BPS: U256 = U256::from_limbs([10_000, 0, 0, 0]);

/// Seconds in a 365-day year.
pub const SECONDS_PER_YEAR: u64 = 31_536_000;

/// `amount × 10^decimals` as a token amount.
pub fn units(amount: u64, decimals: u8) -> U256 {
    U256::from(amount) * U256::from(10u64).pow(U256::from(decimals))
}

// ---------------------------------------------------------------------------
// Asset
// ---------------------------------------------------------------------------

/// A fungible token: the vault's want token or a reward token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

impl Asset {
    /// Token with an address derived from its symbol.
    pub fn new(symbol: &str, decimals: u8) -> Self {
        Self {
            address: Address::from_word(keccak256(symbol.as_bytes())),
            symbol: symbol.to_string(),
            decimals,
        }
    }

    /// One whole token in base units.
    pub fn one(&self) -> U256 {
        units(1, self.decimals)
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} dp)", self.symbol, self.decimals)
    }
}

// ---------------------------------------------------------------------------
// Call context
// ---------------------------------------------------------------------------

/// Caller and chain position for a single state-changing call.
///
/// Every privileged operation receives one of these; `sender` is checked
/// against the relevant access tier before any state is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub sender: Address,
    pub timestamp: DateTime<Utc>,
    pub block: u64,
}

impl CallContext {
    pub fn new(sender: Address, timestamp: DateTime<Utc>, block: u64) -> Self {
        Self {
            sender,
            timestamp,
            block,
        }
    }

    /// The same block, re-entered by another contract.
    pub fn forwarded_by(&self, sender: Address) -> Self {
        Self { sender, ..*self }
    }
}

// ---------------------------------------------------------------------------
// Access tiers
// ---------------------------------------------------------------------------

/// Permission required by a privileged call. Displays as the revert tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessTier {
    Governance,
    Management,
    Keepers,
    Authorized,
    Strategist,
    Vault,
}

impl fmt::Display for AccessTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessTier::Governance => write!(f, "gov"),
            AccessTier::Management => write!(f, "management"),
            AccessTier::Keepers => write!(f, "keepers"),
            AccessTier::Authorized => write!(f, "authorized"),
            AccessTier::Strategist => write!(f, "strategist"),
            AccessTier::Vault => write!(f, "vault"),
        }
    }
}

// ---------------------------------------------------------------------------
// Strategy lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle of a strategy account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyStatus {
    Uninitialized,
    Active,
    Migrating,
    Retired,
}

impl fmt::Display for StrategyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyStatus::Uninitialized => write!(f, "uninitialized"),
            StrategyStatus::Active => write!(f, "active"),
            StrategyStatus::Migrating => write!(f, "migrating"),
            StrategyStatus::Retired => write!(f, "retired"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failures reported by an external lending market or swap venue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarketError {
    #[error("insufficient market liquidity: requested {requested}, available {available}")]
    InsufficientLiquidity { requested: U256, available: U256 },

    #[error("insufficient balance: requested {requested}, held {held}")]
    InsufficientBalance { requested: U256, held: U256 },

    #[error("insufficient allowance: requested {requested}, allowed {allowed}")]
    InsufficientAllowance { requested: U256, allowed: U256 },

    #[error("redeem amount rounds to zero shares")]
    RedeemTooSmall,

    #[error("no price for token {0}")]
    UnknownToken(Address),

    #[error("swap output {out} below minimum {min_out}")]
    Slippage { out: U256, min_out: U256 },

    #[error("trade {token_in} -> {token_out} not enabled")]
    PairDisabled { token_in: Address, token_out: Address },
}

/// Failures raised by a lender adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LenderError {
    #[error("!{0}")]
    Unauthorized(AccessTier),

    #[error("lender already initialized")]
    AlreadyInitialized,

    #[error("market call failed: {0}")]
    Market(#[from] MarketError),

    #[error("lender market pays no reward token")]
    NoRewardToken,
}

/// Failures raised by the strategy account.
#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    #[error("!{0}")]
    Unauthorized(AccessTier),

    #[error("strategy already initialized")]
    AlreadyInitialized,

    #[error("Already Added: {0}")]
    AlreadyAdded(Address),

    #[error("Undocked Lender: {0}")]
    UndockedLender(Address),

    #[error("NOT LENDER: {0}")]
    NotLender(Address),

    #[error("WITHDRAW FAILED: {lender} still holds {residue}")]
    WithdrawFailed { lender: Address, residue: U256 },

    #[error("allocation shares sum to {0}, expected 1000")]
    InvalidShares(u32),

    #[error("invalid address for {0}")]
    InvalidAddress(&'static str),

    #[error("strategy is {0}")]
    Inactive(StrategyStatus),

    #[error("lender {lender} failed during {phase}: {source}")]
    Lender {
        lender: Address,
        phase: String,
        #[source]
        source: LenderError,
    },

    #[error("vault call failed: {0}")]
    Vault(#[from] VaultError),
}

/// Failures raised by a vault.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("!{0}")]
    Unauthorized(AccessTier),

    #[error("unknown strategy {0}")]
    UnknownStrategy(Address),

    #[error("strategy {0} already active")]
    StrategyAlreadyActive(Address),

    #[error("strategy is bound to vault {0}")]
    WrongVault(Address),

    #[error("total debt ratio would exceed 10000 bps")]
    DebtRatioExceeded,

    #[error("deposit exceeds limit: available {available}")]
    DepositLimit { available: U256 },

    #[error("insufficient shares: requested {requested}, held {held}")]
    InsufficientShares { requested: U256, held: U256 },

    #[error("loss {loss} exceeds max loss on {value}")]
    MaxLossExceeded { loss: U256, value: U256 },

    #[error("reported loss {loss} exceeds debt {debt}")]
    LossExceedsDebt { loss: U256, debt: U256 },

    #[error("token transfer failed: {0}")]
    Transfer(#[from] MarketError),

    #[error("strategy call failed: {0}")]
    Strategy(#[source] Box<StrategyError>),
}

impl StrategyError {
    /// Wrap an adapter failure with the lender and harvest phase it hit.
    pub fn lender(lender: Address, phase: impl fmt::Display, source: LenderError) -> Self {
        StrategyError::Lender {
            lender,
            phase: phase.to_string(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
