//! Configuration loading from TOML.
//!
//! Reads `strategy.toml` and deserializes into strongly-typed structs.
//! Every section is optional; missing keys fall back to the defaults a
//! freshly deployed strategy and lender start with.

use anyhow::{Context, Result};
use chrono::Duration;
use serde::Deserialize;
use std::fs;

use crate::types::U256;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub strategy: StrategyConfig,
    pub lenders: LenderConfig,
    pub vault: VaultConfig,
    pub logging: LoggingConfig,
}

/// Strategy account thresholds. Amounts are in want base units.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StrategyConfig {
    pub name: String,
    /// Harvest when `profit_factor × call cost` is below credit plus profit.
    pub profit_factor: u64,
    pub min_report_delay_secs: u64,
    pub max_report_delay_secs: u64,
    /// Outstanding debt or loss above this makes a harvest due.
    pub debt_threshold: u64,
    /// Withdrawals below this amount are not taken from lenders.
    pub withdrawal_threshold: u64,
    /// Window after a profitable report during which profit alone
    /// does not make a harvest due.
    pub harvest_cooldown_secs: u64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            name: "StrategyLenderYieldOptimiser".to_string(),
            profit_factor: 100,
            min_report_delay_secs: 0,
            max_report_delay_secs: 86_400,
            debt_threshold: 0,
            withdrawal_threshold: 0,
            harvest_cooldown_secs: 6 * 3_600,
        }
    }
}

impl StrategyConfig {
    pub fn min_report_delay(&self) -> Duration {
        Duration::seconds(secs(self.min_report_delay_secs))
    }

    pub fn max_report_delay(&self) -> Duration {
        Duration::seconds(secs(self.max_report_delay_secs))
    }

    pub fn harvest_cooldown(&self) -> Duration {
        Duration::seconds(secs(self.harvest_cooldown_secs))
    }
}

/// Defaults applied to newly deployed lender adapters.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LenderConfig {
    /// Residual market balance treated as empty.
    pub dust: u64,
    /// Reward tokens below this are not swapped (base units).
    pub min_reward_to_sell: u64,
    /// Pending rewards below this are not claimed (base units).
    pub min_reward_to_claim: u64,
    /// Uniswap v3 fee tiers, hundredths of a bip. Zero disables the route.
    pub reward_to_eth_fee: u32,
    pub eth_to_want_fee: u32,
    /// Gas budget for peer-to-peer matching on Morpho markets.
    pub max_gas_for_matching: u64,
}

impl Default for LenderConfig {
    fn default() -> Self {
        Self {
            dust: 0,
            min_reward_to_sell: 1_000_000_000_000_000_000,
            min_reward_to_claim: 1_000_000_000_000_000_000,
            reward_to_eth_fee: 0,
            eth_to_want_fee: 0,
            max_gas_for_matching: 100_000,
        }
    }
}

impl LenderConfig {
    pub fn dust(&self) -> U256 {
        U256::from(self.dust)
    }

    pub fn min_reward_to_sell(&self) -> U256 {
        U256::from(self.min_reward_to_sell)
    }

    pub fn min_reward_to_claim(&self) -> U256 {
        U256::from(self.min_reward_to_claim)
    }
}

/// In-memory vault settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VaultConfig {
    /// Zero means unlimited.
    pub deposit_limit: u64,
    /// Seconds over which reported profit unlocks into the share price.
    pub locked_profit_window_secs: u64,
    /// Loss tolerated on user withdrawals, in basis points.
    pub max_loss_bps: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            deposit_limit: 0,
            locked_profit_window_secs: 6 * 3_600,
            max_loss_bps: 1,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "multilend=info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }
}

fn secs(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
