//! Deterministic in-memory collaborators.
//!
//! Everything the engine talks to through a trait has a simulated
//! counterpart here: tokens, money markets, a swap router, a trade
//! factory and a vault. Shared state sits behind `Arc<Mutex<_>>` so a
//! handle can be cloned into an adapter while the test keeps driving it.
//! Time only moves when the [`Chain`] is told to.

pub mod market;
pub mod router;
pub mod token;
pub mod vault;

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::types::{Address, CallContext};

pub use market::{RateModel, SimCompoundMarket, SimMorphoMarket};
pub use router::{SimRouter, SimTradeFactory};
pub use token::{NativeLedger, SimToken};
pub use vault::SimVault;

/// Seconds per block on the simulated chain.
pub const BLOCK_TIME_SECS: i64 = 12;

/// Clock, block height and per-deployer nonces.
#[derive(Debug, Clone)]
pub struct Chain {
    now: DateTime<Utc>,
    block: u64,
    nonces: HashMap<Address, u64>,
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

impl Chain {
    /// Genesis at 2023-01-01T00:00:00Z, block 16 308 190.
    pub fn new() -> Self {
        Self {
            now: Utc
                .timestamp_opt(1_672_531_200, 0)
                .single()
                .unwrap_or_else(Utc::now),
            block: 16_308_190,
            nonces: HashMap::new(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn block(&self) -> u64 {
        self.block
    }

    /// Call context for `sender` at the current block.
    pub fn ctx(&self, sender: Address) -> CallContext {
        CallContext::new(sender, self.now, self.block)
    }

    /// Advance the clock, mining one block per `BLOCK_TIME_SECS`.
    pub fn sleep(&mut self, secs: u64) {
        let secs = i64::try_from(secs).unwrap_or(i64::MAX / 2);
        self.now += Duration::seconds(secs);
        self.block += u64::try_from(secs / BLOCK_TIME_SECS).unwrap_or(0).max(1);
    }

    /// Mine `blocks` blocks, advancing the clock accordingly.
    pub fn mine(&mut self, blocks: u64) {
        let blocks = i64::try_from(blocks).unwrap_or(i64::MAX / (2 * BLOCK_TIME_SECS));
        self.now += Duration::seconds(blocks * BLOCK_TIME_SECS);
        self.block += u64::try_from(blocks).unwrap_or(0);
    }

    /// Address of the next contract `deployer` creates.
    pub fn deploy(&mut self, deployer: Address) -> Address {
        let nonce = self.nonces.entry(deployer).or_insert(0);
        let address = deployer.create(*nonce);
        *nonce += 1;
        address
    }
}

/// Lock shared sim state, recovering it from a poisoned mutex.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
