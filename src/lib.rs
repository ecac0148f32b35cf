//! MULTILEND: multi-lender yield strategy engine
//!
//! Library crate exposing the strategy, its lender adapters and the
//! in-memory collaborators used by the integration tests.

pub mod config;
pub mod telemetry;
pub mod types;
pub mod math;
pub mod market;
pub mod lenders;
pub mod strategy;
pub mod vault;
pub mod sim;
