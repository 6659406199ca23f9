//! The scheduler that hosts the trading loop.
//!
//! [`cycle::CycleEngine`] performs one cycle (signals, discovery,
//! sizing, execution, persistence) plus the settlement and tune passes;
//! [`runner::Runner`] drives those on their cadences with a cycle
//! timeout and graceful shutdown.

pub mod cycle;
pub mod runner;

pub use cycle::{CycleEngine, CycleSummary};
pub use runner::Runner;
