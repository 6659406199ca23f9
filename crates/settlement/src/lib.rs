//! Settlement of expired binary positions against ground truth.

pub mod error;
pub mod resolver;

pub use error::{Result, SettlementError};
pub use resolver::{Resolution, SettlementResolver, SettleSummary};
