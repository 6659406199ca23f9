//! Append-only trade ledger and its derived documents.
//!
//! `trades.jsonl` is the single source of truth. The session state and
//! the settlement cache are caches rebuilt from it; anything that
//! disagrees with the ledger loses.

pub mod error;
pub mod ledger;
pub mod record;
pub mod session;
pub mod settlements;

pub use error::{LedgerError, Result};
pub use ledger::{Ledger, TradeFilter};
pub use record::{
    AlertRecord, HeartbeatRecord, Record, ResultStatus, SkipRecord, TradeRecord,
};
pub use session::{FamilyStats, SessionState};
pub use settlements::{SettlementCache, SettlementEntry, SettlementTotals};
