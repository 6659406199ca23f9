//! Opportunity finding and sizing.
//!
//! The finder turns one cycle's markets and signal snapshots into a
//! ranked candidate list; the sizing policy turns each candidate plus
//! the session's account view into a trade or a reasoned skip. Both are
//! pure over their inputs, so the runner can replay any decision from
//! a ledger record.

pub mod finder;
pub mod opportunity;
pub mod sizing;

pub use finder::{FinderInputs, OpportunityFinder};
pub use opportunity::{FinderOutcome, Opportunity, SkipReason, SkippedCandidate};
pub use sizing::{decide, halt_reason, AccountView, Decision, SizedTrade};
