//! Performance analysis and bounded policy auto-tuning.
//!
//! [`analysis`] slices settled trades into per-dimension buckets with
//! Wilson confidence intervals and a probability calibration table.
//! [`engine`] turns that analysis into parameter recommendations and,
//! past a settled-trade gate, applies them to the live policy with an
//! audit trail.

pub mod analysis;
pub mod engine;

pub use analysis::{analyze, Analysis, BucketStats, CalibrationBucket};
pub use engine::{TuneAudit, TuneChange, TuneEngine, TuneReport};
