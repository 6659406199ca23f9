//! The append-only JSONL ledger.
//!
//! Writes are single `write_all` calls on an `O_APPEND` handle, so
//! concurrent writers interleave whole lines. Reads tolerate a torn
//! final line (a crash mid-append) and ignore record kinds written by
//! newer tooling; a malformed line anywhere else is an integrity error.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use autotrader_core::types::{AssetFamily, ExecutionMode};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{LedgerError, Result};
use crate::record::{Record, ResultStatus, TradeRecord};

const KNOWN_KINDS: [&str; 4] = ["trade", "skip", "cycle_heartbeat", "alert"];

/// Filter for trade queries. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct TradeFilter {
    pub ticker: Option<String>,
    pub family: Option<AssetFamily>,
    pub result_status: Option<ResultStatus>,
    pub mode: Option<ExecutionMode>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TradeFilter {
    #[must_use]
    pub fn with_ticker(mut self, ticker: impl Into<String>) -> Self {
        self.ticker = Some(ticker.into());
        self
    }

    #[must_use]
    pub fn with_family(mut self, family: AssetFamily) -> Self {
        self.family = Some(family);
        self
    }

    #[must_use]
    pub fn with_result_status(mut self, status: ResultStatus) -> Self {
        self.result_status = Some(status);
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = Some(mode);
        self
    }

    #[must_use]
    pub fn with_range(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    fn matches(&self, trade: &TradeRecord) -> bool {
        if let Some(ticker) = &self.ticker {
            if &trade.ticker != ticker {
                return false;
            }
        }
        if let Some(family) = &self.family {
            if &trade.asset != family {
                return false;
            }
        }
        if let Some(status) = self.result_status {
            if trade.result_status != status {
                return false;
            }
        }
        if let Some(mode) = self.mode {
            if trade.execution_mode != mode {
                return false;
            }
        }
        if let Some(from) = self.from {
            if trade.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if trade.timestamp > to {
                return false;
            }
        }
        true
    }
}

pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record as a whole line.
    ///
    /// # Errors
    ///
    /// Returns an error when the record cannot be serialized or the
    /// file cannot be written.
    pub fn append(&self, record: &Record) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Streams every parseable record in file order. A missing file is
    /// an empty ledger.
    ///
    /// # Errors
    ///
    /// Returns an integrity error for a malformed line that is not the
    /// trailing one.
    pub fn scan(&self) -> Result<Vec<Record>> {
        let Some(lines) = self.raw_lines()? else {
            return Ok(Vec::new());
        };
        let total = lines.len();
        let mut records = Vec::new();
        for (idx, line) in lines.iter().enumerate() {
            match parse_line(line) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(message) => {
                    if idx + 1 == total {
                        // Torn final line from an interrupted append.
                        warn!(line = idx + 1, "ignoring trailing partial ledger line");
                    } else {
                        return Err(LedgerError::integrity(idx + 1, message));
                    }
                }
            }
        }
        Ok(records)
    }

    /// Trades matching `filter`, deduplicated by (timestamp, ticker,
    /// side) with the later line winning, sorted by timestamp.
    ///
    /// # Errors
    ///
    /// Propagates scan failures.
    pub fn trades(&self, filter: &TradeFilter) -> Result<Vec<TradeRecord>> {
        let mut by_identity: Vec<TradeRecord> = Vec::new();
        for record in self.scan()? {
            let Record::Trade(trade) = record else {
                continue;
            };
            if !filter.matches(&trade) {
                continue;
            }
            if let Some(existing) = by_identity.iter_mut().find(|t| {
                t.timestamp == trade.timestamp && t.ticker == trade.ticker && t.side == trade.side
            }) {
                *existing = trade;
            } else {
                by_identity.push(trade);
            }
        }
        by_identity.sort_by_key(|t| t.timestamp);
        Ok(by_identity)
    }

    /// Rewrites trade lines in place, preserving every other line
    /// byte-for-byte. `update` returns true when it changed the record.
    /// The whole file is replaced atomically, so a crash leaves either
    /// the old or the new ledger. Returns the number of updated lines.
    ///
    /// # Errors
    ///
    /// Propagates scan and write failures.
    pub fn rewrite_trades<F>(&self, mut update: F) -> Result<usize>
    where
        F: FnMut(&mut TradeRecord) -> bool,
    {
        let Some(lines) = self.raw_lines()? else {
            return Ok(0);
        };
        let total = lines.len();
        let mut updated = 0usize;
        let mut out = String::new();
        for (idx, line) in lines.iter().enumerate() {
            match parse_line(line) {
                Ok(Some(Record::Trade(mut trade))) => {
                    if update(&mut trade) {
                        updated += 1;
                        out.push_str(&serde_json::to_string(&Record::Trade(trade))?);
                    } else {
                        out.push_str(line);
                    }
                    out.push('\n');
                }
                Ok(_) => {
                    out.push_str(line);
                    out.push('\n');
                }
                Err(message) => {
                    if idx + 1 == total {
                        // Drop the torn line; it was never a record.
                        warn!(line = idx + 1, "dropping trailing partial ledger line");
                    } else {
                        return Err(LedgerError::integrity(idx + 1, message));
                    }
                }
            }
        }
        if updated == 0 {
            return Ok(0);
        }

        let tmp = self.path.with_extension("jsonl.tmp");
        fs::write(&tmp, out.as_bytes())?;
        fs::rename(&tmp, &self.path)?;
        debug!(updated, path = %self.path.display(), "ledger rewritten");
        Ok(updated)
    }

    /// Pending trades whose expiry passed at least `grace_secs` ago,
    /// ordered by expiry so settlements keep streak semantics.
    ///
    /// # Errors
    ///
    /// Propagates scan failures.
    pub fn settleable(&self, now: DateTime<Utc>, grace_secs: i64) -> Result<Vec<TradeRecord>> {
        let mut pending =
            self.trades(&TradeFilter::default().with_result_status(ResultStatus::Pending))?;
        pending.retain(|t| (now - t.expiry).num_seconds() >= grace_secs);
        pending.sort_by_key(|t| t.expiry);
        Ok(pending)
    }

    fn raw_lines(&self) -> Result<Option<Vec<String>>> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let reader = BufReader::new(file);
        let mut lines = Vec::new();
        for line in reader.lines() {
            lines.push(line?);
        }
        Ok(Some(lines))
    }
}

/// `Ok(None)` is a blank or unknown-kind line; `Err` is unparseable.
fn parse_line(line: &str) -> std::result::Result<Option<Record>, String> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(line).map_err(|e| e.to_string())?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| "record without a type field".to_string())?;
    if !KNOWN_KINDS.contains(&kind) {
        debug!(kind, "ignoring unknown record kind");
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| e.to_string())
}
