//! Settlement result cache (`settlements.json`).
//!
//! Per-ticker entries plus summary totals, kept so analysis tooling
//! never rescans the ledger for resolved outcomes. Rebuildable from
//! trade records; the ledger stays authoritative.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use autotrader_core::types::Side;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::record::{ResultStatus, TradeRecord};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementEntry {
    pub ticker: String,
    pub side: Side,
    pub won: bool,
    pub pnl_cents: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settlement_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SettlementTotals {
    pub settled: usize,
    pub wins: usize,
    pub losses: usize,
    pub pnl_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementCache {
    pub updated_at: DateTime<Utc>,
    pub totals: SettlementTotals,
    /// Keyed by `"{timestamp}|{ticker}|{side}"`, the trade identity.
    pub entries: BTreeMap<String, SettlementEntry>,
}

fn entry_key(trade: &TradeRecord) -> String {
    format!(
        "{}|{}|{}",
        trade.timestamp.to_rfc3339(),
        trade.ticker,
        trade.side
    )
}

impl SettlementCache {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            updated_at: Utc::now(),
            totals: SettlementTotals::default(),
            entries: BTreeMap::new(),
        }
    }

    /// Rebuilds the cache from deduplicated trade records.
    #[must_use]
    pub fn rebuild(trades: &[TradeRecord]) -> Self {
        let mut cache = Self::empty();
        for trade in trades {
            if !trade.result_status.is_settled() {
                continue;
            }
            let won = trade.result_status == ResultStatus::Won;
            let pnl = trade
                .realized_pnl_cents
                .unwrap_or_else(|| trade.pnl_cents(won));
            cache.entries.insert(
                entry_key(trade),
                SettlementEntry {
                    ticker: trade.ticker.clone(),
                    side: trade.side,
                    won,
                    pnl_cents: pnl,
                    settlement_value: trade.settlement_value,
                    settled_at: trade.settled_at,
                },
            );
        }
        cache.totals = cache.entries.values().fold(
            SettlementTotals::default(),
            |mut totals, entry| {
                totals.settled += 1;
                if entry.won {
                    totals.wins += 1;
                } else {
                    totals.losses += 1;
                }
                totals.pnl_cents += entry.pnl_cents;
                totals
            },
        );
        cache
    }

    /// # Errors
    ///
    /// Returns an error for unreadable or corrupt files.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match fs::read_to_string(path) {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomic overwrite, temp file + rename.
    ///
    /// # Errors
    ///
    /// Returns an error when the document cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}
