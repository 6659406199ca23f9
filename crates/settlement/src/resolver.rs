//! Resolution of pending trades against ground truth.
//!
//! Crypto markets settle against a historical reference price at the
//! contract's expiry instant; weather markets prefer the venue's own
//! finalized result and fall back to NWS station observations. A trade
//! whose reference cannot be fetched is marked `price_fetch_failed` and
//! retried on the next pass. Settlements apply in expiry order so the
//! streak counter stays meaningful.

use autotrader_core::policy::PolicyParams;
use autotrader_core::ticker::{self, ParsedTicker};
use autotrader_core::types::{Side, WeatherKind};
use autotrader_data::{HistoryProvider, WeatherProvider};
use autotrader_kalshi::KalshiClient;
use autotrader_ledger::{Ledger, ResultStatus, TradeFilter, TradeRecord};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::{info, warn};

use crate::error::{Result, SettlementError};

/// One trade's resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Settled {
        won: bool,
        /// Reference price (USD) or observed temperature (°F).
        reference: f64,
    },
    /// No reference could be fetched; retry later.
    ReferenceUnavailable,
}

/// Counts for one settlement pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SettleSummary {
    pub examined: usize,
    pub wins: usize,
    pub losses: usize,
    pub fetch_failures: usize,
    /// Trades whose ticker could not be parsed; skipped, never settled.
    #[serde(default)]
    pub invalid_tickers: usize,
}

impl SettleSummary {
    #[must_use]
    pub fn settled(&self) -> usize {
        self.wins + self.losses
    }
}

pub struct SettlementResolver {
    history: HistoryProvider,
    weather: WeatherProvider,
    /// Used for weather results when present; crypto never asks the
    /// venue.
    venue: Option<KalshiClient>,
}

impl SettlementResolver {
    #[must_use]
    pub fn new(
        history: HistoryProvider,
        weather: WeatherProvider,
        venue: Option<KalshiClient>,
    ) -> Self {
        Self {
            history,
            weather,
            venue,
        }
    }

    /// Resolves one trade. Pure over the fetched reference: the win
    /// condition is `reference >= strike` for YES on crypto, and the
    /// observed temperature against the threshold for weather.
    ///
    /// # Errors
    ///
    /// Returns an error only for an unparseable ticker; fetch failures
    /// come back as [`Resolution::ReferenceUnavailable`].
    pub async fn resolve(&self, trade: &TradeRecord) -> Result<Resolution> {
        let parsed = ticker::parse(&trade.ticker)
            .ok_or_else(|| SettlementError::Ticker(trade.ticker.clone()))?;

        match parsed {
            ParsedTicker::Crypto {
                asset,
                expiry,
                strike,
            } => match self.history.price_at(asset, expiry).await {
                Ok(reference) => {
                    let yes_won = reference >= strike;
                    Ok(Resolution::Settled {
                        won: side_won(trade.side, yes_won),
                        reference,
                    })
                }
                Err(e) => {
                    warn!(ticker = %trade.ticker, error = %e, "reference price unavailable");
                    Ok(Resolution::ReferenceUnavailable)
                }
            },
            ParsedTicker::Weather {
                city,
                kind,
                date,
                threshold,
            } => {
                if let Some(resolution) = self.venue_weather_result(trade).await {
                    return Ok(resolution);
                }
                match self.weather.daily_temperature(&city, date, kind).await {
                    Ok(observed) => {
                        let yes_won = match kind {
                            WeatherKind::High => observed >= threshold,
                            WeatherKind::Low => observed <= threshold,
                        };
                        Ok(Resolution::Settled {
                            won: side_won(trade.side, yes_won),
                            reference: observed,
                        })
                    }
                    Err(e) => {
                        warn!(ticker = %trade.ticker, error = %e, "observation unavailable");
                        Ok(Resolution::ReferenceUnavailable)
                    }
                }
            }
        }
    }

    async fn venue_weather_result(&self, trade: &TradeRecord) -> Option<Resolution> {
        let venue = self.venue.as_ref()?;
        match venue.market_result(&trade.ticker).await {
            Ok(result) if result.is_final() => {
                let winner = result.result?;
                Some(Resolution::Settled {
                    won: winner == trade.side,
                    reference: trade.strike,
                })
            }
            Ok(_) => None,
            Err(e) => {
                warn!(ticker = %trade.ticker, error = %e, "venue result lookup failed");
                None
            }
        }
    }

    /// Settles everything due in the ledger: pending trades plus
    /// earlier fetch failures, expiry at least `grace_secs` in the
    /// past, in expiry order. Updates are written back in place
    /// atomically, so a rerun settles nothing twice.
    ///
    /// # Errors
    ///
    /// Returns an error for ledger failures; individual reference
    /// failures only mark the affected trade, and a trade with an
    /// unparseable ticker is skipped and counted.
    pub async fn settle_due(
        &self,
        ledger: &Ledger,
        policy: &PolicyParams,
        now: DateTime<Utc>,
        grace_secs: i64,
    ) -> Result<SettleSummary> {
        let mut due: Vec<TradeRecord> = ledger
            .trades(&TradeFilter::default())?
            .into_iter()
            .filter(|t| {
                matches!(
                    t.result_status,
                    ResultStatus::Pending | ResultStatus::PriceFetchFailed
                ) && (now - t.expiry).num_seconds() >= grace_secs
            })
            .collect();
        due.sort_by_key(|t| t.expiry);

        let mut summary = SettleSummary {
            examined: due.len(),
            ..SettleSummary::default()
        };
        let mut resolutions: Vec<((DateTime<Utc>, String, Side), Resolution)> = Vec::new();
        for trade in &due {
            let resolution = if policy.paper.simulated_bernoulli {
                simulated_resolution(trade, policy.paper.rng_seed)
            } else {
                match self.resolve(trade).await {
                    Ok(resolution) => resolution,
                    // A malformed ticker can never resolve; skip it so
                    // the rest of the pass still settles.
                    Err(SettlementError::Ticker(ticker)) => {
                        warn!(%ticker, "skipping trade with unparseable ticker");
                        summary.invalid_tickers += 1;
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            };
            match &resolution {
                Resolution::Settled { won, .. } => {
                    if *won {
                        summary.wins += 1;
                    } else {
                        summary.losses += 1;
                    }
                }
                Resolution::ReferenceUnavailable => summary.fetch_failures += 1,
            }
            resolutions.push((
                (trade.timestamp, trade.ticker.clone(), trade.side),
                resolution,
            ));
        }

        if !resolutions.is_empty() {
            ledger.rewrite_trades(|record| {
                let key = (record.timestamp, record.ticker.clone(), record.side);
                let Some((_, resolution)) = resolutions.iter().find(|(k, _)| *k == key) else {
                    return false;
                };
                match resolution {
                    Resolution::Settled { won, reference } => {
                        record.result_status = if *won {
                            ResultStatus::Won
                        } else {
                            ResultStatus::Lost
                        };
                        record.realized_pnl_cents = Some(record.pnl_cents(*won));
                        record.settlement_value = Some(*reference);
                        record.settled_at = Some(now);
                        true
                    }
                    Resolution::ReferenceUnavailable => {
                        if record.result_status == ResultStatus::PriceFetchFailed {
                            false
                        } else {
                            record.result_status = ResultStatus::PriceFetchFailed;
                            true
                        }
                    }
                }
            })?;
        }

        info!(
            examined = summary.examined,
            wins = summary.wins,
            losses = summary.losses,
            fetch_failures = summary.fetch_failures,
            invalid_tickers = summary.invalid_tickers,
            "settlement pass complete"
        );
        Ok(summary)
    }
}

fn side_won(side: Side, yes_won: bool) -> bool {
    match side {
        Side::Yes => yes_won,
        Side::No => !yes_won,
    }
}

/// Deterministic Bernoulli draw against the recorded model probability,
/// seeded per trade so replays reproduce.
fn simulated_resolution(trade: &TradeRecord, seed: u64) -> Resolution {
    let mut hasher = DefaultHasher::new();
    trade.ticker.hash(&mut hasher);
    trade.timestamp.timestamp().hash(&mut hasher);
    let mut rng = StdRng::seed_from_u64(seed ^ hasher.finish());
    let won = rng.gen::<f64>() < trade.our_prob;
    Resolution::Settled {
        won,
        reference: trade.strike,
    }
}
