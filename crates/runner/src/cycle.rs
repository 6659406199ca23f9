//! One trading cycle: refresh signals, discover markets, find and size
//! opportunities, route fills, and persist the outcome.
//!
//! The engine holds no trading state of its own. Every cycle reloads
//! the policy bundle and rebuilds the session view from the ledger, so
//! parameter changes and settlements written between cycles are picked
//! up without coordination.

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use autotrader_core::config::AppConfig;
use autotrader_core::policy::PolicyParams;
use autotrader_core::ticker::{self, ParsedTicker};
use autotrader_core::types::{Asset, Market, MarketStatus, WeatherKind};
use autotrader_data::{
    HistoryProvider, HistorySources, HttpGetter, OhlcProvider, OhlcSources, SpotProvider,
    SpotSources, WeatherProvider, WeatherSources,
};
use autotrader_kalshi::{KalshiClient, KalshiClientConfig, KalshiError};
use autotrader_ledger::{
    AlertRecord, HeartbeatRecord, Ledger, Record, SessionState, SettlementCache, SkipRecord,
    TradeFilter, TradeRecord,
};
use autotrader_settlement::{SettleSummary, SettlementResolver};
use autotrader_signals::{
    snapshot_correlation, NewsClient, SignalEngine, SignalSnapshot, WeatherSnapshot,
};
use autotrader_strategy::{
    decide, halt_reason, AccountView, Decision, FinderInputs, OpportunityFinder, SizedTrade,
    SkipReason,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{info, warn};

/// Forecast uncertainty assumed when a source reports none, °F.
const DEFAULT_FORECAST_UNCERTAINTY_F: f64 = 3.0;

/// What one cycle did, for the caller's logging and loop accounting.
#[derive(Debug, Clone, Default)]
pub struct CycleSummary {
    pub cycle: u64,
    pub markets_scanned: usize,
    pub candidates: usize,
    pub trades: usize,
    pub skips: usize,
    pub degraded: bool,
    /// Session-level stop observed this cycle, if any.
    pub halted: Option<SkipReason>,
}

pub struct CycleEngine {
    config: AppConfig,
    signals: SignalEngine,
    venue: Arc<KalshiClient>,
    resolver: SettlementResolver,
    ledger: Ledger,
    cycle: u64,
    consecutive_api_errors: u32,
}

impl CycleEngine {
    /// Builds every provider and the venue client from configuration.
    /// Venue credentials come from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error for missing credentials or an unusable provider
    /// configuration.
    pub fn new(config: AppConfig) -> Result<Self> {
        let http = HttpGetter::new(
            config.provider.requests_per_minute,
            config.provider.timeout_secs,
            config.provider.retry_attempts,
        )
        .context("building provider HTTP client")?
        .with_max_in_flight(config.provider.max_in_flight);

        let spot = SpotProvider::new(http.clone(), SpotSources::default());
        let ohlc = OhlcProvider::new(
            http.clone(),
            OhlcSources::default(),
            config.paths.ohlc_cache_dir(),
        );
        let weather = WeatherProvider::new(
            http.clone(),
            WeatherSources::default(),
            DEFAULT_FORECAST_UNCERTAINTY_F,
        );
        let news = NewsClient::from_env(http.clone());
        if news.is_none() {
            info!("news sentiment disabled, no token in environment");
        }
        let signals = SignalEngine::new(spot, ohlc, weather.clone(), news);

        let rpm = NonZeroU32::new(config.venue.requests_per_minute)
            .ok_or_else(|| anyhow!("venue requests_per_minute must be nonzero"))?;
        let venue_config = KalshiClientConfig::default()
            .with_base_url(config.venue.base_url.clone())
            .with_rate_limit(rpm)
            .with_timeout_secs(config.venue.timeout_secs);
        let venue = Arc::new(KalshiClient::new(venue_config.clone())?);

        let history = HistoryProvider::new(http, HistorySources::default());
        let resolver = SettlementResolver::new(
            history,
            weather,
            Some(KalshiClient::new(venue_config)?),
        );

        let ledger = Ledger::new(config.paths.trades_file());

        Ok(Self {
            config,
            signals,
            venue,
            resolver,
            ledger,
            cycle: 0,
            consecutive_api_errors: 0,
        })
    }

    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Runs one full cycle and appends its records to the ledger.
    ///
    /// Provider failures degrade the cycle instead of failing it: an
    /// asset family whose data is missing is dropped for this cycle and
    /// noted in the heartbeat.
    ///
    /// # Errors
    ///
    /// Returns an error only for ledger or policy-file failures;
    /// everything network-shaped is absorbed as degradation.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleSummary> {
        let started = Instant::now();
        self.cycle += 1;
        let policy = PolicyParams::load(&self.config.paths.policy_file())?;

        let mut degraded = false;

        let (markets, scan_failed) = self.scan_markets(now).await;
        if scan_failed {
            self.consecutive_api_errors += 1;
            degraded = true;
        } else {
            self.consecutive_api_errors = 0;
        }

        let crypto = self.crypto_snapshots(&policy, now, &mut degraded).await;
        let correlation_high = match (crypto.get(&Asset::Btc), crypto.get(&Asset::Eth)) {
            (Some(btc), Some(eth)) => snapshot_correlation(btc, eth).is_high(),
            _ => false,
        };
        let weather = self.weather_snapshots(&markets, &mut degraded).await;

        let finder = OpportunityFinder::from_policy(&policy);
        let inputs = FinderInputs {
            markets: &markets,
            crypto: &crypto,
            weather: &weather,
            now,
        };
        let outcome = finder.find(&inputs, &policy);

        let all_trades = self.ledger.trades(&TradeFilter::default())?;
        let session = SessionState::rebuild(
            &all_trades,
            policy.paper.starting_bankroll_cents,
            now.date_naive(),
        );
        let open: Vec<TradeRecord> = all_trades
            .iter()
            .filter(|t| !t.result_status.is_settled())
            .cloned()
            .collect();
        let trades_this_hour = all_trades
            .iter()
            .filter(|t| now - t.timestamp < Duration::hours(1))
            .count();
        let mut account = session.account_view(
            &open,
            trades_this_hour,
            self.consecutive_api_errors,
            correlation_high,
        );

        if self.config.execution_mode.is_live() {
            match self.venue.balance_cents().await {
                Ok(venue_balance) => {
                    if reconcile_balance(&mut account, venue_balance) {
                        warn!(
                            venue_balance,
                            "venue balance below the ledger view, trusting the venue"
                        );
                    }
                }
                Err(e) => {
                    warn!(error = %e, "venue balance unavailable");
                    degraded = true;
                }
            }
        }

        let halted = halt_reason(&account, &policy);
        if let Some(reason) = halted {
            self.ledger.append(&Record::Alert(AlertRecord {
                timestamp: now,
                kind: "kill_switch".to_string(),
                message: reason.to_string(),
            }))?;
            warn!(reason = reason.as_str(), "session halted");
        }

        let mut tally: BTreeMap<String, usize> = BTreeMap::new();
        for skipped in &outcome.skips {
            self.ledger.append(&Record::Skip(SkipRecord {
                timestamp: now,
                ticker: skipped.ticker.clone(),
                side: skipped.side,
                reason: skipped.reason,
                details: None,
            }))?;
            *tally.entry(skipped.reason.as_str().to_string()).or_default() += 1;
        }

        let mut trades_done = 0usize;
        for opp in &outcome.opportunities {
            match decide(opp, &account, &policy) {
                Decision::Trade(sized) => match self.execute(&sized, now).await {
                    Ok(record) => {
                        apply_fill(&mut account, &record);
                        info!(
                            ticker = %record.ticker,
                            side = ?record.side,
                            contracts = record.contracts,
                            cost_cents = record.cost_cents,
                            edge_adj = record.edge_adj,
                            "trade recorded"
                        );
                        self.ledger.append(&Record::Trade(record))?;
                        trades_done += 1;
                    }
                    Err(rejection) => {
                        warn!(ticker = %opp.ticker, %rejection, "order rejected");
                        self.ledger.append(&Record::Skip(SkipRecord {
                            timestamp: now,
                            ticker: opp.ticker.clone(),
                            side: opp.side,
                            reason: SkipReason::OrderRejected,
                            details: Some(rejection),
                        }))?;
                        *tally
                            .entry(SkipReason::OrderRejected.as_str().to_string())
                            .or_default() += 1;
                    }
                },
                Decision::Skip(reason) => {
                    self.ledger.append(&Record::Skip(SkipRecord {
                        timestamp: now,
                        ticker: opp.ticker.clone(),
                        side: opp.side,
                        reason,
                        details: None,
                    }))?;
                    *tally.entry(reason.as_str().to_string()).or_default() += 1;
                    // A session-level stop raised by a fill earlier in
                    // this loop applies to every remaining candidate.
                    if reason.is_halt() {
                        warn!(reason = reason.as_str(), "halted mid-cycle");
                        break;
                    }
                }
            }
        }

        let skips_total: usize = tally.values().sum();
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.ledger
            .append(&Record::CycleHeartbeat(HeartbeatRecord {
                timestamp: now,
                cycle: self.cycle,
                markets_scanned: markets.len(),
                candidates: outcome.opportunities.len(),
                trades: trades_done,
                skips: tally,
                latency_ms,
                degraded,
                note: halted.map(|r| format!("halted: {}", r.as_str())),
            }))?;

        // Refresh the derived session view with this cycle's appends.
        let refreshed = SessionState::rebuild(
            &self.ledger.trades(&TradeFilter::default())?,
            policy.paper.starting_bankroll_cents,
            now.date_naive(),
        );
        refreshed.save(&self.config.paths.session_file())?;

        Ok(CycleSummary {
            cycle: self.cycle,
            markets_scanned: markets.len(),
            candidates: outcome.opportunities.len(),
            trades: trades_done,
            skips: skips_total,
            degraded,
            halted,
        })
    }

    /// Records the heartbeat for a cycle abandoned at the wall-clock
    /// bound.
    pub(crate) fn record_timeout(&self, now: DateTime<Utc>) -> Result<()> {
        self.ledger
            .append(&Record::CycleHeartbeat(HeartbeatRecord {
                timestamp: now,
                cycle: self.cycle,
                markets_scanned: 0,
                candidates: 0,
                trades: 0,
                skips: BTreeMap::new(),
                latency_ms: self.config.runner.cycle_timeout_secs * 1_000,
                degraded: true,
                note: Some("cycle timeout".to_string()),
            }))
            .map_err(Into::into)
    }

    /// One settlement pass: resolve due trades, then rebuild the
    /// session view and settlement summary from the updated ledger.
    ///
    /// # Errors
    ///
    /// Returns an error for ledger or policy-file failures.
    pub async fn run_settle(&self, now: DateTime<Utc>) -> Result<SettleSummary> {
        let policy = PolicyParams::load(&self.config.paths.policy_file())?;
        let grace = i64::try_from(self.config.runner.settle_grace_secs).unwrap_or(i64::MAX);
        let summary = self
            .resolver
            .settle_due(&self.ledger, &policy, now, grace)
            .await?;

        if summary.examined > 0 {
            let trades = self.ledger.trades(&TradeFilter::default())?;
            let session = SessionState::rebuild(
                &trades,
                policy.paper.starting_bankroll_cents,
                now.date_naive(),
            );
            session.save(&self.config.paths.session_file())?;
            let cache = SettlementCache::rebuild(&trades);
            cache.save(&self.config.paths.settlements_file())?;
            info!(
                examined = summary.examined,
                wins = summary.wins,
                losses = summary.losses,
                fetch_failures = summary.fetch_failures,
                "settlement pass complete"
            );
        }
        Ok(summary)
    }

    /// One auto-tune pass over the settled history.
    ///
    /// # Errors
    ///
    /// Returns an error for ledger, policy, or report-file failures.
    pub fn run_tune(&self, now: DateTime<Utc>) -> Result<autotrader_autotune::TuneReport> {
        let mut policy = PolicyParams::load(&self.config.paths.policy_file())?;
        let trades = self.ledger.trades(&TradeFilter::default())?;
        let report = autotrader_autotune::TuneEngine::run(
            &trades,
            &mut policy,
            &self.config.paths.policy_file(),
            &self.config.paths.tune_report_file(),
            &self.config.paths.tune_history_file(),
            now,
        )?;
        if report.applied {
            self.ledger.append(&Record::Alert(AlertRecord {
                timestamp: now,
                kind: "tune_change".to_string(),
                message: format!(
                    "{} parameter change(s) applied from {} settled trades",
                    report.recommendations.len(),
                    report.total_settled
                ),
            }))?;
        }
        Ok(report)
    }

    /// Lists open markets for every configured family prefix. Returns
    /// the markets plus whether any scan failed.
    async fn scan_markets(&self, now: DateTime<Utc>) -> (Vec<Market>, bool) {
        let mut prefixes: Vec<String> = self
            .config
            .crypto_assets
            .iter()
            .map(|a| a.ticker_prefix().to_string())
            .collect();
        for city in &self.config.weather_cities {
            prefixes.push(format!("KXHIGH{city}"));
            prefixes.push(format!("KXLOW{city}"));
        }

        let mut markets = Vec::new();
        let mut failed = false;
        for prefix in prefixes {
            match self.venue.search(&prefix).await {
                Ok(found) => markets.extend(found),
                Err(KalshiError::RateLimit { retry_after_secs }) => {
                    warn!(retry_after_secs, "venue rate limit, abandoning scan");
                    let _ = self.ledger.append(&Record::Alert(AlertRecord {
                        timestamp: now,
                        kind: "rate_limit".to_string(),
                        message: format!("market scan cooled off for {retry_after_secs}s"),
                    }));
                    markets.retain(|m| m.status == MarketStatus::Open);
                    return (markets, true);
                }
                Err(e) => {
                    warn!(prefix = %prefix, error = %e, "market scan failed");
                    failed = true;
                }
            }
        }
        markets.retain(|m| m.status == MarketStatus::Open);
        (markets, failed)
    }

    async fn crypto_snapshots(
        &mut self,
        policy: &PolicyParams,
        now: DateTime<Utc>,
        degraded: &mut bool,
    ) -> HashMap<Asset, SignalSnapshot> {
        let mut snapshots = HashMap::new();
        for asset in self.config.crypto_assets.clone() {
            match self.signals.crypto_snapshot(asset, policy).await {
                Ok(snapshot) => {
                    snapshots.insert(asset, snapshot);
                }
                Err(e) => {
                    warn!(asset = %asset.symbol(), error = %e, "asset disabled for cycle");
                    let _ = self.ledger.append(&Record::Alert(AlertRecord {
                        timestamp: now,
                        kind: "provider_unhealthy".to_string(),
                        message: format!("{} signals unavailable: {e}", asset.symbol()),
                    }));
                    *degraded = true;
                }
            }
        }
        snapshots
    }

    /// Forecast snapshots keyed by market ticker. One forecast fetch
    /// per distinct (city, date, kind); a failed forecast drops its
    /// markets silently apart from the degraded flag.
    async fn weather_snapshots(
        &self,
        markets: &[Market],
        degraded: &mut bool,
    ) -> HashMap<String, WeatherSnapshot> {
        let mut by_ticker = HashMap::new();
        let mut fetched: HashMap<(String, NaiveDate, WeatherKind), Option<WeatherSnapshot>> =
            HashMap::new();
        for market in markets {
            let Some(ParsedTicker::Weather {
                city, kind, date, ..
            }) = ticker::parse(&market.ticker)
            else {
                continue;
            };
            let key = (city.clone(), date, kind);
            if !fetched.contains_key(&key) {
                let snapshot = match self.signals.weather_snapshot(&city, date, kind).await {
                    Ok(s) => Some(s),
                    Err(e) => {
                        warn!(city = %city, %date, error = %e, "forecast unavailable");
                        *degraded = true;
                        None
                    }
                };
                fetched.insert(key.clone(), snapshot);
            }
            if let Some(Some(snapshot)) = fetched.get(&key) {
                by_ticker.insert(market.ticker.clone(), snapshot.clone());
            }
        }
        by_ticker
    }

    /// The execution gate. Paper mode fills at the observed ask; live
    /// mode places a limit order at it. A rejection comes back as the
    /// reason string for the skip record.
    async fn execute(&self, sized: &SizedTrade, now: DateTime<Utc>) -> Result<TradeRecord, String> {
        let opp = &sized.opportunity;
        if !self.config.execution_mode.is_live() {
            return Ok(TradeRecord::open(sized, self.config.execution_mode, now));
        }

        let contracts = u32::try_from(sized.contracts)
            .map_err(|_| format!("contract count out of range: {}", sized.contracts))?;
        match self
            .venue
            .place_order(&opp.ticker, opp.side, contracts, opp.ask_cents)
            .await
        {
            Ok(fill) => {
                info!(order_id = %fill.order_id, status = %fill.status, "order placed");
                Ok(TradeRecord::open(sized, self.config.execution_mode, now))
            }
            Err(e) => Err(e.to_string()),
        }
    }
}

/// Live mode trusts the venue's cash figure when it is below the
/// ledger-derived view. Returns whether the view moved.
fn reconcile_balance(account: &mut AccountView, venue_balance_cents: i64) -> bool {
    if venue_balance_cents < account.balance_cents {
        account.balance_cents = venue_balance_cents;
        return true;
    }
    false
}

/// Folds a fill into the working account view so caps observed by the
/// next candidate include it.
fn apply_fill(account: &mut AccountView, record: &TradeRecord) {
    account.open_positions += 1;
    account.trades_this_hour += 1;
    account.total_open_cents += record.cost_cents;
    account.balance_cents -= record.cost_cents;
    *account
        .family_open_cents
        .entry(record.asset.to_string())
        .or_default() += record.cost_cents;
    if record.asset.is_crypto() {
        account.crypto_open_cents += record.cost_cents;
    } else {
        account.weather_open_cents += record.cost_cents;
    }
}
