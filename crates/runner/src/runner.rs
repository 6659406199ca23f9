//! The long-lived scheduler hosting the cycle, settlement, and tune
//! cadences.

use anyhow::Result;
use autotrader_core::config::AppConfig;
use autotrader_settlement::SettleSummary;
use chrono::Utc;
use tokio::time::{interval, timeout, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::cycle::{CycleEngine, CycleSummary};

pub struct Runner {
    engine: CycleEngine,
    config: AppConfig,
}

impl Runner {
    /// # Errors
    ///
    /// Returns an error when the engine cannot be constructed, which is
    /// a configuration problem (missing credentials, bad URLs).
    pub fn new(config: AppConfig) -> Result<Self> {
        let engine = CycleEngine::new(config.clone())?;
        Ok(Self { engine, config })
    }

    /// Runs one trading cycle under the configured wall-clock bound.
    ///
    /// # Errors
    ///
    /// Returns an error for ledger or policy-file failures.
    pub async fn run_cycle_once(&mut self) -> Result<CycleSummary> {
        let bound = Duration::from_secs(self.config.runner.cycle_timeout_secs);
        let now = Utc::now();
        match timeout(bound, self.engine.run_cycle(now)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    timeout_secs = self.config.runner.cycle_timeout_secs,
                    "cycle exceeded its wall-clock bound"
                );
                self.engine.record_timeout(now)?;
                Ok(CycleSummary {
                    degraded: true,
                    ..CycleSummary::default()
                })
            }
        }
    }

    /// Runs one settlement pass.
    ///
    /// # Errors
    ///
    /// Returns an error for ledger or policy-file failures.
    pub async fn settle_once(&self) -> Result<SettleSummary> {
        self.engine.run_settle(Utc::now()).await
    }

    /// Runs one auto-tune pass.
    ///
    /// # Errors
    ///
    /// Returns an error for ledger, policy, or report-file failures.
    pub fn tune_once(&self) -> Result<autotrader_autotune::TuneReport> {
        self.engine.run_tune(Utc::now())
    }

    /// The continuous loop. Each cadence fires on its own tick;
    /// settlement and tuning failures are logged and retried on the
    /// next tick rather than stopping trading. A termination signal
    /// lets the in-flight arm finish, then returns cleanly.
    ///
    /// # Errors
    ///
    /// Returns an error when a cycle fails on local persistence, which
    /// is not survivable.
    pub async fn run_loop(&mut self, max_cycles: Option<u64>) -> Result<()> {
        let mut cycle_tick = interval(Duration::from_secs(self.config.runner.cycle_interval_secs));
        let mut settle_tick =
            interval(Duration::from_secs(self.config.runner.settle_interval_secs));
        let mut tune_tick = interval(Duration::from_secs(self.config.runner.tune_interval_secs));
        cycle_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        settle_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tune_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tune tick fires immediately; skip it so tuning only
        // ever sees a ledger this process has already settled against.
        tune_tick.tick().await;

        let mut cycles_run = 0u64;
        info!(
            mode = ?self.config.execution_mode,
            cycle_secs = self.config.runner.cycle_interval_secs,
            "runner started"
        );
        loop {
            // Pick the cadence first, then run its work to completion,
            // so a termination signal never interrupts an in-flight arm.
            let due = tokio::select! {
                _ = cycle_tick.tick() => Due::Cycle,
                _ = settle_tick.tick() => Due::Settle,
                _ = tune_tick.tick() => Due::Tune,
                _ = tokio::signal::ctrl_c() => Due::Shutdown,
            };
            match due {
                Due::Cycle => {
                    let summary = self.run_cycle_once().await?;
                    info!(
                        cycle = summary.cycle,
                        markets = summary.markets_scanned,
                        candidates = summary.candidates,
                        trades = summary.trades,
                        skips = summary.skips,
                        degraded = summary.degraded,
                        "cycle complete"
                    );
                    cycles_run += 1;
                    if max_cycles.is_some_and(|max| cycles_run >= max) {
                        info!(cycles_run, "cycle budget reached");
                        return Ok(());
                    }
                }
                Due::Settle => {
                    if let Err(e) = self.engine.run_settle(Utc::now()).await {
                        error!(error = %e, "settlement pass failed");
                    }
                }
                Due::Tune => {
                    if let Err(e) = self.engine.run_tune(Utc::now()) {
                        error!(error = %e, "tune pass failed");
                    }
                }
                Due::Shutdown => {
                    info!("termination signal, shutting down");
                    return Ok(());
                }
            }
        }
    }
}

enum Due {
    Cycle,
    Settle,
    Tune,
    Shutdown,
}
