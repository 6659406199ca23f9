use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use autotrader_core::types::ExecutionMode;
use autotrader_core::ConfigLoader;
use autotrader_kalshi::KalshiError;
use autotrader_ledger::LedgerError;
use autotrader_runner::Runner;
use clap::{Parser, Subcommand};
use tracing::error;

mod commands;

#[derive(Parser)]
#[command(name = "autotrader")]
#[command(about = "Kalshi binary-options autotrader", long_about = None)]
struct Cli {
    /// Place real orders on the venue
    #[arg(long, global = true, conflicts_with = "paper")]
    live: bool,

    /// Simulate fills locally (the default)
    #[arg(long, global = true)]
    paper: bool,

    /// Config file path
    #[arg(long, global = true, default_value = "config/Config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one trading cycle and exit
    RunCycle,
    /// Run the continuous trading loop
    RunLoop {
        /// Seconds between cycles, overriding the config file
        #[arg(long)]
        interval: Option<u64>,
        /// Stop after this many cycles
        #[arg(long)]
        max_cycles: Option<u64>,
    },
    /// Run one settlement pass over due trades
    Settle,
    /// Run one auto-tune pass over the settled history
    Tune,
    /// Print the session state
    Status,
    /// Archive the ledger and reinitialize the paper bankroll
    ResetPaper,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(exit_code_for(&e))
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = ConfigLoader::load_from(&cli.config)?;
    if cli.live {
        config.execution_mode = ExecutionMode::Live;
    } else if cli.paper {
        config.execution_mode = ExecutionMode::Paper;
    }

    match cli.command {
        Commands::RunCycle => {
            let mut runner = Runner::new(config)?;
            let summary = runner.run_cycle_once().await?;
            println!(
                "cycle {}: {} markets, {} candidates, {} trades, {} skips{}",
                summary.cycle,
                summary.markets_scanned,
                summary.candidates,
                summary.trades,
                summary.skips,
                if summary.degraded { " (degraded)" } else { "" }
            );
            Ok(())
        }
        Commands::RunLoop {
            interval,
            max_cycles,
        } => {
            if let Some(secs) = interval {
                config.runner.cycle_interval_secs = secs;
            }
            let mut runner = Runner::new(config)?;
            runner.run_loop(max_cycles).await
        }
        Commands::Settle => {
            let runner = Runner::new(config)?;
            let summary = runner.settle_once().await?;
            println!(
                "settled {} of {} due trades ({} won, {} lost, {} reference failures)",
                summary.settled(),
                summary.examined,
                summary.wins,
                summary.losses,
                summary.fetch_failures
            );
            Ok(())
        }
        Commands::Tune => {
            let runner = Runner::new(config)?;
            let report = runner.tune_once()?;
            println!(
                "{} settled trades, {} recommendation(s){}",
                report.total_settled,
                report.recommendations.len(),
                if report.applied { ", applied" } else { "" }
            );
            Ok(())
        }
        Commands::Status => commands::status(&config),
        Commands::ResetPaper => commands::reset_paper(&config),
    }
}

/// Maps a top-level failure to the process exit code: 2 for
/// configuration problems, 3 for a corrupt ledger, 1 otherwise.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(ledger) = cause.downcast_ref::<LedgerError>() {
            if matches!(ledger, LedgerError::Integrity { .. }) {
                return 3;
            }
        }
        if let Some(venue) = cause.downcast_ref::<KalshiError>() {
            if matches!(venue, KalshiError::Configuration(_)) {
                return 2;
            }
        }
        if cause.downcast_ref::<figment::Error>().is_some()
            || cause.downcast_ref::<serde_json::Error>().is_some()
        {
            return 2;
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    // ===== Exit codes =====

    #[test]
    fn integrity_failures_exit_three() {
        let err = anyhow::Error::from(LedgerError::integrity(7, "bad json"))
            .context("scanning ledger");
        assert_eq!(exit_code_for(&err), 3);
    }

    #[test]
    fn missing_credentials_exit_two() {
        let err = anyhow::Error::from(KalshiError::Configuration(
            "KALSHI_API_KEY_ID not set".to_string(),
        ));
        assert_eq!(exit_code_for(&err), 2);
    }

    #[test]
    fn anything_else_exits_one() {
        let err = anyhow::anyhow!("provider timed out");
        assert_eq!(exit_code_for(&err), 1);
    }
}
