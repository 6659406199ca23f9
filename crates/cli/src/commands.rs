//! Subcommands that read local state without touching the venue.

use std::fs;

use anyhow::{Context, Result};
use autotrader_core::config::AppConfig;
use autotrader_core::PolicyParams;
use autotrader_ledger::{Ledger, SessionState, TradeFilter};
use chrono::Utc;

/// Prints the session state, rebuilt from the ledger so it is accurate
/// even when no runner has saved a snapshot recently.
pub fn status(config: &AppConfig) -> Result<()> {
    let policy = PolicyParams::load(&config.paths.policy_file())?;
    let ledger = Ledger::new(config.paths.trades_file());
    let trades = ledger.trades(&TradeFilter::default())?;
    let now = Utc::now();
    let state = SessionState::rebuild(
        &trades,
        policy.paper.starting_bankroll_cents,
        now.date_naive(),
    );

    println!("mode:          {:?}", config.execution_mode);
    println!(
        "balance:       ${:.2} (started ${:.2})",
        state.balance_cents as f64 / 100.0,
        state.starting_bankroll_cents as f64 / 100.0
    );
    println!(
        "realized pnl:  {}{:.2} ({:+.1}% roi)",
        if state.realized_pnl_cents < 0 { "-$" } else { "$" },
        state.realized_pnl_cents.abs() as f64 / 100.0,
        state.roi() * 100.0
    );
    println!(
        "record:        {} won / {} lost / {} pending",
        state.wins, state.losses, state.pending
    );
    println!("streak:        {:+}", state.streak);
    println!(
        "peak balance:  ${:.2}, max drawdown {:.1}%",
        state.peak_balance_cents as f64 / 100.0,
        state.max_drawdown_pct * 100.0
    );
    if let Some(sharpe) = state.sharpe {
        println!("sharpe:        {sharpe:.2}");
    }
    if !state.families.is_empty() {
        println!("families:");
        for (family, stats) in &state.families {
            println!(
                "  {family}: {} trades, {}W/{}L, pnl ${:.2}, open ${:.2}",
                stats.trades,
                stats.wins,
                stats.losses,
                stats.pnl_cents as f64 / 100.0,
                stats.open_cents as f64 / 100.0
            );
        }
    }
    Ok(())
}

/// Archives the current ledger (if any) and writes a fresh session
/// snapshot at the configured starting bankroll.
pub fn reset_paper(config: &AppConfig) -> Result<()> {
    let policy = PolicyParams::load(&config.paths.policy_file())?;
    let trades_path = config.paths.trades_file();

    if trades_path.exists() {
        let stamp = Utc::now().format("%Y%m%d-%H%M%S");
        let archive = trades_path.with_file_name(format!("trades-{stamp}.jsonl"));
        fs::rename(&trades_path, &archive)
            .with_context(|| format!("archiving ledger to {}", archive.display()))?;
        println!("archived ledger to {}", archive.display());
    }

    let fresh = SessionState::fresh(policy.paper.starting_bankroll_cents);
    fresh.save(&config.paths.session_file())?;
    println!(
        "paper session reset, bankroll ${:.2}",
        fresh.starting_bankroll_cents as f64 / 100.0
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn reset_paper_archives_the_ledger() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::default().with_data_dir(dir.path());
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(config.paths.trades_file(), "{\"type\":\"alert\"}\n").unwrap();

        reset_paper(&config).unwrap();

        assert!(!config.paths.trades_file().exists());
        let archived = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                name.starts_with("trades-") && name.ends_with(".jsonl")
            })
            .count();
        assert_eq!(archived, 1);
        assert!(config.paths.session_file().exists());
    }

    #[test]
    fn status_tolerates_an_empty_data_dir() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::default().with_data_dir(dir.path());
        status(&config).unwrap();
    }
}
