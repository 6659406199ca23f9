//! Static application configuration.
//!
//! Unlike [`crate::policy::PolicyParams`], nothing here is mutated at
//! runtime: these are deployment choices (URLs, paths, cadences) loaded
//! once at startup. Credentials never live here; they come from the
//! environment only.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::types::{Asset, ExecutionMode};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub venue: VenueConfig,
    pub provider: ProviderConfig,
    pub paths: PathsConfig,
    pub runner: RunnerConfig,
    /// Crypto assets to scan.
    pub crypto_assets: Vec<Asset>,
    /// Weather city codes to scan (venue ticker tokens, e.g. "CHI").
    pub weather_cities: Vec<String>,
    pub execution_mode: ExecutionMode,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            venue: VenueConfig::default(),
            provider: ProviderConfig::default(),
            paths: PathsConfig::default(),
            runner: RunnerConfig::default(),
            crypto_assets: vec![Asset::Btc, Asset::Eth],
            weather_cities: vec![
                "CHI".to_string(),
                "NY".to_string(),
                "DEN".to_string(),
                "MIA".to_string(),
            ],
            execution_mode: ExecutionMode::Paper,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VenueConfig {
    pub base_url: String,
    pub requests_per_minute: u32,
    pub timeout_secs: u64,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.elections.kalshi.com/trade-api/v2".to_string(),
            requests_per_minute: 60,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub requests_per_minute: u32,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
    /// Bounded fan-out for parallel provider requests.
    pub max_in_flight: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 30,
            timeout_secs: 10,
            retry_attempts: 3,
            max_in_flight: 8,
        }
    }
}

/// Where the persisted artifacts live. Everything is relative to one
/// data directory so a session can be archived by copying a folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl PathsConfig {
    #[must_use]
    pub fn trades_file(&self) -> PathBuf {
        self.data_dir.join("trades.jsonl")
    }

    #[must_use]
    pub fn session_file(&self) -> PathBuf {
        self.data_dir.join("session-state.json")
    }

    #[must_use]
    pub fn settlements_file(&self) -> PathBuf {
        self.data_dir.join("settlements.json")
    }

    #[must_use]
    pub fn policy_file(&self) -> PathBuf {
        self.data_dir.join("policy.json")
    }

    #[must_use]
    pub fn tune_report_file(&self) -> PathBuf {
        self.data_dir.join("tune-report.json")
    }

    #[must_use]
    pub fn tune_history_file(&self) -> PathBuf {
        self.data_dir.join("tune-history.jsonl")
    }

    #[must_use]
    pub fn ohlc_cache_dir(&self) -> PathBuf {
        self.data_dir.join("ohlc-cache")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub cycle_interval_secs: u64,
    pub settle_interval_secs: u64,
    pub tune_interval_secs: u64,
    /// Hard bound on one cycle's wall-clock time.
    pub cycle_timeout_secs: u64,
    /// Grace after expiry before a trade is eligible for settlement.
    pub settle_grace_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: 300,
            settle_interval_secs: 300,
            tune_interval_secs: 1_800,
            cycle_timeout_secs: 120,
            settle_grace_secs: 120,
        }
    }
}

impl AppConfig {
    /// Convenience for tests and tools that want everything under one
    /// temporary directory.
    #[must_use]
    pub fn with_data_dir(mut self, dir: &Path) -> Self {
        self.paths.data_dir = dir.to_path_buf();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths_hang_off_data_dir() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.paths.trades_file(), PathBuf::from("data/trades.jsonl"));
        assert_eq!(
            cfg.paths.tune_history_file(),
            PathBuf::from("data/tune-history.jsonl")
        );
        assert_eq!(
            cfg.paths.ohlc_cache_dir(),
            PathBuf::from("data/ohlc-cache")
        );
    }

    #[test]
    fn default_mode_is_paper() {
        assert_eq!(AppConfig::default().execution_mode, ExecutionMode::Paper);
    }
}
