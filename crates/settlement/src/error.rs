//! Settlement error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("unparseable ticker: {0}")]
    Ticker(String),

    #[error(transparent)]
    Provider(#[from] autotrader_data::ProviderError),

    #[error(transparent)]
    Venue(#[from] autotrader_kalshi::KalshiError),

    #[error(transparent)]
    Ledger(#[from] autotrader_ledger::LedgerError),
}

pub type Result<T> = std::result::Result<T, SettlementError>;
