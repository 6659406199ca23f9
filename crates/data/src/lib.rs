//! Market-data providers for the autotrader.
//!
//! This crate supplies every external datum the trading loop consumes:
//! - spot prices (three sources, median)
//! - hourly OHLC candles (disk-cached, stale-tolerant)
//! - historical settlement reference prices (two sources)
//! - observed and forecast daily temperatures
//!
//! A missing datum is never fatal: callers drop the affected market or
//! asset family for the cycle and move on.

pub mod error;
pub mod history;
pub mod http;
pub mod ohlc;
pub mod spot;
pub mod weather;

pub use error::{ProviderError, Result};
pub use history::{HistoryProvider, HistorySources};
pub use http::HttpGetter;
pub use ohlc::{OhlcProvider, OhlcSources};
pub use spot::{SpotProvider, SpotSources};
pub use weather::{city_by_code, CityInfo, WeatherProvider, WeatherSources, CITIES};
