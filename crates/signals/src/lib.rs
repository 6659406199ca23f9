//! Derived trading signals.
//!
//! Pure transforms over hourly candles (volatility, momentum, regime,
//! correlation), an optional news sentiment feed, and the
//! [`snapshot::SignalEngine`] that assembles them per asset each cycle.

pub mod correlation;
pub mod momentum;
pub mod news;
pub mod regime;
pub mod snapshot;
pub mod volatility;

pub use correlation::{crypto_correlation, CorrelationReading, HIGH_CORRELATION};
pub use momentum::{momentum, Momentum, TimeframeMomentum};
pub use news::{NewsClient, NewsSentiment, NEWS_TOKEN_ENV};
pub use regime::{dynamic_min_edge, RegimeReading, RegimeTracker};
pub use snapshot::{snapshot_correlation, SignalEngine, SignalSnapshot, WeatherSnapshot};
pub use volatility::{realized_hourly_vol, vol_class, vol_reading, VolClass, VolReading};
