//! Shared domain types for the autotrader.
//!
//! Everything here is plain data: venue markets, asset families, sides,
//! candles, and the small enums that end up embedded in persisted trade
//! records. Persisted representations are part of the ledger file format,
//! so the serde forms below (lowercase strings, `-1/0/1` momentum) must
//! stay stable.

use chrono::{DateTime, Utc};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Contract side on a binary market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Yes,
    No,
}

impl Side {
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Yes => Self::No,
            Self::No => Self::Yes,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Crypto assets with hourly binary markets on the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Asset {
    Btc,
    Eth,
}

impl Asset {
    /// Trading-pair symbol used by spot price providers.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Btc => "BTC",
            Self::Eth => "ETH",
        }
    }

    /// CoinGecko coin id.
    #[must_use]
    pub fn coingecko_id(self) -> &'static str {
        match self {
            Self::Btc => "bitcoin",
            Self::Eth => "ethereum",
        }
    }

    /// Venue ticker prefix for this asset's hourly markets.
    #[must_use]
    pub fn ticker_prefix(self) -> &'static str {
        match self {
            Self::Btc => "KXBTCD",
            Self::Eth => "KXETHD",
        }
    }

    /// Assumed hourly volatility when no realized estimate is available.
    #[must_use]
    pub fn default_hourly_vol(self) -> f64 {
        match self {
            Self::Btc => 0.005,
            Self::Eth => 0.007,
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// High or low daily temperature market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeatherKind {
    High,
    Low,
}

/// The family a market belongs to, which determines pricing model,
/// settlement source, and exposure grouping.
///
/// Serialized as a single string (`crypto-btc`, `weather-high-CHI`)
/// because trade records carry it as one field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AssetFamily {
    CryptoBtc,
    CryptoEth,
    WeatherHigh { city: String },
    WeatherLow { city: String },
}

impl AssetFamily {
    #[must_use]
    pub fn is_crypto(&self) -> bool {
        matches!(self, Self::CryptoBtc | Self::CryptoEth)
    }

    /// The crypto asset behind this family, if any.
    #[must_use]
    pub fn crypto_asset(&self) -> Option<Asset> {
        match self {
            Self::CryptoBtc => Some(Asset::Btc),
            Self::CryptoEth => Some(Asset::Eth),
            _ => None,
        }
    }

    /// Exposure group used by the sizing caps: all crypto families share
    /// one group, all weather families another.
    #[must_use]
    pub fn group(&self) -> &'static str {
        if self.is_crypto() {
            "crypto"
        } else {
            "weather"
        }
    }
}

impl fmt::Display for AssetFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CryptoBtc => f.write_str("crypto-btc"),
            Self::CryptoEth => f.write_str("crypto-eth"),
            Self::WeatherHigh { city } => write!(f, "weather-high-{city}"),
            Self::WeatherLow { city } => write!(f, "weather-low-{city}"),
        }
    }
}

impl FromStr for AssetFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "crypto-btc" => Ok(Self::CryptoBtc),
            "crypto-eth" => Ok(Self::CryptoEth),
            other => {
                if let Some(city) = other.strip_prefix("weather-high-") {
                    Ok(Self::WeatherHigh {
                        city: city.to_string(),
                    })
                } else if let Some(city) = other.strip_prefix("weather-low-") {
                    Ok(Self::WeatherLow {
                        city: city.to_string(),
                    })
                } else {
                    Err(format!("unknown asset family: {other}"))
                }
            }
        }
    }
}

impl Serialize for AssetFamily {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AssetFamily {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Venue market status as observed by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketStatus {
    Open,
    Closed,
    Settled,
}

/// A binary market observed on the venue.
///
/// Never mutated locally; each cycle observes a fresh copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub ticker: String,
    pub family: AssetFamily,
    /// USD for crypto, degrees Fahrenheit for weather.
    pub strike: f64,
    pub expiry: DateTime<Utc>,
    /// Ask price for YES in cents, 1..=99.
    pub yes_ask_cents: i64,
    /// Ask price for NO in cents, 1..=99.
    pub no_ask_cents: i64,
    pub status: MarketStatus,
    /// Winning side once the venue has resolved the market.
    pub result: Option<Side>,
}

impl Market {
    /// Ask price in cents for the given side.
    #[must_use]
    pub fn ask_cents(&self, side: Side) -> i64 {
        match side {
            Side::Yes => self.yes_ask_cents,
            Side::No => self.no_ask_cents,
        }
    }

    /// Market-implied probability for the given side.
    #[must_use]
    pub fn implied_prob(&self, side: Side) -> f64 {
        self.ask_cents(side) as f64 / 100.0
    }

    /// True when the two asks are coherent within a spread tolerance.
    /// A book wider than `tolerance_cents` is malformed and skipped.
    #[must_use]
    pub fn book_is_coherent(&self, tolerance_cents: i64) -> bool {
        (1..=99).contains(&self.yes_ask_cents)
            && (1..=99).contains(&self.no_ask_cents)
            && self.yes_ask_cents + self.no_ask_cents <= 100 + tolerance_cents
    }

    /// Minutes remaining until expiry; negative once past.
    #[must_use]
    pub fn minutes_to_expiry(&self, now: DateTime<Utc>) -> i64 {
        (self.expiry - now).num_minutes()
    }
}

/// One hourly OHLCV candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Qualitative market state from the signal layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Regime {
    Trending,
    Ranging,
    Volatile,
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trending => f.write_str("trending"),
            Self::Ranging => f.write_str("ranging"),
            Self::Volatile => f.write_str("volatile"),
        }
    }
}

/// Momentum direction, persisted as -1/0/1 in trade records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MomentumDirection {
    Bearish,
    Neutral,
    Bullish,
}

impl MomentumDirection {
    #[must_use]
    pub fn as_i8(self) -> i8 {
        match self {
            Self::Bearish => -1,
            Self::Neutral => 0,
            Self::Bullish => 1,
        }
    }

    #[must_use]
    pub fn from_sign(value: f64) -> Self {
        if value > 0.0 {
            Self::Bullish
        } else if value < 0.0 {
            Self::Bearish
        } else {
            Self::Neutral
        }
    }

    /// The side this momentum direction supports on an "above strike"
    /// market.
    #[must_use]
    pub fn favored_side(self) -> Option<Side> {
        match self {
            Self::Bullish => Some(Side::Yes),
            Self::Bearish => Some(Side::No),
            Self::Neutral => None,
        }
    }
}

impl Serialize for MomentumDirection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i8(self.as_i8())
    }
}

impl<'de> Deserialize<'de> for MomentumDirection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match i8::deserialize(deserializer)? {
            -1 => Ok(Self::Bearish),
            0 => Ok(Self::Neutral),
            1 => Ok(Self::Bullish),
            other => Err(D::Error::custom(format!(
                "momentum direction out of range: {other}"
            ))),
        }
    }
}

/// Recent-results context attached to every sizing decision.
///
/// Persisted as a string (`fresh_start`, `after_3_wins`, `after_2_losses`).
/// Records written by older tooling may lack the field or carry a form we
/// no longer produce; those deserialize as [`StreakContext::Unknown`] and
/// are never imputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreakContext {
    FreshStart,
    AfterWins(u32),
    AfterLosses(u32),
    Unknown,
}

impl StreakContext {
    /// Derives the context from a signed streak counter (positive wins,
    /// negative losses, zero or ±1 is a fresh start).
    #[must_use]
    pub fn from_streak(streak: i32) -> Self {
        if streak >= 2 {
            Self::AfterWins(streak as u32)
        } else if streak <= -2 {
            Self::AfterLosses(streak.unsigned_abs())
        } else {
            Self::FreshStart
        }
    }
}

impl fmt::Display for StreakContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FreshStart => f.write_str("fresh_start"),
            Self::AfterWins(n) => write!(f, "after_{n}_wins"),
            Self::AfterLosses(n) => write!(f, "after_{n}_losses"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

impl FromStr for StreakContext {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "fresh_start" {
            return Ok(Self::FreshStart);
        }
        if let Some(rest) = s.strip_prefix("after_") {
            if let Some(n) = rest.strip_suffix("_wins").and_then(|n| n.parse().ok()) {
                return Ok(Self::AfterWins(n));
            }
            if let Some(n) = rest.strip_suffix("_losses").and_then(|n| n.parse().ok()) {
                return Ok(Self::AfterLosses(n));
            }
        }
        Ok(Self::Unknown)
    }
}

impl Serialize for StreakContext {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StreakContext {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(s.parse().unwrap_or(Self::Unknown))
    }
}

/// Whether fills are simulated or routed to the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Paper,
    Live,
}

impl ExecutionMode {
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Live)
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Paper => f.write_str("paper"),
            Self::Live => f.write_str("live"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // ===== AssetFamily round-trips =====

    #[test]
    fn asset_family_string_forms() {
        assert_eq!(AssetFamily::CryptoBtc.to_string(), "crypto-btc");
        assert_eq!(
            AssetFamily::WeatherHigh {
                city: "CHI".to_string()
            }
            .to_string(),
            "weather-high-CHI"
        );
        let parsed: AssetFamily = "weather-low-DEN".parse().unwrap();
        assert_eq!(
            parsed,
            AssetFamily::WeatherLow {
                city: "DEN".to_string()
            }
        );
        assert!("stocks-aapl".parse::<AssetFamily>().is_err());
    }

    #[test]
    fn asset_family_groups() {
        assert_eq!(AssetFamily::CryptoEth.group(), "crypto");
        assert_eq!(
            AssetFamily::WeatherHigh {
                city: "NY".to_string()
            }
            .group(),
            "weather"
        );
    }

    // ===== Market helpers =====

    fn market(yes: i64, no: i64) -> Market {
        Market {
            ticker: "KXBTCD-26JAN2810-T89000.00".to_string(),
            family: AssetFamily::CryptoBtc,
            strike: 89_000.0,
            expiry: Utc.with_ymd_and_hms(2026, 1, 28, 15, 0, 0).unwrap(),
            yes_ask_cents: yes,
            no_ask_cents: no,
            status: MarketStatus::Open,
            result: None,
        }
    }

    #[test]
    fn implied_prob_from_ask() {
        let m = market(55, 48);
        assert!((m.implied_prob(Side::Yes) - 0.55).abs() < 1e-12);
        assert!((m.implied_prob(Side::No) - 0.48).abs() < 1e-12);
    }

    #[test]
    fn book_coherence_allows_spread_tolerance() {
        assert!(market(55, 48).book_is_coherent(5));
        assert!(!market(60, 48).book_is_coherent(5));
        assert!(!market(0, 48).book_is_coherent(5));
        assert!(!market(55, 100).book_is_coherent(5));
    }

    // ===== Streak context =====

    #[test]
    fn streak_context_from_counter() {
        assert_eq!(StreakContext::from_streak(0), StreakContext::FreshStart);
        assert_eq!(StreakContext::from_streak(1), StreakContext::FreshStart);
        assert_eq!(StreakContext::from_streak(-1), StreakContext::FreshStart);
        assert_eq!(StreakContext::from_streak(3), StreakContext::AfterWins(3));
        assert_eq!(
            StreakContext::from_streak(-4),
            StreakContext::AfterLosses(4)
        );
    }

    #[test]
    fn streak_context_string_round_trip() {
        for ctx in [
            StreakContext::FreshStart,
            StreakContext::AfterWins(5),
            StreakContext::AfterLosses(2),
        ] {
            let s = ctx.to_string();
            assert_eq!(s.parse::<StreakContext>().unwrap(), ctx);
        }
        // Forward compatibility: unrecognized forms degrade to Unknown.
        assert_eq!(
            "after_many_pushes".parse::<StreakContext>().unwrap(),
            StreakContext::Unknown
        );
    }

    #[test]
    fn momentum_direction_serde_as_int() {
        let json = serde_json::to_string(&MomentumDirection::Bearish).unwrap();
        assert_eq!(json, "-1");
        let back: MomentumDirection = serde_json::from_str("1").unwrap();
        assert_eq!(back, MomentumDirection::Bullish);
        assert!(serde_json::from_str::<MomentumDirection>("2").is_err());
    }
}
