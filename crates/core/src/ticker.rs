//! Venue ticker grammar.
//!
//! Two families of contract identifiers are understood:
//!
//! - Crypto hourlies: `KX{BTC|ETH}D-{YY}{MON}{DD}{HH}-T{STRIKE}`, e.g.
//!   `KXBTCD-26JAN2810-T89000.00`. The embedded hour is an eastern-time
//!   hour; the venue's convention adds a fixed +5 hours to reach UTC.
//!   That is exact in winter and one hour off under daylight saving;
//!   the offset is kept fixed anyway so historical reference lookups
//!   stay bit-compatible with every record already on disk.
//! - Daily weather: `KX{HIGH|LOW}{CITY}-{YY}{MON}{DD}-B{THRESHOLD}`,
//!   e.g. `KXHIGHCHI-26JAN29-B16.5`.

use crate::types::{Asset, AssetFamily, WeatherKind};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

/// Fixed eastern-to-UTC hour offset encoded in crypto tickers.
const EASTERN_UTC_OFFSET_HOURS: i64 = 5;

/// A ticker decomposed into its settlement-relevant parts.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedTicker {
    Crypto {
        asset: Asset,
        /// Settlement instant, UTC.
        expiry: DateTime<Utc>,
        /// Strike in USD.
        strike: f64,
    },
    Weather {
        city: String,
        kind: WeatherKind,
        /// Calendar date the temperature is measured over.
        date: NaiveDate,
        /// Threshold in °F.
        threshold: f64,
    },
}

impl ParsedTicker {
    /// The asset family this ticker belongs to.
    #[must_use]
    pub fn family(&self) -> AssetFamily {
        match self {
            Self::Crypto {
                asset: Asset::Btc, ..
            } => AssetFamily::CryptoBtc,
            Self::Crypto {
                asset: Asset::Eth, ..
            } => AssetFamily::CryptoEth,
            Self::Weather {
                city,
                kind: WeatherKind::High,
                ..
            } => AssetFamily::WeatherHigh { city: city.clone() },
            Self::Weather {
                city,
                kind: WeatherKind::Low,
                ..
            } => AssetFamily::WeatherLow { city: city.clone() },
        }
    }

    /// Settlement instant. Weather markets settle on the official daily
    /// observation, pinned here to end of the calendar day.
    #[must_use]
    pub fn expiry(&self) -> DateTime<Utc> {
        match self {
            Self::Crypto { expiry, .. } => *expiry,
            Self::Weather { date, .. } => Utc
                .from_utc_datetime(&date.and_hms_opt(23, 59, 0).unwrap_or_else(|| {
                    date.and_hms_opt(0, 0, 0).expect("midnight always valid")
                })),
        }
    }

    /// Strike (USD) or threshold (°F).
    #[must_use]
    pub fn strike(&self) -> f64 {
        match self {
            Self::Crypto { strike, .. } => *strike,
            Self::Weather { threshold, .. } => *threshold,
        }
    }
}

/// Parses a venue ticker. Returns `None` for identifiers outside the two
/// supported grammars.
#[must_use]
pub fn parse(ticker: &str) -> Option<ParsedTicker> {
    parse_crypto(ticker).or_else(|| parse_weather(ticker))
}

fn month_number(mon: &str) -> Option<u32> {
    Some(match mon {
        "JAN" => 1,
        "FEB" => 2,
        "MAR" => 3,
        "APR" => 4,
        "MAY" => 5,
        "JUN" => 6,
        "JUL" => 7,
        "AUG" => 8,
        "SEP" => 9,
        "OCT" => 10,
        "NOV" => 11,
        "DEC" => 12,
        _ => return None,
    })
}

fn parse_crypto(ticker: &str) -> Option<ParsedTicker> {
    let mut parts = ticker.split('-');
    let head = parts.next()?;
    let datetime = parts.next()?;
    let strike_part = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    let asset = match head {
        "KXBTCD" | "KXBTC" => Asset::Btc,
        "KXETHD" | "KXETH" => Asset::Eth,
        _ => return None,
    };

    // {YY}{MON}{DD}{HH}, all fixed-width.
    if datetime.len() != 9 || !datetime.is_ascii() {
        return None;
    }
    let year: i32 = datetime[0..2].parse().ok()?;
    let month = month_number(&datetime[2..5])?;
    let day: u32 = datetime[5..7].parse().ok()?;
    let hour_eastern: i64 = datetime[7..9].parse().ok()?;
    if hour_eastern > 23 {
        return None;
    }

    let strike: f64 = strike_part.strip_prefix('T')?.parse().ok()?;

    let date = NaiveDate::from_ymd_opt(2000 + year, month, day)?;
    let midnight = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?);
    let expiry = midnight + Duration::hours(hour_eastern + EASTERN_UTC_OFFSET_HOURS);

    Some(ParsedTicker::Crypto {
        asset,
        expiry,
        strike,
    })
}

fn parse_weather(ticker: &str) -> Option<ParsedTicker> {
    let (kind, rest) = if let Some(rest) = ticker.strip_prefix("KXHIGH") {
        (WeatherKind::High, rest)
    } else if let Some(rest) = ticker.strip_prefix("KXLOW") {
        (WeatherKind::Low, rest)
    } else {
        return None;
    };

    let mut parts = rest.split('-');
    let city = parts.next()?;
    let datepart = parts.next()?;
    let threshold_part = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    if city.is_empty() || !city.chars().all(|c| c.is_ascii_uppercase()) {
        return None;
    }
    if datepart.len() != 7 || !datepart.is_ascii() {
        return None;
    }
    let year: i32 = datepart[0..2].parse().ok()?;
    let month = month_number(&datepart[2..5])?;
    let day: u32 = datepart[5..7].parse().ok()?;
    let threshold: f64 = threshold_part.strip_prefix('B')?.parse().ok()?;

    let date = NaiveDate::from_ymd_opt(2000 + year, month, day)?;

    Some(ParsedTicker::Weather {
        city: city.to_string(),
        kind,
        date,
        threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crypto_ticker_full_round() {
        let parsed = parse("KXBTCD-26JAN2810-T89000.00").unwrap();
        match &parsed {
            ParsedTicker::Crypto {
                asset,
                expiry,
                strike,
            } => {
                assert_eq!(*asset, Asset::Btc);
                // 10:00 eastern + 5h = 15:00 UTC.
                assert_eq!(
                    *expiry,
                    Utc.with_ymd_and_hms(2026, 1, 28, 15, 0, 0).unwrap()
                );
                assert_eq!(*strike, 89_000.0);
            }
            other => panic!("expected crypto, got {other:?}"),
        }
        assert_eq!(parsed.family(), AssetFamily::CryptoBtc);
    }

    #[test]
    fn crypto_late_hour_rolls_into_next_day_utc() {
        // 22:00 eastern + 5h = 03:00 UTC the next day.
        let parsed = parse("KXETHD-26JAN2822-T3200.50").unwrap();
        assert_eq!(
            parsed.expiry(),
            Utc.with_ymd_and_hms(2026, 1, 29, 3, 0, 0).unwrap()
        );
        assert_eq!(parsed.family(), AssetFamily::CryptoEth);
        assert_eq!(parsed.strike(), 3_200.5);
    }

    #[test]
    fn weather_high_and_low() {
        let high = parse("KXHIGHCHI-26JAN29-B16.5").unwrap();
        match &high {
            ParsedTicker::Weather {
                city,
                kind,
                date,
                threshold,
            } => {
                assert_eq!(city, "CHI");
                assert_eq!(*kind, WeatherKind::High);
                assert_eq!(*date, NaiveDate::from_ymd_opt(2026, 1, 29).unwrap());
                assert_eq!(*threshold, 16.5);
            }
            other => panic!("expected weather, got {other:?}"),
        }
        assert_eq!(
            high.family(),
            AssetFamily::WeatherHigh {
                city: "CHI".to_string()
            }
        );

        let low = parse("KXLOWDEN-26JAN30-B25").unwrap();
        assert_eq!(
            low.family(),
            AssetFamily::WeatherLow {
                city: "DEN".to_string()
            }
        );
        assert_eq!(low.strike(), 25.0);
        assert_eq!(
            low.expiry(),
            Utc.with_ymd_and_hms(2026, 1, 30, 23, 59, 0).unwrap()
        );
    }

    #[test]
    fn rejects_foreign_and_malformed_tickers() {
        assert!(parse("INXD-26JAN28-T5000").is_none());
        assert!(parse("KXBTCD-26XXX2810-T89000").is_none());
        assert!(parse("KXBTCD-26JAN28-T89000").is_none()); // missing hour
        assert!(parse("KXBTCD-26JAN2825-T89000").is_none()); // hour out of range
        assert!(parse("KXHIGHCHI-26JAN29-16.5").is_none()); // missing B
        assert!(parse("KXHIGHchi-26JAN29-B16.5").is_none()); // lowercase city
        assert!(parse("").is_none());
    }
}
