//! Temperature observations and forecasts for weather markets.
//!
//! Observed daily highs/lows come from NWS station observations (the
//! venue settles on the official climate report from the same stations).
//! Forecasts come from Open-Meteo's daily endpoint; the uncertainty band
//! attached to a forecast is a configured default since the endpoint
//! returns point estimates only.

use crate::error::{ProviderError, Result};
use crate::http::HttpGetter;
use autotrader_core::types::WeatherKind;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::debug;

/// A city the venue lists weather markets for.
#[derive(Debug, Clone, Copy)]
pub struct CityInfo {
    pub code: &'static str,
    pub name: &'static str,
    /// NWS observation station id.
    pub station: &'static str,
    pub lat: f64,
    pub lon: f64,
}

/// City codes as they appear inside venue tickers.
pub const CITIES: &[CityInfo] = &[
    CityInfo {
        code: "CHI",
        name: "Chicago",
        station: "KMDW",
        lat: 41.786,
        lon: -87.752,
    },
    CityInfo {
        code: "NY",
        name: "New York",
        station: "KNYC",
        lat: 40.779,
        lon: -73.969,
    },
    CityInfo {
        code: "DEN",
        name: "Denver",
        station: "KDEN",
        lat: 39.847,
        lon: -104.656,
    },
    CityInfo {
        code: "MIA",
        name: "Miami",
        station: "KMIA",
        lat: 25.788,
        lon: -80.317,
    },
    CityInfo {
        code: "AUS",
        name: "Austin",
        station: "KAUS",
        lat: 30.183,
        lon: -97.680,
    },
    CityInfo {
        code: "PHIL",
        name: "Philadelphia",
        station: "KPHL",
        lat: 39.868,
        lon: -75.231,
    },
    CityInfo {
        code: "LAX",
        name: "Los Angeles",
        station: "KLAX",
        lat: 33.938,
        lon: -118.389,
    },
];

/// Looks up a city by venue ticker code.
#[must_use]
pub fn city_by_code(code: &str) -> Option<&'static CityInfo> {
    CITIES.iter().find(|c| c.code == code)
}

/// Source endpoints, overridable for tests.
#[derive(Debug, Clone)]
pub struct WeatherSources {
    pub nws_base: String,
    pub open_meteo_base: String,
}

impl Default for WeatherSources {
    fn default() -> Self {
        Self {
            nws_base: "https://api.weather.gov".to_string(),
            open_meteo_base: "https://api.open-meteo.com".to_string(),
        }
    }
}

/// Temperature observation and forecast provider.
#[derive(Debug, Clone)]
pub struct WeatherProvider {
    http: HttpGetter,
    sources: WeatherSources,
    /// Uncertainty attached to point forecasts, °F.
    pub default_uncertainty_f: f64,
}

#[derive(Debug, Deserialize)]
struct NwsObservations {
    features: Vec<NwsFeature>,
}

#[derive(Debug, Deserialize)]
struct NwsFeature {
    properties: NwsProperties,
}

#[derive(Debug, Deserialize)]
struct NwsProperties {
    timestamp: Option<String>,
    temperature: Option<NwsTemperature>,
}

#[derive(Debug, Deserialize)]
struct NwsTemperature {
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    daily: OpenMeteoDaily,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoDaily {
    time: Vec<String>,
    temperature_2m_max: Vec<f64>,
    temperature_2m_min: Vec<f64>,
}

fn c_to_f(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

impl WeatherProvider {
    #[must_use]
    pub fn new(http: HttpGetter, sources: WeatherSources, default_uncertainty_f: f64) -> Self {
        Self {
            http,
            sources,
            default_uncertainty_f,
        }
    }

    /// Observed daily high or low in °F for `city` on `date`.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown cities, provider failure, or when no
    /// observation for the date exists yet.
    pub async fn daily_temperature(
        &self,
        city: &str,
        date: NaiveDate,
        kind: WeatherKind,
    ) -> Result<f64> {
        let info = city_by_code(city)
            .ok_or_else(|| ProviderError::permanent(404, format!("unknown city code {city}")))?;

        let url = format!(
            "{}/stations/{}/observations",
            self.sources.nws_base, info.station
        );
        let observations: NwsObservations = self.http.get_json(&url).await?;

        let date_str = date.format("%Y-%m-%d").to_string();
        let temps: Vec<f64> = observations
            .features
            .iter()
            .filter(|f| {
                f.properties
                    .timestamp
                    .as_deref()
                    .is_some_and(|t| t.starts_with(&date_str))
            })
            .filter_map(|f| f.properties.temperature.as_ref().and_then(|t| t.value))
            .map(c_to_f)
            .collect();

        if temps.is_empty() {
            return Err(ProviderError::Exhausted(format!(
                "no observations for {} on {date_str}",
                info.station
            )));
        }
        debug!(city, %date, count = temps.len(), "NWS observations collected");

        let value = match kind {
            WeatherKind::High => temps.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            WeatherKind::Low => temps.iter().copied().fold(f64::INFINITY, f64::min),
        };
        Ok(value)
    }

    /// Forecast high/low in °F with an uncertainty band for `city` on
    /// `date`.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown cities, provider failure, or a date
    /// outside the forecast horizon.
    pub async fn forecast_temperature(
        &self,
        city: &str,
        date: NaiveDate,
        kind: WeatherKind,
    ) -> Result<(f64, f64)> {
        let info = city_by_code(city)
            .ok_or_else(|| ProviderError::permanent(404, format!("unknown city code {city}")))?;

        let url = format!(
            "{}/v1/forecast?latitude={}&longitude={}&daily=temperature_2m_max,temperature_2m_min&temperature_unit=fahrenheit&timezone=UTC",
            self.sources.open_meteo_base, info.lat, info.lon
        );
        let response: OpenMeteoResponse = self.http.get_json(&url).await?;

        let date_str = date.format("%Y-%m-%d").to_string();
        let idx = response
            .daily
            .time
            .iter()
            .position(|d| *d == date_str)
            .ok_or_else(|| {
                ProviderError::Exhausted(format!("{date_str} outside forecast horizon"))
            })?;

        let series = match kind {
            WeatherKind::High => &response.daily.temperature_2m_max,
            WeatherKind::Low => &response.daily.temperature_2m_min,
        };
        let value = series
            .get(idx)
            .copied()
            .ok_or_else(|| ProviderError::Parse("forecast series shorter than dates".to_string()))?;

        Ok((value, self.default_uncertainty_f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server_uri: &str) -> WeatherProvider {
        let base = server_uri.to_string();
        WeatherProvider::new(
            HttpGetter::new(6000, 5, 1).unwrap(),
            WeatherSources {
                nws_base: base.clone(),
                open_meteo_base: base,
            },
            3.0,
        )
    }

    #[test]
    fn city_table_lookup() {
        assert_eq!(city_by_code("CHI").unwrap().station, "KMDW");
        assert!(city_by_code("XXX").is_none());
    }

    #[test]
    fn celsius_conversion() {
        assert_eq!(c_to_f(0.0), 32.0);
        assert_eq!(c_to_f(100.0), 212.0);
        assert!((c_to_f(-9.722) - 14.5).abs() < 0.01);
    }

    #[tokio::test]
    async fn daily_high_takes_max_of_date_observations() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stations/KMDW/observations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "features": [
                    {"properties": {"timestamp": "2026-01-29T06:00:00+00:00",
                                     "temperature": {"value": -9.0}}},
                    {"properties": {"timestamp": "2026-01-29T14:00:00+00:00",
                                     "temperature": {"value": -5.0}}},
                    {"properties": {"timestamp": "2026-01-30T02:00:00+00:00",
                                     "temperature": {"value": 4.0}}},
                    {"properties": {"timestamp": "2026-01-29T20:00:00+00:00",
                                     "temperature": {"value": null}}}
                ]
            })))
            .mount(&server)
            .await;

        let date = NaiveDate::from_ymd_opt(2026, 1, 29).unwrap();
        let high = provider_for(&server.uri())
            .daily_temperature("CHI", date, WeatherKind::High)
            .await
            .unwrap();
        // max(-9°C, -5°C) = -5°C = 23°F; the Jan 30 reading is excluded.
        assert!((high - 23.0).abs() < 1e-9);

        let low = provider_for(&server.uri())
            .daily_temperature("CHI", date, WeatherKind::Low)
            .await
            .unwrap();
        assert!((low - 15.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn missing_date_observations_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stations/KNYC/observations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "features": []
            })))
            .mount(&server)
            .await;

        let date = NaiveDate::from_ymd_opt(2026, 1, 29).unwrap();
        let err = provider_for(&server.uri())
            .daily_temperature("NY", date, WeatherKind::High)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Exhausted(_)));
    }

    #[tokio::test]
    async fn forecast_finds_date_and_attaches_uncertainty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "daily": {
                    "time": ["2026-01-28", "2026-01-29", "2026-01-30"],
                    "temperature_2m_max": [18.0, 16.5, 21.0],
                    "temperature_2m_min": [4.0, 2.5, 8.0]
                }
            })))
            .mount(&server)
            .await;

        let date = NaiveDate::from_ymd_opt(2026, 1, 29).unwrap();
        let (high, band) = provider_for(&server.uri())
            .forecast_temperature("DEN", date, WeatherKind::High)
            .await
            .unwrap();
        assert_eq!(high, 16.5);
        assert_eq!(band, 3.0);

        let (low, _) = provider_for(&server.uri())
            .forecast_temperature("DEN", date, WeatherKind::Low)
            .await
            .unwrap();
        assert_eq!(low, 2.5);
    }

    #[tokio::test]
    async fn unknown_city_is_permanent() {
        let provider = provider_for("http://127.0.0.1:1");
        let date = NaiveDate::from_ymd_opt(2026, 1, 29).unwrap();
        let err = provider
            .daily_temperature("ATLANTIS", date, WeatherKind::High)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Permanent { .. }));
    }
}
