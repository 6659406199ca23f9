//! Kalshi REST client with rate limiting and retry.
//!
//! The client exposes exactly what the trading loop needs: paginated
//! market search by ticker prefix, order submission, market-result
//! lookup for settlement, and the account balance. Every request waits
//! on a shared token bucket; a 429 arms a cycle-wide cool-off that
//! short-circuits further requests until it expires.

use crate::auth::{KalshiAuth, KalshiAuthConfig};
use crate::error::{KalshiError, Result};
use autotrader_core::ticker;
use autotrader_core::types::{Market, MarketStatus, Side};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use parking_lot::Mutex;
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// Kalshi production API base URL.
pub const KALSHI_PROD_URL: &str = "https://api.elections.kalshi.com/trade-api/v2";

/// Kalshi demo API base URL.
pub const KALSHI_DEMO_URL: &str = "https://demo-api.kalshi.co/trade-api/v2";

/// Page size for market search.
const SEARCH_PAGE_LIMIT: u32 = 200;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the Kalshi client.
#[derive(Debug, Clone)]
pub struct KalshiClientConfig {
    /// Base URL for the API (scheme + host + API prefix).
    pub base_url: String,

    /// Authentication configuration.
    pub auth_config: KalshiAuthConfig,

    /// Requests per minute limit.
    pub requests_per_minute: NonZeroU32,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Attempts per request for retryable failures.
    pub retry_attempts: u32,
}

impl Default for KalshiClientConfig {
    fn default() -> Self {
        Self {
            base_url: KALSHI_PROD_URL.to_string(),
            auth_config: KalshiAuthConfig::default(),
            requests_per_minute: nonzero!(60u32),
            timeout_secs: 30,
            retry_attempts: 3,
        }
    }
}

impl KalshiClientConfig {
    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the authentication configuration.
    #[must_use]
    pub fn with_auth_config(mut self, config: KalshiAuthConfig) -> Self {
        self.auth_config = config;
        self
    }

    /// Sets the rate limit.
    #[must_use]
    pub fn with_rate_limit(mut self, requests_per_minute: NonZeroU32) -> Self {
        self.requests_per_minute = requests_per_minute;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Sets the retry attempt count.
    #[must_use]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
struct RawMarketsResponse {
    markets: Option<Vec<RawMarket>>,
    cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawMarket {
    ticker: String,
    status: Option<String>,
    yes_ask: Option<i64>,
    no_ask: Option<i64>,
    result: Option<String>,
}

fn parse_result_side(result: Option<&str>) -> Option<Side> {
    match result {
        Some("yes") => Some(Side::Yes),
        Some("no") => Some(Side::No),
        _ => None,
    }
}

fn parse_status(status: Option<&str>) -> MarketStatus {
    match status {
        Some("open" | "active") => MarketStatus::Open,
        Some("settled" | "finalized") => MarketStatus::Settled,
        _ => MarketStatus::Closed,
    }
}

impl RawMarket {
    /// Converts a wire market into the domain type. Tickers outside the
    /// two supported grammars yield `None` and are skipped upstream.
    fn into_market(self) -> Option<Market> {
        let parsed = ticker::parse(&self.ticker)?;
        Some(Market {
            family: parsed.family(),
            strike: parsed.strike(),
            expiry: parsed.expiry(),
            yes_ask_cents: self.yes_ask.unwrap_or(0),
            no_ask_cents: self.no_ask.unwrap_or(0),
            status: parse_status(self.status.as_deref()),
            result: parse_result_side(self.result.as_deref()),
            ticker: self.ticker,
        })
    }
}

/// Venue-side resolution state of one market, for settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketResult {
    pub status: MarketStatus,
    pub result: Option<Side>,
}

impl MarketResult {
    /// True once the venue has finalized the outcome.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.status == MarketStatus::Settled && self.result.is_some()
    }
}

#[derive(Debug, Serialize)]
struct OrderBody<'a> {
    ticker: &'a str,
    client_order_id: String,
    action: &'static str,
    side: &'a str,
    count: u32,
    #[serde(rename = "type")]
    order_type: &'static str,
    yes_price: i64,
}

#[derive(Debug, Deserialize)]
struct RawOrderResponse {
    order: Option<RawOrder>,
}

#[derive(Debug, Deserialize)]
struct RawOrder {
    order_id: String,
    status: Option<String>,
}

/// Accepted order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderFill {
    pub order_id: String,
    /// Venue order status at submission (`executed`, `resting`, ...).
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct RawBalanceResponse {
    balance: Option<i64>,
}

// =============================================================================
// KalshiClient
// =============================================================================

/// Kalshi REST API client.
pub struct KalshiClient {
    config: KalshiClientConfig,
    /// Path prefix of `base_url`, prepended when signing.
    base_path: String,
    http: Client,
    rate_limiter: Arc<
        RateLimiter<
            governor::state::NotKeyed,
            governor::state::InMemoryState,
            governor::clock::DefaultClock,
        >,
    >,
    auth: KalshiAuth,
    /// Cycle-wide cool-off armed by a 429.
    cool_off_until: Mutex<Option<Instant>>,
}

impl std::fmt::Debug for KalshiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KalshiClient")
            .field("base_url", &self.config.base_url)
            .field("requests_per_minute", &self.config.requests_per_minute)
            .finish_non_exhaustive()
    }
}

fn url_path_of(base_url: &str) -> String {
    base_url
        .find("://")
        .and_then(|scheme_end| {
            let rest = &base_url[scheme_end + 3..];
            rest.find('/').map(|i| rest[i..].to_string())
        })
        .unwrap_or_default()
}

impl KalshiClient {
    /// Creates a client whose credentials come from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing or the HTTP client
    /// cannot be built.
    pub fn new(config: KalshiClientConfig) -> Result<Self> {
        let auth = KalshiAuth::from_env(&config.auth_config)?;
        Self::with_auth(config, auth)
    }

    /// Creates a client with an explicit authenticator (tests, fixtures).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_auth(config: KalshiClientConfig, auth: KalshiAuth) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| KalshiError::Configuration(format!("failed to build HTTP client: {e}")))?;

        let quota = Quota::per_minute(config.requests_per_minute);
        let rate_limiter = Arc::new(RateLimiter::direct(quota));
        let base_path = url_path_of(&config.base_url);

        Ok(Self {
            config,
            base_path,
            http,
            rate_limiter,
            auth,
            cool_off_until: Mutex::new(None),
        })
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Seconds remaining in the rate-limit cool-off, if one is armed.
    #[must_use]
    pub fn cool_off_remaining_secs(&self) -> Option<u64> {
        let guard = self.cool_off_until.lock();
        guard.and_then(|until| {
            let now = Instant::now();
            (until > now).then(|| (until - now).as_secs().max(1))
        })
    }

    fn arm_cool_off(&self, secs: u64) {
        let mut guard = self.cool_off_until.lock();
        *guard = Some(Instant::now() + Duration::from_secs(secs));
        warn!(retry_after_secs = secs, "venue rate limit hit, cooling off");
    }

    /// Validates a ticker string to prevent path traversal.
    fn validate_ticker(ticker: &str) -> Result<&str> {
        if ticker.is_empty() {
            return Err(KalshiError::InvalidTicker("empty ticker".to_string()));
        }
        if ticker.len() > 64 {
            return Err(KalshiError::InvalidTicker(format!(
                "ticker exceeds maximum length of 64: {}",
                ticker.len()
            )));
        }
        if !ticker
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(KalshiError::InvalidTicker(format!(
                "ticker must contain only alphanumeric, hyphen, underscore, or dot: {ticker}"
            )));
        }
        Ok(ticker)
    }

    async fn send_get(&self, path_and_query: &str) -> Result<reqwest::Response> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.config.base_url, path_and_query);
        let sign_path = format!(
            "{}{}",
            self.base_path,
            path_and_query.split('?').next().unwrap_or(path_and_query)
        );
        let headers = self.auth.sign_request("GET", &sign_path)?;

        debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .header(headers.as_tuples()[0].0, headers.as_tuples()[0].1)
            .header(headers.as_tuples()[1].0, headers.as_tuples()[1].1)
            .header(headers.as_tuples()[2].0, headers.as_tuples()[2].1)
            .send()
            .await?;
        Ok(response)
    }

    /// Authenticated GET with capped jittered retry on transient errors.
    async fn get<T: serde::de::DeserializeOwned>(&self, path_and_query: &str) -> Result<T> {
        if let Some(secs) = self.cool_off_remaining_secs() {
            return Err(KalshiError::rate_limit(secs));
        }

        let attempts = self.config.retry_attempts.max(1);
        let mut last_err = None;
        for attempt in 0..attempts {
            if attempt > 0 {
                let jitter_ms = rand::thread_rng().gen_range(0..500);
                let backoff = Duration::from_secs(1 << attempt.min(4))
                    + Duration::from_millis(jitter_ms);
                tokio::time::sleep(backoff).await;
            }

            let result = match self.send_get(path_and_query).await {
                Ok(response) => self.handle_response(response).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e @ KalshiError::RateLimit { .. }) => {
                    if let Some(secs) = e.retry_delay_secs() {
                        self.arm_cool_off(secs);
                    }
                    return Err(e);
                }
                Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                    debug!(attempt, error = %e, "retrying venue request");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| KalshiError::Network("retries exhausted".to_string())))
    }

    /// Authenticated POST. Orders are not retried: a timeout after
    /// submission is ambiguous and must surface to the caller.
    async fn post<T: serde::de::DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        if let Some(secs) = self.cool_off_remaining_secs() {
            return Err(KalshiError::rate_limit(secs));
        }
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.config.base_url, path);
        let sign_path = format!("{}{}", self.base_path, path);
        let body_json = serde_json::to_string(body)?;
        let headers = self.auth.sign_request("POST", &sign_path)?;

        debug!("POST {} body_len={}", url, body_json.len());

        let response = self
            .http
            .post(&url)
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .header(headers.as_tuples()[0].0, headers.as_tuples()[0].1)
            .header(headers.as_tuples()[1].0, headers.as_tuples()[1].1)
            .header(headers.as_tuples()[2].0, headers.as_tuples()[2].1)
            .body(body_json)
            .send()
            .await?;

        let result = self.handle_response(response).await;
        if let Err(KalshiError::RateLimit { retry_after_secs }) = &result {
            self.arm_cool_off(*retry_after_secs);
        }
        result
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            return Err(KalshiError::rate_limit(retry_after));
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(KalshiError::api(status.as_u16(), text));
        }

        let body = response.json::<T>().await?;
        Ok(body)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Returns all open markets whose ticker starts with `prefix`,
    /// following continuation cursors until the venue is exhausted.
    /// Markets with unparseable tickers are dropped with a debug log.
    ///
    /// # Errors
    ///
    /// Returns an error if any page request fails.
    pub async fn search(&self, prefix: &str) -> Result<Vec<Market>> {
        let prefix = Self::validate_ticker(prefix)?;
        let mut markets = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut path = format!(
                "/markets?limit={SEARCH_PAGE_LIMIT}&status=open&series_ticker={prefix}"
            );
            if let Some(c) = &cursor {
                path.push_str("&cursor=");
                path.push_str(c);
            }

            let page: RawMarketsResponse = self.get(&path).await?;
            for raw in page.markets.unwrap_or_default() {
                let ticker = raw.ticker.clone();
                match raw.into_market() {
                    Some(market) if market.ticker.starts_with(prefix) => markets.push(market),
                    Some(_) => {}
                    None => debug!(ticker, "dropping market with unparseable ticker"),
                }
            }

            match page.cursor {
                Some(c) if !c.is_empty() => cursor = Some(c),
                _ => break,
            }
        }

        Ok(markets)
    }

    /// Submits a buy limit order for `contracts` at `limit_cents`.
    ///
    /// The venue prices both sides in YES cents, so a NO order is sent
    /// as `yes_price = 100 - limit`.
    ///
    /// # Errors
    ///
    /// Returns [`KalshiError::OrderRejected`] when the venue declines
    /// the order, or a transport/API error otherwise.
    pub async fn place_order(
        &self,
        ticker: &str,
        side: Side,
        contracts: u32,
        limit_cents: i64,
    ) -> Result<OrderFill> {
        let ticker = Self::validate_ticker(ticker)?;
        if contracts == 0 {
            return Err(KalshiError::order_rejected("zero contracts"));
        }
        if !(1..=99).contains(&limit_cents) {
            return Err(KalshiError::order_rejected(format!(
                "limit price out of range: {limit_cents}"
            )));
        }

        let body = OrderBody {
            ticker,
            client_order_id: Uuid::new_v4().to_string(),
            action: "buy",
            side: side.as_str(),
            count: contracts,
            order_type: "limit",
            yes_price: match side {
                Side::Yes => limit_cents,
                Side::No => 100 - limit_cents,
            },
        };

        let response: RawOrderResponse = self.post("/portfolio/orders", &body).await?;
        let order = response
            .order
            .ok_or_else(|| KalshiError::order_rejected("venue returned no order"))?;

        match order.status.as_deref() {
            Some("executed" | "resting" | "pending") => Ok(OrderFill {
                order_id: order.order_id,
                status: order.status.unwrap_or_default(),
            }),
            other => Err(KalshiError::order_rejected(
                other.unwrap_or("unknown status"),
            )),
        }
    }

    /// Fetches the venue's resolution state for one market. Used during
    /// settlement, mainly for weather markets the venue finalizes itself.
    ///
    /// # Errors
    ///
    /// Returns [`KalshiError::MarketNotFound`] for unknown tickers.
    pub async fn market_result(&self, ticker: &str) -> Result<MarketResult> {
        let ticker = Self::validate_ticker(ticker)?;

        #[derive(Deserialize)]
        struct SingleMarketResponse {
            market: Option<RawMarket>,
        }

        let response: SingleMarketResponse = self.get(&format!("/markets/{ticker}")).await?;
        let raw = response
            .market
            .ok_or_else(|| KalshiError::market_not_found(ticker))?;

        Ok(MarketResult {
            status: parse_status(raw.status.as_deref()),
            result: parse_result_side(raw.result.as_deref()),
        })
    }

    /// Returns the account balance in cents.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn balance_cents(&self) -> Result<i64> {
        let response: RawBalanceResponse = self.get("/portfolio/balance").await?;
        Ok(response.balance.unwrap_or(0))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::RsaPrivateKey;
    use std::sync::OnceLock;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn shared_key() -> RsaPrivateKey {
        static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
        KEY.get_or_init(|| {
            let mut rng = rand::thread_rng();
            RsaPrivateKey::new(&mut rng, 2048).expect("keygen")
        })
        .clone()
    }

    fn test_client(base_url: &str) -> KalshiClient {
        let config = KalshiClientConfig::default()
            .with_base_url(base_url)
            .with_rate_limit(nonzero!(6000u32))
            .with_retry_attempts(1);
        KalshiClient::with_auth(config, KalshiAuth::from_parts("test-key", shared_key())).unwrap()
    }

    // ==================== Config ====================

    #[test]
    fn config_defaults() {
        let config = KalshiClientConfig::default();
        assert_eq!(config.base_url, KALSHI_PROD_URL);
        assert_eq!(config.requests_per_minute.get(), 60);
        assert_eq!(config.retry_attempts, 3);
    }

    #[test]
    fn config_builder() {
        let config = KalshiClientConfig::default()
            .with_base_url("https://custom.url")
            .with_rate_limit(nonzero!(120u32))
            .with_timeout_secs(60)
            .with_retry_attempts(0);
        assert_eq!(config.base_url, "https://custom.url");
        assert_eq!(config.requests_per_minute.get(), 120);
        assert_eq!(config.timeout_secs, 60);
        // Zero attempts would mean no request at all.
        assert_eq!(config.retry_attempts, 1);
    }

    #[test]
    fn base_path_extraction() {
        assert_eq!(url_path_of(KALSHI_PROD_URL), "/trade-api/v2");
        assert_eq!(url_path_of("http://127.0.0.1:9000"), "");
        assert_eq!(url_path_of("not a url"), "");
    }

    // ==================== Conversions ====================

    #[test]
    fn raw_market_conversion_parses_ticker() {
        let raw = RawMarket {
            ticker: "KXBTCD-26JAN2810-T89000.00".to_string(),
            status: Some("open".to_string()),
            yes_ask: Some(55),
            no_ask: Some(48),
            result: None,
        };
        let market = raw.into_market().unwrap();
        assert_eq!(market.family, autotrader_core::types::AssetFamily::CryptoBtc);
        assert_eq!(market.strike, 89_000.0);
        assert_eq!(market.yes_ask_cents, 55);
        assert_eq!(market.status, MarketStatus::Open);
    }

    #[test]
    fn raw_market_conversion_drops_foreign_tickers() {
        let raw = RawMarket {
            ticker: "INXD-26JAN28-B5000".to_string(),
            status: Some("open".to_string()),
            yes_ask: Some(50),
            no_ask: Some(52),
            result: None,
        };
        assert!(raw.into_market().is_none());
    }

    #[test]
    fn ticker_validation() {
        assert!(KalshiClient::validate_ticker("KXBTCD-26JAN2810-T89000.00").is_ok());
        assert!(KalshiClient::validate_ticker("").is_err());
        assert!(KalshiClient::validate_ticker("../etc/passwd").is_err());
        assert!(KalshiClient::validate_ticker("KX/BTC").is_err());
        assert!(KalshiClient::validate_ticker(&"K".repeat(65)).is_err());
    }

    // ==================== HTTP behavior ====================

    #[tokio::test]
    async fn search_follows_cursor_pagination() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/markets"))
            .and(query_param("series_ticker", "KXBTCD"))
            .and(query_param("cursor", "page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "markets": [{
                    "ticker": "KXBTCD-26JAN2811-T90000.00",
                    "status": "open", "yes_ask": 40, "no_ask": 62
                }],
                "cursor": ""
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/markets"))
            .and(query_param("series_ticker", "KXBTCD"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "markets": [{
                    "ticker": "KXBTCD-26JAN2810-T89000.00",
                    "status": "open", "yes_ask": 55, "no_ask": 48
                }],
                "cursor": "page2"
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let markets = client.search("KXBTCD").await.unwrap();
        assert_eq!(markets.len(), 2);
        assert_eq!(markets[0].ticker, "KXBTCD-26JAN2810-T89000.00");
        assert_eq!(markets[1].ticker, "KXBTCD-26JAN2811-T90000.00");
    }

    #[tokio::test]
    async fn rate_limit_arms_cool_off() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/markets"))
            .respond_with(
                ResponseTemplate::new(429).insert_header("Retry-After", "17"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client.search("KXBTCD").await.unwrap_err();
        assert!(matches!(err, KalshiError::RateLimit { retry_after_secs: 17 }));

        // Second call short-circuits without touching the server
        // (the mock's expect(1) would fail otherwise).
        let err = client.search("KXETHD").await.unwrap_err();
        assert!(matches!(err, KalshiError::RateLimit { .. }));
        assert!(client.cool_off_remaining_secs().is_some());
    }

    #[tokio::test]
    async fn server_error_surfaces_as_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/markets"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client.search("KXBTCD").await.unwrap_err();
        match err {
            KalshiError::Api { status_code, .. } => assert_eq!(status_code, 500),
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn place_order_sends_no_side_as_yes_price() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/portfolio/orders"))
            .and(body_partial_json(serde_json::json!({
                "ticker": "KXBTCD-26JAN2810-T89000.00",
                "action": "buy",
                "side": "no",
                "count": 3,
                "type": "limit",
                "yes_price": 52
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "order": {"order_id": "ord-1", "status": "executed"}
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let fill = client
            .place_order("KXBTCD-26JAN2810-T89000.00", Side::No, 3, 48)
            .await
            .unwrap();
        assert_eq!(fill.order_id, "ord-1");
        assert_eq!(fill.status, "executed");
    }

    #[tokio::test]
    async fn rejected_order_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/portfolio/orders"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "order": {"order_id": "ord-2", "status": "rejected"}
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client
            .place_order("KXBTCD-26JAN2810-T89000.00", Side::Yes, 2, 55)
            .await
            .unwrap_err();
        assert!(matches!(err, KalshiError::OrderRejected { .. }));
    }

    #[tokio::test]
    async fn market_result_reads_settled_outcome() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/markets/KXHIGHCHI-26JAN29-B16.5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "market": {
                    "ticker": "KXHIGHCHI-26JAN29-B16.5",
                    "status": "settled",
                    "result": "yes"
                }
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let result = client.market_result("KXHIGHCHI-26JAN29-B16.5").await.unwrap();
        assert!(result.is_final());
        assert_eq!(result.result, Some(Side::Yes));
    }

    #[tokio::test]
    async fn zero_contract_orders_never_reach_the_wire() {
        let client = test_client("http://127.0.0.1:1");
        let err = client
            .place_order("KXBTCD-26JAN2810-T89000.00", Side::Yes, 0, 55)
            .await
            .unwrap_err();
        assert!(matches!(err, KalshiError::OrderRejected { .. }));
    }
}
