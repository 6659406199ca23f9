//! Shared HTTP plumbing for the providers: one rate-limited client with
//! capped jittered retry on transient failures.

use crate::error::{ProviderError, Result};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use rand::Rng;
use reqwest::Client;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

/// Cap on concurrent requests when the caller does not set one.
const DEFAULT_MAX_IN_FLIGHT: usize = 8;

/// A reqwest client wrapped with a token bucket and retry policy.
#[derive(Clone)]
pub struct HttpGetter {
    client: Client,
    rate_limiter: Arc<
        RateLimiter<
            governor::state::NotKeyed,
            governor::state::InMemoryState,
            governor::clock::DefaultClock,
        >,
    >,
    /// Bounds the fan-out when providers are queried concurrently.
    in_flight: Arc<Semaphore>,
    attempts: u32,
}

impl std::fmt::Debug for HttpGetter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGetter")
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

impl HttpGetter {
    /// Creates a getter with the given per-minute quota, timeout, and
    /// retry attempt count.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(requests_per_minute: u32, timeout_secs: u64, attempts: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("autotrader/0.1 (research)")
            .build()
            .map_err(|e| ProviderError::Transient(format!("building HTTP client: {e}")))?;

        let quota = Quota::per_minute(
            NonZeroU32::new(requests_per_minute).unwrap_or(nonzero!(30u32)),
        );

        Ok(Self {
            client,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            in_flight: Arc::new(Semaphore::new(DEFAULT_MAX_IN_FLIGHT)),
            attempts: attempts.max(1),
        })
    }

    /// Replaces the concurrent-request bound (default 8).
    #[must_use]
    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.in_flight = Arc::new(Semaphore::new(max.max(1)));
        self
    }

    /// GETs `url` and decodes the JSON body, retrying transient failures
    /// with `2^attempt` seconds plus jitter between attempts.
    ///
    /// # Errors
    ///
    /// Returns the last failure when all attempts are spent; permanent
    /// (4xx) failures return immediately.
    pub async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut last_err = None;
        for attempt in 0..self.attempts {
            if attempt > 0 {
                let jitter_ms = rand::thread_rng().gen_range(0..750);
                let backoff =
                    Duration::from_secs(1 << attempt.min(4)) + Duration::from_millis(jitter_ms);
                tokio::time::sleep(backoff).await;
            }

            match self.try_get_json(url).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt + 1 < self.attempts => {
                    debug!(attempt, url, error = %e, "retrying provider request");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err
            .unwrap_or_else(|| ProviderError::Transient("retries exhausted".to_string())))
    }

    async fn try_get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|_| ProviderError::Transient("request gate closed".to_string()))?;
        self.rate_limiter.until_ready().await;

        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status.as_u16() == 429 || status.is_server_error() {
            return Err(ProviderError::Transient(format!("status {status} from {url}")));
        }
        if status.is_client_error() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::permanent(status.as_u16(), text));
        }

        let body = response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn client_error_is_permanent_and_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/x"))
            .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
            .expect(1)
            .mount(&server)
            .await;

        let getter = HttpGetter::new(6000, 5, 3).unwrap();
        let err = getter
            .get_json::<serde_json::Value>(&format!("{}/x", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Permanent { status_code: 404, .. }));
    }

    #[tokio::test]
    async fn transient_error_retries_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/y"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/y"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let getter = HttpGetter::new(6000, 5, 3).unwrap();
        let value: serde_json::Value = getter
            .get_json(&format!("{}/y", server.uri()))
            .await
            .unwrap();
        assert_eq!(value["ok"], true);
    }
}
