//! RSA-PSS authentication for the Kalshi API.
//!
//! Kalshi signs each request with RSA-PSS (SHA-256) over
//! `timestamp + method + path` (path without query string) and sends the
//! result in three headers alongside the key id.
//!
//! # Security
//!
//! - Private keys are loaded from environment variables
//! - Private keys are NEVER logged
//! - Key material is zeroized on drop where possible

use crate::error::{KalshiError, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rsa::pkcs8::DecodePrivateKey;
use rsa::pss::BlindedSigningKey;
use rsa::sha2::Sha256;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::RsaPrivateKey;
use secrecy::{ExposeSecret, SecretString};
use std::time::{SystemTime, UNIX_EPOCH};
use zeroize::Zeroize;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for Kalshi authentication.
#[derive(Debug, Clone)]
pub struct KalshiAuthConfig {
    /// Environment variable name for the API key id.
    pub api_key_env: String,

    /// Environment variable name for the private key (PEM format).
    pub private_key_env: String,
}

impl Default for KalshiAuthConfig {
    fn default() -> Self {
        Self {
            api_key_env: "KALSHI_API_KEY_ID".to_string(),
            private_key_env: "KALSHI_PRIVATE_KEY".to_string(),
        }
    }
}

impl KalshiAuthConfig {
    /// Sets custom environment variable names.
    #[must_use]
    pub fn with_env_vars(
        mut self,
        api_key_env: impl Into<String>,
        private_key_env: impl Into<String>,
    ) -> Self {
        self.api_key_env = api_key_env.into();
        self.private_key_env = private_key_env.into();
        self
    }
}

// =============================================================================
// Signed Headers
// =============================================================================

/// Headers required for authenticated Kalshi API requests.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    /// KALSHI-ACCESS-KEY header.
    pub access_key: String,

    /// KALSHI-ACCESS-SIGNATURE header (base64 encoded).
    pub signature: String,

    /// KALSHI-ACCESS-TIMESTAMP header (Unix timestamp in milliseconds).
    pub timestamp: String,
}

impl SignedHeaders {
    /// Returns headers as tuples for reqwest.
    #[must_use]
    pub fn as_tuples(&self) -> [(&'static str, &str); 3] {
        [
            ("KALSHI-ACCESS-KEY", &self.access_key),
            ("KALSHI-ACCESS-SIGNATURE", &self.signature),
            ("KALSHI-ACCESS-TIMESTAMP", &self.timestamp),
        ]
    }
}

// =============================================================================
// KalshiAuth
// =============================================================================

/// RSA-PSS authenticator for the Kalshi API.
pub struct KalshiAuth {
    /// API key id.
    api_key: String,

    /// RSA private key for signing.
    private_key: RsaPrivateKey,
}

impl std::fmt::Debug for KalshiAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KalshiAuth")
            .field("api_key", &self.api_key)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

impl Drop for KalshiAuth {
    fn drop(&mut self) {
        self.api_key.zeroize();
        // RsaPrivateKey does not implement Zeroize directly; its memory is
        // reclaimed on drop.
    }
}

impl KalshiAuth {
    /// Creates an authenticator from an API key id and PEM-encoded
    /// private key.
    ///
    /// # Errors
    ///
    /// Returns an error if the private key cannot be parsed.
    pub fn new(api_key: impl Into<String>, private_key_pem: &str) -> Result<Self> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(private_key_pem)
            .map_err(|e| KalshiError::Signing(format!("failed to parse private key: {e}")))?;

        Ok(Self {
            api_key: api_key.into(),
            private_key,
        })
    }

    /// Creates an authenticator from an already-parsed key (tests).
    #[must_use]
    pub fn from_parts(api_key: impl Into<String>, private_key: RsaPrivateKey) -> Self {
        Self {
            api_key: api_key.into(),
            private_key,
        }
    }

    /// Creates an authenticator from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the variables are missing or the key is
    /// invalid.
    pub fn from_env(config: &KalshiAuthConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            KalshiError::Configuration(format!(
                "missing environment variable: {}",
                config.api_key_env
            ))
        })?;

        let private_key_pem = std::env::var(&config.private_key_env).map_err(|_| {
            KalshiError::Configuration(format!(
                "missing environment variable: {}",
                config.private_key_env
            ))
        })?;

        // Keys pasted into env files usually carry literal "\n".
        let private_key_pem = private_key_pem.replace("\\n", "\n");

        Self::new(api_key, &private_key_pem)
    }

    /// Creates an authenticator with a `SecretString` private key.
    ///
    /// # Errors
    ///
    /// Returns an error if the private key cannot be parsed.
    pub fn with_secret_key(
        api_key: impl Into<String>,
        private_key_pem: &SecretString,
    ) -> Result<Self> {
        Self::new(api_key, private_key_pem.expose_secret())
    }

    /// Returns the API key id.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Signs a request and returns the required headers.
    ///
    /// `path` must be the URL path only (no host, no query string); the
    /// venue verifies the signature against exactly that string.
    ///
    /// # Errors
    ///
    /// Returns an error if the system clock is unavailable.
    pub fn sign_request(&self, method: &str, path: &str) -> Result<SignedHeaders> {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| KalshiError::Signing(format!("failed to get timestamp: {e}")))?
            .as_millis();

        Ok(self.sign_request_with_timestamp(method, path, timestamp_ms as u64))
    }

    /// Signs a request with a specific timestamp (useful for testing).
    #[must_use]
    pub fn sign_request_with_timestamp(
        &self,
        method: &str,
        path: &str,
        timestamp_ms: u64,
    ) -> SignedHeaders {
        let timestamp_str = timestamp_ms.to_string();
        let message = format!("{timestamp_str}{method}{path}");

        let signing_key = BlindedSigningKey::<Sha256>::new(self.private_key.clone());
        let mut rng = rand::thread_rng();
        let signature = signing_key.sign_with_rng(&mut rng, message.as_bytes());

        SignedHeaders {
            access_key: self.api_key.clone(),
            signature: BASE64.encode(signature.to_bytes()),
            timestamp: timestamp_str,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
