//! Kalshi venue integration for the binary-options autotrader.
//!
//! This crate provides:
//! - REST client with rate limiting and jittered retry
//! - RSA-PSS authentication for API requests
//! - Market search by ticker prefix with cursor pagination
//! - Order submission and market-result lookup for settlement
//!
//! # Authentication
//!
//! Kalshi uses RSA-PSS (SHA-256) signatures over
//! `timestamp + method + path`. Set the following environment
//! variables:
//!
//! - `KALSHI_API_KEY_ID`: your API key id
//! - `KALSHI_PRIVATE_KEY`: your RSA private key in PEM format

pub mod auth;
pub mod client;
pub mod error;

pub use auth::{KalshiAuth, KalshiAuthConfig, SignedHeaders};
pub use client::{
    KalshiClient, KalshiClientConfig, MarketResult, OrderFill, KALSHI_DEMO_URL, KALSHI_PROD_URL,
};
pub use error::{KalshiError, Result};
