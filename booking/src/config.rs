//! Configuration management for tixwatch.
//!
//! Loads configuration from environment variables with sensible defaults.
//! The binary loads a `.env` file first, so the same variables can live there.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tixwatch_api::{BookingApiClient, DEFAULT_BOOKING_URL, DEFAULT_PAYMENT_URL};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Backend endpoints and credentials
    pub api: ApiConfig,
    /// Cache timing
    pub cache: CacheConfig,
    /// Booking screen behaviour
    pub screen: ScreenConfig,
    /// Log filter (trace, debug, info, warn, error or an `EnvFilter` directive)
    pub log_level: String,
}

/// Backend configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Booking service base URL
    pub booking_url: String,
    /// Payment service base URL
    pub payment_url: String,
    /// Bearer token issued by the auth service
    #[serde(skip_serializing)]
    pub token: Option<String>,
}

/// Cache timing configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Seconds a booking or list read is served without revalidation
    pub stale_time_secs: u64,
    /// Seconds between polls while a booking is pending
    pub poll_interval_secs: u64,
    /// Seconds a payment record is served without revalidation
    pub payment_stale_time_secs: u64,
}

/// Booking screen configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenConfig {
    /// Revalidate immediately when the local countdown reaches zero
    pub refetch_on_expiry: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable values fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            api: ApiConfig {
                booking_url: lookup("TIXWATCH_BOOKING_URL")
                    .unwrap_or_else(|| DEFAULT_BOOKING_URL.to_string()),
                payment_url: lookup("TIXWATCH_PAYMENT_URL")
                    .unwrap_or_else(|| DEFAULT_PAYMENT_URL.to_string()),
                token: lookup("TIXWATCH_TOKEN").filter(|token| !token.trim().is_empty()),
            },
            cache: CacheConfig {
                stale_time_secs: lookup("TIXWATCH_STALE_TIME_SECS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0),
                poll_interval_secs: lookup("TIXWATCH_POLL_INTERVAL_SECS")
                    .and_then(|s| s.parse().ok())
                    .filter(|secs| *secs > 0)
                    .unwrap_or(5),
                payment_stale_time_secs: lookup("TIXWATCH_PAYMENT_STALE_TIME_SECS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            },
            screen: ScreenConfig {
                refetch_on_expiry: lookup("TIXWATCH_REFETCH_ON_EXPIRY")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(true),
            },
            log_level: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        }
    }

    /// HTTP client for the configured services
    #[must_use]
    pub fn api_client(&self) -> BookingApiClient {
        let client = BookingApiClient::new(&self.api.booking_url, &self.api.payment_url);
        match &self.api.token {
            Some(token) => client.with_token(token),
            None => client,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl CacheConfig {
    /// Booking stale window
    #[must_use]
    pub const fn stale_time(&self) -> Duration {
        Duration::from_secs(self.stale_time_secs)
    }

    /// Poll interval for pending bookings
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Payment stale window
    #[must_use]
    pub const fn payment_stale_time(&self) -> Duration {
        Duration::from_secs(self.payment_stale_time_secs)
    }
}
