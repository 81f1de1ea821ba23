use crate::core::currency::{Currency, ExchangeRate};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Rates are trusted for this long after a successful fetch.
pub const RATE_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// A durable string key-value collection with per-entry expiry.
///
/// Read failures of any kind surface as `None`; write failures are logged by
/// the implementation and otherwise ignored.
#[async_trait]
pub trait KeyValueCollection: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn put(&self, key: &str, value: String, ttl: Option<Duration>);
}

/// Per-currency exchange-rate cache on top of a [`KeyValueCollection`].
#[derive(Clone)]
pub struct RateCache {
    store: Arc<dyn KeyValueCollection>,
}

impl RateCache {
    pub fn new(store: Arc<dyn KeyValueCollection>) -> Self {
        Self { store }
    }

    fn key(currency: Currency) -> String {
        format!("rate_{}", currency.code())
    }

    pub async fn get(&self, currency: Currency) -> Option<ExchangeRate> {
        let raw = self.store.get(&Self::key(currency)).await?;
        match serde_json::from_str::<ExchangeRate>(&raw) {
            Ok(rate) if rate.is_valid() && rate.currency == currency => {
                debug!("Rate cache HIT for {}", currency);
                Some(rate)
            }
            Ok(rate) => {
                debug!(?rate, "Ignoring unusable cached rate for {}", currency);
                None
            }
            Err(e) => {
                debug!("Ignoring malformed cached rate for {}: {}", currency, e);
                None
            }
        }
    }

    pub async fn put(&self, currency: Currency, rate: &ExchangeRate) {
        match serde_json::to_string(rate) {
            Ok(payload) => {
                debug!("Rate cache PUT for {}", currency);
                self.store
                    .put(&Self::key(currency), payload, Some(RATE_TTL))
                    .await;
            }
            Err(e) => debug!("Failed to serialize rate for {}: {}", currency, e),
        }
    }
}
