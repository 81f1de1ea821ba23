use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

use crate::core::currency::{Currency, CurrencyRateProvider, ExchangeRate, FetchError};

#[derive(Debug, Deserialize)]
struct LatestRatesResponse {
    result: String,
    #[serde(default)]
    rates: HashMap<String, f64>,
}

/// Rates from the open.er-api.com `latest` endpoint, quoted against the home
/// currency and inverted to home units per foreign unit.
pub struct OpenErApiProvider {
    base_url: String,
    home: Currency,
    client: reqwest::Client,
}

impl OpenErApiProvider {
    pub fn new(base_url: &str, home: Currency) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("residue/0.1")
            .build()?;
        Ok(OpenErApiProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            home,
            client,
        })
    }
}

#[async_trait]
impl CurrencyRateProvider for OpenErApiProvider {
    #[instrument(
        name = "ExchangeRateFetch",
        skip(self),
        fields(currency = %currency)
    )]
    async fn fetch_rate(&self, currency: Currency) -> Result<ExchangeRate, FetchError> {
        let url = format!("{}/v6/latest/{}", self.base_url, self.home);
        debug!("Requesting exchange rates from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Network(format!("Request error: {e} for URL: {url}")))?;

        if !response.status().is_success() {
            return Err(FetchError::Network(format!(
                "HTTP error: {} for URL: {}",
                response.status(),
                url
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| FetchError::Network(format!("Failed to read response body: {e}")))?;

        let data: LatestRatesResponse = serde_json::from_str(&text)
            .map_err(|e| FetchError::Network(format!("Failed to parse JSON response: {e}")))?;

        if data.result != "success" {
            return Err(FetchError::Data(format!(
                "Rate source returned result: {}",
                data.result
            )));
        }

        let quoted = data
            .rates
            .get(currency.code())
            .copied()
            .ok_or_else(|| FetchError::Data(format!("Currency not found: {currency}")))?;

        if !(quoted.is_finite() && quoted > 0.0) {
            return Err(FetchError::Data(format!(
                "Invalid quote for {currency}: {quoted}"
            )));
        }

        Ok(ExchangeRate {
            currency,
            rate_to_home: 1.0 / quoted,
            fetched_at: Utc::now(),
        })
    }
}
