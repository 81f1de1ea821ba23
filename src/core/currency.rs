//! Currency table and exchange-rate abstractions

use anyhow::{Result, anyhow, ensure};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Jpy,
    Cny,
    Hkd,
    Aud,
    Sgd,
    Krw,
    Twd,
    Cad,
}

impl Currency {
    pub const ALL: [Currency; 11] = [
        Currency::Usd,
        Currency::Eur,
        Currency::Gbp,
        Currency::Jpy,
        Currency::Cny,
        Currency::Hkd,
        Currency::Aud,
        Currency::Sgd,
        Currency::Krw,
        Currency::Twd,
        Currency::Cad,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Jpy => "JPY",
            Currency::Cny => "CNY",
            Currency::Hkd => "HKD",
            Currency::Aud => "AUD",
            Currency::Sgd => "SGD",
            Currency::Krw => "KRW",
            Currency::Twd => "TWD",
            Currency::Cad => "CAD",
        }
    }

    /// Returns the display symbol for the currency
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::Usd => "$",
            Currency::Eur => "€",
            Currency::Gbp => "£",
            Currency::Jpy | Currency::Cny => "¥",
            Currency::Hkd => "HK$",
            Currency::Aud => "A$",
            Currency::Sgd => "S$",
            Currency::Krw => "₩",
            Currency::Twd => "NT$",
            Currency::Cad => "C$",
        }
    }
}

impl Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Currency {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_uppercase();
        Currency::ALL
            .into_iter()
            .find(|c| c.code() == code)
            .ok_or_else(|| anyhow!("Unsupported currency: {}", s))
    }
}

/// Display symbol for a raw currency code, falling back to the code itself.
pub fn symbol_for(code: &str) -> String {
    code.parse::<Currency>()
        .map(|c| c.symbol().to_string())
        .unwrap_or_else(|_| code.to_string())
}

/// Value of one unit of `currency` expressed in the home currency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub currency: Currency,
    pub rate_to_home: f64,
    pub fetched_at: DateTime<Utc>,
}

impl ExchangeRate {
    pub fn new(currency: Currency, rate_to_home: f64, fetched_at: DateTime<Utc>) -> Result<Self> {
        ensure!(
            rate_to_home.is_finite() && rate_to_home > 0.0,
            "Exchange rate for {} must be positive, got {}",
            currency,
            rate_to_home
        );
        Ok(Self {
            currency,
            rate_to_home,
            fetched_at,
        })
    }

    /// The identity rate used when the selected currency is the home currency.
    pub fn home(currency: Currency, now: DateTime<Utc>) -> Self {
        Self {
            currency,
            rate_to_home: 1.0,
            fetched_at: now,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.rate_to_home.is_finite() && self.rate_to_home > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Transport failure or a payload that could not be decoded
    #[error("network error: {0}")]
    Network(String),
    /// Well-formed response that lacks the requested rate or signals failure
    #[error("data error: {0}")]
    Data(String),
}

#[async_trait]
pub trait CurrencyRateProvider: Send + Sync {
    async fn fetch_rate(&self, currency: Currency) -> Result<ExchangeRate, FetchError>;
}
