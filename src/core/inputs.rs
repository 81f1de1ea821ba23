//! The raw subscription form and its persistence.

use crate::core::cache::KeyValueCollection;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const INPUTS_KEY: &str = "inputs";
pub const INPUTS_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// User-editable inputs, kept as entered so a save/load cycle reproduces
/// every field exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionForm {
    pub price: String,
    pub currency: String,
    /// Cycle length in days
    pub cycle: String,
    pub due_date: String,
    pub trade_date: String,
    /// Home-currency value of one foreign unit
    pub custom_rate: String,
}

impl Default for SubscriptionForm {
    fn default() -> Self {
        Self {
            price: String::new(),
            currency: "USD".to_string(),
            cycle: "365".to_string(),
            due_date: String::new(),
            trade_date: String::new(),
            custom_rate: String::new(),
        }
    }
}

impl SubscriptionForm {
    /// Overlays the non-empty fields of `self` onto `base`.
    pub fn merged_over(self, base: SubscriptionForm) -> SubscriptionForm {
        fn pick(saved: String, fallback: String) -> String {
            if saved.is_empty() { fallback } else { saved }
        }

        SubscriptionForm {
            price: pick(self.price, base.price),
            currency: pick(self.currency, base.currency),
            cycle: pick(self.cycle, base.cycle),
            due_date: pick(self.due_date, base.due_date),
            trade_date: pick(self.trade_date, base.trade_date),
            custom_rate: pick(self.custom_rate, base.custom_rate),
        }
    }

    /// Fills both dates when either is missing: the trade date becomes
    /// `today` and the due date the next November 25th.
    pub fn fill_default_dates(&mut self, today: NaiveDate) {
        if !self.trade_date.is_empty() && !self.due_date.is_empty() {
            return;
        }

        self.trade_date = today.format(DATE_FORMAT).to_string();
        let due = default_due_date(today);
        self.due_date = due.format(DATE_FORMAT).to_string();
    }
}

fn default_due_date(today: NaiveDate) -> NaiveDate {
    let this_year = NaiveDate::from_ymd_opt(today.year(), 11, 25);
    match this_year {
        Some(due) if today <= due => due,
        _ => NaiveDate::from_ymd_opt(today.year() + 1, 11, 25).unwrap_or(today),
    }
}

/// Persists the [`SubscriptionForm`] as a JSON blob.
#[derive(Clone)]
pub struct InputStore {
    store: Arc<dyn KeyValueCollection>,
}

impl InputStore {
    pub fn new(store: Arc<dyn KeyValueCollection>) -> Self {
        Self { store }
    }

    pub async fn load(&self) -> Option<SubscriptionForm> {
        let raw = self.store.get(INPUTS_KEY).await?;
        match serde_json::from_str(&raw) {
            Ok(form) => Some(form),
            Err(e) => {
                debug!("Ignoring malformed saved inputs: {}", e);
                None
            }
        }
    }

    pub async fn save(&self, form: &SubscriptionForm) {
        match serde_json::to_string(form) {
            Ok(payload) => {
                debug!("Saving inputs");
                self.store.put(INPUTS_KEY, payload, Some(INPUTS_TTL)).await;
            }
            Err(e) => debug!("Failed to serialize inputs: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryCollection;

    fn sample_form() -> SubscriptionForm {
        SubscriptionForm {
            price: "12.50".to_string(),
            currency: "EUR".to_string(),
            cycle: "30".to_string(),
            due_date: "2025-03-01".to_string(),
            trade_date: "2025-01-15".to_string(),
            custom_rate: "7.8125".to_string(),
        }
    }

    #[tokio::test]
    async fn test_save_then_load_preserves_fields() {
        let store = InputStore::new(Arc::new(MemoryCollection::new()));
        assert!(store.load().await.is_none());

        let form = sample_form();
        store.save(&form).await;

        assert_eq!(store.load().await, Some(form));
    }

    #[tokio::test]
    async fn test_trailing_zeros_survive_round_trip() {
        let store = InputStore::new(Arc::new(MemoryCollection::new()));
        let form = SubscriptionForm {
            price: "10.00".to_string(),
            custom_rate: "0.1000".to_string(),
            ..sample_form()
        };
        store.save(&form).await;

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.price, "10.00");
        assert_eq!(loaded.custom_rate, "0.1000");
    }

    #[tokio::test]
    async fn test_malformed_inputs_are_ignored() {
        let collection = Arc::new(MemoryCollection::new());
        collection.put(INPUTS_KEY, "[1, 2".to_string(), None).await;
        let store = InputStore::new(collection);
        assert!(store.load().await.is_none());
    }

    #[test]
    fn test_merged_over_keeps_defaults_for_empty_fields() {
        let saved = SubscriptionForm {
            price: "5".to_string(),
            currency: String::new(),
            cycle: String::new(),
            ..SubscriptionForm::default()
        };
        let merged = saved.merged_over(SubscriptionForm::default());
        assert_eq!(merged.price, "5");
        assert_eq!(merged.currency, "USD");
        assert_eq!(merged.cycle, "365");
    }

    #[test]
    fn test_missing_fields_deserialize_to_defaults() {
        let form: SubscriptionForm = serde_json::from_str(r#"{"price":"9"}"#).unwrap();
        assert_eq!(form.price, "9");
        assert_eq!(form.cycle, "365");
    }

    #[test]
    fn test_default_dates_before_november_25() {
        let mut form = SubscriptionForm::default();
        form.fill_default_dates(NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
        assert_eq!(form.trade_date, "2024-03-10");
        assert_eq!(form.due_date, "2024-11-25");
    }

    #[test]
    fn test_default_dates_after_november_25() {
        let mut form = SubscriptionForm::default();
        form.fill_default_dates(NaiveDate::from_ymd_opt(2024, 12, 1).unwrap());
        assert_eq!(form.due_date, "2025-11-25");
    }

    #[test]
    fn test_default_dates_keep_existing_pair() {
        let mut form = sample_form();
        form.fill_default_dates(NaiveDate::from_ymd_opt(2030, 1, 1).unwrap());
        assert_eq!(form.trade_date, "2025-01-15");
        assert_eq!(form.due_date, "2025-03-01");
    }
}
