//! Valuation engine and exchange-rate plumbing

pub mod cache;
pub mod config;
pub mod currency;
pub mod debounce;
pub mod inputs;
pub mod log;
pub mod refresh;
pub mod session;
pub mod valuation;

// Re-export main types for cleaner imports
pub use cache::{KeyValueCollection, RateCache};
pub use currency::{Currency, CurrencyRateProvider, ExchangeRate, FetchError};
pub use inputs::SubscriptionForm;
pub use refresh::{RefreshPolicy, RefreshTrigger};
pub use session::{RefreshOutcome, Session};
pub use valuation::{CycleLength, Skipped, SubscriptionInput, ValuationResult, compute, evaluate};
