//! State of one calculator session: the form being edited, the effective
//! exchange rate and the last good valuation.

use crate::core::cache::{KeyValueCollection, RateCache};
use crate::core::currency::{Currency, CurrencyRateProvider, ExchangeRate, FetchError};
use crate::core::debounce::Debouncer;
use crate::core::inputs::{InputStore, SubscriptionForm};
use crate::core::refresh::{RefreshPolicy, RefreshTrigger};
use crate::core::valuation::{self, CycleLength, Skipped, ValuationResult};
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const NOTICE_LIFETIME: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Toast,
    RateLimitTip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
    expires_at: Instant,
}

/// What the rate indicator next to the currency shows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateDisplay {
    Unknown,
    Pending,
    Value(f64),
    Error,
}

impl Display for RateDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateDisplay::Unknown => write!(f, "-"),
            RateDisplay::Pending => write!(f, "..."),
            RateDisplay::Value(rate) => write!(f, "{rate:.4}"),
            RateDisplay::Error => write!(f, "ERR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied,
    /// Home currency or unsupported code; nothing to fetch
    NotNeeded,
    Denied,
    Failed,
    /// The selected currency changed while the fetch was in flight
    Stale,
}

/// Issued by [`Session::begin_fetch`]; names the currency the fetch is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    currency: Currency,
}

impl FetchTicket {
    pub fn currency(&self) -> Currency {
        self.currency
    }
}

pub struct Session {
    home: Currency,
    form: SubscriptionForm,
    rates: RateCache,
    policy: RefreshPolicy,
    inputs: InputStore,
    provider: Arc<dyn CurrencyRateProvider>,
    rate_display: RateDisplay,
    last_result: Option<ValuationResult>,
    last_skipped: Option<Skipped>,
    notices: Vec<Notice>,
    pending_save: Debouncer,
}

impl Session {
    pub fn new(
        home: Currency,
        store: Arc<dyn KeyValueCollection>,
        provider: Arc<dyn CurrencyRateProvider>,
    ) -> Self {
        Self {
            home,
            form: SubscriptionForm::default(),
            rates: RateCache::new(Arc::clone(&store)),
            policy: RefreshPolicy::new(Arc::clone(&store)),
            inputs: InputStore::new(store),
            provider,
            rate_display: RateDisplay::Unknown,
            last_result: None,
            last_skipped: None,
            notices: Vec::new(),
            pending_save: Debouncer::default(),
        }
    }

    pub fn home(&self) -> Currency {
        self.home
    }

    pub fn form(&self) -> &SubscriptionForm {
        &self.form
    }

    pub fn rate_display(&self) -> RateDisplay {
        self.rate_display
    }

    pub fn last_result(&self) -> Option<&ValuationResult> {
        self.last_result.as_ref()
    }

    /// Reason the most recent recalculation was skipped, if it was.
    pub fn last_skipped(&self) -> Option<&Skipped> {
        self.last_skipped.as_ref()
    }

    pub fn selected_currency(&self) -> Option<Currency> {
        self.form.currency.parse().ok()
    }

    pub fn price_in_home(&self) -> f64 {
        valuation::price_in_home(&self.form)
    }

    pub fn has_pending_save(&self) -> bool {
        self.pending_save.is_pending()
    }

    /// Restores saved inputs, fills missing dates and resolves a rate.
    pub async fn load(&mut self, today: NaiveDate, now: Instant) {
        if let Some(saved) = self.inputs.load().await {
            debug!("Restored saved inputs");
            self.form = saved.merged_over(SubscriptionForm::default());
        }
        self.form.fill_default_dates(today);
        self.recalculate();
        self.init_rates(now).await;
    }

    /// Applies the home rate, a cached rate, or falls back to an automatic
    /// refresh.
    pub async fn init_rates(&mut self, now: Instant) {
        let Some(currency) = self.selected_currency() else {
            warn!("Unsupported currency selected: {}", self.form.currency);
            return;
        };

        if currency == self.home {
            self.apply_rate(&ExchangeRate::home(currency, Utc::now()));
            return;
        }

        match self.rates.get(currency).await {
            Some(rate) => self.apply_rate(&rate),
            None => {
                self.refresh_rate(RefreshTrigger::Automatic, now).await;
            }
        }
    }

    /// Refreshes the selected currency's rate. Notices raised here are
    /// stamped with `now`.
    pub async fn refresh_rate(&mut self, trigger: RefreshTrigger, now: Instant) -> RefreshOutcome {
        match self.selected_currency() {
            Some(currency) if currency != self.home => {}
            _ => return RefreshOutcome::NotNeeded,
        }

        if !self.policy.try_consume(trigger).await {
            self.push_notice(
                NoticeKind::RateLimitTip,
                "Refresh limit reached, try again later",
                now,
            );
            return RefreshOutcome::Denied;
        }

        let Some(ticket) = self.begin_fetch() else {
            return RefreshOutcome::NotNeeded;
        };
        let result = self.provider.fetch_rate(ticket.currency()).await;
        self.complete_fetch(ticket, result, now).await
    }

    /// Marks the rate as pending and records which currency is being fetched.
    pub fn begin_fetch(&mut self) -> Option<FetchTicket> {
        let currency = self.selected_currency()?;
        self.rate_display = RateDisplay::Pending;
        Some(FetchTicket { currency })
    }

    /// Commits a fetched rate, unless the user has switched to another
    /// currency in the meantime.
    pub async fn complete_fetch(
        &mut self,
        ticket: FetchTicket,
        result: Result<ExchangeRate, FetchError>,
        now: Instant,
    ) -> RefreshOutcome {
        let still_selected = self.selected_currency() == Some(ticket.currency);

        match result {
            Ok(rate) => {
                self.rates.put(ticket.currency, &rate).await;
                if !still_selected {
                    debug!("Discarding rate for {}; selection changed", ticket.currency);
                    return RefreshOutcome::Stale;
                }
                info!(currency = %ticket.currency, rate = rate.rate_to_home, "Exchange rate updated");
                self.apply_rate(&rate);
                self.flush().await;
                RefreshOutcome::Applied
            }
            Err(e) => {
                if !still_selected {
                    return RefreshOutcome::Stale;
                }
                warn!(error = %e, "Failed to fetch exchange rate");
                self.rate_display = RateDisplay::Error;
                self.push_notice(NoticeKind::Toast, "Failed to fetch exchange rate", now);
                RefreshOutcome::Failed
            }
        }
    }

    fn apply_rate(&mut self, rate: &ExchangeRate) {
        self.form.custom_rate = rate.rate_to_home.to_string();
        self.rate_display = RateDisplay::Value(rate.rate_to_home);
        self.recalculate();
    }

    fn recalculate(&mut self) {
        match valuation::evaluate(&self.form) {
            Ok(result) => {
                self.last_result = Some(result);
                self.last_skipped = None;
            }
            Err(skipped) => {
                debug!("Keeping previous valuation: {}", skipped);
                self.last_skipped = Some(skipped);
            }
        }
    }

    /// Applies an edit, recalculates and schedules a debounced save.
    pub fn edit_at(&mut self, now: Instant, edit: impl FnOnce(&mut SubscriptionForm)) {
        edit(&mut self.form);
        self.recalculate();
        self.pending_save.schedule(now);
    }

    pub async fn set_cycle(&mut self, cycle: CycleLength) {
        self.form.cycle = cycle.days().to_string();
        self.recalculate();
        self.flush().await;
    }

    pub async fn switch_currency(&mut self, code: &str, now: Instant) -> Result<()> {
        let currency: Currency = code
            .parse()
            .with_context(|| format!("Cannot switch to currency {code}"))?;
        self.form.currency = currency.code().to_string();
        self.init_rates(now).await;
        self.flush().await;
        Ok(())
    }

    /// Writes the form if the debounce deadline has passed.
    pub async fn save_if_due(&mut self, now: Instant) -> bool {
        if self.pending_save.take_due(now) {
            self.inputs.save(&self.form).await;
            return true;
        }
        false
    }

    pub async fn flush(&mut self) {
        self.pending_save.cancel();
        self.inputs.save(&self.form).await;
    }

    fn push_notice(&mut self, kind: NoticeKind, message: &str, now: Instant) {
        self.notices.retain(|n| n.kind != kind);
        self.notices.push(Notice {
            kind,
            message: message.to_string(),
            expires_at: now + NOTICE_LIFETIME,
        });
    }

    /// Notices still visible at `now`; expired ones are dropped.
    pub fn notices_at(&mut self, now: Instant) -> &[Notice] {
        self.notices.retain(|n| n.expires_at > now);
        &self.notices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryCollection;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::{Mutex, OnceLock};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockRateProvider {
        rates: Mutex<HashMap<Currency, f64>>,
        call_count: AtomicUsize,
    }

    impl MockRateProvider {
        fn new() -> Self {
            Self {
                rates: Mutex::new(HashMap::new()),
                call_count: AtomicUsize::new(0),
            }
        }

        fn add_rate(&self, currency: Currency, rate: f64) {
            self.rates.lock().unwrap().insert(currency, rate);
        }

        fn calls(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CurrencyRateProvider for MockRateProvider {
        async fn fetch_rate(&self, currency: Currency) -> Result<ExchangeRate, FetchError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            let rate = self.rates.lock().unwrap().get(&currency).copied();
            match rate {
                Some(rate) => Ok(ExchangeRate::new(currency, rate, Utc::now()).unwrap()),
                None => Err(FetchError::Data(format!("Currency not found: {currency}"))),
            }
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn t0() -> Instant {
        static START: OnceLock<Instant> = OnceLock::new();
        *START.get_or_init(Instant::now)
    }

    fn new_session() -> (Arc<MemoryCollection>, Arc<MockRateProvider>, Session) {
        let store = Arc::new(MemoryCollection::new());
        let provider = Arc::new(MockRateProvider::new());
        let session = Session::new(Currency::Cny, store.clone(), provider.clone());
        (store, provider, session)
    }

    async fn save_form(store: &Arc<MemoryCollection>, form: &SubscriptionForm) {
        InputStore::new(store.clone()).save(form).await;
    }

    fn yearly_usd_form() -> SubscriptionForm {
        SubscriptionForm {
            price: "365".to_string(),
            currency: "USD".to_string(),
            cycle: "365".to_string(),
            due_date: "2024-01-08".to_string(),
            trade_date: "2024-01-01".to_string(),
            custom_rate: String::new(),
        }
    }

    #[tokio::test]
    async fn test_load_fetches_and_computes() {
        let (store, provider, mut session) = new_session();
        provider.add_rate(Currency::Usd, 1.0 / 7.0);
        save_form(&store, &yearly_usd_form()).await;

        session.load(today(), t0()).await;

        assert_eq!(provider.calls(), 1);
        let result = session.last_result().unwrap();
        assert_eq!(result.remaining_days, 7);
        assert!((result.residual_value_home - 1.0).abs() < 1e-9);
        assert!(matches!(session.rate_display(), RateDisplay::Value(_)));
    }

    #[tokio::test]
    async fn test_cached_rate_skips_fetch() {
        let (store, provider, mut session) = new_session();
        save_form(&store, &yearly_usd_form()).await;
        RateCache::new(store.clone())
            .put(
                Currency::Usd,
                &ExchangeRate::new(Currency::Usd, 7.0, Utc::now()).unwrap(),
            )
            .await;

        session.load(today(), t0()).await;

        assert_eq!(provider.calls(), 0);
        assert_eq!(session.form().custom_rate, "7");
        assert!((session.last_result().unwrap().residual_value_home - 49.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_home_currency_uses_identity_rate() {
        let (store, provider, mut session) = new_session();
        let form = SubscriptionForm {
            currency: "CNY".to_string(),
            ..yearly_usd_form()
        };
        save_form(&store, &form).await;

        session.load(today(), t0()).await;

        assert_eq!(provider.calls(), 0);
        assert_eq!(session.rate_display(), RateDisplay::Value(1.0));
        assert_eq!(
            session.refresh_rate(RefreshTrigger::Manual, t0()).await,
            RefreshOutcome::NotNeeded
        );
    }

    #[tokio::test]
    async fn test_manual_refresh_is_limited() {
        let (store, provider, mut session) = new_session();
        provider.add_rate(Currency::Usd, 7.0);
        save_form(&store, &yearly_usd_form()).await;
        session.load(today(), t0()).await;

        assert_eq!(
            session.refresh_rate(RefreshTrigger::Manual, t0()).await,
            RefreshOutcome::Applied
        );
        assert_eq!(
            session.refresh_rate(RefreshTrigger::Manual, t0()).await,
            RefreshOutcome::Applied
        );
        assert_eq!(
            session.refresh_rate(RefreshTrigger::Manual, t0()).await,
            RefreshOutcome::Denied
        );
        // one automatic fetch on load plus two manual
        assert_eq!(provider.calls(), 3);

        let notices = session.notices_at(t0());
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, NoticeKind::RateLimitTip);
    }

    #[tokio::test]
    async fn test_fetch_failure_marks_error() {
        let (store, _provider, mut session) = new_session();
        save_form(&store, &yearly_usd_form()).await;

        session.load(today(), t0()).await;

        assert_eq!(session.rate_display(), RateDisplay::Error);
        assert_eq!(session.rate_display().to_string(), "ERR");
        // only the home conversion is missing
        let result = session.last_result().unwrap();
        assert_eq!(result.remaining_days, 7);
        assert!((result.residual_value_foreign - 7.0).abs() < 1e-9);
        assert_eq!(result.residual_value_home, 0.0);
        assert!(session.last_skipped().is_none());
        let notices = session.notices_at(t0());
        assert_eq!(notices[0].kind, NoticeKind::Toast);
    }

    #[tokio::test]
    async fn test_notices_expire() {
        let (store, _provider, mut session) = new_session();
        save_form(&store, &yearly_usd_form()).await;
        session.load(today(), t0()).await;

        let almost = t0() + NOTICE_LIFETIME - Duration::from_millis(1);
        assert_eq!(session.notices_at(almost).len(), 1);
        assert!(session.notices_at(t0() + NOTICE_LIFETIME).is_empty());
    }

    #[tokio::test]
    async fn test_stale_fetch_is_not_applied() {
        let (store, provider, mut session) = new_session();
        provider.add_rate(Currency::Usd, 7.0);
        provider.add_rate(Currency::Eur, 7.8);
        save_form(&store, &yearly_usd_form()).await;
        session.load(today(), t0()).await;

        let ticket = session.begin_fetch().unwrap();
        assert_eq!(ticket.currency(), Currency::Usd);
        assert_eq!(session.rate_display(), RateDisplay::Pending);

        session.switch_currency("EUR", t0()).await.unwrap();
        assert_eq!(session.rate_display(), RateDisplay::Value(7.8));

        let late = ExchangeRate::new(Currency::Usd, 6.5, Utc::now()).unwrap();
        let outcome = session.complete_fetch(ticket, Ok(late), t0()).await;

        assert_eq!(outcome, RefreshOutcome::Stale);
        assert_eq!(session.rate_display(), RateDisplay::Value(7.8));
        assert_eq!(session.form().custom_rate, "7.8");
        // the late rate is still valid for its own currency
        let cached = RateCache::new(store.clone()).get(Currency::Usd).await.unwrap();
        assert_eq!(cached.rate_to_home, 6.5);
    }

    #[tokio::test]
    async fn test_invalid_date_keeps_previous_result() {
        let (store, provider, mut session) = new_session();
        provider.add_rate(Currency::Usd, 7.0);
        save_form(&store, &yearly_usd_form()).await;
        session.load(today(), t0()).await;
        let before = *session.last_result().unwrap();

        session.edit_at(t0(), |form| {
            form.due_date = "2024-02-30".to_string();
        });

        assert_eq!(session.last_result(), Some(&before));
        assert!(matches!(
            session.last_skipped(),
            Some(Skipped::InvalidDate { field: "due", .. })
        ));
    }

    #[tokio::test]
    async fn test_edits_are_saved_after_debounce() {
        let (store, provider, mut session) = new_session();
        provider.add_rate(Currency::Usd, 7.0);
        save_form(&store, &yearly_usd_form()).await;
        session.load(today(), t0()).await;

        let start = t0();
        session.edit_at(start, |form| form.price = "40".to_string());
        session.edit_at(start + Duration::from_millis(200), |form| {
            form.price = "400".to_string()
        });

        assert!(!session.save_if_due(start + Duration::from_millis(600)).await);
        let saved = InputStore::new(store.clone()).load().await.unwrap();
        assert_eq!(saved.price, "365");

        assert!(session.save_if_due(start + Duration::from_millis(700)).await);
        let saved = InputStore::new(store.clone()).load().await.unwrap();
        assert_eq!(saved.price, "400");
        assert!(!session.has_pending_save());
    }

    #[tokio::test]
    async fn test_set_cycle_saves_immediately() {
        let (store, provider, mut session) = new_session();
        provider.add_rate(Currency::Usd, 1.0);
        save_form(&store, &yearly_usd_form()).await;
        session.load(today(), t0()).await;

        session.set_cycle(CycleLength::Month).await;

        let saved = InputStore::new(store.clone()).load().await.unwrap();
        assert_eq!(saved.cycle, "30");
        let result = session.last_result().unwrap();
        assert!((result.daily_price - 365.0 / 30.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_switch_to_unknown_currency_fails() {
        let (_store, _provider, mut session) = new_session();
        session.load(today(), t0()).await;
        assert!(session.switch_currency("XYZ", t0()).await.is_err());
    }

    #[tokio::test]
    async fn test_load_fills_default_dates() {
        let (_store, provider, mut session) = new_session();
        provider.add_rate(Currency::Usd, 7.0);
        session.load(today(), t0()).await;

        assert_eq!(session.form().trade_date, "2024-01-01");
        assert_eq!(session.form().due_date, "2024-11-25");
    }
}
