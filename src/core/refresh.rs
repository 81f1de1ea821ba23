//! Metering of user-triggered exchange-rate refreshes.

use crate::core::cache::KeyValueCollection;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

pub const MAX_MANUAL_REFRESHES: u32 = 2;
pub const REFRESH_WINDOW_HOURS: i64 = 12;

const REFRESH_LIMIT_KEY: &str = "refresh_limit";
const MIN_QUOTA_TTL: std::time::Duration = std::time::Duration::from_secs(6 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    /// Cache miss on load or currency switch; never metered
    Automatic,
    /// Explicit user request
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshQuota {
    pub attempts_used: u32,
    pub window_reset_at: DateTime<Utc>,
}

impl RefreshQuota {
    fn fresh(now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            attempts_used: 0,
            window_reset_at: now + window,
        }
    }
}

pub struct RefreshPolicy {
    store: Arc<dyn KeyValueCollection>,
    max_attempts: u32,
    window: Duration,
}

impl RefreshPolicy {
    pub fn new(store: Arc<dyn KeyValueCollection>) -> Self {
        Self::with_limits(
            store,
            MAX_MANUAL_REFRESHES,
            Duration::hours(REFRESH_WINDOW_HOURS),
        )
    }

    pub fn with_limits(store: Arc<dyn KeyValueCollection>, max_attempts: u32, window: Duration) -> Self {
        Self {
            store,
            max_attempts,
            window,
        }
    }

    /// Returns the quota in effect at `now`. Missing, corrupt or elapsed
    /// quotas read as a fresh window starting at `now`.
    pub async fn quota_at(&self, now: DateTime<Utc>) -> RefreshQuota {
        let stored = match self.store.get(REFRESH_LIMIT_KEY).await {
            Some(raw) => match serde_json::from_str::<RefreshQuota>(&raw) {
                Ok(quota) => Some(quota),
                Err(e) => {
                    debug!("Ignoring malformed refresh quota: {}", e);
                    None
                }
            },
            None => None,
        };

        match stored {
            Some(quota) if now < quota.window_reset_at => quota,
            _ => RefreshQuota::fresh(now, self.window),
        }
    }

    pub async fn try_consume(&self, trigger: RefreshTrigger) -> bool {
        self.try_consume_at(trigger, Utc::now()).await
    }

    pub async fn try_consume_at(&self, trigger: RefreshTrigger, now: DateTime<Utc>) -> bool {
        if trigger == RefreshTrigger::Automatic {
            return true;
        }

        let mut quota = self.quota_at(now).await;
        if quota.attempts_used >= self.max_attempts {
            info!(
                reset_at = %quota.window_reset_at,
                "Manual refresh limit reached"
            );
            return false;
        }

        quota.attempts_used += 1;
        let ttl = (quota.window_reset_at - now)
            .to_std()
            .unwrap_or_default()
            .max(MIN_QUOTA_TTL);

        match serde_json::to_string(&quota) {
            Ok(payload) => {
                self.store
                    .put(REFRESH_LIMIT_KEY, payload, Some(ttl))
                    .await
            }
            Err(e) => debug!("Failed to serialize refresh quota: {}", e),
        }
        debug!(attempts_used = quota.attempts_used, "Manual refresh allowed");
        true
    }
}
