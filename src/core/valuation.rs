//! Residual value calculations for prepaid subscriptions.

use crate::core::currency::ExchangeRate;
use crate::core::inputs::{DATE_FORMAT, SubscriptionForm};
use anyhow::{Result, anyhow, ensure};
use chrono::NaiveDate;
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_CYCLE_DAYS: u32 = 365;

/// Renewal cycle presets. Any positive number of days is accepted as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleLength {
    Month,
    Quarter,
    HalfYear,
    Year,
    TwoYears,
    ThreeYears,
    Days(u32),
}

impl CycleLength {
    pub fn days(&self) -> u32 {
        match self {
            CycleLength::Month => 30,
            CycleLength::Quarter => 90,
            CycleLength::HalfYear => 180,
            CycleLength::Year => 365,
            CycleLength::TwoYears => 730,
            CycleLength::ThreeYears => 1095,
            CycleLength::Days(days) => *days,
        }
    }

    pub fn from_days(days: u32) -> Self {
        match days {
            30 => CycleLength::Month,
            90 => CycleLength::Quarter,
            180 => CycleLength::HalfYear,
            365 => CycleLength::Year,
            730 => CycleLength::TwoYears,
            1095 => CycleLength::ThreeYears,
            other => CycleLength::Days(other),
        }
    }
}

impl Display for CycleLength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleLength::Month => write!(f, "monthly"),
            CycleLength::Quarter => write!(f, "quarterly"),
            CycleLength::HalfYear => write!(f, "half-yearly"),
            CycleLength::Year => write!(f, "yearly"),
            CycleLength::TwoYears => write!(f, "every 2 years"),
            CycleLength::ThreeYears => write!(f, "every 3 years"),
            CycleLength::Days(days) => write!(f, "every {days} days"),
        }
    }
}

impl FromStr for CycleLength {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cycle = match s.trim().to_lowercase().as_str() {
            "month" | "monthly" => CycleLength::Month,
            "quarter" | "quarterly" => CycleLength::Quarter,
            "half-year" | "half-yearly" | "semiannual" => CycleLength::HalfYear,
            "year" | "yearly" | "annual" => CycleLength::Year,
            "two-years" | "biennial" => CycleLength::TwoYears,
            "three-years" | "triennial" => CycleLength::ThreeYears,
            other => {
                let days: u32 = other
                    .parse()
                    .map_err(|_| anyhow!("Invalid cycle length: {}", s))?;
                ensure!(days > 0, "Cycle length must be at least one day");
                CycleLength::from_days(days)
            }
        };
        Ok(cycle)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionInput {
    price: f64,
    currency: String,
    cycle_days: u32,
    purchase_date: NaiveDate,
    due_date: NaiveDate,
}

impl SubscriptionInput {
    pub fn new(
        price: f64,
        currency: &str,
        cycle_days: u32,
        purchase_date: NaiveDate,
        due_date: NaiveDate,
    ) -> Result<Self> {
        ensure!(
            price.is_finite() && price >= 0.0,
            "Price must be a non-negative number"
        );
        ensure!(cycle_days > 0, "Cycle length must be at least one day");
        Ok(Self {
            price,
            currency: currency.to_string(),
            cycle_days,
            purchase_date,
            due_date,
        })
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn cycle_days(&self) -> u32 {
        self.cycle_days
    }

    pub fn purchase_date(&self) -> NaiveDate {
        self.purchase_date
    }

    pub fn due_date(&self) -> NaiveDate {
        self.due_date
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValuationResult {
    pub remaining_days: u64,
    pub daily_price: f64,
    pub residual_value_foreign: f64,
    pub residual_value_home: f64,
    /// Not clamped; see [`ValuationResult::bar_percent`]
    pub progress_percent: f64,
}

impl ValuationResult {
    /// Progress clamped to `[0, 100]` for drawing a bar. Labels should keep
    /// using `progress_percent`.
    pub fn bar_percent(&self) -> f64 {
        self.progress_percent.clamp(0.0, 100.0)
    }
}

/// Why a recalculation did not happen. The previous result stays current.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Skipped {
    #[error("invalid {field} date: {value:?}")]
    InvalidDate { field: &'static str, value: String },
    #[error("invalid price: {0:?}")]
    InvalidPrice(String),
    #[error("invalid cycle length: {0:?}")]
    InvalidCycle(String),
}

pub fn compute(input: &SubscriptionInput, rate: &ExchangeRate) -> ValuationResult {
    compute_with_rate(input, rate.rate_to_home)
}

fn compute_with_rate(input: &SubscriptionInput, rate_to_home: f64) -> ValuationResult {
    let remaining = (input.due_date - input.purchase_date).num_days();
    let daily_price = input.price / f64::from(input.cycle_days);

    if remaining <= 0 {
        return ValuationResult {
            remaining_days: 0,
            daily_price,
            residual_value_foreign: 0.0,
            residual_value_home: 0.0,
            progress_percent: 0.0,
        };
    }

    let remaining_days = remaining as u64;
    let cycle_days = u64::from(input.cycle_days);
    let residual_value_foreign = daily_price * remaining_days as f64;
    let residual_value_home = residual_value_foreign * rate_to_home;

    // Due dates several cycles ahead are measured against the whole span
    // of cycles they fall within.
    let base_days = if remaining_days <= cycle_days {
        cycle_days
    } else {
        cycle_days * remaining_days.div_ceil(cycle_days)
    };
    let progress_percent = remaining_days as f64 / base_days as f64 * 100.0;

    ValuationResult {
        remaining_days,
        daily_price,
        residual_value_foreign,
        residual_value_home,
        progress_percent,
    }
}

/// Parses a price field; blank or non-numeric text counts as zero.
pub fn parse_price(text: &str) -> f64 {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite())
        .unwrap_or(0.0)
}

fn parse_date(field: &'static str, text: &str) -> Result<NaiveDate, Skipped> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).map_err(|_| Skipped::InvalidDate {
        field,
        value: text.to_string(),
    })
}

/// Parses the rate field. Anything that is not a positive number means no
/// home conversion is possible, so the home value comes out as zero.
fn parse_rate(text: &str) -> f64 {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|r| r.is_finite() && *r > 0.0)
        .unwrap_or(0.0)
}

/// Evaluates the raw form using the rate in its `custom_rate` field.
pub fn evaluate(form: &SubscriptionForm) -> Result<ValuationResult, Skipped> {
    let due_date = parse_date("due", &form.due_date)?;
    let purchase_date = parse_date("trade", &form.trade_date)?;

    let price = parse_price(&form.price);
    if price < 0.0 {
        return Err(Skipped::InvalidPrice(form.price.clone()));
    }

    let cycle_days = if form.cycle.trim().is_empty() {
        DEFAULT_CYCLE_DAYS
    } else {
        form.cycle
            .parse::<CycleLength>()
            .map_err(|_| Skipped::InvalidCycle(form.cycle.clone()))?
            .days()
    };

    let rate_to_home = parse_rate(&form.custom_rate);

    let input = SubscriptionInput::new(price, &form.currency, cycle_days, purchase_date, due_date)
        .map_err(|_| Skipped::InvalidPrice(form.price.clone()))?;
    Ok(compute_with_rate(&input, rate_to_home))
}

/// Full renewal price converted to the home currency, shown next to the
/// price field. Unparseable values count as zero.
pub fn price_in_home(form: &SubscriptionForm) -> f64 {
    parse_price(&form.price) * parse_rate(&form.custom_rate)
}
