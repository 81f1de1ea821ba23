//! Markdown summary of a valuation, suitable for pasting into a listing.

use super::report::{ReportView, cycle_label};
use crate::core::valuation::parse_price;

pub fn markdown(view: &ReportView) -> String {
    let form = view.form;
    let home = view.home;
    let currency = form.currency.as_str();

    let price = if form.price.trim().is_empty() {
        "0"
    } else {
        form.price.trim()
    };
    let rate = parse_price(&form.custom_rate);
    let price_home = parse_price(&form.price) * rate;

    let (days, value_home, value_foreign) = view.result.map_or((0, 0.0, 0.0), |r| {
        (
            r.remaining_days,
            r.residual_value_home,
            r.residual_value_foreign,
        )
    });

    format!(
        "## Subscription residual value\n\
         - Trade date: {trade}\n\
         - Exchange rate: 1 {currency} ≈ {rate:.4} {home}\n\
         - Renewal price: {price} {currency} {cycle} (about {price_home:.2} {home})\n\
         - Remaining days: {days} (due {due})\n\
         - Residual value: {value_home:.2} {home} (about {value_foreign:.2} {currency})",
        trade = form.trade_date,
        cycle = cycle_label(form),
        due = form.due_date,
    )
}
