use super::ui;
use crate::core::currency::{Currency, symbol_for};
use crate::core::inputs::SubscriptionForm;
use crate::core::session::{RateDisplay, Session};
use crate::core::valuation::{CycleLength, Skipped, ValuationResult, parse_price, price_in_home};
use comfy_table::Cell;

const BAR_WIDTH: usize = 30;

/// Everything the report needs, detached from the session so it can be
/// rendered from any state.
pub struct ReportView<'a> {
    pub home: Currency,
    pub form: &'a SubscriptionForm,
    pub rate: RateDisplay,
    pub result: Option<&'a ValuationResult>,
    pub skipped: Option<&'a Skipped>,
}

impl<'a> ReportView<'a> {
    pub fn from_session(session: &'a Session) -> Self {
        Self {
            home: session.home(),
            form: session.form(),
            rate: session.rate_display(),
            result: session.last_result(),
            skipped: session.last_skipped(),
        }
    }
}

pub fn cycle_label(form: &SubscriptionForm) -> String {
    form.cycle
        .parse::<CycleLength>()
        .map(|c| c.to_string())
        .unwrap_or_else(|_| form.cycle.clone())
}

pub fn render(view: &ReportView) -> String {
    let form = view.form;
    let home = view.home;
    let currency = form.currency.as_str();

    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Item"), ui::header_cell("Value")]);

    table.add_row(vec![
        Cell::new("Renewal price"),
        Cell::new(format!(
            "{}{:.2} {} ({}), ≈ {:.2} {}",
            symbol_for(currency),
            parse_price(&form.price),
            currency,
            cycle_label(form),
            price_in_home(form),
            home
        )),
    ]);
    table.add_row(vec![
        Cell::new(format!("Rate (1 {currency} in {home})")),
        Cell::new(view.rate.to_string()),
    ]);
    table.add_row(vec![
        Cell::new("Trade date"),
        Cell::new(form.trade_date.as_str()),
    ]);
    table.add_row(vec![Cell::new("Due date"), Cell::new(form.due_date.as_str())]);

    let result = view.result;
    table.add_row(vec![
        Cell::new("Remaining days"),
        ui::format_optional_cell(result.map(|r| r.remaining_days), |d| d.to_string()),
    ]);
    table.add_row(vec![
        Cell::new(format!("Daily price ({currency})")),
        ui::format_optional_cell(result.map(|r| r.daily_price), |p| format!("{p:.4}")),
    ]);
    table.add_row(vec![
        Cell::new(format!("Residual value ({currency})")),
        ui::format_optional_cell(result.map(|r| r.residual_value_foreign), |v| {
            format!("{v:.2}")
        }),
    ]);
    table.add_row(vec![
        Cell::new(format!("Residual value ({home})")),
        match result {
            Some(r) => ui::format_total_cell(format!("{:.2}", r.residual_value_home)),
            None => ui::format_optional_cell(None::<f64>, |v| v.to_string()),
        },
    ]);

    let mut output = format!(
        "{}\n\n",
        ui::style_text("Subscription residual value", ui::StyleType::Title)
    );
    output.push_str(&table.to_string());

    if let Some(result) = result {
        output.push_str(&format!(
            "\n\n{} {} {:.1}%",
            ui::style_text("Remaining:", ui::StyleType::TotalLabel),
            ui::bar(result.bar_percent(), BAR_WIDTH),
            result.progress_percent
        ));
    }

    if let Some(skipped) = view.skipped {
        output.push_str(&format!(
            "\n\n{}",
            ui::style_text(
                &format!("Inputs not evaluated, showing last result: {skipped}"),
                ui::StyleType::Error
            )
        ));
    }

    output
}

pub fn render_currencies(home: Currency) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Code"), ui::header_cell("Symbol")]);
    for currency in Currency::ALL {
        let code = if currency == home {
            format!("{} {}", currency, ui::style_text("(home)", ui::StyleType::Subtle))
        } else {
            currency.to_string()
        };
        table.add_row(vec![Cell::new(code), Cell::new(currency.symbol())]);
    }
    table.to_string()
}
