pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::cli::report::{self, ReportView};
use crate::core::config::AppConfig;
use crate::core::refresh::RefreshTrigger;
use crate::core::session::{RefreshOutcome, Session};
use crate::core::valuation::CycleLength;
use crate::providers::open_er_api::OpenErApiProvider;
use anyhow::Result;
use chrono::Local;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Field changes requested on the command line. Values are taken as typed.
#[derive(Debug, Default, Clone)]
pub struct FormEdits {
    pub price: Option<String>,
    pub currency: Option<String>,
    pub cycle: Option<CycleLength>,
    pub trade_date: Option<String>,
    pub due_date: Option<String>,
    pub rate: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppCommand {
    Show,
    Set(FormEdits),
    Refresh,
    Summary,
    Currencies,
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("Residue starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let home = config.home_currency()?;
    if let AppCommand::Currencies = command {
        println!("{}", report::render_currencies(home));
        return Ok(());
    }

    let store = store::open_store(&config);
    let provider = Arc::new(OpenErApiProvider::new(config.rate_source_url(), home)?);
    let mut session = Session::new(home, store, provider);

    let started = Instant::now();
    let spinner = cli::ui::new_spinner("Loading exchange rate...");
    session.load(Local::now().date_naive(), started).await;
    spinner.finish_and_clear();

    match command {
        AppCommand::Show => {}
        AppCommand::Set(edits) => apply_edits(&mut session, edits, started).await?,
        AppCommand::Refresh => {
            let spinner = cli::ui::new_spinner("Refreshing exchange rate...");
            let outcome = session
                .refresh_rate(RefreshTrigger::Manual, started)
                .await;
            spinner.finish_and_clear();
            if outcome == RefreshOutcome::NotNeeded {
                println!("{} needs no exchange rate", session.form().currency);
            }
        }
        AppCommand::Summary => {
            println!("{}", cli::summary::markdown(&ReportView::from_session(&session)));
            return Ok(());
        }
        AppCommand::Currencies => unreachable!("Currencies command is handled before loading"),
    }

    // One invocation is a single moment for notices, so all of them print.
    for notice in session.notices_at(started) {
        eprintln!(
            "{}",
            cli::ui::style_text(&notice.message, cli::ui::StyleType::Error)
        );
    }
    println!("{}", report::render(&ReportView::from_session(&session)));
    Ok(())
}

async fn apply_edits(session: &mut Session, edits: FormEdits, now: Instant) -> Result<()> {
    if let Some(currency) = &edits.currency {
        session.switch_currency(currency, now).await?;
    }
    if let Some(cycle) = edits.cycle {
        session.set_cycle(cycle).await;
    }

    session.edit_at(now, |form| {
        if let Some(price) = edits.price {
            form.price = price;
        }
        if let Some(trade_date) = edits.trade_date {
            form.trade_date = trade_date;
        }
        if let Some(due_date) = edits.due_date {
            form.due_date = due_date;
        }
        if let Some(rate) = edits.rate {
            form.custom_rate = rate;
        }
    });
    // The process exits right after, so don't wait out the debounce.
    session.flush().await;
    Ok(())
}
