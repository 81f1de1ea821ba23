use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use residue::core::log::init_logging;
use residue::core::valuation::CycleLength;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct SetArgs {
    /// Renewal price in the subscription currency
    #[arg(long)]
    price: Option<String>,

    /// Currency code of the price, e.g. USD
    #[arg(long)]
    currency: Option<String>,

    /// Renewal cycle: month, quarter, half-year, year, two-years, three-years or a number of days
    #[arg(long)]
    cycle: Option<CycleLength>,

    /// Trade (purchase) date, YYYY-MM-DD
    #[arg(long)]
    purchase: Option<String>,

    /// Due (expiry) date, YYYY-MM-DD
    #[arg(long)]
    due: Option<String>,

    /// Home-currency value of one unit of the subscription currency
    #[arg(long)]
    rate: Option<String>,
}

impl From<SetArgs> for residue::FormEdits {
    fn from(args: SetArgs) -> residue::FormEdits {
        residue::FormEdits {
            price: args.price,
            currency: args.currency,
            cycle: args.cycle,
            trade_date: args.purchase,
            due_date: args.due,
            rate: args.rate,
        }
    }
}

impl From<Commands> for residue::AppCommand {
    fn from(cmd: Commands) -> residue::AppCommand {
        match cmd {
            Commands::Show => residue::AppCommand::Show,
            Commands::Set(args) => residue::AppCommand::Set(args.into()),
            Commands::Refresh => residue::AppCommand::Refresh,
            Commands::Summary => residue::AppCommand::Summary,
            Commands::Currencies => residue::AppCommand::Currencies,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Display the residual value of the saved subscription
    Show,
    /// Update the saved subscription and display the result
    Set(SetArgs),
    /// Fetch a fresh exchange rate (limited to 2 per 12 hours)
    Refresh,
    /// Print a Markdown summary
    Summary,
    /// List supported currencies
    Currencies,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => residue::cli::setup::setup(),
        Some(cmd) => residue::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
