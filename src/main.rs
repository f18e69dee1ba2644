use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, CommandFactory, Parser, Subcommand};
use pnlfolio::core::log::{LogFormat, init_logging};
use pnlfolio::core::transaction::{
    AssetClass, Operation, PriceInput, TransactionInput, parse_timestamp,
};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log layout: pretty or compact
    #[arg(long, global = true, default_value = "pretty")]
    log_format: LogFormat,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    /// Ledger owner, overrides the configured one
    #[arg(short, long, global = true)]
    owner: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct TransactionArgs {
    /// Asset symbol, e.g. BTC, AAPL or EURUSD
    symbol: String,
    /// buy or sell
    operation: Operation,
    /// Number of units
    quantity: f64,
    /// Asset class: crypto, stock or forex
    #[arg(short = 'k', long = "class", default_value = "crypto")]
    asset_class: AssetClass,
    /// Price per unit in USD
    #[arg(short, long, conflicts_with = "total", required_unless_present = "total")]
    price: Option<f64>,
    /// Total paid or received in USD, fees excluded
    #[arg(short, long)]
    total: Option<f64>,
    /// Fee in USD
    #[arg(short, long)]
    fee: Option<f64>,
    /// Trade date, YYYY-MM-DD or RFC 3339. Defaults to now
    #[arg(short, long, value_parser = parse_timestamp)]
    date: Option<DateTime<Utc>>,
}

impl From<TransactionArgs> for TransactionInput {
    fn from(args: TransactionArgs) -> Self {
        let price = match (args.price, args.total) {
            (_, Some(total)) => PriceInput::TotalCost(total),
            (Some(price), None) => PriceInput::UnitPrice(price),
            // Rejected by clap, and by validation if it ever gets through.
            (None, None) => PriceInput::UnitPrice(0.0),
        };
        TransactionInput {
            symbol: args.symbol,
            asset_class: args.asset_class,
            operation: args.operation,
            quantity: args.quantity,
            price,
            fee: args.fee,
            timestamp: args.date.unwrap_or_else(Utc::now),
        }
    }
}

impl From<Commands> for pnlfolio::AppCommand {
    fn from(cmd: Commands) -> pnlfolio::AppCommand {
        match cmd {
            Commands::Summary => pnlfolio::AppCommand::Summary,
            Commands::List => pnlfolio::AppCommand::List,
            Commands::Add(args) => pnlfolio::AppCommand::Add(args.into()),
            Commands::Edit { id, args } => pnlfolio::AppCommand::Edit {
                id,
                input: args.into(),
            },
            Commands::Remove { id } => pnlfolio::AppCommand::Remove { id },
            Commands::Sync => pnlfolio::AppCommand::Sync,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Value the ledger against live prices
    Summary,
    /// List recorded transactions, newest first
    List,
    /// Record a transaction
    Add(TransactionArgs),
    /// Replace a recorded transaction
    Edit {
        /// Id of the transaction to replace
        id: String,
        #[command(flatten)]
        args: TransactionArgs,
    },
    /// Delete a recorded transaction
    Remove {
        /// Id of the transaction to delete
        id: String,
    },
    /// Move transactions recorded without an owner into the owner's ledger
    Sync,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_format);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => pnlfolio::cli::setup::setup_at_path(path),
            None => pnlfolio::cli::setup::setup(),
        },
        Some(cmd) => {
            pnlfolio::run_command(
                cmd.into(),
                cli.config_path.as_deref(),
                cli.owner.as_deref(),
            )
            .await
        }
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
