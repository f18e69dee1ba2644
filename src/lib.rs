pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

pub use crate::core::config;

use crate::core::transaction::TransactionInput;
use anyhow::Result;
use tracing::{debug, info};

pub enum AppCommand {
    Summary,
    List,
    Add(TransactionInput),
    Edit { id: String, input: TransactionInput },
    Remove { id: String },
    Sync,
}

/// Runs one command against the ledger selected by the configuration.
///
/// `owner` overrides the owner named in the configuration file.
pub async fn run_command(
    command: AppCommand,
    config_path: Option<&str>,
    owner: Option<&str>,
) -> Result<()> {
    info!("pnlfolio starting...");

    let config = match config_path {
        Some(path) => config::AppConfig::load_from_path(path)?,
        None => config::AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let owner = owner.map(str::to_string).or_else(|| config.owner.clone());
    let ledger = store::open_ledger(&config, owner)?;

    match command {
        AppCommand::Summary => {
            let providers = providers::build_providers(&config)?;
            let outcome = ledger.load_with_fallback().await;
            cli::summary::run(outcome, &providers, &config).await
        }
        AppCommand::List => cli::transactions::list(&ledger).await,
        AppCommand::Add(input) => cli::transactions::add(&ledger, input).await,
        AppCommand::Edit { id, input } => cli::transactions::edit(&ledger, &id, input).await,
        AppCommand::Remove { id } => cli::transactions::remove(&ledger, &id).await,
        AppCommand::Sync => cli::transactions::sync(&ledger).await,
    }
}
