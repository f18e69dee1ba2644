pub mod disk;
pub mod local;
pub mod memory;

use crate::core::config::AppConfig;
use crate::core::ledger::Ledger;
use anyhow::{Context, Result};
use disk::DiskStore;
use local::LocalStore;
use std::sync::Arc;

/// Opens the configured stores under the data directory and wires them into
/// a ledger for `owner`.
pub fn open_ledger(config: &AppConfig, owner: Option<String>) -> Result<Ledger> {
    let data_path = config.data_path()?;
    let disk = DiskStore::open(&data_path.join("ledger")).with_context(|| {
        format!(
            "Failed to open transaction store at {}",
            data_path.join("ledger").display()
        )
    })?;
    let local = LocalStore::new(data_path.join("local_transactions.json"));

    Ok(Ledger::new(owner, Arc::new(disk), Arc::new(local)))
}
