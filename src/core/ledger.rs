//! The boundary to wherever transactions are persisted.
//!
//! A [`Ledger`] routes reads and writes either to an owner-scoped
//! [`TransactionStore`] or, when no owner is known, to the local list. The
//! local list doubles as the last known snapshot of the owner's data so a
//! failing store never costs the user their history.

use crate::core::transaction::{Transaction, TransactionInput};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },
    #[error("Transaction not found: {0}")]
    NotFound(String),
    #[error("Persistence failure: {0}")]
    Persistence(String),
}

impl LedgerError {
    pub fn validation(field: &str, reason: &str) -> Self {
        LedgerError::Validation {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn persistence(err: impl std::fmt::Display) -> Self {
        LedgerError::Persistence(err.to_string())
    }
}

/// Owner-scoped CRUD over transactions.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// All transactions of `owner`, newest first.
    async fn list(&self, owner: &str) -> Result<Vec<Transaction>, LedgerError>;

    async fn create(&self, owner: &str, tx: Transaction) -> Result<Transaction, LedgerError>;

    /// Replaces the record `id` keeping its identity.
    async fn update(&self, owner: &str, tx: Transaction) -> Result<Transaction, LedgerError>;

    async fn delete(&self, owner: &str, id: &str) -> Result<(), LedgerError>;

    /// Replaces every record of `owner`.
    async fn replace_all(&self, owner: &str, txs: Vec<Transaction>) -> Result<(), LedgerError>;
}

/// Sorts newest first. Equal timestamps put the later insertion first.
pub fn sort_newest_first(txs: &mut [Transaction]) {
    txs.sort_by_key(|tx| std::cmp::Reverse(tx.ledger_order()));
}

/// Sequence for the next record appended after `existing`.
pub fn next_sequence<'a>(existing: impl IntoIterator<Item = &'a Transaction>) -> u64 {
    existing
        .into_iter()
        .map(|tx| tx.sequence)
        .max()
        .map_or(1, |last| last + 1)
}

/// Result of a read that may have fallen back to the local snapshot.
#[derive(Debug)]
pub struct LoadOutcome {
    pub transactions: Vec<Transaction>,
    /// Set when the owner store failed and the snapshot was used instead.
    pub error: Option<LedgerError>,
}

pub struct Ledger {
    owner: Option<String>,
    store: Arc<dyn TransactionStore>,
    local: Arc<dyn TransactionStore>,
}

/// Owner key under which the local list is kept.
pub const LOCAL_OWNER: &str = "local";

impl Ledger {
    pub fn new(
        owner: Option<String>,
        store: Arc<dyn TransactionStore>,
        local: Arc<dyn TransactionStore>,
    ) -> Self {
        Ledger {
            owner: owner.filter(|o| !o.trim().is_empty()),
            store,
            local,
        }
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    fn target(&self) -> (&dyn TransactionStore, &str) {
        match &self.owner {
            Some(owner) => (self.store.as_ref(), owner.as_str()),
            None => (self.local.as_ref(), LOCAL_OWNER),
        }
    }

    /// Reads the full history, newest first. A successful owner read also
    /// refreshes the local snapshot.
    pub async fn load(&self) -> Result<Vec<Transaction>, LedgerError> {
        let (store, owner) = self.target();
        let txs = store.list(owner).await?;
        if self.owner.is_some() {
            if let Err(e) = self.local.replace_all(LOCAL_OWNER, txs.clone()).await {
                warn!(error = %e, "Failed to refresh local snapshot");
            }
        }
        debug!(count = txs.len(), "Loaded transactions");
        Ok(txs)
    }

    /// Like [`Ledger::load`], but answers with the local snapshot when the
    /// owner store cannot be read.
    pub async fn load_with_fallback(&self) -> LoadOutcome {
        match self.load().await {
            Ok(transactions) => LoadOutcome {
                transactions,
                error: None,
            },
            Err(e) if self.owner.is_some() => {
                warn!(error = %e, "Owner store unavailable, using local snapshot");
                let transactions = self.local.list(LOCAL_OWNER).await.unwrap_or_default();
                LoadOutcome {
                    transactions,
                    error: Some(e),
                }
            }
            Err(e) => LoadOutcome {
                transactions: Vec::new(),
                error: Some(e),
            },
        }
    }

    pub async fn add(&self, input: TransactionInput) -> Result<Transaction, LedgerError> {
        let id = match &self.owner {
            Some(_) => uuid::Uuid::new_v4().to_string(),
            None => format!("local_{}", uuid::Uuid::new_v4()),
        };
        let tx = input.into_transaction(id)?;
        let (store, owner) = self.target();
        let created = store.create(owner, tx).await?;
        info!(id = %created.id, symbol = %created.symbol, operation = %created.operation, "Added transaction");
        Ok(created)
    }

    pub async fn update(&self, id: &str, input: TransactionInput) -> Result<Transaction, LedgerError> {
        let tx = input.into_transaction(id)?;
        let (store, owner) = self.target();
        let updated = store.update(owner, tx).await?;
        info!(id = %updated.id, "Updated transaction");
        Ok(updated)
    }

    pub async fn delete(&self, id: &str) -> Result<(), LedgerError> {
        let (store, owner) = self.target();
        store.delete(owner, id).await?;
        info!(id, "Deleted transaction");
        Ok(())
    }

    /// Moves transactions recorded without an owner into the owner store.
    ///
    /// Records already present in the owner store (same symbol, timestamp,
    /// quantity, price and operation) are skipped. The local list is cleared
    /// once everything has been written. Returns the number of records added.
    pub async fn sync_local_to_owner(&self) -> Result<usize, LedgerError> {
        let Some(owner) = &self.owner else {
            return Err(LedgerError::validation("owner", "required to sync local transactions"));
        };

        let local = self.local.list(LOCAL_OWNER).await?;
        if local.is_empty() {
            return Ok(0);
        }

        let existing: HashSet<_> = self
            .store
            .list(owner)
            .await?
            .iter()
            .map(Transaction::dedup_key)
            .collect();

        let mut added = 0;
        let mut seen = existing;
        // Oldest first so the owner store assigns sequences in ledger order.
        for tx in local.into_iter().rev() {
            if !seen.insert(tx.dedup_key()) {
                debug!(id = %tx.id, "Skipping already synced transaction");
                continue;
            }
            let tx = Transaction {
                id: uuid::Uuid::new_v4().to_string(),
                ..tx
            };
            self.store.create(owner, tx).await?;
            added += 1;
        }

        self.local.replace_all(LOCAL_OWNER, Vec::new()).await?;
        info!(added, owner = %owner, "Synced local transactions");
        Ok(added)
    }
}
