use crate::core::ledger::{LedgerError, TransactionStore, next_sequence, sort_newest_first};
use crate::core::transaction::Transaction;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// In-memory transaction store, one list per owner.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<HashMap<String, Vec<Transaction>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn list(&self, owner: &str) -> Result<Vec<Transaction>, LedgerError> {
        let store = self.inner.lock().await;
        let mut txs = store.get(owner).cloned().unwrap_or_default();
        sort_newest_first(&mut txs);
        debug!(owner, count = txs.len(), "Memory store LIST");
        Ok(txs)
    }

    async fn create(&self, owner: &str, tx: Transaction) -> Result<Transaction, LedgerError> {
        let mut store = self.inner.lock().await;
        let txs = store.entry(owner.to_string()).or_default();
        let tx = Transaction {
            sequence: next_sequence(txs.iter()),
            ..tx
        };
        txs.push(tx.clone());
        debug!(owner, id = %tx.id, sequence = tx.sequence, "Memory store CREATE");
        Ok(tx)
    }

    async fn update(&self, owner: &str, tx: Transaction) -> Result<Transaction, LedgerError> {
        let mut store = self.inner.lock().await;
        let existing = store
            .get_mut(owner)
            .and_then(|txs| txs.iter_mut().find(|t| t.id == tx.id))
            .ok_or_else(|| LedgerError::NotFound(tx.id.clone()))?;
        let tx = Transaction {
            sequence: existing.sequence,
            ..tx
        };
        *existing = tx.clone();
        debug!(owner, id = %tx.id, "Memory store UPDATE");
        Ok(tx)
    }

    async fn delete(&self, owner: &str, id: &str) -> Result<(), LedgerError> {
        let mut store = self.inner.lock().await;
        let txs = store
            .get_mut(owner)
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;
        let before = txs.len();
        txs.retain(|t| t.id != id);
        if txs.len() == before {
            return Err(LedgerError::NotFound(id.to_string()));
        }
        debug!(owner, id, "Memory store DELETE");
        Ok(())
    }

    async fn replace_all(&self, owner: &str, txs: Vec<Transaction>) -> Result<(), LedgerError> {
        let mut store = self.inner.lock().await;
        store.insert(owner.to_string(), txs);
        Ok(())
    }
}
