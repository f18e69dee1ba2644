use crate::core::ledger::{LedgerError, TransactionStore, next_sequence, sort_newest_first};
use crate::core::transaction::Transaction;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// A single JSON list of transactions on disk.
///
/// Used for the owner-less ledger and as the snapshot of the last successful
/// owner read. The owner argument is ignored; there is only one list.
pub struct LocalStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl LocalStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    async fn read(&self) -> Result<Vec<Transaction>, LedgerError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                LedgerError::Persistence(format!(
                    "Failed to parse local transactions {}: {e}",
                    self.path.display()
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(LedgerError::persistence(e)),
        }
    }

    async fn write(&self, txs: &[Transaction]) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(LedgerError::persistence)?;
        }
        let bytes = serde_json::to_vec_pretty(txs).map_err(LedgerError::persistence)?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(LedgerError::persistence)?;
        debug!(path = %self.path.display(), count = txs.len(), "Wrote local transactions");
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for LocalStore {
    async fn list(&self, _owner: &str) -> Result<Vec<Transaction>, LedgerError> {
        let _guard = self.lock.lock().await;
        let mut txs = self.read().await?;
        sort_newest_first(&mut txs);
        Ok(txs)
    }

    async fn create(&self, _owner: &str, tx: Transaction) -> Result<Transaction, LedgerError> {
        let _guard = self.lock.lock().await;
        let mut txs = self.read().await?;
        let tx = Transaction {
            sequence: next_sequence(&txs),
            ..tx
        };
        txs.push(tx.clone());
        self.write(&txs).await?;
        Ok(tx)
    }

    async fn update(&self, _owner: &str, tx: Transaction) -> Result<Transaction, LedgerError> {
        let _guard = self.lock.lock().await;
        let mut txs = self.read().await?;
        let existing = txs
            .iter_mut()
            .find(|t| t.id == tx.id)
            .ok_or_else(|| LedgerError::NotFound(tx.id.clone()))?;
        let tx = Transaction {
            sequence: existing.sequence,
            ..tx
        };
        *existing = tx.clone();
        self.write(&txs).await?;
        Ok(tx)
    }

    async fn delete(&self, _owner: &str, id: &str) -> Result<(), LedgerError> {
        let _guard = self.lock.lock().await;
        let mut txs = self.read().await?;
        let before = txs.len();
        txs.retain(|t| t.id != id);
        if txs.len() == before {
            return Err(LedgerError::NotFound(id.to_string()));
        }
        self.write(&txs).await
    }

    async fn replace_all(&self, _owner: &str, txs: Vec<Transaction>) -> Result<(), LedgerError> {
        let _guard = self.lock.lock().await;
        self.write(&txs).await
    }
}
