use crate::core::ledger::{LedgerError, TransactionStore, next_sequence, sort_newest_first};
use crate::core::transaction::Transaction;
use async_trait::async_trait;
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::path::Path;
use tracing::debug;

const PARTITION: &str = "transactions";

/// Transaction store on a fjall keyspace. Keys are `<owner>\0<id>`, values
/// are JSON encoded transactions.
pub struct DiskStore {
    keyspace: Keyspace,
    partition: PartitionHandle,
}

fn key(owner: &str, id: &str) -> Vec<u8> {
    let mut key = owner_prefix(owner);
    key.extend_from_slice(id.as_bytes());
    key
}

fn owner_prefix(owner: &str) -> Vec<u8> {
    let mut prefix = owner.as_bytes().to_vec();
    prefix.push(0);
    prefix
}

impl DiskStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(path)?;
        let keyspace = fjall::Config::new(path).open()?;
        let partition = keyspace.open_partition(PARTITION, PartitionCreateOptions::default())?;
        Ok(Self {
            keyspace,
            partition,
        })
    }

    fn persist(&self) -> Result<(), LedgerError> {
        self.keyspace
            .persist(PersistMode::SyncAll)
            .map_err(LedgerError::persistence)
    }

    fn contains(&self, owner: &str, id: &str) -> Result<bool, LedgerError> {
        self.partition
            .contains_key(key(owner, id))
            .map_err(LedgerError::persistence)
    }

    fn read(&self, owner: &str, id: &str) -> Result<Option<Transaction>, LedgerError> {
        let Some(value) = self
            .partition
            .get(key(owner, id))
            .map_err(LedgerError::persistence)?
        else {
            return Ok(None);
        };
        serde_json::from_slice(&value)
            .map(Some)
            .map_err(LedgerError::persistence)
    }

    /// Records of `owner` in key order, which is id order and says nothing
    /// about when they were written.
    fn scan(&self, owner: &str) -> Result<Vec<Transaction>, LedgerError> {
        let mut txs = Vec::new();
        for item in self.partition.prefix(owner_prefix(owner)) {
            let (_, value) = item.map_err(LedgerError::persistence)?;
            let tx: Transaction = serde_json::from_slice(&value).map_err(LedgerError::persistence)?;
            txs.push(tx);
        }
        Ok(txs)
    }

    fn write(&self, owner: &str, tx: &Transaction) -> Result<(), LedgerError> {
        let value = serde_json::to_vec(tx).map_err(LedgerError::persistence)?;
        self.partition
            .insert(key(owner, &tx.id), value)
            .map_err(LedgerError::persistence)
    }
}

#[async_trait]
impl TransactionStore for DiskStore {
    async fn list(&self, owner: &str) -> Result<Vec<Transaction>, LedgerError> {
        let mut txs = self.scan(owner)?;
        sort_newest_first(&mut txs);
        debug!(owner, count = txs.len(), "Disk store LIST");
        Ok(txs)
    }

    async fn create(&self, owner: &str, tx: Transaction) -> Result<Transaction, LedgerError> {
        let tx = Transaction {
            sequence: next_sequence(&self.scan(owner)?),
            ..tx
        };
        self.write(owner, &tx)?;
        self.persist()?;
        debug!(owner, id = %tx.id, sequence = tx.sequence, "Disk store CREATE");
        Ok(tx)
    }

    async fn update(&self, owner: &str, tx: Transaction) -> Result<Transaction, LedgerError> {
        let Some(existing) = self.read(owner, &tx.id)? else {
            return Err(LedgerError::NotFound(tx.id));
        };
        let tx = Transaction {
            sequence: existing.sequence,
            ..tx
        };
        self.write(owner, &tx)?;
        self.persist()?;
        debug!(owner, id = %tx.id, "Disk store UPDATE");
        Ok(tx)
    }

    async fn delete(&self, owner: &str, id: &str) -> Result<(), LedgerError> {
        if !self.contains(owner, id)? {
            return Err(LedgerError::NotFound(id.to_string()));
        }
        self.partition
            .remove(key(owner, id))
            .map_err(LedgerError::persistence)?;
        self.persist()?;
        debug!(owner, id, "Disk store DELETE");
        Ok(())
    }

    async fn replace_all(&self, owner: &str, txs: Vec<Transaction>) -> Result<(), LedgerError> {
        for tx in self.scan(owner)? {
            self.partition
                .remove(key(owner, &tx.id))
                .map_err(LedgerError::persistence)?;
        }
        for tx in &txs {
            self.write(owner, tx)?;
        }
        self.persist()
    }
}
