use crate::domain::pending::{PendingTransaction, TxnRef};
use crate::domain::ports::PendingTransactionStore;
use crate::error::{ReconcileError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Options};
use std::path::Path;
use std::sync::Arc;

/// Column Family holding pending transactions keyed by reference.
pub const CF_PENDING: &str = "pending_transactions";

/// A persistent pending-transaction store backed by RocksDB.
///
/// Values are the JSON encoding of `PendingTransaction`; keys are the raw
/// reference bytes. Pending bookings therefore survive an app restart and can
/// still be matched when the provider redirect cold-starts the process.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBPendingStore {
    db: Arc<DB>,
}

impl RocksDBPendingStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the pending-transactions column family exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_pending = ColumnFamilyDescriptor::new(CF_PENDING, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf_pending])?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self) -> Result<&ColumnFamily> {
        self.db.cf_handle(CF_PENDING).ok_or_else(|| {
            ReconcileError::InternalError(Box::new(std::io::Error::other(
                "Pending transactions column family not found",
            )))
        })
    }
}

#[async_trait]
impl PendingTransactionStore for RocksDBPendingStore {
    async fn insert(&self, tx: PendingTransaction) -> Result<()> {
        let cf = self.cf()?;
        let value = serde_json::to_vec(&tx)?;
        self.db.put_cf(cf, tx.reference.as_str().as_bytes(), value)?;
        Ok(())
    }

    async fn get(&self, reference: &TxnRef) -> Result<Option<PendingTransaction>> {
        let cf = self.cf()?;
        match self.db.get_pinned_cf(cf, reference.as_str().as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, reference: &TxnRef) -> Result<bool> {
        let cf = self.cf()?;
        let key = reference.as_str().as_bytes();
        // Only check if the key exists without retrieving the value
        let existed = self.db.get_pinned_cf(cf, key)?.is_some();
        if existed {
            self.db.delete_cf(cf, key)?;
        }
        Ok(existed)
    }
}
