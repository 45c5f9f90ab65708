use super::outcome::Outcome;
use super::pending::{PendingTransaction, TxnRef};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Durable map from transaction reference to the booking snapshot awaiting
/// settlement. Only point lookups; no scans.
#[async_trait]
pub trait PendingTransactionStore: Send + Sync {
    async fn insert(&self, tx: PendingTransaction) -> Result<()>;
    /// Returns `None` for references that were never stored or already removed.
    async fn get(&self, reference: &TxnRef) -> Result<Option<PendingTransaction>>;
    /// Returns whether a record was actually removed.
    async fn delete(&self, reference: &TxnRef) -> Result<bool>;
}

/// Surfaces a terminal outcome to the user.
#[async_trait]
pub trait OutcomePresenter: Send + Sync {
    async fn present(&self, reference: &TxnRef, outcome: Outcome) -> Result<()>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type PendingStoreBox = Box<dyn PendingTransactionStore>;
pub type PresenterBox = Box<dyn OutcomePresenter>;
pub type ClockBox = Box<dyn Clock>;
