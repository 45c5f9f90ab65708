use crate::domain::outcome::Outcome;
use crate::domain::pending::{PendingTransaction, TxnRef};
use crate::domain::ports::{OutcomePresenter, PendingTransactionStore};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// A thread-safe in-memory store for pending transactions.
///
/// Uses `Arc<RwLock<HashMap<TxnRef, PendingTransaction>>>` so clones share the
/// same map. Nothing survives a restart; use the RocksDB store for that.
#[derive(Default, Clone)]
pub struct InMemoryPendingStore {
    pending: Arc<RwLock<HashMap<TxnRef, PendingTransaction>>>,
}

impl InMemoryPendingStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.pending.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.read().await.is_empty()
    }
}

#[async_trait]
impl PendingTransactionStore for InMemoryPendingStore {
    async fn insert(&self, tx: PendingTransaction) -> Result<()> {
        let mut pending = self.pending.write().await;
        pending.insert(tx.reference.clone(), tx);
        Ok(())
    }

    async fn get(&self, reference: &TxnRef) -> Result<Option<PendingTransaction>> {
        let pending = self.pending.read().await;
        Ok(pending.get(reference).cloned())
    }

    async fn delete(&self, reference: &TxnRef) -> Result<bool> {
        let mut pending = self.pending.write().await;
        Ok(pending.remove(reference).is_some())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PresentedOutcome {
    pub reference: TxnRef,
    pub outcome: Outcome,
}

/// Presenter that records every outcome in arrival order.
///
/// The CLI drains it into CSV once all deliveries are processed; tests use it
/// to count presenter invocations.
#[derive(Default, Clone)]
pub struct CollectingPresenter {
    presented: Arc<Mutex<Vec<PresentedOutcome>>>,
}

impl CollectingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn outcomes(&self) -> Vec<PresentedOutcome> {
        self.presented.lock().await.clone()
    }
}

#[async_trait]
impl OutcomePresenter for CollectingPresenter {
    async fn present(&self, reference: &TxnRef, outcome: Outcome) -> Result<()> {
        self.presented.lock().await.push(PresentedOutcome {
            reference: reference.clone(),
            outcome,
        });
        Ok(())
    }
}
