#![allow(dead_code)]

use async_trait::async_trait;
use payrecon::application::reconciler::Reconciler;
use payrecon::config::ReconcilerConfig;
use payrecon::domain::pending::{PendingTransaction, TxnRef};
use payrecon::domain::ports::PendingTransactionStore;
use payrecon::error::{ReconcileError, Result};
use payrecon::infrastructure::clock::ManualClock;
use payrecon::infrastructure::in_memory::{CollectingPresenter, InMemoryPendingStore};
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::NamedTempFile;

pub const COOL_DOWN: Duration = Duration::from_secs(3);

pub fn callback_url(reference: &str, code: &str, amount: u64) -> String {
    format!(
        "app://payment/callback?vnp_Amount={amount}&vnp_BankCode=NCB&vnp_ResponseCode={code}&vnp_TxnRef={reference}"
    )
}

/// In-memory store that counts deletions, i.e. store mutations made by the
/// reconciler. Lookups can be slowed down to widen race windows.
#[derive(Clone, Default)]
pub struct CountingStore {
    inner: InMemoryPendingStore,
    deletes: Arc<AtomicUsize>,
    lookup_delay: Option<Duration>,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lookup_delay(mut self, delay: Duration) -> Self {
        self.lookup_delay = Some(delay);
        self
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub async fn contains(&self, reference: &str) -> bool {
        self.inner
            .get(&TxnRef::new(reference))
            .await
            .unwrap()
            .is_some()
    }
}

#[async_trait]
impl PendingTransactionStore for CountingStore {
    async fn insert(&self, tx: PendingTransaction) -> Result<()> {
        self.inner.insert(tx).await
    }

    async fn get(&self, reference: &TxnRef) -> Result<Option<PendingTransaction>> {
        if let Some(delay) = self.lookup_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.get(reference).await
    }

    async fn delete(&self, reference: &TxnRef) -> Result<bool> {
        let removed = self.inner.delete(reference).await?;
        if removed {
            self.deletes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(removed)
    }
}

/// Store whose lookups fail until `heal` is called.
#[derive(Clone, Default)]
pub struct FlakyStore {
    inner: InMemoryPendingStore,
    healthy: Arc<std::sync::atomic::AtomicBool>,
}

impl FlakyStore {
    pub fn heal(&self) {
        self.healthy.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PendingTransactionStore for FlakyStore {
    async fn insert(&self, tx: PendingTransaction) -> Result<()> {
        self.inner.insert(tx).await
    }

    async fn get(&self, reference: &TxnRef) -> Result<Option<PendingTransaction>> {
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(ReconcileError::IoError(std::io::Error::other(
                "storage unavailable",
            )));
        }
        self.inner.get(reference).await
    }

    async fn delete(&self, reference: &TxnRef) -> Result<bool> {
        self.inner.delete(reference).await
    }
}

pub struct Harness {
    pub reconciler: Arc<Reconciler>,
    pub store: CountingStore,
    pub presenter: CollectingPresenter,
    pub clock: ManualClock,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(CountingStore::new())
    }

    pub fn with_store(store: CountingStore) -> Self {
        let presenter = CollectingPresenter::new();
        let clock = ManualClock::default();
        let reconciler = Reconciler::new(
            &ReconcilerConfig::default().with_cool_down(COOL_DOWN),
            Box::new(store.clone()),
            Box::new(presenter.clone()),
        )
        .with_clock(Box::new(clock.clone()));
        Self {
            reconciler: Arc::new(reconciler),
            store,
            presenter,
            clock,
        }
    }

    pub async fn park(&self, tx: PendingTransaction) {
        self.store.insert(tx).await.unwrap();
    }
}

pub fn write_csv(lines: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file
}
