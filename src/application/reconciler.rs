use super::guard::{ArmedRef, GuardState, ReconciliationGuard, SharedGuard};
use super::normalizer::CallbackNormalizer;
use crate::config::ReconcilerConfig;
use crate::domain::callback::{NormalizedCallback, SourceChannel};
use crate::domain::outcome::{AMOUNT_MISMATCH_REASON, Outcome};
use crate::domain::pending::{PendingTransaction, TxnRef};
use crate::domain::ports::{ClockBox, PendingStoreBox, PresenterBox};
use crate::error::{ReconcileError, Result};
use crate::infrastructure::clock::SystemClock;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, error, info, warn};

/// What happened to a single delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// The callback was reconciled and this outcome was presented.
    Presented(Outcome),
    /// Same reference already in flight or cooling down; nothing happened.
    Duplicate,
    /// Not a usable payment callback; logged and dropped.
    Malformed,
}

/// Matches provider callbacks to pending bookings, exactly once per reference.
///
/// The guard lock is only held to check-and-arm and to start the cool-down,
/// never across store I/O, so different references never wait on each other's
/// lookups. A reconciliation that is cancelled mid-flight releases its
/// reference on drop.
pub struct Reconciler {
    store: PendingStoreBox,
    presenter: PresenterBox,
    clock: ClockBox,
    normalizer: CallbackNormalizer,
    minor_unit_factor: u32,
    guard: SharedGuard,
}

impl Reconciler {
    /// Creates a reconciler using the system clock.
    ///
    /// # Arguments
    ///
    /// * `config` - Cool-down, amount factor and callback field names.
    /// * `store` - Where the booking flow parked pending transactions.
    /// * `presenter` - Receives exactly one outcome per reconciled reference.
    pub fn new(config: &ReconcilerConfig, store: PendingStoreBox, presenter: PresenterBox) -> Self {
        Self {
            store,
            presenter,
            clock: Box::new(SystemClock),
            normalizer: CallbackNormalizer::new(config.fields.clone()),
            minor_unit_factor: config.minor_unit_factor,
            guard: Mutex::new(ReconciliationGuard::new(config.cool_down)),
        }
    }

    pub fn with_clock(mut self, clock: ClockBox) -> Self {
        self.clock = clock;
        self
    }

    pub fn guard_state(&self, reference: &TxnRef) -> GuardState {
        self.guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state(reference, self.clock.now())
    }

    /// Normalizes a raw redirect and reconciles it. Malformed input never
    /// reaches the guard or the presenter.
    pub async fn handle_raw(&self, raw: &str, channel: SourceChannel) -> Result<Reconciliation> {
        match self.normalizer.normalize(raw, channel) {
            Ok(callback) => self.handle(callback).await,
            Err(ReconcileError::MalformedCallback(reason)) => {
                warn!(%channel, %reason, "Dropping malformed callback");
                Ok(Reconciliation::Malformed)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn handle(&self, callback: NormalizedCallback) -> Result<Reconciliation> {
        let reference = callback.reference.clone();
        let channel = callback.source_channel;

        let Some(armed) = ArmedRef::arm(&self.guard, &reference, self.clock.now()) else {
            debug!(%reference, %channel, "Duplicate callback suppressed");
            return Ok(Reconciliation::Duplicate);
        };

        let pending = match self.store.get(&reference).await {
            Ok(pending) => pending,
            Err(e) => {
                // Nothing was consumed, so a later delivery may try again.
                armed.release();
                error!(%reference, %channel, error = %e, "Pending transaction lookup failed");
                return Err(e);
            }
        };

        let result = self.resolve(&callback, pending).await;
        armed.start_cool_down(self.clock.now());

        match result {
            Ok(outcome) => {
                info!(%reference, %channel, outcome = outcome.kind(), "Callback reconciled");
                Ok(Reconciliation::Presented(outcome))
            }
            Err(e) => {
                error!(%reference, %channel, error = %e, "Reconciliation failed");
                Err(e)
            }
        }
    }

    async fn resolve(
        &self,
        callback: &NormalizedCallback,
        pending: Option<PendingTransaction>,
    ) -> Result<Outcome> {
        let reference = &callback.reference;
        let outcome = match pending {
            Some(pending) => {
                let outcome = self.decide(callback, pending);
                self.store.delete(reference).await?;
                outcome
            }
            None => {
                warn!(%reference, "No pending transaction for callback");
                Outcome::UnknownTransaction
            }
        };

        if let Err(e) = self.presenter.present(reference, outcome.clone()).await {
            error!(
                %reference,
                outcome = outcome.kind(),
                message = outcome.user_message(),
                error = %e,
                "Outcome was decided but could not be presented"
            );
            return Err(e);
        }
        Ok(outcome)
    }

    fn decide(&self, callback: &NormalizedCallback, pending: PendingTransaction) -> Outcome {
        if !callback.response_code.is_approved() {
            let disposition = callback.response_code.disposition();
            return Outcome::failed(disposition.reason, disposition.retryable);
        }

        let paid = callback.display_amount(self.minor_unit_factor);
        if let (Some(expected), Some(paid)) = (pending.expected_amount, paid) {
            if paid != expected.value() {
                warn!(
                    reference = %callback.reference,
                    %paid,
                    expected = %expected.value(),
                    "Approved amount does not match booking"
                );
                return Outcome::failed(AMOUNT_MISMATCH_REASON, false);
            }
        }

        Outcome::Settled {
            booking_context: pending.booking_context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::outcome::UNCONFIRMED_MESSAGE;
    use crate::domain::pending::Amount;
    use crate::domain::ports::{OutcomePresenter, PendingTransactionStore};
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::in_memory::{CollectingPresenter, InMemoryPendingStore};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::time::Duration;

    fn callback(reference: &str, code: &str, amount: u64) -> String {
        format!(
            "app://payment/callback?vnp_TxnRef={reference}&vnp_ResponseCode={code}&vnp_Amount={amount}"
        )
    }

    fn setup() -> (Reconciler, InMemoryPendingStore, CollectingPresenter, ManualClock) {
        let store = InMemoryPendingStore::new();
        let presenter = CollectingPresenter::new();
        let clock = ManualClock::default();
        let reconciler = Reconciler::new(
            &ReconcilerConfig::default().with_cool_down(Duration::from_secs(3)),
            Box::new(store.clone()),
            Box::new(presenter.clone()),
        )
        .with_clock(Box::new(clock.clone()));
        (reconciler, store, presenter, clock)
    }

    #[tokio::test]
    async fn test_approved_callback_settles_and_consumes() {
        let (reconciler, store, presenter, _) = setup();
        store
            .insert(PendingTransaction::new("TX1", json!({"vehicle_id": 9})))
            .await
            .unwrap();

        let result = reconciler
            .handle_raw(&callback("TX1", "00", 200000000), SourceChannel::OsDeepLink)
            .await
            .unwrap();

        assert_eq!(
            result,
            Reconciliation::Presented(Outcome::Settled {
                booking_context: json!({"vehicle_id": 9})
            })
        );
        assert!(store.is_empty().await);
        assert_eq!(presenter.outcomes().await.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_within_cool_down_is_dropped() {
        let (reconciler, store, presenter, clock) = setup();
        store
            .insert(PendingTransaction::new("TX1", json!({})))
            .await
            .unwrap();

        let raw = callback("TX1", "00", 0);
        reconciler
            .handle_raw(&raw, SourceChannel::OsDeepLink)
            .await
            .unwrap();
        clock.advance(Duration::from_secs(2));
        let second = reconciler
            .handle_raw(&raw, SourceChannel::WebViewIntercept)
            .await
            .unwrap();

        assert_eq!(second, Reconciliation::Duplicate);
        assert_eq!(presenter.outcomes().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_reference_is_presented_without_mutation() {
        let (reconciler, store, presenter, _) = setup();
        store
            .insert(PendingTransaction::new("OTHER", json!({})))
            .await
            .unwrap();

        let result = reconciler
            .handle_raw(&callback("TX9", "00", 0), SourceChannel::OsDeepLink)
            .await
            .unwrap();

        assert_eq!(result, Reconciliation::Presented(Outcome::UnknownTransaction));
        assert_eq!(store.len().await, 1);
        let outcomes = presenter.outcomes().await;
        assert_eq!(outcomes[0].outcome.user_message(), UNCONFIRMED_MESSAGE);
    }

    #[tokio::test]
    async fn test_malformed_callback_is_never_presented() {
        let (reconciler, _, presenter, _) = setup();
        let result = reconciler
            .handle_raw("app://payment/callback?vnp_Amount=100", SourceChannel::OsDeepLink)
            .await
            .unwrap();

        assert_eq!(result, Reconciliation::Malformed);
        assert!(presenter.outcomes().await.is_empty());
    }

    #[tokio::test]
    async fn test_amount_mismatch_fails_without_retry() {
        let (reconciler, store, _, _) = setup();
        store
            .insert(
                PendingTransaction::new("TX3", json!({}))
                    .with_expected_amount(Amount::new(dec!(2000000)).unwrap()),
            )
            .await
            .unwrap();

        let result = reconciler
            .handle_raw(&callback("TX3", "00", 100000000), SourceChannel::OsDeepLink)
            .await
            .unwrap();

        assert_eq!(
            result,
            Reconciliation::Presented(Outcome::failed(AMOUNT_MISMATCH_REASON, false))
        );
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_matching_amount_settles() {
        let (reconciler, store, _, _) = setup();
        store
            .insert(
                PendingTransaction::new("TX4", json!({"total": "2000000"}))
                    .with_expected_amount(Amount::new(dec!(2000000.00)).unwrap()),
            )
            .await
            .unwrap();

        let result = reconciler
            .handle_raw(&callback("TX4", "00", 200000000), SourceChannel::OsDeepLink)
            .await
            .unwrap();

        assert!(matches!(
            result,
            Reconciliation::Presented(Outcome::Settled { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_amount_is_not_a_mismatch() {
        let (reconciler, store, _, _) = setup();
        store
            .insert(
                PendingTransaction::new("TX1", json!({"vehicle_id": 9}))
                    .with_expected_amount(Amount::new(dec!(2000000)).unwrap()),
            )
            .await
            .unwrap();

        let result = reconciler
            .handle_raw(
                "app://payment/callback?vnp_TxnRef=TX1&vnp_ResponseCode=00",
                SourceChannel::OsDeepLink,
            )
            .await
            .unwrap();

        assert_eq!(
            result,
            Reconciliation::Presented(Outcome::Settled {
                booking_context: json!({"vehicle_id": 9})
            })
        );
        assert!(store.is_empty().await);
    }

    struct UnavailablePresenter;

    #[async_trait]
    impl OutcomePresenter for UnavailablePresenter {
        async fn present(&self, _reference: &TxnRef, _outcome: Outcome) -> Result<()> {
            Err(ReconcileError::ChannelClosed)
        }
    }

    #[tokio::test]
    async fn test_presenter_failure_is_reported_and_cools_down() {
        let store = InMemoryPendingStore::new();
        let clock = ManualClock::default();
        let reconciler = Reconciler::new(
            &ReconcilerConfig::default(),
            Box::new(store.clone()),
            Box::new(UnavailablePresenter),
        )
        .with_clock(Box::new(clock.clone()));
        store
            .insert(PendingTransaction::new("TX1", json!({})))
            .await
            .unwrap();

        let result = reconciler
            .handle_raw(&callback("TX1", "51", 0), SourceChannel::OsDeepLink)
            .await;

        assert!(matches!(result, Err(ReconcileError::ChannelClosed)));
        assert!(store.is_empty().await);
        assert!(matches!(
            reconciler.guard_state(&TxnRef::new("TX1")),
            GuardState::CoolingDown { .. }
        ));
    }

    #[tokio::test]
    async fn test_guard_states_follow_lifecycle() {
        let (reconciler, store, _, clock) = setup();
        let tx1 = TxnRef::new("TX1");
        store
            .insert(PendingTransaction::new("TX1", json!({})))
            .await
            .unwrap();

        assert_eq!(reconciler.guard_state(&tx1), GuardState::Idle);
        reconciler
            .handle_raw(&callback("TX1", "24", 0), SourceChannel::OsDeepLink)
            .await
            .unwrap();
        assert!(matches!(
            reconciler.guard_state(&tx1),
            GuardState::CoolingDown { .. }
        ));

        clock.advance(Duration::from_secs(3));
        assert_eq!(reconciler.guard_state(&tx1), GuardState::Idle);
    }
}
