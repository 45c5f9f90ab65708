use crate::domain::pending::TxnRef;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::warn;

/// Where a reference sits in the reconciliation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Idle,
    /// A callback for the reference is being reconciled right now.
    Processing,
    /// Reconciled; repeats are absorbed until `until`.
    CoolingDown { until: DateTime<Utc> },
}

/// Idempotency latch keyed by transaction reference.
///
/// A reference is armed when its first callback is accepted and stays armed
/// until the cool-down that starts once processing finishes has elapsed.
/// Expired entries are pruned whenever a new reference is armed.
#[derive(Debug)]
pub struct ReconciliationGuard {
    cool_down: chrono::Duration,
    armed: HashMap<TxnRef, GuardState>,
}

impl ReconciliationGuard {
    pub fn new(cool_down: std::time::Duration) -> Self {
        Self {
            cool_down: chrono::Duration::from_std(cool_down).unwrap_or(chrono::Duration::MAX),
            armed: HashMap::new(),
        }
    }

    pub fn state(&self, reference: &TxnRef, now: DateTime<Utc>) -> GuardState {
        match self.armed.get(reference) {
            Some(GuardState::CoolingDown { until }) if *until <= now => GuardState::Idle,
            Some(state) => *state,
            None => GuardState::Idle,
        }
    }

    /// Arms the guard for `reference`. Returns `false` when it is already
    /// armed, in which case the caller must drop the callback.
    pub fn try_arm(&mut self, reference: &TxnRef, now: DateTime<Utc>) -> bool {
        self.prune(now);
        if self.armed.contains_key(reference) {
            return false;
        }
        self.armed.insert(reference.clone(), GuardState::Processing);
        true
    }

    /// Processing finished; keep absorbing repeats for the cool-down window.
    pub fn start_cool_down(&mut self, reference: &TxnRef, now: DateTime<Utc>) {
        let until = now.checked_add_signed(self.cool_down).unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.armed
            .insert(reference.clone(), GuardState::CoolingDown { until });
    }

    /// Releases the reference immediately, e.g. when nothing was consumed.
    pub fn disarm(&mut self, reference: &TxnRef) {
        self.armed.remove(reference);
    }

    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        self.armed.retain(|_, state| match state {
            GuardState::CoolingDown { until } => *until > now,
            _ => true,
        });
    }
}

/// The guard as shared by every task reconciling callbacks. Never locked
/// across an `.await`.
pub type SharedGuard = Mutex<ReconciliationGuard>;

fn lock(guard: &SharedGuard) -> MutexGuard<'_, ReconciliationGuard> {
    guard.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Ownership of a reference's `Processing` entry.
///
/// Finish it with `start_cool_down` or `release`. If it is dropped instead
/// (the reconciling future was cancelled, timed out or panicked) the reference
/// is disarmed so a later delivery can still reconcile it.
pub struct ArmedRef<'a> {
    guard: &'a SharedGuard,
    reference: TxnRef,
    finished: bool,
}

impl<'a> ArmedRef<'a> {
    /// Arms `reference`, or returns `None` when it is already armed.
    pub fn arm(guard: &'a SharedGuard, reference: &TxnRef, now: DateTime<Utc>) -> Option<Self> {
        if !lock(guard).try_arm(reference, now) {
            return None;
        }
        Some(Self {
            guard,
            reference: reference.clone(),
            finished: false,
        })
    }

    pub fn start_cool_down(mut self, now: DateTime<Utc>) {
        self.finished = true;
        lock(self.guard).start_cool_down(&self.reference, now);
    }

    pub fn release(mut self) {
        self.finished = true;
        lock(self.guard).disarm(&self.reference);
    }
}

impl Drop for ArmedRef<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(reference = %self.reference, "Reconciliation abandoned, releasing reference");
            lock(self.guard).disarm(&self.reference);
        }
    }
}
