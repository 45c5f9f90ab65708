//! Application layer containing the reconciliation orchestration.
//!
//! Raw redirects enter through the `DeliveryMultiplexer`, which queues them on
//! a `tokio` channel. A single worker drains the queue into the `Reconciler`,
//! which normalizes each callback, applies the per-reference guard and drives
//! the pending-transaction store and the outcome presenter.

pub mod guard;
pub mod multiplexer;
pub mod normalizer;
pub mod reconciler;
