use crate::error::ReconcileError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Provider-assigned correlation id shared by a booking and its callback.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxnRef(String);

impl TxnRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TxnRef {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Represents a positive monetary amount in display currency.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, ReconcileError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(ReconcileError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = ReconcileError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Snapshot of the booking flow taken right before redirecting to the provider.
///
/// The reconciler never looks inside `booking_context`; it is handed back to
/// the presenter untouched once the payment settles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub reference: TxnRef,
    pub booking_context: serde_json::Value,
    /// Amount the booking expects the provider to charge, if known.
    #[serde(default)]
    pub expected_amount: Option<Amount>,
    pub created_at: DateTime<Utc>,
}

impl PendingTransaction {
    pub fn new(reference: impl Into<TxnRef>, booking_context: serde_json::Value) -> Self {
        Self {
            reference: reference.into(),
            booking_context,
            expected_amount: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_expected_amount(mut self, amount: Amount) -> Self {
        self.expected_amount = Some(amount);
        self
    }
}
