use serde::Serialize;

pub const UNCONFIRMED_MESSAGE: &str = "payment could not be confirmed";
pub const AMOUNT_MISMATCH_REASON: &str = "paid amount does not match the booking";

/// Terminal result of reconciling one callback.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Payment went through; the booking flow resumes with this context.
    Settled { booking_context: serde_json::Value },
    Failed { reason: String, retryable: bool },
    /// No pending booking matched the callback reference.
    UnknownTransaction,
}

impl Outcome {
    pub fn failed(reason: impl Into<String>, retryable: bool) -> Self {
        Outcome::Failed {
            reason: reason.into(),
            retryable,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Settled { .. } => "settled",
            Outcome::Failed { .. } => "failed",
            Outcome::UnknownTransaction => "unknown_transaction",
        }
    }

    /// Text the presenter shows; empty for a settled payment.
    pub fn user_message(&self) -> &str {
        match self {
            Outcome::Settled { .. } => "",
            Outcome::Failed { reason, .. } => reason,
            Outcome::UnknownTransaction => UNCONFIRMED_MESSAGE,
        }
    }

    /// Whether the presenter should offer a way back into the booking flow.
    pub fn offers_retry(&self) -> bool {
        match self {
            Outcome::Settled { .. } => false,
            Outcome::Failed { retryable, .. } => *retryable,
            Outcome::UnknownTransaction => true,
        }
    }
}
