//! Runtime configuration for the reconciliation engine.
//!
//! Defaults target the VNPay sandbox and the `app://payment/callback` redirect
//! used by the booking flow. Every value can be overridden from the CLI.

use std::time::Duration;

/// Query parameter names carrying the fields the engine cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackFields {
    pub reference: String,
    pub response_code: String,
    pub amount: String,
}

impl Default for CallbackFields {
    fn default() -> Self {
        Self {
            reference: "vnp_TxnRef".to_string(),
            response_code: "vnp_ResponseCode".to_string(),
            amount: "vnp_Amount".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// How long a reference stays armed after its callback was processed.
    pub cool_down: Duration,
    /// Divisor turning the provider's minor-unit amount into display currency.
    pub minor_unit_factor: u32,
    /// Hosted payment page domain; subdomains match too.
    pub provider_host: String,
    /// Private URL scheme the provider redirects back to.
    pub callback_scheme: String,
    pub fields: CallbackFields,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            cool_down: Duration::from_secs(3),
            minor_unit_factor: 100,
            provider_host: "sandbox.vnpayment.vn".to_string(),
            callback_scheme: "app".to_string(),
            fields: CallbackFields::default(),
        }
    }
}

impl ReconcilerConfig {
    pub fn with_cool_down(mut self, cool_down: Duration) -> Self {
        self.cool_down = cool_down;
        self
    }
}
