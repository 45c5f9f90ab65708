use super::pending::TxnRef;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Where a raw callback came from. Only ever used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceChannel {
    #[serde(rename = "deep_link")]
    OsDeepLink,
    #[serde(rename = "initial_url")]
    ColdStartInitialUrl,
    #[serde(rename = "web_view")]
    WebViewIntercept,
}

impl SourceChannel {
    pub const ALL: [SourceChannel; 3] = [
        SourceChannel::OsDeepLink,
        SourceChannel::ColdStartInitialUrl,
        SourceChannel::WebViewIntercept,
    ];
}

impl fmt::Display for SourceChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceChannel::OsDeepLink => "deep_link",
            SourceChannel::ColdStartInitialUrl => "initial_url",
            SourceChannel::WebViewIntercept => "web_view",
        };
        f.write_str(name)
    }
}

/// Provider response codes (VNPay numbering).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    Approved,
    SuspectedFraud,
    NotEnrolled,
    AuthenticationFailed,
    Timeout,
    InstrumentLocked,
    InvalidOtp,
    UserCancelled,
    InsufficientFunds,
    LimitExceeded,
    BankMaintenance,
    PasswordRetriesExceeded,
    Unknown(String),
}

/// What a non-approved code means for the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disposition {
    pub reason: &'static str,
    pub retryable: bool,
}

const GENERIC_FAILURE: Disposition = Disposition {
    reason: "payment failed",
    retryable: true,
};

impl ResponseCode {
    /// Parses either the provider's numeric code or the variant name.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw {
            "00" | "Approved" => ResponseCode::Approved,
            "07" | "SuspectedFraud" => ResponseCode::SuspectedFraud,
            "09" | "NotEnrolled" => ResponseCode::NotEnrolled,
            "10" | "AuthenticationFailed" => ResponseCode::AuthenticationFailed,
            "11" | "Timeout" => ResponseCode::Timeout,
            "12" | "InstrumentLocked" => ResponseCode::InstrumentLocked,
            "13" | "InvalidOtp" => ResponseCode::InvalidOtp,
            "24" | "UserCancelled" => ResponseCode::UserCancelled,
            "51" | "InsufficientFunds" => ResponseCode::InsufficientFunds,
            "65" | "LimitExceeded" => ResponseCode::LimitExceeded,
            "75" | "BankMaintenance" => ResponseCode::BankMaintenance,
            "79" | "PasswordRetriesExceeded" => ResponseCode::PasswordRetriesExceeded,
            other => ResponseCode::Unknown(other.to_string()),
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, ResponseCode::Approved)
    }

    /// Maps the code to the message shown to the user and whether the booking
    /// flow should offer a retry. Unrecognised codes get a generic, retryable
    /// failure.
    pub fn disposition(&self) -> Disposition {
        let (reason, retryable) = match self {
            ResponseCode::SuspectedFraud => ("payment flagged as suspicious by the bank", false),
            ResponseCode::NotEnrolled => ("card is not registered for internet banking", true),
            ResponseCode::AuthenticationFailed => ("card verification failed too many times", true),
            ResponseCode::Timeout => ("payment session expired", true),
            ResponseCode::InstrumentLocked => ("card or account is locked", false),
            ResponseCode::InvalidOtp => ("incorrect one-time password", true),
            ResponseCode::UserCancelled => ("payment was cancelled", false),
            ResponseCode::InsufficientFunds => ("insufficient balance", true),
            ResponseCode::LimitExceeded => ("daily transaction limit exceeded", true),
            ResponseCode::BankMaintenance => ("bank is under maintenance", true),
            ResponseCode::PasswordRetriesExceeded => {
                ("payment password entered incorrectly too many times", true)
            }
            ResponseCode::Approved | ResponseCode::Unknown(_) => return GENERIC_FAILURE,
        };
        Disposition { reason, retryable }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedCallback {
    pub reference: TxnRef,
    pub response_code: ResponseCode,
    /// Amount as sent by the provider, in minor units. `None` when the
    /// provider left it out or sent something unparsable.
    pub raw_amount: Option<Decimal>,
    pub source_channel: SourceChannel,
    /// Every other query parameter, already decoded.
    pub metadata: BTreeMap<String, String>,
}

impl NormalizedCallback {
    pub fn display_amount(&self, minor_unit_factor: u32) -> Option<Decimal> {
        let raw = self.raw_amount?;
        if minor_unit_factor == 0 {
            return Some(raw);
        }
        Some(raw / Decimal::from(minor_unit_factor))
    }
}
