use crate::domain::pending::{Amount, PendingTransaction, TxnRef};
use crate::error::{ReconcileError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize)]
struct PendingRecord {
    reference: String,
    expected_amount: Option<Decimal>,
    #[serde(default)]
    booking_context: String,
}

impl TryFrom<PendingRecord> for PendingTransaction {
    type Error = ReconcileError;

    fn try_from(record: PendingRecord) -> Result<Self> {
        let booking_context = if record.booking_context.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&record.booking_context)?
        };

        let mut pending = PendingTransaction::new(TxnRef::new(record.reference), booking_context);
        if let Some(amount) = record.expected_amount {
            pending = pending.with_expected_amount(Amount::new(amount)?);
        }
        Ok(pending)
    }
}

/// Reads pending bookings (`reference, expected_amount, booking_context`)
/// from a CSV source. The booking context column holds JSON.
pub struct PendingReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> PendingReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn pending(self) -> impl Iterator<Item = Result<PendingTransaction>> {
        self.reader.into_deserialize().map(|result| {
            result
                .map_err(ReconcileError::from)
                .and_then(|record: PendingRecord| PendingTransaction::try_from(record))
        })
    }
}
