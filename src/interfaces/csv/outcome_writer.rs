use crate::domain::outcome::Outcome;
use crate::error::Result;
use crate::infrastructure::in_memory::PresentedOutcome;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct OutcomeRecord<'a> {
    reference: &'a str,
    outcome: &'static str,
    reason: &'a str,
    retryable: bool,
    booking_context: String,
}

/// Writes presented outcomes as CSV, one row per presenter invocation.
pub struct OutcomeWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OutcomeWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_outcomes(&mut self, outcomes: &[PresentedOutcome]) -> Result<()> {
        for presented in outcomes {
            let booking_context = match &presented.outcome {
                Outcome::Settled { booking_context } => serde_json::to_string(booking_context)?,
                _ => String::new(),
            };
            self.writer.serialize(OutcomeRecord {
                reference: presented.reference.as_str(),
                outcome: presented.outcome.kind(),
                reason: presented.outcome.user_message(),
                retryable: presented.outcome.offers_retry(),
                booking_context,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
