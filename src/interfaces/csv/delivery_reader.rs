use crate::application::multiplexer::Delivery;
use crate::domain::callback::SourceChannel;
use crate::error::{ReconcileError, Result};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize)]
struct DeliveryRecord {
    channel: SourceChannel,
    url: String,
}

/// Reads recorded callback deliveries (`channel, url`) from a CSV source.
///
/// Channels are `deep_link`, `initial_url` or `web_view`. URLs containing
/// commas must be quoted.
pub struct DeliveryReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> DeliveryReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily yields deliveries in file order.
    pub fn deliveries(self) -> impl Iterator<Item = Result<Delivery>> {
        self.reader.into_deserialize().map(|result| {
            result
                .map(|record: DeliveryRecord| Delivery {
                    raw: record.url,
                    channel: record.channel,
                })
                .map_err(ReconcileError::from)
        })
    }
}
