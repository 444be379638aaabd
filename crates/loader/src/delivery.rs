use std::sync::Arc;

use courier_protocol::{Encoder, Record};
use log::{error, trace, warn};

use crate::{
    batch::Batch, destination::Destination, signal::CancelToken, stats::DeliveryStats,
};

enum Outcome {
    Delivered,
    Rejected,
    Abandoned,
    Cancelled,
}

/// One batch's worth of work: write every record to `prefix/<id>`.
///
/// Only transport failures consume retry budget. A rejecting status is logged and
/// the record counts as processed.
pub struct DeliveryTask<R, E, D> {
    prefix: Arc<str>,
    batch: Batch<R>,
    encoder: Arc<E>,
    destination: Arc<D>,
    retry_budget: u32,
    stats: Arc<DeliveryStats>,
}

impl<R, E, D> DeliveryTask<R, E, D>
where
    R: Record,
    E: Encoder<R>,
    D: Destination,
{
    pub fn new(
        prefix: Arc<str>,
        batch: Batch<R>,
        encoder: Arc<E>,
        destination: Arc<D>,
        retry_budget: u32,
        stats: Arc<DeliveryStats>,
    ) -> Self {
        Self {
            prefix,
            batch,
            encoder,
            destination,
            retry_budget: retry_budget.max(1),
            stats,
        }
    }

    /// Deliver the records in batch order. Returns early only when `cancel` is raised.
    pub fn run(self, cancel: &CancelToken) {
        let records = self.batch.records();
        trace!("Delivery task has {} records", records.len());

        for (pos, record) in records.iter().enumerate() {
            if cancel.is_cancelled() {
                self.abandon_rest(records.len() - pos);
                return;
            }

            let url = format!("{}/{}", self.prefix, record.id());
            let payload = match self.encoder.encode(record) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("While delivering batch {}: {e}", self.batch.range());
                    self.stats.record_encode_failure();
                    continue;
                }
            };

            match self.deliver(&url, &payload, cancel) {
                Outcome::Delivered => self.stats.record_delivered(),
                Outcome::Rejected => self.stats.record_rejected(),
                Outcome::Abandoned => self.stats.record_abandoned(),
                Outcome::Cancelled => {
                    self.abandon_rest(records.len() - pos);
                    return;
                }
            }
        }
    }

    fn deliver(&self, url: &str, payload: &[u8], cancel: &CancelToken) -> Outcome {
        let mut attempts_left = self.retry_budget;

        loop {
            trace!("Writing {} bytes to '{url}'", payload.len());

            match self.destination.write(url, payload) {
                Ok(response) if response.is_success() => {
                    trace!("HTTP response status code: {}", response.status);
                    return Outcome::Delivered;
                }
                Ok(response) => {
                    warn!(
                        "HTTP error status: {} from '{url}' ({})",
                        response.status, response.body
                    );
                    return Outcome::Rejected;
                }
                Err(e) => {
                    attempts_left -= 1;
                    if attempts_left == 0 {
                        error!(
                            "No retries left for '{url}' while inserting batch {}; giving up: {e}",
                            self.batch.range()
                        );
                        return Outcome::Abandoned;
                    }

                    warn!(
                        "IO error while inserting batch {} ({attempts_left} attempts left): {e}",
                        self.batch.range()
                    );
                    self.stats.record_retry();

                    if cancel.is_cancelled() {
                        return Outcome::Cancelled;
                    }
                }
            }
        }
    }

    fn abandon_rest(&self, remaining: usize) {
        warn!(
            "Delivery cancelled; {remaining} records of batch {} left undelivered",
            self.batch.range()
        );
        self.stats.record_cancelled(remaining as u64);
    }
}

#[cfg(test)]
#[path = "delivery_tests.rs"]
mod tests;
